//! Value encoding between `sqlmapper_core::Value` and SQLite storage classes.
//!
//! SQLite stores INTEGER, REAL, TEXT, BLOB or NULL. Temporal values are
//! written as ISO-8601 text, which the core temporal decoders parse back;
//! UUIDs as 16-byte blobs and JSON as text.

#![allow(clippy::cast_possible_truncation)]

use std::ffi::{CStr, c_int};

use chrono::{DateTime, NaiveTime};
use sqlmapper_core::Value;

use crate::ffi;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Bind `value` to the 1-based parameter `index`.
///
/// # Safety
/// `stmt` must be a valid prepared statement handle.
pub unsafe fn bind_value(stmt: *mut ffi::sqlite3_stmt, index: c_int, value: &Value) -> c_int {
    // SAFETY: caller guarantees stmt is valid; SQLITE_TRANSIENT makes SQLite
    // copy text and blobs before the borrowed buffers go away
    unsafe {
        match value {
            Value::Null => ffi::sqlite3_bind_null(stmt, index),
            Value::Bool(b) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*b)),
            Value::TinyInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::SmallInt(v) => ffi::sqlite3_bind_int(stmt, index, c_int::from(*v)),
            Value::Int(v) => ffi::sqlite3_bind_int(stmt, index, *v),
            Value::BigInt(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
            Value::Float(v) => ffi::sqlite3_bind_double(stmt, index, f64::from(*v)),
            Value::Double(v) => ffi::sqlite3_bind_double(stmt, index, *v),
            Value::Text(s) | Value::Decimal(s) => bind_text(stmt, index, s),
            Value::Bytes(b) => bind_blob(stmt, index, b),
            Value::Uuid(bytes) => bind_blob(stmt, index, bytes),
            Value::Json(json) => bind_text(stmt, index, &json.to_string()),
            temporal => match temporal_text(temporal) {
                Some(text) => bind_text(stmt, index, &text),
                None => ffi::sqlite3_bind_null(stmt, index),
            },
        }
    }
}

unsafe fn bind_text(stmt: *mut ffi::sqlite3_stmt, index: c_int, text: &str) -> c_int {
    // SAFETY: pointer and length describe a live UTF-8 buffer; SQLite copies it
    unsafe {
        ffi::sqlite3_bind_text(
            stmt,
            index,
            text.as_ptr().cast(),
            text.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

unsafe fn bind_blob(stmt: *mut ffi::sqlite3_stmt, index: c_int, bytes: &[u8]) -> c_int {
    // SAFETY: pointer and length describe a live buffer; SQLite copies it
    unsafe {
        ffi::sqlite3_bind_blob(
            stmt,
            index,
            bytes.as_ptr().cast(),
            bytes.len() as c_int,
            ffi::SQLITE_TRANSIENT(),
        )
    }
}

/// ISO-8601 text for date, time and timestamp values.
fn temporal_text(value: &Value) -> Option<String> {
    match value {
        Value::Date(days) => DateTime::from_timestamp(i64::from(*days) * 86_400, 0)
            .map(|dt| dt.date_naive().format("%Y-%m-%d").to_string()),
        Value::Time(micros) => {
            let secs = u32::try_from(micros.div_euclid(1_000_000)).ok()?;
            let nanos = u32::try_from(micros.rem_euclid(1_000_000) * 1_000).ok()?;
            NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                .map(|t| t.format("%H:%M:%S%.6f").to_string())
        }
        Value::Timestamp(micros) | Value::TimestampTz(micros) => {
            DateTime::from_timestamp_micros(*micros)
                .map(|dt| dt.naive_utc().format(TIMESTAMP_FORMAT).to_string())
        }
        _ => None,
    }
}

/// Read column `index` of the current row.
///
/// Integers that fit in 32 bits come back as `Value::Int`, wider ones as
/// `Value::BigInt`.
///
/// # Safety
/// `stmt` must be a valid statement positioned on a row (`SQLITE_ROW`).
pub unsafe fn read_column(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Value {
    // SAFETY: caller guarantees stmt is on a row; returned buffers are
    // copied before the next step
    unsafe {
        match ffi::sqlite3_column_type(stmt, index) {
            ffi::SQLITE_INTEGER => {
                let v = ffi::sqlite3_column_int64(stmt, index);
                i32::try_from(v).map_or(Value::BigInt(v), Value::Int)
            }
            ffi::SQLITE_FLOAT => Value::Double(ffi::sqlite3_column_double(stmt, index)),
            ffi::SQLITE_TEXT => {
                let ptr = ffi::sqlite3_column_text(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() {
                    Value::Null
                } else {
                    let slice = std::slice::from_raw_parts(ptr, len as usize);
                    Value::Text(String::from_utf8_lossy(slice).into_owned())
                }
            }
            ffi::SQLITE_BLOB => {
                let ptr = ffi::sqlite3_column_blob(stmt, index);
                let len = ffi::sqlite3_column_bytes(stmt, index);
                if ptr.is_null() || len == 0 {
                    Value::Bytes(Vec::new())
                } else {
                    Value::Bytes(std::slice::from_raw_parts(ptr.cast::<u8>(), len as usize).to_vec())
                }
            }
            _ => Value::Null,
        }
    }
}

/// Result column name as reported by SQLite (the `AS` alias when given).
///
/// # Safety
/// `stmt` must be a valid prepared statement.
pub unsafe fn column_name(stmt: *mut ffi::sqlite3_stmt, index: c_int) -> Option<String> {
    // SAFETY: caller guarantees stmt is valid
    unsafe {
        let ptr = ffi::sqlite3_column_name(stmt, index);
        if ptr.is_null() {
            None
        } else {
            CStr::from_ptr(ptr).to_str().ok().map(String::from)
        }
    }
}
