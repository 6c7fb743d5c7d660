//! Helpers over the raw libsqlite3 bindings.
//!
//! The bindings themselves come from `libsqlite3-sys` (bundled build); this
//! module re-exports the handful the driver touches and wraps the calls
//! that return static or borrowed C strings.

use std::ffi::{CStr, c_int};

pub use libsqlite3_sys::{
    SQLITE_AUTH, SQLITE_BLOB, SQLITE_BUSY, SQLITE_CONSTRAINT, SQLITE_DONE, SQLITE_ERROR,
    SQLITE_FLOAT, SQLITE_INTEGER, SQLITE_LOCKED, SQLITE_NOTFOUND, SQLITE_NULL, SQLITE_OK,
    SQLITE_OPEN_CREATE, SQLITE_OPEN_FULLMUTEX, SQLITE_OPEN_READONLY, SQLITE_OPEN_READWRITE,
    SQLITE_OPEN_URI, SQLITE_PERM, SQLITE_ROW, SQLITE_TEXT, SQLITE_TRANSIENT, sqlite3,
    sqlite3_bind_blob, sqlite3_bind_double, sqlite3_bind_int, sqlite3_bind_int64,
    sqlite3_bind_null, sqlite3_bind_text, sqlite3_busy_timeout, sqlite3_changes,
    sqlite3_column_blob, sqlite3_column_bytes, sqlite3_column_count,
    sqlite3_column_double, sqlite3_column_int64, sqlite3_column_name, sqlite3_column_text,
    sqlite3_column_type, sqlite3_errcode, sqlite3_errmsg, sqlite3_exec, sqlite3_finalize,
    sqlite3_free, sqlite3_last_insert_rowid, sqlite3_open_v2, sqlite3_prepare_v2, sqlite3_step,
    sqlite3_stmt,
};

// `libsqlite3-sys` blocklists `sqlite3_close_v2` from its bundled bindings,
// but the bundled amalgamation still exports the symbol.
unsafe extern "C" {
    pub fn sqlite3_close_v2(db: *mut sqlite3) -> c_int;
}

/// SQLite library version string, e.g. `3.46.0`.
pub fn version() -> &'static str {
    // SAFETY: sqlite3_libversion returns a static NUL-terminated string
    unsafe {
        CStr::from_ptr(libsqlite3_sys::sqlite3_libversion())
            .to_str()
            .unwrap_or("unknown")
    }
}

/// SQLite library version as `3XXYYZZ`.
pub fn version_number() -> i32 {
    // SAFETY: no preconditions
    unsafe { libsqlite3_sys::sqlite3_libversion_number() }
}

/// English description of a result code.
pub fn error_string(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a static string for every code
    unsafe {
        CStr::from_ptr(libsqlite3_sys::sqlite3_errstr(code))
            .to_str()
            .unwrap_or("unknown error")
    }
}

/// Most recent error message of `db`.
///
/// # Safety
/// `db` must be a valid open connection handle.
pub unsafe fn last_error(db: *mut sqlite3) -> (c_int, String) {
    // SAFETY: caller guarantees db is valid; errmsg is owned by SQLite and
    // copied before the next call on db
    unsafe {
        let code = sqlite3_errcode(db);
        let msg = CStr::from_ptr(sqlite3_errmsg(db))
            .to_string_lossy()
            .into_owned();
        (code, msg)
    }
}
