//! Driver-neutral SQL values.
//!
//! Parameters are bound and result columns are read as [`Value`]. Temporal
//! variants use epoch offsets so every driver can encode them the same way.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Days from 0001-01-01 (CE day 1) to 1970-01-01.
pub(crate) const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// One SQL value, as bound to a parameter or read from a result column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    /// Exact numeric kept in its textual form
    Decimal(String),
    Text(String),
    Bytes(Vec<u8>),
    /// Days since 1970-01-01
    Date(i32),
    /// Microseconds since midnight
    Time(i64),
    /// Microseconds since the Unix epoch, no zone
    Timestamp(i64),
    /// Microseconds since the Unix epoch, UTC
    TimestampTz(i64),
    Uuid([u8; 16]),
    Json(serde_json::Value),
}

impl Value {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// SQL-style name of the variant, used in conversion errors.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOLEAN",
            Self::TinyInt(_) => "TINYINT",
            Self::SmallInt(_) => "SMALLINT",
            Self::Int(_) => "INTEGER",
            Self::BigInt(_) => "BIGINT",
            Self::Float(_) => "REAL",
            Self::Double(_) => "DOUBLE",
            Self::Decimal(_) => "DECIMAL",
            Self::Text(_) => "TEXT",
            Self::Bytes(_) => "BLOB",
            Self::Date(_) => "DATE",
            Self::Time(_) => "TIME",
            Self::Timestamp(_) => "TIMESTAMP",
            Self::TimestampTz(_) => "TIMESTAMPTZ",
            Self::Uuid(_) => "UUID",
            Self::Json(_) => "JSON",
        }
    }

    /// Whether this value is one of the integer variants.
    pub const fn is_integer(&self) -> bool {
        matches!(
            self,
            Self::TinyInt(_) | Self::SmallInt(_) | Self::Int(_) | Self::BigInt(_)
        )
    }

    /// Integer variants and booleans widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Self::TinyInt(v) => v.into(),
            Self::SmallInt(v) => v.into(),
            Self::Int(v) => v.into(),
            Self::BigInt(v) => v,
            Self::Bool(v) => v.into(),
            _ => return None,
        })
    }

    /// Integers are true when non-zero.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            other => other.as_i64().map(|n| n != 0),
        }
    }

    /// Any numeric variant as `f64`; decimals are parsed.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(f64::from(*v)),
            Self::Double(v) => Some(*v),
            Self::BigInt(v) => Some(*v as f64),
            Self::Decimal(s) => s.trim().parse().ok(),
            Self::Bool(_) => None,
            other => other.as_i64().map(|n| n as f64),
        }
    }
}

/// Human-readable rendering, used in log fields and optimistic lock messages.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(v) => fmt::Display::fmt(v, f),
            Self::TinyInt(v) => fmt::Display::fmt(v, f),
            Self::SmallInt(v) => fmt::Display::fmt(v, f),
            Self::Int(v) => fmt::Display::fmt(v, f),
            Self::BigInt(v) => fmt::Display::fmt(v, f),
            Self::Float(v) => fmt::Display::fmt(v, f),
            Self::Double(v) => fmt::Display::fmt(v, f),
            Self::Decimal(s) | Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Self::Date(days) => match date_from_days(*days) {
                Some(d) => write!(f, "{d}"),
                None => write!(f, "date({days})"),
            },
            Self::Time(us) => match time_from_micros(*us) {
                Some(t) => write!(f, "{t}"),
                None => write!(f, "time({us})"),
            },
            Self::Timestamp(us) | Self::TimestampTz(us) => {
                match DateTime::from_timestamp_micros(*us) {
                    Some(dt) => write!(f, "{}", dt.naive_utc()),
                    None => write!(f, "timestamp({us})"),
                }
            }
            Self::Uuid(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if matches!(i, 4 | 6 | 8 | 10) {
                        f.write_str("-")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
            Self::Json(v) => fmt::Display::fmt(v, f),
        }
    }
}

/// Calendar date for a day offset from 1970-01-01.
pub(crate) fn date_from_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days.checked_add(UNIX_EPOCH_DAYS_FROM_CE)?)
}

/// Wall-clock time for a microsecond offset from midnight.
pub(crate) fn time_from_micros(us: i64) -> Option<NaiveTime> {
    let secs = u32::try_from(us.div_euclid(1_000_000)).ok()?;
    let nanos = u32::try_from(us.rem_euclid(1_000_000) * 1_000).ok()?;
    NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Self::$variant(v)
            }
        })*
    };
}

value_from! {
    bool => Bool,
    i8 => TinyInt,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    String => Text,
    Vec<u8> => Bytes,
    [u8; 16] => Uuid,
    serde_json::Value => Json,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        let whole = i64::from(v.num_seconds_from_midnight());
        Self::Time(whole * 1_000_000 + i64::from(v.nanosecond() / 1_000))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::Timestamp(v.and_utc().timestamp_micros())
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::TimestampTz(v.timestamp_micros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_integers() {
        assert_eq!(Value::from(42i8), Value::TinyInt(42));
        assert_eq!(Value::from(42i16), Value::SmallInt(42));
        assert_eq!(Value::from(42i32), Value::Int(42));
        assert_eq!(Value::from(42i64), Value::BigInt(42));
    }

    #[test]
    fn test_from_option() {
        let some: Value = Some(42i32).into();
        assert_eq!(some, Value::Int(42));

        let none: Value = Option::<i32>::None.into();
        assert_eq!(none, Value::Null);
    }

    #[test]
    fn test_as_i64_widens_all_integer_variants() {
        assert_eq!(Value::TinyInt(5).as_i64(), Some(5));
        assert_eq!(Value::Int(5).as_i64(), Some(5));
        assert_eq!(Value::BigInt(5).as_i64(), Some(5));
        assert_eq!(Value::Text("5".into()).as_i64(), None);
        assert!(Value::SmallInt(1).is_integer());
        assert!(!Value::Double(1.0).is_integer());
    }

    #[test]
    fn test_chrono_round_trip_through_epoch_offsets() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(Value::from(epoch), Value::Date(0));
        assert_eq!(date_from_days(1), NaiveDate::from_ymd_opt(1970, 1, 2));

        let ts = NaiveDate::from_ymd_opt(2024, 3, 5)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        let Value::Timestamp(us) = Value::from(ts) else {
            panic!("expected timestamp");
        };
        assert_eq!(DateTime::from_timestamp_micros(us).unwrap().naive_utc(), ts);

        let t = NaiveTime::from_hms_opt(1, 2, 3).unwrap();
        assert_eq!(Value::from(t), Value::Time(3_723_000_000));
        assert_eq!(time_from_micros(3_723_000_000), Some(t));
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::BigInt(7).to_string(), "7");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Text("Ada".into()).to_string(), "Ada");
        assert_eq!(Value::Date(0).to_string(), "1970-01-01");
        assert_eq!(
            Value::Uuid([0u8; 16]).to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Bool(true).as_i64(), Some(1));
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Decimal(" 2.50".into()).as_f64(), Some(2.5));
        assert_eq!(Value::SmallInt(3).as_f64(), Some(3.0));
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::Text("1".into()).as_bool(), None);
    }
}
