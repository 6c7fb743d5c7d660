//! Result rows and typed column decoding.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::{Value, date_from_days, time_from_micros};

/// Result column labels of one statement, shared by all of its rows.
#[derive(Debug, Clone, Default)]
pub struct ColumnIndex {
    labels: Vec<String>,
    exact: HashMap<String, usize>,
    /// Lower-cased label -> first position, for drivers that fold case
    folded: HashMap<String, usize>,
}

impl ColumnIndex {
    pub fn new(labels: Vec<String>) -> Self {
        let mut exact = HashMap::with_capacity(labels.len());
        let mut folded = HashMap::with_capacity(labels.len());
        for (pos, label) in labels.iter().enumerate() {
            exact.entry(label.clone()).or_insert(pos);
            folded.entry(label.to_lowercase()).or_insert(pos);
        }
        Self {
            labels,
            exact,
            folded,
        }
    }

    /// Position of `label`, matched exactly.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.exact.get(label).copied()
    }

    /// Position of `label`; an exact match wins over a case-folded one.
    pub fn position_ignore_case(&self, label: &str) -> Option<usize> {
        self.position(label)
            .or_else(|| self.folded.get(&label.to_lowercase()).copied())
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// One result row: values in select-list order plus the shared label index.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<ColumnIndex>,
    values: Vec<Value>,
}

impl Row {
    /// Standalone row with its own label index.
    pub fn new(labels: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnIndex::new(labels)), values)
    }

    /// Row sharing the label index of its result set.
    pub fn with_columns(columns: Arc<ColumnIndex>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &Arc<ColumnIndex> {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Value under an exact result label.
    pub fn get_by_name(&self, label: &str) -> Option<&Value> {
        self.columns.position(label).and_then(|i| self.get(i))
    }

    /// Value under a result label, tolerating drivers that change label case.
    pub fn get_ignore_case(&self, label: &str) -> Option<&Value> {
        self.columns
            .position_ignore_case(label)
            .and_then(|i| self.get(i))
    }

    /// Decode the value under `label` as `T`.
    ///
    /// A missing label is a type error naming the label.
    #[allow(clippy::result_large_err)]
    pub fn get_named<T: FromValue>(&self, label: &str) -> Result<T> {
        let Some(value) = self.get_by_name(label) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: "no such column".to_string(),
                column: Some(label.to_string()),
                rust_type: None,
            }));
        };
        T::from_value(value).map_err(|err| match err {
            Error::Type(mut te) => {
                te.column.get_or_insert_with(|| label.to_string());
                Error::Type(te)
            }
            other => other,
        })
    }

    /// `(label, value)` pairs in select-list order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns
            .labels()
            .iter()
            .map(String::as_str)
            .zip(&self.values)
    }
}

/// Decoding of a [`Value`] into a Rust property type.
///
/// Impls accept the value shapes a driver produces for the type without
/// coercing across families; reshaping (text to number, wide to narrow
/// integer) is the job of the conversion service.
pub trait FromValue: Sized {
    #[allow(clippy::result_large_err)]
    fn from_value(value: &Value) -> Result<Self>;
}

fn unexpected(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: match value {
            Value::Text(s) => format!("TEXT '{s}'"),
            other => other.type_name().to_string(),
        },
        column: None,
        rust_type: None,
    })
}

/// Integer width rank of a value; booleans count as the narrowest.
fn integer_rank(value: &Value) -> Option<(u8, i64)> {
    let rank = match value {
        Value::Bool(_) => 0,
        Value::TinyInt(_) => 1,
        Value::SmallInt(_) => 2,
        Value::Int(_) => 3,
        Value::BigInt(_) => 4,
        _ => return None,
    };
    value.as_i64().map(|n| (rank, n))
}

macro_rules! integer_from_value {
    ($($ty:ty => $rank:literal),* $(,)?) => {
        $(impl FromValue for $ty {
            fn from_value(value: &Value) -> Result<Self> {
                // Only variants no wider than the target are accepted.
                integer_rank(value)
                    .filter(|(rank, _)| *rank <= $rank)
                    .and_then(|(_, n)| <$ty>::try_from(n).ok())
                    .ok_or_else(|| unexpected(stringify!($ty), value))
            }
        })*
    };
}

integer_from_value! {
    i8 => 1,
    i16 => 2,
    i32 => 3,
    i64 => 4,
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_bool().ok_or_else(|| unexpected("bool", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| unexpected("f64", value))
    }
}

impl FromValue for f32 {
    #[allow(clippy::cast_possible_truncation)]
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Float(v) => Ok(*v),
            other => other
                .as_f64()
                .map(|d| d as f32)
                .ok_or_else(|| unexpected("f32", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) | Value::Decimal(s) => Ok(s.clone()),
            other => Err(unexpected("String", other)),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Bytes(b) => Ok(b.clone()),
            Value::Text(s) => Ok(s.clone().into_bytes()),
            other => Err(unexpected("Vec<u8>", other)),
        }
    }
}

impl FromValue for serde_json::Value {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Json(v) => Ok(v.clone()),
            Value::Text(s) => serde_json::from_str(s).map_err(|_| unexpected("JSON", value)),
            other => Err(unexpected("JSON", other)),
        }
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// Temporal columns arrive as epoch offsets from typed drivers and as ISO-8601
// text from SQLite.

/// Accepts both the space and the `T` separator, with optional fraction.
fn parse_timestamp_text(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

fn timestamp_micros(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(us) | Value::TimestampTz(us) => DateTime::from_timestamp_micros(*us),
        _ => None,
    }
}

impl FromValue for NaiveDateTime {
    fn from_value(value: &Value) -> Result<Self> {
        let decoded = match value {
            Value::Text(s) => parse_timestamp_text(s),
            Value::Date(days) => date_from_days(*days).and_then(|d| d.and_hms_opt(0, 0, 0)),
            other => timestamp_micros(other).map(|dt| dt.naive_utc()),
        };
        decoded.ok_or_else(|| unexpected("NaiveDateTime", value))
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Result<Self> {
        let decoded = match value {
            Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_timestamp_text(s).map(|naive| naive.and_utc())),
            other => timestamp_micros(other),
        };
        decoded.ok_or_else(|| unexpected("DateTime<Utc>", value))
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> Result<Self> {
        let decoded = match value {
            Value::Date(days) => date_from_days(*days),
            Value::Text(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .ok()
                .or_else(|| parse_timestamp_text(s).map(|dt| dt.date())),
            other => timestamp_micros(other).map(|dt| dt.date_naive()),
        };
        decoded.ok_or_else(|| unexpected("NaiveDate", value))
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: &Value) -> Result<Self> {
        let decoded = match value {
            Value::Time(us) => time_from_micros(*us),
            Value::Text(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f").ok(),
            _ => None,
        };
        decoded.ok_or_else(|| unexpected("NaiveTime", value))
    }
}
