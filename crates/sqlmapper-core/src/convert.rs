//! Pluggable SQL-to-host value conversion.
//!
//! Drivers hand back whatever representation the database produced: SQLite
//! returns `INTEGER` columns as `Int`/`BigInt` regardless of the declared
//! width, decimals arrive as text, booleans as integers. Before a raw value
//! is assigned to a struct property, the [`ConversionService`] reshapes it
//! into the variant the property's [`FromValue`] impl expects.
//!
//! Converters are keyed by the target host type. Built-in converters cover
//! the numeric, boolean and string primitives; temporal types are parsed by
//! their `FromValue` impls. Callers may register additional converters or
//! replace the built-in ones.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result, TypeError};
use crate::row::FromValue;
use crate::types::{HostType, TypeInfo};
use crate::value::Value;

/// A conversion from a raw driver value into the value shape a host type reads.
pub type Converter = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

/// Registry of converters keyed by target host type.
pub struct ConversionService {
    converters: RwLock<HashMap<TypeId, Converter>>,
}

impl ConversionService {
    /// An empty service: values pass through unchanged.
    pub fn empty() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    /// A service with the built-in primitive converters installed.
    pub fn new() -> Self {
        let service = Self::empty();
        service.register::<i8>(|v| narrow_integer(v, "i8", |n| i8::try_from(n).ok().map(Value::TinyInt)));
        service.register::<i16>(|v| {
            narrow_integer(v, "i16", |n| i16::try_from(n).ok().map(Value::SmallInt))
        });
        service.register::<i32>(|v| narrow_integer(v, "i32", |n| i32::try_from(n).ok().map(Value::Int)));
        service.register::<i64>(|v| narrow_integer(v, "i64", |n| Some(Value::BigInt(n))));
        service.register::<f64>(|v| to_double(v, "f64"));
        #[allow(clippy::cast_possible_truncation)]
        service.register::<f32>(|v| to_double(v, "f32").map(|d| match d {
            Value::Double(f) => Value::Float(f as f32),
            other => other,
        }));
        service.register::<bool>(to_bool);
        service.register::<String>(to_text);
        service
    }

    /// Register (or replace) the converter for host type `T`.
    ///
    /// `Option<T>` and `T` share a converter; null values never reach it.
    pub fn register<T: TypeInfo>(
        &self,
        converter: impl Fn(&Value) -> Result<Value> + Send + Sync + 'static,
    ) {
        self.register_for(T::host_type(), Arc::new(converter));
    }

    /// Register (or replace) a converter for an explicit host type.
    pub fn register_for(&self, host: HostType, converter: Converter) {
        let mut converters = self.converters.write().unwrap_or_else(|e| e.into_inner());
        converters.insert(host.type_id(), converter);
    }

    /// Whether a converter is registered for `host`.
    pub fn has_converter(&self, host: HostType) -> bool {
        let converters = self.converters.read().unwrap_or_else(|e| e.into_inner());
        converters.contains_key(&host.type_id())
    }

    /// Convert a raw value for assignment to a property of host type `target`.
    pub fn convert(&self, value: &Value, target: HostType) -> Result<Value> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        let converter = {
            let converters = self.converters.read().unwrap_or_else(|e| e.into_inner());
            converters.get(&target.type_id()).cloned()
        };
        match converter {
            Some(convert) => convert(value),
            None => Ok(value.clone()),
        }
    }

    /// Convert and decode in one step.
    pub fn convert_to<T: FromValue + TypeInfo>(&self, value: &Value) -> Result<T> {
        T::from_value(&self.convert(value, T::host_type())?)
    }
}

impl Default for ConversionService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ConversionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let converters = self.converters.read().unwrap_or_else(|e| e.into_inner());
        f.debug_struct("ConversionService")
            .field("converters", &converters.len())
            .finish()
    }
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: match value {
            Value::Text(s) | Value::Decimal(s) => format!("{} '{}'", value.type_name(), s),
            other => other.type_name().to_string(),
        },
        column: None,
        rust_type: Some(expected),
    })
}

fn narrow_integer(
    value: &Value,
    expected: &'static str,
    narrow: impl Fn(i64) -> Option<Value>,
) -> Result<Value> {
    let wide = match value {
        Value::Text(s) | Value::Decimal(s) => s.trim().parse::<i64>().ok(),
        #[allow(clippy::cast_possible_truncation)]
        Value::Double(f) if f.fract() == 0.0 => Some(*f as i64),
        #[allow(clippy::cast_possible_truncation)]
        Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
        other => other.as_i64(),
    };
    wide.and_then(narrow).ok_or_else(|| mismatch(expected, value))
}

fn to_double(value: &Value, expected: &'static str) -> Result<Value> {
    let parsed = match value {
        Value::Text(s) => s.trim().parse::<f64>().ok(),
        other => other.as_f64(),
    };
    parsed.map(Value::Double).ok_or_else(|| mismatch(expected, value))
}

fn to_bool(value: &Value) -> Result<Value> {
    let parsed = match value {
        Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        other => other.as_bool(),
    };
    parsed.map(Value::Bool).ok_or_else(|| mismatch("bool", value))
}

fn to_text(value: &Value) -> Result<Value> {
    match value {
        Value::Text(_) => Ok(value.clone()),
        Value::Bytes(b) => String::from_utf8(b.clone())
            .map(Value::Text)
            .map_err(|_| mismatch("String", value)),
        Value::Json(_) => Err(mismatch("String", value)),
        other => Ok(Value::Text(other.to_string())),
    }
}
