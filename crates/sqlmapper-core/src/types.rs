//! Catalog column types and the identity of Rust property types.

use std::any::TypeId;
use std::fmt;

/// Column type as declared in the catalog, normalized across vendors.
///
/// Length and precision arguments are kept where the vendor reports them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Numeric { precision: u8, scale: u8 },
    Decimal { precision: u8, scale: u8 },
    Boolean,
    Char(u32),
    VarChar(u32),
    Text,
    Binary(u32),
    VarBinary(u32),
    Blob,
    Date,
    Time,
    DateTime,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    JsonB,
    /// Vendor type name that has no dedicated variant
    Custom(String),
}

impl SqlType {
    /// True when values of this type carry a UTC offset.
    pub const fn has_zone(&self) -> bool {
        matches!(self, Self::TimestampTz)
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keyword = match self {
            Self::Numeric { precision, scale } => {
                return write!(f, "NUMERIC({precision}, {scale})");
            }
            Self::Decimal { precision, scale } => {
                return write!(f, "DECIMAL({precision}, {scale})");
            }
            Self::Char(n) => return write!(f, "CHAR({n})"),
            Self::VarChar(n) => return write!(f, "VARCHAR({n})"),
            Self::Binary(n) => return write!(f, "BINARY({n})"),
            Self::VarBinary(n) => return write!(f, "VARBINARY({n})"),
            Self::Custom(name) => return f.write_str(name),
            Self::TinyInt => "TINYINT",
            Self::SmallInt => "SMALLINT",
            Self::Integer => "INTEGER",
            Self::BigInt => "BIGINT",
            Self::Real => "REAL",
            Self::Double => "DOUBLE PRECISION",
            Self::Boolean => "BOOLEAN",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Date => "DATE",
            Self::Time => "TIME",
            Self::DateTime => "DATETIME",
            Self::Timestamp => "TIMESTAMP",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::Uuid => "UUID",
            Self::Json => "JSON",
            Self::JsonB => "JSONB",
        };
        f.write_str(keyword)
    }
}

/// Identity of a Rust property type.
///
/// Two host types are equal when their `TypeId`s are equal. `Option<T>`
/// properties report the host type of `T`, so a nullable foreign key and a
/// non-null id of the same scalar type compare equal.
#[derive(Clone, Copy)]
pub struct HostType {
    id: TypeId,
    name: &'static str,
}

impl HostType {
    /// Host type of `T` itself (no `Option` unwrapping).
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path (`chrono::NaiveDate` -> `NaiveDate`).
    pub fn simple_name(&self) -> &'static str {
        simple_type_name(self.name)
    }
}

impl PartialEq for HostType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for HostType {}

impl fmt::Debug for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.simple_name())
    }
}

/// Strip the module path from a type name, keeping generic arguments intact.
pub fn simple_type_name(full: &'static str) -> &'static str {
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// Rust types that can back a mapped property.
pub trait TypeInfo: 'static {
    /// Catalog type the property is expected to map onto.
    const SQL_TYPE: SqlType;

    /// Whether the property accepts SQL NULL.
    const NULLABLE: bool = false;

    /// Host type used for join compatibility checks and converter lookup.
    fn host_type() -> HostType {
        HostType::of::<Self>()
    }
}

macro_rules! type_info {
    ($($ty:ty => $sql:expr),* $(,)?) => {
        $(impl TypeInfo for $ty {
            const SQL_TYPE: SqlType = $sql;
        })*
    };
}

type_info! {
    i8 => SqlType::TinyInt,
    i16 => SqlType::SmallInt,
    i32 => SqlType::Integer,
    i64 => SqlType::BigInt,
    f32 => SqlType::Real,
    f64 => SqlType::Double,
    bool => SqlType::Boolean,
    String => SqlType::Text,
    Vec<u8> => SqlType::Blob,
    serde_json::Value => SqlType::Json,
    chrono::NaiveDate => SqlType::Date,
    chrono::NaiveTime => SqlType::Time,
    chrono::NaiveDateTime => SqlType::Timestamp,
    chrono::DateTime<chrono::Utc> => SqlType::TimestampTz,
}

impl<T: TypeInfo> TypeInfo for Option<T> {
    const SQL_TYPE: SqlType = T::SQL_TYPE;
    const NULLABLE: bool = true;

    fn host_type() -> HostType {
        T::host_type()
    }
}
