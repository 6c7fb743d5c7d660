//! Column metadata introspection.
//!
//! The resolver needs one thing from the database: the columns of a table,
//! with their names and SQL types. This module fetches them per dialect
//! (`PRAGMA table_info` on SQLite, `information_schema.columns` on
//! PostgreSQL and MySQL) and parses the reported type strings.

use sqlmapper_core::{Connection, Dialect, Result, SqlType, Value, sanitize_identifier};

/// Map a vendor type declaration onto [`SqlType`].
///
/// Accepts the forms the catalogs report: `VARCHAR(255)`, `decimal(10, 2)`,
/// `INT UNSIGNED`, `timestamp with time zone`. Unknown names become
/// `SqlType::Custom` in upper case.
pub fn parse_sql_type(declared: &str) -> SqlType {
    let normalized = declared.trim().to_uppercase();
    // Signedness does not change which property types a column accepts.
    let unsigned_free = normalized.strip_suffix(" UNSIGNED").unwrap_or(&normalized);
    let (base, args) = match unsigned_free.split_once('(') {
        Some((base, rest)) => (base.trim(), type_args(rest)),
        None => (unsigned_free, Vec::new()),
    };
    let arg = |i: usize| args.get(i).copied().unwrap_or(0);
    let digits = |i: usize| u8::try_from(arg(i)).unwrap_or(u8::MAX);

    match base {
        "TINYINT" => SqlType::TinyInt,
        "SMALLINT" | "INT2" => SqlType::SmallInt,
        "INT" | "INTEGER" | "INT4" | "MEDIUMINT" | "SERIAL" => SqlType::Integer,
        "BIGINT" | "INT8" | "BIGSERIAL" => SqlType::BigInt,
        "REAL" | "FLOAT" | "FLOAT4" => SqlType::Real,
        "DOUBLE" | "DOUBLE PRECISION" | "FLOAT8" => SqlType::Double,
        "NUMERIC" => SqlType::Numeric {
            precision: digits(0),
            scale: digits(1),
        },
        "DECIMAL" => SqlType::Decimal {
            precision: digits(0),
            scale: digits(1),
        },
        "BOOL" | "BOOLEAN" => SqlType::Boolean,
        "CHAR" | "CHARACTER" | "NCHAR" | "BPCHAR" => SqlType::Char(arg(0)),
        "VARCHAR" | "CHARACTER VARYING" | "NVARCHAR" => SqlType::VarChar(arg(0)),
        "TEXT" | "CLOB" | "NTEXT" | "MEDIUMTEXT" | "LONGTEXT" => SqlType::Text,
        "BINARY" => SqlType::Binary(arg(0)),
        "VARBINARY" => SqlType::VarBinary(arg(0)),
        "BLOB" | "BYTEA" | "LONGBLOB" | "MEDIUMBLOB" => SqlType::Blob,
        "DATE" => SqlType::Date,
        "TIME" | "TIME WITHOUT TIME ZONE" => SqlType::Time,
        "DATETIME" => SqlType::DateTime,
        "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => SqlType::Timestamp,
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => SqlType::TimestampTz,
        "UUID" => SqlType::Uuid,
        "JSON" => SqlType::Json,
        "JSONB" => SqlType::JsonB,
        other => SqlType::Custom(other.to_string()),
    }
}

/// Positional numeric arguments of `(10, 2)`; unparseable ones count as 0.
fn type_args(rest: &str) -> Vec<u32> {
    rest.trim_end_matches(')')
        .split(',')
        .map(|a| a.trim().parse().unwrap_or(0))
        .collect()
}

/// A table column as the catalog reports it.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMetadata {
    /// Column name, lower-cased for case-insensitive matching
    pub name: String,
    /// Declaration as reported, e.g. `VARCHAR(40)`
    pub type_name: String,
    pub sql_type: SqlType,
    pub nullable: bool,
}

impl ColumnMetadata {
    pub fn new(name: &str, type_name: &str, nullable: bool) -> Self {
        Self {
            name: name.to_ascii_lowercase(),
            type_name: type_name.to_string(),
            sql_type: parse_sql_type(type_name),
            nullable,
        }
    }
}

/// Fetches column metadata for tables.
#[derive(Debug, Clone, Default)]
pub struct Introspector {
    schema: Option<String>,
    catalog: Option<String>,
}

impl Introspector {
    /// Create an introspector scoped to an optional schema and catalog.
    pub fn new(schema: Option<String>, catalog: Option<String>) -> Self {
        Self { schema, catalog }
    }

    /// Columns of `table_name` in ordinal order. An unknown table yields an
    /// empty list, not an error.
    pub fn columns<C: Connection + ?Sized>(
        &self,
        conn: &C,
        table_name: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        let columns = match conn.dialect() {
            Dialect::Sqlite => self.sqlite_columns(conn, table_name)?,
            Dialect::Postgres => self.postgres_columns(conn, table_name)?,
            Dialect::Mysql => self.mysql_columns(conn, table_name)?,
        };
        tracing::debug!(
            table = table_name,
            dialect = conn.dialect().name(),
            columns = columns.len(),
            "Introspected table columns"
        );
        Ok(columns)
    }

    fn sqlite_columns<C: Connection + ?Sized>(
        &self,
        conn: &C,
        table_name: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        let table = sanitize_identifier(table_name);
        let sql = match &self.schema {
            Some(schema) => format!(
                "PRAGMA {}.table_info({})",
                sanitize_identifier(schema),
                table
            ),
            None => format!("PRAGMA table_info({})", table),
        };
        let rows = conn.query(&sql, &[])?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get_named::<String>("name").ok()?;
                let sql_type = row.get_named::<String>("type").ok().unwrap_or_default();
                let notnull = row.get_named::<i64>("notnull").ok().unwrap_or(0);
                Some(ColumnMetadata::new(&name, &sql_type, notnull == 0))
            })
            .collect())
    }

    fn postgres_columns<C: Connection + ?Sized>(
        &self,
        conn: &C,
        table_name: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        let mut sql = String::from(
            "SELECT column_name, data_type, character_maximum_length, \
             numeric_precision, numeric_scale, is_nullable \
             FROM information_schema.columns WHERE lower(table_name) = lower($1)",
        );
        let mut params = vec![Value::Text(table_name.to_string())];
        match &self.schema {
            Some(schema) => {
                params.push(Value::Text(schema.clone()));
                sql.push_str(&format!(" AND lower(table_schema) = lower(${})", params.len()));
            }
            None => sql.push_str(" AND table_schema = current_schema()"),
        }
        if let Some(catalog) = &self.catalog {
            params.push(Value::Text(catalog.clone()));
            sql.push_str(&format!(" AND table_catalog = ${}", params.len()));
        }
        sql.push_str(" ORDER BY ordinal_position");
        let rows = conn.query(&sql, &params)?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get_named::<String>("column_name").ok()?;
                let data_type = row.get_named::<String>("data_type").ok()?;
                let char_len = row.get_named::<i64>("character_maximum_length").ok();
                let precision = row.get_named::<i64>("numeric_precision").ok();
                let scale = row.get_named::<i64>("numeric_scale").ok();
                let nullable = row.get_named::<String>("is_nullable").ok()?;
                let sql_type = postgres_declaration(&data_type, char_len, precision, scale);
                Some(ColumnMetadata::new(&name, &sql_type, nullable == "YES"))
            })
            .collect())
    }

    fn mysql_columns<C: Connection + ?Sized>(
        &self,
        conn: &C,
        table_name: &str,
    ) -> Result<Vec<ColumnMetadata>> {
        // MySQL has no schema level below the database; the catalog names it.
        let database = self.catalog.as_ref().or(self.schema.as_ref());
        let mut sql = String::from(
            "SELECT column_name AS column_name, column_type AS column_type, \
             is_nullable AS is_nullable FROM information_schema.columns \
             WHERE table_name = ?",
        );
        let mut params = vec![Value::Text(table_name.to_string())];
        match database {
            Some(db) => {
                sql.push_str(" AND table_schema = ?");
                params.push(Value::Text(db.clone()));
            }
            None => sql.push_str(" AND table_schema = DATABASE()"),
        }
        sql.push_str(" ORDER BY ordinal_position");
        let rows = conn.query(&sql, &params)?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let name = row.get_named::<String>("column_name").ok()?;
                let sql_type = row.get_named::<String>("column_type").ok()?;
                let nullable = row.get_named::<String>("is_nullable").ok()?;
                Some(ColumnMetadata::new(&name, &sql_type, nullable == "YES"))
            })
            .collect())
    }
}

/// Reassemble a declaration from the split `information_schema` fields.
///
/// Only character lengths and `numeric` precision/scale are kept; integer
/// precision is implied by the type name.
fn postgres_declaration(
    data_type: &str,
    char_len: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    let base = data_type.to_uppercase();
    match (char_len, precision, scale) {
        (Some(len), _, _) => format!("{base}({len})"),
        (None, Some(p), Some(s)) if base == "NUMERIC" => format!("NUMERIC({p},{s})"),
        _ => base,
    }
}
