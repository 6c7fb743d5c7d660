//! Database connection trait.
//!
//! The mapper talks to the database through [`Connection`], a small blocking
//! interface: every call runs on the caller's thread and returns when the
//! round-trip completes. Drivers translate their native errors into
//! [`Error::Query`](crate::Error::Query) / [`Error::Connection`](crate::Error::Connection)
//! and the mapper propagates them untouched.

use crate::error::Result;
use crate::row::Row;
use crate::value::Value;

/// SQL dialect spoken by a connection.
///
/// Decides the bind placeholder syntax and how column metadata is fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum Dialect {
    /// `$1, $2, ...`
    #[default]
    Postgres,
    /// `?1, ?2, ...`
    Sqlite,
    /// bare `?`
    Mysql,
}

impl Dialect {
    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::Sqlite => format!("?{index}"),
            Self::Mysql => String::from("?"),
        }
    }

    /// Lower-case name used in log fields.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Mysql => "mysql",
        }
    }
}

/// A database connection capable of executing parameterized SQL.
///
/// Parameters are positional and bound in order using the placeholders of
/// [`dialect`](Connection::dialect). Implementations must be `Send + Sync`
/// so one mapper can be shared across threads; drivers whose handles are
/// not thread-safe guard them internally.
pub trait Connection: Send + Sync {
    /// The SQL dialect of this connection.
    fn dialect(&self) -> Dialect;

    /// Execute a query and return all rows.
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a query and return the first row, if any.
    fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        Ok(self.query(sql, params)?.into_iter().next())
    }

    /// Execute a query and hand each row to `f` in result order.
    ///
    /// Stops at the first error returned by `f`. The default implementation
    /// buffers the result through [`query`](Connection::query); drivers that
    /// can stream should override it.
    fn query_each(
        &self,
        sql: &str,
        params: &[Value],
        f: &mut dyn FnMut(&Row) -> Result<()>,
    ) -> Result<()> {
        for row in self.query(sql, params)? {
            f(&row)?;
        }
        Ok(())
    }

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute an INSERT and return the generated key.
    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64>;
}

macro_rules! forward_connection {
    ($($wrapper:ty),*) => {
        $(impl<C: Connection + ?Sized> Connection for $wrapper {
            fn dialect(&self) -> Dialect {
                (**self).dialect()
            }

            fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
                (**self).query(sql, params)
            }

            fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
                (**self).query_one(sql, params)
            }

            fn query_each(
                &self,
                sql: &str,
                params: &[Value],
                f: &mut dyn FnMut(&Row) -> Result<()>,
            ) -> Result<()> {
                (**self).query_each(sql, params, f)
            }

            fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
                (**self).execute(sql, params)
            }

            fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
                (**self).insert(sql, params)
            }
        })*
    };
}

forward_connection!(&C, std::sync::Arc<C>, Box<C>);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, QueryError};

    struct FixedRows(Vec<Row>);

    impl Connection for FixedRows {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        fn query(&self, _sql: &str, _params: &[Value]) -> Result<Vec<Row>> {
            Ok(self.0.clone())
        }

        fn execute(&self, _sql: &str, _params: &[Value]) -> Result<u64> {
            Err(Error::Query(QueryError::database("read only", None)))
        }

        fn insert(&self, _sql: &str, _params: &[Value]) -> Result<i64> {
            Ok(0)
        }
    }

    fn rows() -> Vec<Row> {
        (1..=3)
            .map(|i| Row::new(vec!["id".to_string()], vec![Value::Int(i)]))
            .collect()
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(2), "$2");
        assert_eq!(Dialect::Sqlite.placeholder(2), "?2");
        assert_eq!(Dialect::Mysql.placeholder(2), "?");
    }

    #[test]
    fn test_boxed_connection_forwards() {
        let boxed: Box<dyn Connection> = Box::new(FixedRows(rows()));
        assert_eq!(boxed.dialect().name(), "sqlite");
        assert_eq!(boxed.query("SELECT id FROM t", &[]).unwrap().len(), 3);
    }

    #[test]
    fn test_query_each_visits_rows_in_order() {
        let conn = FixedRows(rows());
        let mut seen = Vec::new();
        conn.query_each("SELECT id FROM t", &[], &mut |row| {
            seen.push(row.get_named::<i64>("id")?);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[test]
    fn test_query_each_stops_on_callback_error() {
        let conn = FixedRows(rows());
        let mut count = 0;
        let result = conn.query_each("SELECT id FROM t", &[], &mut |_| {
            count += 1;
            Err(Error::Custom("stop".into()))
        });
        assert!(result.is_err());
        assert_eq!(count, 1);
    }

    #[test]
    fn test_query_one_and_reference_impl() {
        let conn = FixedRows(rows());
        let by_ref: &dyn Connection = &conn;
        let first = (&by_ref).query_one("SELECT id FROM t", &[]).unwrap().unwrap();
        assert_eq!(first.get_named::<i64>("id").unwrap(), 1);
        assert!(by_ref.execute("DELETE FROM t", &[]).is_err());
    }
}
