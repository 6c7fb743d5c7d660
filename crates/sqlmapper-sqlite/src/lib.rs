//! SQLite driver for SQLMapper.
//!
//! [`SqliteConnection`] implements the blocking
//! [`Connection`](sqlmapper_core::Connection) trait over libsqlite3, built
//! from source through `libsqlite3-sys`. The schema resolver reads table
//! metadata with `PRAGMA table_info`, which goes through the same query path
//! as application SQL.
//!
//! ```rust,ignore
//! use sqlmapper_core::{Connection, Value};
//! use sqlmapper_sqlite::SqliteConnection;
//!
//! let conn = SqliteConnection::open_memory()?;
//! conn.execute_raw("CREATE TABLE customer (customer_id INTEGER PRIMARY KEY, last_name TEXT)")?;
//! let id = conn.insert("INSERT INTO customer (last_name) VALUES (?1)", &[Value::from("Lovelace")])?;
//! ```
//!
//! Values are stored as follows. Temporal text is what the core decoders
//! parse back into chrono types.
//!
//! | Value | Storage class |
//! |-------|---------------|
//! | `Bool`, integer variants | INTEGER |
//! | `Float`, `Double` | REAL |
//! | `Text`, `Decimal`, `Json` | TEXT |
//! | `Date`, `Time`, `Timestamp`, `TimestampTz` | TEXT, ISO-8601 |
//! | `Bytes`, `Uuid` | BLOB |
//! | `Null` | NULL |

#![allow(unsafe_code)]

pub mod connection;
pub mod ffi;
pub mod types;

pub use connection::{OpenMode, SqliteConfig, SqliteConnection};

/// Version string of the linked SQLite library.
pub fn sqlite_version() -> &'static str {
    ffi::version()
}
