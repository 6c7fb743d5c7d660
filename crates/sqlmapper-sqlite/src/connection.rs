//! Blocking SQLite connection.
//!
//! Wraps one `sqlite3` handle behind a mutex and implements the core
//! [`Connection`] trait. Statements are prepared per call and finalized by
//! an RAII guard, so an early return never leaks a statement.

// FFI casts match C types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::borrow_as_ptr)]

use std::ffi::{CStr, CString, c_int};
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use sqlmapper_core::{
    ColumnIndex, Connection, ConnectionError, Dialect, Error, QueryError,
    QueryErrorKind, Result, Row, Value,
};

use crate::ffi;
use crate::types;

/// Access mode requested when opening a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpenMode {
    ReadOnly,
    /// Existing databases only
    ReadWrite,
    #[default]
    ReadWriteCreate,
}

/// Where and how to open a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database file, `:memory:`, or a `file:` URI
    pub location: String,
    pub mode: OpenMode,
    /// How long a statement waits on a locked database before failing as busy
    pub busy_timeout: Option<Duration>,
}

impl SqliteConfig {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            mode: OpenMode::default(),
            busy_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// A private in-memory database, dropped with the connection.
    pub fn in_memory() -> Self {
        Self::new(":memory:")
    }

    #[must_use]
    pub fn mode(mut self, mode: OpenMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn busy_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// `sqlite3_open_v2` flags; the handle is always opened serialized.
    fn open_flags(&self) -> c_int {
        let access = match self.mode {
            OpenMode::ReadOnly => ffi::SQLITE_OPEN_READONLY,
            OpenMode::ReadWrite => ffi::SQLITE_OPEN_READWRITE,
            OpenMode::ReadWriteCreate => ffi::SQLITE_OPEN_READWRITE | ffi::SQLITE_OPEN_CREATE,
        };
        let uri = if self.location.starts_with("file:") {
            ffi::SQLITE_OPEN_URI
        } else {
            0
        };
        access | uri | ffi::SQLITE_OPEN_FULLMUTEX
    }
}

struct Handle {
    db: *mut ffi::sqlite3,
}

// SAFETY: the handle is opened in serialized mode and only touched while
// the owning mutex is held
unsafe impl Send for Handle {}

/// A connection to a SQLite database.
///
/// Calls are serialized on an internal mutex. The row callback of
/// [`query_each`](Connection::query_each) runs while that mutex is held and
/// must not use the same connection.
pub struct SqliteConnection {
    handle: Mutex<Handle>,
    location: String,
}

impl SqliteConnection {
    pub fn open(config: &SqliteConfig) -> Result<Self> {
        let db = open_handle(config)?;
        if let Some(timeout) = config.busy_timeout {
            let ms = c_int::try_from(timeout.as_millis()).unwrap_or(c_int::MAX);
            // SAFETY: db was just opened successfully
            unsafe {
                ffi::sqlite3_busy_timeout(db, ms);
            }
        }
        tracing::debug!(location = %config.location, mode = ?config.mode, "Opened SQLite database");
        Ok(Self {
            handle: Mutex::new(Handle { db }),
            location: config.location.clone(),
        })
    }

    pub fn open_memory() -> Result<Self> {
        Self::open(&SqliteConfig::in_memory())
    }

    pub fn open_file(path: impl Into<String>) -> Result<Self> {
        Self::open(&SqliteConfig::new(path))
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run one or more `;`-separated statements without parameters
    /// (DDL, seed data).
    pub fn execute_raw(&self, sql: &str) -> Result<()> {
        let handle = self.lock();
        let c_sql = CString::new(sql).map_err(|_| nul_error(sql))?;
        let mut errmsg: *mut std::ffi::c_char = ptr::null_mut();

        // SAFETY: all pointers are valid for the duration of the call
        let rc = unsafe {
            ffi::sqlite3_exec(handle.db, c_sql.as_ptr(), None, ptr::null_mut(), &mut errmsg)
        };
        if rc != ffi::SQLITE_OK {
            let msg = if errmsg.is_null() {
                ffi::error_string(rc).to_string()
            } else {
                // SAFETY: errmsg was allocated by SQLite and is freed once copied
                unsafe {
                    let msg = CStr::from_ptr(errmsg).to_string_lossy().into_owned();
                    ffi::sqlite3_free(errmsg.cast());
                    msg
                }
            };
            return Err(query_error(rc, msg, sql));
        }
        Ok(())
    }

    /// Rowid of the most recent successful insert.
    pub fn last_insert_rowid(&self) -> i64 {
        let handle = self.lock();
        // SAFETY: db is valid
        unsafe { ffi::sqlite3_last_insert_rowid(handle.db) }
    }

    fn lock(&self) -> MutexGuard<'_, Handle> {
        self.handle.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Prepare `sql`, bind `params` and step through every result row.
    fn run(
        &self,
        sql: &str,
        params: &[Value],
        on_row: &mut dyn FnMut(&Row) -> Result<()>,
    ) -> Result<u64> {
        let handle = self.lock();
        let stmt = Statement::prepare(handle.db, sql)?;
        stmt.bind(params)?;

        let columns = Arc::new(ColumnIndex::new(stmt.column_names()));
        loop {
            // SAFETY: stmt is valid until dropped
            match unsafe { ffi::sqlite3_step(stmt.raw) } {
                ffi::SQLITE_ROW => {
                    let values = (0..columns.len() as c_int)
                        // SAFETY: stmt is positioned on a row
                        .map(|i| unsafe { types::read_column(stmt.raw, i) })
                        .collect();
                    on_row(&Row::with_columns(Arc::clone(&columns), values))?;
                }
                ffi::SQLITE_DONE => break,
                _ => return Err(stmt.error()),
            }
        }
        // SAFETY: db is valid
        let changes = unsafe { ffi::sqlite3_changes(handle.db) };
        Ok(u64::try_from(changes).unwrap_or(0))
    }
}

impl Drop for SqliteConnection {
    fn drop(&mut self) {
        let handle = self.lock();
        if !handle.db.is_null() {
            // SAFETY: db is valid and no statement outlives the connection
            unsafe {
                ffi::sqlite3_close_v2(handle.db);
            }
        }
    }
}

impl std::fmt::Debug for SqliteConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteConnection")
            .field("location", &self.location)
            .finish_non_exhaustive()
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        self.run(sql, params, &mut |row| {
            rows.push(row.clone());
            Ok(())
        })?;
        Ok(rows)
    }

    fn query_each(
        &self,
        sql: &str,
        params: &[Value],
        f: &mut dyn FnMut(&Row) -> Result<()>,
    ) -> Result<()> {
        self.run(sql, params, f).map(|_| ())
    }

    fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.run(sql, params, &mut |_| Ok(()))
    }

    fn insert(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let handle = self.lock();
        let stmt = Statement::prepare(handle.db, sql)?;
        stmt.bind(params)?;
        // SAFETY: stmt is valid
        match unsafe { ffi::sqlite3_step(stmt.raw) } {
            ffi::SQLITE_DONE | ffi::SQLITE_ROW => {
                // SAFETY: db is valid; read under the same lock as the insert
                Ok(unsafe { ffi::sqlite3_last_insert_rowid(handle.db) })
            }
            _ => Err(stmt.error()),
        }
    }
}

/// A prepared statement, finalized on drop.
struct Statement<'a> {
    raw: *mut ffi::sqlite3_stmt,
    db: *mut ffi::sqlite3,
    sql: &'a str,
}

impl<'a> Statement<'a> {
    fn prepare(db: *mut ffi::sqlite3, sql: &'a str) -> Result<Self> {
        let c_sql = CString::new(sql).map_err(|_| nul_error(sql))?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: all pointers are valid for the duration of the call
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                db,
                c_sql.as_ptr(),
                c_sql.as_bytes().len() as c_int,
                &mut raw,
                ptr::null_mut(),
            )
        };
        if rc != ffi::SQLITE_OK {
            // SAFETY: db is valid
            let (code, msg) = unsafe { ffi::last_error(db) };
            return Err(query_error(code, msg, sql));
        }
        Ok(Self { raw, db, sql })
    }

    fn bind(&self, params: &[Value]) -> Result<()> {
        for (i, param) in params.iter().enumerate() {
            // SAFETY: raw is valid, index is 1-based
            let rc = unsafe { types::bind_value(self.raw, (i + 1) as c_int, param) };
            if rc != ffi::SQLITE_OK {
                // SAFETY: db is valid
                let (code, msg) = unsafe { ffi::last_error(self.db) };
                return Err(query_error(
                    code,
                    format!("Failed to bind parameter {}: {}", i + 1, msg),
                    self.sql,
                ));
            }
        }
        Ok(())
    }

    fn column_names(&self) -> Vec<String> {
        // SAFETY: raw is valid
        let count = unsafe { ffi::sqlite3_column_count(self.raw) };
        (0..count)
            // SAFETY: index is in range
            .map(|i| unsafe { types::column_name(self.raw, i) }.unwrap_or_else(|| format!("col{}", i)))
            .collect()
    }

    fn error(&self) -> Error {
        // SAFETY: db is valid
        let (code, msg) = unsafe { ffi::last_error(self.db) };
        query_error(code, msg, self.sql)
    }
}

impl Drop for Statement<'_> {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            // SAFETY: raw was produced by prepare and is finalized once
            unsafe {
                ffi::sqlite3_finalize(self.raw);
            }
        }
    }
}

fn open_handle(config: &SqliteConfig) -> Result<*mut ffi::sqlite3> {
    let location = CString::new(config.location.as_str())
        .map_err(|_| connect_error(&config.location, "location contains a null byte".to_string()))?;
    let mut db: *mut ffi::sqlite3 = ptr::null_mut();
    // SAFETY: location is NUL-terminated and db is a valid out-pointer
    let rc = unsafe { ffi::sqlite3_open_v2(location.as_ptr(), &mut db, config.open_flags(), ptr::null()) };
    if rc == ffi::SQLITE_OK {
        return Ok(db);
    }
    let message = if db.is_null() {
        ffi::error_string(rc).to_string()
    } else {
        // SAFETY: a failed open may still allocate a handle, which must be closed
        unsafe {
            let (_, message) = ffi::last_error(db);
            ffi::sqlite3_close_v2(db);
            message
        }
    };
    Err(connect_error(&config.location, message))
}

fn connect_error(path: &str, message: String) -> Error {
    Error::Connection(ConnectionError {
        target: Some(path.to_string()),
        message,
    })
}

fn nul_error(sql: &str) -> Error {
    Error::Query(QueryError {
        kind: QueryErrorKind::Syntax,
        sql: Some(sql.to_string()),
        code: None,
        message: "SQL contains a null byte".to_string(),
    })
}

fn query_error(code: c_int, message: String, sql: &str) -> Error {
    tracing::debug!(code, message = %message, sql = %sql, "SQLite error");
    Error::Query(QueryError {
        kind: error_code_to_kind(code),
        sql: Some(sql.to_string()),
        code: Some(code),
        message,
    })
}

fn error_code_to_kind(code: c_int) -> QueryErrorKind {
    match code & 0xff {
        ffi::SQLITE_CONSTRAINT => QueryErrorKind::Constraint,
        ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => QueryErrorKind::Busy,
        ffi::SQLITE_PERM | ffi::SQLITE_AUTH => QueryErrorKind::Permission,
        ffi::SQLITE_NOTFOUND => QueryErrorKind::NotFound,
        ffi::SQLITE_ERROR => QueryErrorKind::Syntax,
        _ => QueryErrorKind::Database,
    }
}
