//! SQLite data-access layer shared by both applications.
//!
//! A [`Database`] owns one rusqlite connection behind a mutex. Handlers hand
//! their work to [`Database::call`], which locks a [`Session`] on the
//! blocking pool and runs queries through the [`SqlExecutor`] trait. [`Tx`]
//! implements the same trait so the helpers work inside a transaction.

mod row;
pub mod schema;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use catalogd_core::{Page, Pagination, Params, SqlValue};
use rusqlite::{Connection, OpenFlags, Statement, Transaction};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

/// One result row, keyed by column name in SELECT order.
pub type Record = serde_json::Map<String, Value>;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database file not found: {0:?}")]
    MissingFile(PathBuf),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("row decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("database connection lock poisoned")]
    Poisoned,

    #[error("database task failed: {0}")]
    Task(String),
}

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: PathBuf,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}

impl Database {
    /// Open an existing database file. The file is never created.
    pub fn open(path: impl Into<PathBuf>) -> DbResult<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(DbError::MissingFile(path));
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn, path, true)
    }

    /// Open or create a file and apply `schema` (idempotent DDL).
    pub fn create(path: impl Into<PathBuf>, schema: &str) -> DbResult<Self> {
        let path = path.into();
        let conn = Connection::open(&path)?;
        let db = Self::from_connection(conn, path, true)?;
        db.apply_schema(schema)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory(schema: &str) -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self::from_connection(conn, PathBuf::from(":memory:"), false)?;
        db.apply_schema(schema)?;
        Ok(db)
    }

    fn from_connection(conn: Connection, path: PathBuf, on_disk: bool) -> DbResult<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        if on_disk {
            let mode: String =
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            tracing::debug!(path = %path.display(), journal_mode = %mode, "database opened");
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
        })
    }

    pub fn apply_schema(&self, sql: &str) -> DbResult<()> {
        self.session()?.conn().execute_batch(sql)?;
        Ok(())
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get database file size in bytes
    pub fn size_bytes(&self) -> Option<u64> {
        std::fs::metadata(&self.path).ok().map(|m| m.len())
    }

    /// Lock the connection for one unit of work.
    pub fn session(&self) -> DbResult<Session<'_>> {
        let guard = self.conn.lock().map_err(|_| DbError::Poisoned)?;
        Ok(Session { guard })
    }

    /// Run `f` with a locked session on the blocking thread pool.
    ///
    /// Waiting for the lock and running the query both happen off the async
    /// workers, so a slow request never stalls others and the caller's
    /// future stays cancellable.
    pub async fn call<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Session<'_>) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: From<DbError> + Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = db.session()?;
            f(&mut session)
        })
        .await
        .map_err(|err| E::from(DbError::Task(err.to_string())))?
    }
}

/// A locked connection.
pub struct Session<'a> {
    guard: MutexGuard<'a, Connection>,
}

impl Session<'_> {
    /// Commit when `f` succeeds, roll back when it fails.
    pub fn transaction<T, E>(&mut self, f: impl FnOnce(&Tx<'_>) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let tx = Tx {
            inner: self.guard.transaction().map_err(DbError::from)?,
        };

        match f(&tx) {
            Ok(value) => {
                tx.inner.commit().map_err(DbError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = tx.inner.rollback() {
                    tracing::warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl SqlExecutor for Session<'_> {
    fn conn(&self) -> &Connection {
        &self.guard
    }
}

/// A session inside an open transaction.
pub struct Tx<'a> {
    inner: Transaction<'a>,
}

impl SqlExecutor for Tx<'_> {
    fn conn(&self) -> &Connection {
        &self.inner
    }
}

/// Query helpers over named parameters.
///
/// Parameters the statement does not reference are skipped, so one
/// [`Params`] can feed both a list query and its count.
pub trait SqlExecutor {
    fn conn(&self) -> &Connection;

    /// Run a SELECT and return every row.
    fn query(&self, sql: &str, params: &Params) -> DbResult<Vec<Record>> {
        let mut stmt = self.conn().prepare(sql)?;
        bind(&mut stmt, params)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row::record_from_row(row, &columns)?);
        }
        Ok(records)
    }

    /// First row, if any.
    fn get(&self, sql: &str, params: &Params) -> DbResult<Option<Record>> {
        let mut stmt = self.conn().prepare(sql)?;
        bind(&mut stmt, params)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.raw_query();
        match rows.next()? {
            Some(row) => Ok(Some(row::record_from_row(row, &columns)?)),
            None => Ok(None),
        }
    }

    fn query_as<T: DeserializeOwned>(&self, sql: &str, params: &Params) -> DbResult<Vec<T>> {
        self.query(sql, params)?
            .into_iter()
            .map(|record| Ok(serde_json::from_value(Value::Object(record))?))
            .collect()
    }

    fn get_as<T: DeserializeOwned>(&self, sql: &str, params: &Params) -> DbResult<Option<T>> {
        self.get(sql, params)?
            .map(|record| Ok(serde_json::from_value(Value::Object(record))?))
            .transpose()
    }

    /// First column of the first row as an integer; 0 for no rows or NULL.
    fn count(&self, sql: &str, params: &Params) -> DbResult<i64> {
        let mut stmt = self.conn().prepare(sql)?;
        bind(&mut stmt, params)?;

        let mut rows = stmt.raw_query();
        match rows.next()? {
            Some(row) => Ok(row.get::<_, Option<i64>>(0)?.unwrap_or(0)),
            None => Ok(0),
        }
    }

    /// INSERT/UPDATE/DELETE; returns rows changed.
    fn execute(&self, sql: &str, params: &Params) -> DbResult<usize> {
        let mut stmt = self.conn().prepare(sql)?;
        bind(&mut stmt, params)?;
        Ok(stmt.raw_execute()?)
    }

    /// Insert one row; returns its rowid.
    fn insert(&self, table: &'static str, values: &[(&'static str, SqlValue)]) -> DbResult<i64> {
        let sql = if values.is_empty() {
            format!("INSERT INTO {table} DEFAULT VALUES")
        } else {
            let columns: Vec<&str> = values.iter().map(|(column, _)| *column).collect();
            let placeholders: Vec<String> = columns.iter().map(|c| format!(":{c}")).collect();
            format!(
                "INSERT INTO {table} ({}) VALUES ({})",
                columns.join(", "),
                placeholders.join(", ")
            )
        };

        self.execute(&sql, &column_params(values))?;
        Ok(self.conn().last_insert_rowid())
    }

    /// Update the row whose `id_column` equals `id`; returns rows changed.
    fn update(
        &self,
        table: &'static str,
        id_column: &'static str,
        id: i64,
        values: &[(&'static str, SqlValue)],
    ) -> DbResult<usize> {
        if values.is_empty() {
            return Ok(0);
        }

        let assignments: Vec<String> = values
            .iter()
            .map(|(column, _)| format!("{column} = :{column}"))
            .collect();
        let sql = format!(
            "UPDATE {table} SET {} WHERE {id_column} = :__key",
            assignments.join(", ")
        );

        let mut params = column_params(values);
        params.push(":__key", id);
        self.execute(&sql, &params)
    }

    fn delete(&self, table: &'static str, id_column: &'static str, id: i64) -> DbResult<usize> {
        let sql = format!("DELETE FROM {table} WHERE {id_column} = :__key");
        self.execute(&sql, &Params::new().bind(":__key", id))
    }

    /// One page of `sql` plus the total row count.
    ///
    /// The total is counted over `sql` as a subquery, so GROUP BY and
    /// DISTINCT queries count result rows rather than source rows.
    fn paginate(&self, sql: &str, params: &Params, page: Pagination) -> DbResult<Page<Record>> {
        let total = self.count(&format!("SELECT COUNT(*) FROM ({sql})"), params)?;
        let items = self.query(
            &format!("{sql} LIMIT {} OFFSET {}", page.limit(), page.offset()),
            params,
        )?;

        Ok(Page::new(items, total.max(0) as u64, page))
    }
}

fn column_params(values: &[(&'static str, SqlValue)]) -> Params {
    values.iter().fold(Params::new(), |params, (column, value)| {
        params.bind(&format!(":{column}"), value.clone())
    })
}

fn bind(stmt: &mut Statement<'_>, params: &Params) -> DbResult<()> {
    for (name, value) in params.iter() {
        if let Some(idx) = stmt.parameter_index(name)? {
            stmt.raw_bind_parameter(idx, row::sqlite_from_param(value))?;
        }
    }
    Ok(())
}
