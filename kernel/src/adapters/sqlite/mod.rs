// SQLite Store Adapter
//
// Drives an embedded SQLite database through `rusqlite`. Bookkeeping is a
// single-column table; every applied level appends one row and the
// current level is the highest row.

use std::path::PathBuf;

use rusqlite::{Batch, Connection, OptionalExtension, Statement};
use serde::Deserialize;

use crate::script::Level;
use crate::store::{MigrationStore, StoreError};

pub const DEFAULT_TABLE: &str = "migrations";

/// Where the database lives and how bookkeeping is named.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SqliteConfig {
    /// Database file. `None` keeps the database in memory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_table")]
    pub table: String,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_owned()
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: None,
            table: default_table(),
        }
    }
}

impl SqliteConfig {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }
}

/// SQLite-backed `MigrationStore`.
///
/// File databases connect on `open` and disconnect on `close`. In-memory
/// and attached connections stay alive for the lifetime of the store, so
/// closing only marks the store closed instead of discarding the data.
#[derive(Debug)]
pub struct SqliteStore {
    path: Option<PathBuf>,
    table: String,
    conn: Option<Connection>,
    open: bool,
}

impl SqliteStore {
    pub fn new(config: SqliteConfig) -> Result<Self, StoreError> {
        validate_table_name(&config.table)?;
        Ok(Self {
            path: config.path,
            table: config.table,
            conn: None,
            open: false,
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            table: default_table(),
            conn: None,
            open: false,
        }
    }

    /// Wrap a connection owned elsewhere. It is never disconnected by `close`.
    pub fn attach(conn: Connection) -> Self {
        Self {
            path: None,
            table: default_table(),
            conn: Some(conn),
            open: false,
        }
    }

    /// The live connection, if one exists.
    pub fn connection(&self) -> Option<&Connection> {
        self.conn.as_ref()
    }

    pub fn into_connection(self) -> Option<Connection> {
        self.conn
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> Result<&Connection, StoreError> {
        match (&self.conn, self.open) {
            (Some(conn), true) => Ok(conn),
            _ => Err(StoreError::NotOpen),
        }
    }
}

impl MigrationStore for SqliteStore {
    /// Rows changed, or rows returned for statements producing results,
    /// summed over every statement in the text.
    type Output = usize;

    fn open(&mut self) -> Result<(), StoreError> {
        if self.open {
            return Ok(());
        }
        if self.conn.is_none() {
            let conn = match &self.path {
                Some(path) => Connection::open(path)?,
                None => Connection::open_in_memory()?,
            };
            tracing::debug!(path = ?self.path, "sqlite connection opened");
            self.conn = Some(conn);
        }
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        if self.path.is_some() {
            if let Some(conn) = self.conn.take() {
                conn.close().map_err(|(_, err)| StoreError::from(err))?;
                tracing::debug!(path = ?self.path, "sqlite connection closed");
            }
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn bookkeeping_exists(&mut self) -> Result<bool, StoreError> {
        let count: i64 = self.conn()?.query_row(
            "SELECT count(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            [self.table.as_str()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create_bookkeeping(&mut self) -> Result<(), StoreError> {
        let sql = format!("CREATE TABLE {} (level INTEGER NOT NULL)", self.table);
        self.conn()?.execute(&sql, [])?;
        Ok(())
    }

    fn current_level(&mut self) -> Result<Option<Level>, StoreError> {
        let sql = format!(
            "SELECT level FROM {} ORDER BY level DESC LIMIT 1",
            self.table
        );
        let level: Option<i64> = self
            .conn()?
            .query_row(&sql, [], |row| row.get(0))
            .optional()?;

        level
            .map(|level| {
                Level::try_from(level)
                    .map_err(|_| StoreError::Rejected(format!("negative level {level} recorded")))
            })
            .transpose()
    }

    fn record_level(&mut self, level: Level) -> Result<(), StoreError> {
        let value = i64::try_from(level).map_err(|_| StoreError::LevelOutOfRange(level))?;
        let sql = format!("INSERT INTO {} (level) VALUES (?1)", self.table);
        self.conn()?.execute(&sql, [value])?;
        Ok(())
    }

    /// Runs every statement in `statement`, stopping at the first failure.
    fn execute(&mut self, statement: &str) -> Result<usize, StoreError> {
        let mut batch = Batch::new(self.conn()?, statement);
        let mut total = 0;
        while let Some(mut stmt) = batch.next()? {
            total += run_prepared(&mut stmt)?;
        }
        Ok(total)
    }
}

fn run_prepared(stmt: &mut Statement<'_>) -> Result<usize, StoreError> {
    if stmt.column_count() == 0 {
        return Ok(stmt.execute([])?);
    }

    let mut rows = stmt.query([])?;
    let mut returned = 0;
    while rows.next()?.is_some() {
        returned += 1;
    }
    Ok(returned)
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Backend(Box::new(err))
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn validate_table_name(table: &str) -> Result<(), StoreError> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::Rejected(format!(
            "invalid bookkeeping table name `{table}`"
        )))
    }
}
