// Migration Store Abstraction
//
// Defines the capability contract a backing store offers the migrator.
// Implementations may talk to a network database, an embedded engine,
// or plain memory.

use std::fmt;

use crate::script::Level;

pub mod memory;

pub use memory::MemoryStore;

/// Errors raised by store drivers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store is not open")]
    NotOpen,

    #[error("level {0} cannot be represented by this store")]
    LevelOutOfRange(Level),

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Backend(Box<dyn std::error::Error + Send + Sync>),
}

/// Names of the store capabilities, used to annotate failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    Open,
    Close,
    BookkeepingExists,
    CreateBookkeeping,
    CurrentLevel,
    RecordLevel,
    Execute,
}

impl StoreOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreOperation::Open => "open",
            StoreOperation::Close => "close",
            StoreOperation::BookkeepingExists => "bookkeeping_exists",
            StoreOperation::CreateBookkeeping => "create_bookkeeping",
            StoreOperation::CurrentLevel => "current_level",
            StoreOperation::RecordLevel => "record_level",
            StoreOperation::Execute => "execute",
        }
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backing store driven by the migrator.
///
/// Properties required from implementations:
/// - `open` and `close` are idempotent
/// - `current_level` reflects the maximum level ever recorded
/// - `execute` runs exactly the statement given, nothing more
///
/// Implementations MUST NOT:
/// - Reorder or batch statements across calls
/// - Retry on their own behalf without being idempotent
pub trait MigrationStore {
    /// Driver specific result of a statement. Never inspected by the migrator.
    type Output;

    /// Establish the connection. No-op when already open.
    fn open(&mut self) -> Result<(), StoreError>;

    /// Release the connection. No-op when already closed.
    fn close(&mut self) -> Result<(), StoreError>;

    fn is_open(&self) -> bool;

    /// Whether the level bookkeeping record already exists.
    fn bookkeeping_exists(&mut self) -> Result<bool, StoreError>;

    /// Create the level bookkeeping record, conceptually at level 0.
    fn create_bookkeeping(&mut self) -> Result<(), StoreError>;

    /// Highest recorded level, `None` when nothing was ever recorded.
    fn current_level(&mut self) -> Result<Option<Level>, StoreError>;

    /// Durably persist `level` as the new high-water mark.
    fn record_level(&mut self, level: Level) -> Result<(), StoreError>;

    /// Execute one opaque statement.
    fn execute(&mut self, statement: &str) -> Result<Self::Output, StoreError>;
}

impl<S: MigrationStore + ?Sized> MigrationStore for &mut S {
    type Output = S::Output;

    fn open(&mut self) -> Result<(), StoreError> {
        (**self).open()
    }

    fn close(&mut self) -> Result<(), StoreError> {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn bookkeeping_exists(&mut self) -> Result<bool, StoreError> {
        (**self).bookkeeping_exists()
    }

    fn create_bookkeeping(&mut self) -> Result<(), StoreError> {
        (**self).create_bookkeeping()
    }

    fn current_level(&mut self) -> Result<Option<Level>, StoreError> {
        (**self).current_level()
    }

    fn record_level(&mut self, level: Level) -> Result<(), StoreError> {
        (**self).record_level(level)
    }

    fn execute(&mut self, statement: &str) -> Result<Self::Output, StoreError> {
        (**self).execute(statement)
    }
}
