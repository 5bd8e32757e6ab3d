// Error Taxonomy
//
// Configuration errors are raised before any store I/O.
// Everything else carries enough context to locate the failure.

use crate::script::Level;
use crate::store::{StoreError, StoreOperation};

/// Problems with the migrator's inputs, detected without touching the store.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no store supplied to the migrator")]
    MissingStore,

    #[error("no migration scripts supplied")]
    NoScripts,

    #[error("migration script at level {level} has no statements")]
    EmptyScript { level: Level },

    #[error("migration scripts may not use level 0, it means nothing is applied")]
    ZeroLevel,

    #[error("duplicate migration level {level}")]
    DuplicateLevel { level: Level },

    #[error("migration level {level} follows level {previous}, scripts must ascend")]
    OutOfOrder { previous: Level, level: Level },

    #[error("could not parse migration scripts: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("could not read migration scripts: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by `Migrator` operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("store {operation} failed: {source}")]
    Store {
        operation: StoreOperation,
        #[source]
        source: StoreError,
    },

    #[error("migration level {level}, statement {statement} failed: {source}")]
    Statement {
        level: Level,
        /// 1-based index within the script.
        statement: usize,
        #[source]
        source: StoreError,
    },

    #[error("store is behind: at level {current}, level {required} required")]
    Behind { current: Level, required: Level },
}

impl MigrateError {
    pub(crate) fn store(operation: StoreOperation) -> impl FnOnce(StoreError) -> Self {
        move |source| MigrateError::Store { operation, source }
    }

    /// True for the dry-run "store is behind" outcome.
    pub fn is_behind(&self) -> bool {
        matches!(self, MigrateError::Behind { .. })
    }
}
