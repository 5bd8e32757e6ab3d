// Ascend Kernel
//
// Applies ordered, versioned migration scripts to a store and tracks
// the recorded level so re-runs are incremental.

pub mod adapters;
pub mod engine;
pub mod error;
pub mod plan;
pub mod script;
pub mod store;

pub use engine::{MigrationStatus, Migrator, MigratorBuilder};
pub use error::{ConfigError, MigrateError};
pub use plan::MigrationPlan;
pub use script::{Level, MigrationScript, ScriptSet};
pub use store::{MemoryStore, MigrationStore, StoreError, StoreOperation};

#[cfg(feature = "sqlite")]
pub use adapters::sqlite::{SqliteConfig, SqliteStore};
