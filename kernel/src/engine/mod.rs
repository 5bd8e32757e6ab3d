// Migration Engine
//
// Drives a store through open -> bookkeeping -> apply -> close.
// Scripts run strictly in supplied order, statements strictly in
// list order, and the store is closed on every exit path.

use tracing::{debug, error, info, warn};

use crate::error::{ConfigError, MigrateError};
use crate::plan::MigrationPlan;
use crate::script::{Level, MigrationScript, ScriptSet};
use crate::store::{MigrationStore, StoreOperation};

mod check;

pub use check::MigrationStatus;

/// Applies pending scripts to a store and tracks its recorded level.
///
/// Callers must serialize `ensure`/`check` calls against one store; the
/// migrator assumes it is the only writer of the recorded level.
#[derive(Debug)]
pub struct Migrator<S> {
    store: S,
    scripts: ScriptSet,
}

impl<S: MigrationStore> Migrator<S> {
    /// Validates `scripts` before the store is touched.
    pub fn new(store: S, scripts: Vec<MigrationScript>) -> Result<Self, ConfigError> {
        Ok(Self::with_script_set(store, ScriptSet::new(scripts)?))
    }

    pub fn with_script_set(store: S, scripts: ScriptSet) -> Self {
        Self { store, scripts }
    }

    pub fn builder() -> MigratorBuilder<S> {
        MigratorBuilder::default()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn scripts(&self) -> &ScriptSet {
        &self.scripts
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Bring the store up to `target`, or to the latest script when unset.
    ///
    /// Returns the recorded level after the run. A failure leaves the store
    /// at the level of the last fully applied script.
    pub fn ensure(&mut self, target: Option<Level>) -> Result<Level, MigrateError> {
        let span = tracing::info_span!("ensure", ?target);
        let _guard = span.enter();

        let outcome = self.open().and_then(|()| self.apply_pending(target));
        self.finish(outcome)
    }

    fn apply_pending(&mut self, target: Option<Level>) -> Result<Level, MigrateError> {
        let from = self.prepare_bookkeeping()?;
        let plan = MigrationPlan::build(&self.scripts, from, target);

        if plan.is_empty() {
            info!(level = from, "store is up to date");
            return Ok(from);
        }
        debug!(from, levels = ?plan.levels(), "applying pending migrations");

        for script in plan.scripts() {
            apply_script(&mut self.store, script)?;
        }

        let reached = plan.high_water_mark();
        info!(from, level = reached, "migrations applied");
        Ok(reached)
    }

    /// Create bookkeeping when missing and return the starting level.
    fn prepare_bookkeeping(&mut self) -> Result<Level, MigrateError> {
        let exists = self
            .store
            .bookkeeping_exists()
            .map_err(MigrateError::store(StoreOperation::BookkeepingExists))?;

        if !exists {
            debug!("creating bookkeeping");
            self.store
                .create_bookkeeping()
                .map_err(MigrateError::store(StoreOperation::CreateBookkeeping))?;
            return Ok(0);
        }

        let level = self
            .store
            .current_level()
            .map_err(MigrateError::store(StoreOperation::CurrentLevel))?;
        Ok(level.unwrap_or(0))
    }

    fn open(&mut self) -> Result<(), MigrateError> {
        if self.store.is_open() {
            debug!("store already open");
            return Ok(());
        }
        self.store
            .open()
            .map_err(MigrateError::store(StoreOperation::Open))
    }

    /// Close the store and merge the close result into `outcome`.
    /// The first error wins; a close failure only surfaces on its own.
    fn finish<T>(&mut self, outcome: Result<T, MigrateError>) -> Result<T, MigrateError> {
        let closed = self
            .store
            .close()
            .map_err(MigrateError::store(StoreOperation::Close));

        match (outcome, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_err)) => Err(close_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(close_err)) => {
                warn!(error = %close_err, "close failed while reporting an earlier error");
                Err(err)
            }
        }
    }
}

fn apply_script<S: MigrationStore>(
    store: &mut S,
    script: &MigrationScript,
) -> Result<(), MigrateError> {
    let level = script.level();

    for (index, statement) in script.statements().iter().enumerate() {
        if let Err(source) = store.execute(statement) {
            error!(level, statement = index + 1, error = %source, "migration statement failed");
            return Err(MigrateError::Statement {
                level,
                statement: index + 1,
                source,
            });
        }
    }

    store
        .record_level(level)
        .map_err(MigrateError::store(StoreOperation::RecordLevel))?;
    info!(level, "applied migration");
    Ok(())
}

/// Collects a store and scripts; reports a missing store as a
/// configuration error instead of a compile-time requirement.
#[derive(Debug)]
pub struct MigratorBuilder<S> {
    store: Option<S>,
    scripts: Vec<MigrationScript>,
}

impl<S> Default for MigratorBuilder<S> {
    fn default() -> Self {
        Self {
            store: None,
            scripts: Vec::new(),
        }
    }
}

impl<S: MigrationStore> MigratorBuilder<S> {
    pub fn store(mut self, store: S) -> Self {
        self.store = Some(store);
        self
    }

    pub fn script(mut self, script: MigrationScript) -> Self {
        self.scripts.push(script);
        self
    }

    pub fn scripts(mut self, scripts: impl IntoIterator<Item = MigrationScript>) -> Self {
        self.scripts.extend(scripts);
        self
    }

    pub fn build(self) -> Result<Migrator<S>, ConfigError> {
        let store = self.store.ok_or(ConfigError::MissingStore)?;
        Migrator::new(store, self.scripts)
    }
}
