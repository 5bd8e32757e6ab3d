// Dry-Run Verification
//
// Read-only counterparts of `ensure`: they open and close the store,
// read the recorded level and plan, but never execute statements,
// record levels or create bookkeeping.

use serde::Serialize;
use tracing::{debug, info};

use super::Migrator;
use crate::error::MigrateError;
use crate::plan::MigrationPlan;
use crate::script::Level;
use crate::store::{MigrationStore, StoreOperation};

/// Snapshot of where a store stands relative to the script set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    /// Whether the level bookkeeping exists yet.
    pub bookkeeping: bool,
    pub current: Level,
    /// Highest level available in the script set.
    pub latest: Level,
    pub pending: Vec<Level>,
}

impl MigrationStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<S: MigrationStore> Migrator<S> {
    /// Verify the store already satisfies `target` (or the latest script).
    ///
    /// Returns the current level, or `MigrateError::Behind` naming the
    /// current and required levels.
    pub fn check(&mut self, target: Option<Level>) -> Result<Level, MigrateError> {
        let span = tracing::info_span!("check", ?target);
        let _guard = span.enter();

        let outcome = self.open().and_then(|()| self.verify(target));
        self.finish(outcome)
    }

    /// Report recorded and pending levels without changing the store.
    pub fn status(&mut self) -> Result<MigrationStatus, MigrateError> {
        let outcome = self.open().and_then(|()| self.read_status());
        self.finish(outcome)
    }

    fn verify(&mut self, target: Option<Level>) -> Result<Level, MigrateError> {
        let current = self.read_recorded()?.level;
        let plan = MigrationPlan::build(&self.scripts, current, target);
        let required = required_level(&plan);

        if current < required {
            info!(current, required, "store is behind");
            return Err(MigrateError::Behind { current, required });
        }

        debug!(current, "store satisfies requirement");
        Ok(current)
    }

    fn read_status(&mut self) -> Result<MigrationStatus, MigrateError> {
        let recorded = self.read_recorded()?;
        let plan = MigrationPlan::build(&self.scripts, recorded.level, None);

        Ok(MigrationStatus {
            bookkeeping: recorded.bookkeeping,
            current: recorded.level,
            latest: self.scripts.latest(),
            pending: plan.levels(),
        })
    }

    /// Missing bookkeeping reads as level 0 and is left missing.
    fn read_recorded(&mut self) -> Result<Recorded, MigrateError> {
        let bookkeeping = self
            .store
            .bookkeeping_exists()
            .map_err(MigrateError::store(StoreOperation::BookkeepingExists))?;

        if !bookkeeping {
            return Ok(Recorded {
                bookkeeping,
                level: 0,
            });
        }

        let level = self
            .store
            .current_level()
            .map_err(MigrateError::store(StoreOperation::CurrentLevel))?;
        Ok(Recorded {
            bookkeeping,
            level: level.unwrap_or(0),
        })
    }
}

struct Recorded {
    bookkeeping: bool,
    level: Level,
}

/// Level `ensure` would reach, raised to the explicit target if one was given.
fn required_level(plan: &MigrationPlan<'_>) -> Level {
    let reached = plan.high_water_mark();
    match plan.target {
        Some(target) => reached.max(target),
        None => reached,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::MigrationScript;
    use crate::store::MemoryStore;

    fn migrator(store: &MemoryStore) -> Migrator<MemoryStore> {
        Migrator::new(
            store.clone(),
            vec![
                MigrationScript::new(1, ["create table t (a int)"]),
                MigrationScript::new(2, ["insert into t values (2)"]),
                MigrationScript::new(3, ["update t set a = 3", "insert into t values (99)"]),
            ],
        )
        .unwrap()
    }

    fn assert_untouched(store: &MemoryStore) {
        assert_eq!(store.call_count(StoreOperation::Execute), 0);
        assert_eq!(store.call_count(StoreOperation::RecordLevel), 0);
        assert_eq!(store.call_count(StoreOperation::CreateBookkeeping), 0);
        assert!(!store.is_open());
    }

    #[test]
    fn fully_migrated_store_passes() {
        let store = MemoryStore::at_level(3);

        assert_eq!(migrator(&store).check(None).unwrap(), 3);
        assert_untouched(&store);
    }

    #[test]
    fn behind_store_reports_current_and_required() {
        let store = MemoryStore::at_level(1);

        let err = migrator(&store).check(None).unwrap_err();

        assert!(matches!(
            err,
            MigrateError::Behind {
                current: 1,
                required: 3
            }
        ));
        assert_untouched(&store);
    }

    #[test]
    fn target_is_checked_against_current_level() {
        let store = MemoryStore::at_level(2);
        let mut migrator = migrator(&store);

        assert_eq!(migrator.check(Some(2)).unwrap(), 2);
        assert!(migrator.check(Some(3)).unwrap_err().is_behind());
        assert_untouched(&store);
    }

    #[test]
    fn target_beyond_scripts_is_still_required() {
        let store = MemoryStore::at_level(3);

        let err = migrator(&store).check(Some(5)).unwrap_err();

        assert!(matches!(
            err,
            MigrateError::Behind {
                current: 3,
                required: 5
            }
        ));
    }

    #[test]
    fn missing_bookkeeping_is_not_created() {
        let store = MemoryStore::new();

        let err = migrator(&store).check(None).unwrap_err();

        assert!(matches!(
            err,
            MigrateError::Behind {
                current: 0,
                required: 3
            }
        ));
        assert!(!store.has_bookkeeping());
        assert_untouched(&store);
    }

    #[test]
    fn check_then_ensure_then_check() {
        let store = MemoryStore::new();
        let mut migrator = migrator(&store);

        assert!(migrator.check(Some(2)).is_err());
        assert_eq!(migrator.ensure(Some(2)).unwrap(), 2);
        assert_eq!(migrator.check(Some(2)).unwrap(), 2);
    }

    #[test]
    fn status_lists_pending_levels() {
        let store = MemoryStore::at_level(1);

        let status = migrator(&store).status().unwrap();

        assert_eq!(
            status,
            MigrationStatus {
                bookkeeping: true,
                current: 1,
                latest: 3,
                pending: vec![2, 3],
            }
        );
        assert!(!status.is_up_to_date());
        assert_untouched(&store);
    }

    #[test]
    fn status_of_fresh_store() {
        let store = MemoryStore::new();

        let status = migrator(&store).status().unwrap();

        assert!(!status.bookkeeping);
        assert_eq!(status.current, 0);
        assert_eq!(status.pending, vec![1, 2, 3]);
    }

    #[test]
    fn check_read_failure_is_reported_and_closes() {
        let store = MemoryStore::at_level(3);
        store.fail_on(StoreOperation::BookkeepingExists, "lost connection");

        let err = migrator(&store).check(None).unwrap_err();

        assert!(matches!(
            err,
            MigrateError::Store {
                operation: StoreOperation::BookkeepingExists,
                ..
            }
        ));
        assert_eq!(store.calls().last(), Some(&StoreOperation::Close));
    }

    #[test]
    fn check_requires_the_level_ensure_reaches() {
        let store = MemoryStore::at_level(1);
        let mut migrator = migrator(&store);

        let required = match migrator.check(None).unwrap_err() {
            MigrateError::Behind { required, .. } => required,
            other => panic!("unexpected error: {other}"),
        };
        let reached = migrator.ensure(None).unwrap();

        assert_eq!(required, reached);
        assert_eq!(migrator.check(None).unwrap(), reached);
    }
}
