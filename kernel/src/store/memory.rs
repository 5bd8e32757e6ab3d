// In-Memory Migration Store
//
// Keeps bookkeeping in process memory and journals every capability call.
// Statements are recorded, not interpreted. Clones share state, so a
// caller can keep a handle while the migrator owns another.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::{MigrationStore, StoreError, StoreOperation};
use crate::script::Level;

#[derive(Debug, Default)]
struct Inner {
    open: bool,
    bookkeeping: bool,
    levels: Vec<Level>,
    executed: Vec<String>,
    calls: Vec<StoreOperation>,
    failing_operations: HashMap<StoreOperation, String>,
    failing_statements: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose bookkeeping already exists and records `level`.
    pub fn at_level(level: Level) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock();
            inner.bookkeeping = true;
            inner.levels.push(level);
        }
        store
    }

    /// A store whose bookkeeping exists but holds no rows yet.
    pub fn with_empty_bookkeeping() -> Self {
        let store = Self::new();
        store.inner.lock().bookkeeping = true;
        store
    }

    /// Make every future call of `operation` fail with `message`.
    pub fn fail_on(&self, operation: StoreOperation, message: impl Into<String>) {
        self.inner
            .lock()
            .failing_operations
            .insert(operation, message.into());
    }

    /// Make executing exactly `statement` fail with `message`.
    pub fn fail_statement(&self, statement: impl Into<String>, message: impl Into<String>) {
        self.inner
            .lock()
            .failing_statements
            .insert(statement.into(), message.into());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.failing_operations.clear();
        inner.failing_statements.clear();
    }

    /// Every capability invoked so far, in order.
    pub fn calls(&self) -> Vec<StoreOperation> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.inner
            .lock()
            .calls
            .iter()
            .filter(|op| **op == operation)
            .count()
    }

    /// Statements executed successfully, in order.
    pub fn executed(&self) -> Vec<String> {
        self.inner.lock().executed.clone()
    }

    /// Levels passed to `record_level`, in order.
    pub fn recorded_levels(&self) -> Vec<Level> {
        self.inner.lock().levels.clone()
    }

    pub fn level(&self) -> Level {
        self.inner.lock().levels.iter().copied().max().unwrap_or(0)
    }

    pub fn has_bookkeeping(&self) -> bool {
        self.inner.lock().bookkeeping
    }

    fn enter(&self, operation: StoreOperation) -> parking_lot::MutexGuard<'_, Inner> {
        let mut inner = self.inner.lock();
        inner.calls.push(operation);
        inner
    }
}

impl Inner {
    fn injected(&self, operation: StoreOperation) -> Result<(), StoreError> {
        match self.failing_operations.get(&operation) {
            Some(message) => Err(StoreError::Rejected(message.clone())),
            None => Ok(()),
        }
    }

    fn require_open(&self) -> Result<(), StoreError> {
        if self.open {
            Ok(())
        } else {
            Err(StoreError::NotOpen)
        }
    }
}

impl MigrationStore for MemoryStore {
    type Output = ();

    fn open(&mut self) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOperation::Open);
        inner.injected(StoreOperation::Open)?;
        inner.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOperation::Close);
        inner.injected(StoreOperation::Close)?;
        inner.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    fn bookkeeping_exists(&mut self) -> Result<bool, StoreError> {
        let inner = self.enter(StoreOperation::BookkeepingExists);
        inner.require_open()?;
        inner.injected(StoreOperation::BookkeepingExists)?;
        Ok(inner.bookkeeping)
    }

    fn create_bookkeeping(&mut self) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOperation::CreateBookkeeping);
        inner.require_open()?;
        inner.injected(StoreOperation::CreateBookkeeping)?;
        if inner.bookkeeping {
            return Err(StoreError::Rejected("bookkeeping already exists".into()));
        }
        inner.bookkeeping = true;
        Ok(())
    }

    fn current_level(&mut self) -> Result<Option<Level>, StoreError> {
        let inner = self.enter(StoreOperation::CurrentLevel);
        inner.require_open()?;
        inner.injected(StoreOperation::CurrentLevel)?;
        if !inner.bookkeeping {
            return Err(StoreError::Rejected("no bookkeeping".into()));
        }
        Ok(inner.levels.iter().copied().max())
    }

    fn record_level(&mut self, level: Level) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOperation::RecordLevel);
        inner.require_open()?;
        inner.injected(StoreOperation::RecordLevel)?;
        if !inner.bookkeeping {
            return Err(StoreError::Rejected("no bookkeeping".into()));
        }
        inner.levels.push(level);
        Ok(())
    }

    fn execute(&mut self, statement: &str) -> Result<(), StoreError> {
        let mut inner = self.enter(StoreOperation::Execute);
        inner.require_open()?;
        inner.injected(StoreOperation::Execute)?;
        if let Some(message) = inner.failing_statements.get(statement) {
            return Err(StoreError::Rejected(message.clone()));
        }
        inner.executed.push(statement.to_owned());
        Ok(())
    }
}
