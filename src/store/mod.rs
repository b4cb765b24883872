//! Persisted state store and the transaction protocol around it.
//!
//! All reads and writes of the shared document go through [`Store::begin`]
//! or [`Store::transaction`]: lock, load, mutate, save, unlock. The document
//! is always rewritten in full, so a mutation outside a transaction would
//! silently discard concurrent updates.

pub mod document;
pub mod lock;

use std::path::PathBuf;

use crate::config::StoreConfig;
use crate::error::Result;
use crate::scheduler::JobTable;

pub use lock::{CoordinationLock, LockGuard};

#[derive(Debug, Clone)]
pub struct Store {
    config: StoreConfig,
    lock: CoordinationLock,
}

/// One locked load → mutate → save cycle.
///
/// Dropping a transaction without calling [`Transaction::commit`] releases
/// the locks without writing anything.
#[derive(Debug)]
pub struct Transaction {
    table: JobTable,
    state_path: PathBuf,
    _guard: LockGuard,
}

impl Store {
    pub fn new(config: StoreConfig) -> Self {
        let lock = CoordinationLock::new(config.lock_path());
        Self { config, lock }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Acquires the coordination lock and loads the current state.
    pub async fn begin(&self) -> Result<Transaction> {
        let guard = self.lock.acquire().await?;
        let state_path = self.config.state_path();
        let table = document::load(&state_path).await?;
        Ok(Transaction {
            table,
            state_path,
            _guard: guard,
        })
    }

    /// Runs `f` inside a transaction. The result is saved only if `f`
    /// succeeds.
    pub async fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut JobTable) -> Result<T>,
    {
        let mut tx = self.begin().await?;
        let out = f(tx.table_mut())?;
        tx.commit().await?;
        Ok(out)
    }

    /// Consistent read of the current state; nothing is written.
    pub async fn snapshot(&self) -> Result<JobTable> {
        let tx = self.begin().await?;
        Ok(tx.into_table())
    }
}

impl Transaction {
    pub fn table_mut(&mut self) -> &mut JobTable {
        &mut self.table
    }

    /// Saves the full table and releases the locks.
    pub async fn commit(self) -> Result<()> {
        document::save(&self.state_path, &self.table).await
    }

    /// Releases the locks, handing back the loaded table.
    pub fn into_table(self) -> JobTable {
        self.table
    }
}
