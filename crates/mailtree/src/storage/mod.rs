//! SQLite persistence: schema, connection handling and the store facade

pub(crate) mod schema;
mod sqlite;

use std::sync::atomic::{AtomicU64, Ordering};

pub use sqlite::{SqliteMailTree, StoreCounts, StoreTx};

/// Counts statements issued against the database.
///
/// Lets callers (and tests) check that operations stay query-bounded.
#[derive(Debug, Default)]
pub struct QueryCounter(AtomicU64);

impl QueryCounter {
    pub(crate) fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}
