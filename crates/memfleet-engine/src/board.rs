//! The coverage table: one total row plus one row per worker slot.
//!
//! The poll loop is the only writer. The total row sits in a
//! [`GuardedCell`] because the stats task reads it concurrently; worker rows
//! sit behind an `RwLock`.

use std::sync::{PoisonError, RwLock};

use memfleet_core::{CoverageRecord, CoverageSnapshot, GuardedCell};

#[derive(Debug)]
pub struct CoverageBoard {
    total: GuardedCell<CoverageRecord>,
    workers: RwLock<Vec<CoverageRecord>>,
}

impl CoverageBoard {
    /// A board with `capacity` worker rows, all invalid until [`Self::resize`].
    pub fn new(capacity: usize) -> Self {
        let workers = (0..capacity)
            .map(|index| CoverageRecord {
                valid: false,
                ..CoverageRecord::worker(index)
            })
            .collect();
        Self {
            total: GuardedCell::new(CoverageRecord::total()),
            workers: RwLock::new(workers),
        }
    }

    pub fn capacity(&self) -> usize {
        self.workers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Mark the first `active_count` worker rows valid and the rest invalid.
    pub fn resize(&self, active_count: usize) {
        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        for (index, record) in workers.iter_mut().enumerate() {
            record.valid = index < active_count;
        }
    }

    /// Zero every counter and resize for a new run.
    pub fn reset(&self, active_count: usize) {
        {
            let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
            for (index, record) in workers.iter_mut().enumerate() {
                *record = CoverageRecord {
                    valid: index < active_count,
                    ..CoverageRecord::worker(index)
                };
            }
        }
        self.total.replace(CoverageRecord::total());
    }

    /// Consistent copy of the total row.
    pub fn total(&self) -> CoverageRecord {
        self.total.read()
    }

    pub fn worker(&self, index: usize) -> Option<CoverageRecord> {
        self.workers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .cloned()
    }

    /// The total row followed by every valid worker row.
    pub fn rows(&self) -> Vec<CoverageRecord> {
        let workers = self.workers.read().unwrap_or_else(PoisonError::into_inner);
        std::iter::once(self.total())
            .chain(workers.iter().filter(|r| r.valid).cloned())
            .collect()
    }

    pub fn update_worker(&self, index: usize, snapshot: CoverageSnapshot) {
        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = workers.get_mut(index) {
            record.apply(snapshot);
        }
    }

    pub fn set_errored(&self, index: usize, errored: bool) {
        let mut workers = self.workers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = workers.get_mut(index) {
            record.errored = errored;
        }
    }

    /// Replace the total row in one step and return it.
    pub fn publish_total(&self, coverage_percent: f64, error_count: u64) -> CoverageRecord {
        let mut total = CoverageRecord::total();
        total.apply(CoverageSnapshot::new(coverage_percent, error_count));
        self.total.replace(total.clone());
        total
    }
}
