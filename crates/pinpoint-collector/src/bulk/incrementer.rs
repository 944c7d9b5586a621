// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::merge::RowKeyMerge;
use super::reporter::BulkOperationReporter;
use super::RowInfo;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::store::Increment;
use pinpoint_common::table::TableName;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Accumulates counter deltas per cell until the next flush.
pub trait BulkIncrementer: Send + Sync {
    /// Adds `addition` to the cell. Returns `false` when the cell was rejected.
    fn increment(&self, row: RowInfo, addition: i64) -> bool;

    /// Puts back deltas a flush failed to write. Returns `false` when the cell no longer fits.
    fn restore(&self, row: RowInfo, addition: i64) -> bool;

    /// Snapshots and resets every cell, returning the non-zero deltas.
    fn drain(&self) -> Vec<(RowInfo, i64)>;

    fn get_increments(
        &self,
        distributor: &RowKeyDistributorByHashPrefix,
    ) -> HashMap<TableName, Vec<Increment>> {
        RowKeyMerge.merge(self.drain(), distributor)
    }

    /// Number of pending cells.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct DefaultBulkIncrementer {
    counters: DashMap<RowInfo, AtomicI64>,
    cells: AtomicUsize,
}

impl DefaultBulkIncrementer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds to an existing cell, or creates it when `admit(pending cells)` allows.
    pub(crate) fn increment_if(
        &self,
        row: RowInfo,
        addition: i64,
        admit: impl Fn(usize) -> bool,
    ) -> bool {
        if let Some(counter) = self.counters.get(&row) {
            counter.fetch_add(addition, Ordering::AcqRel);
            return true;
        }
        match self.counters.entry(row) {
            Entry::Occupied(entry) => {
                entry.get().fetch_add(addition, Ordering::AcqRel);
                true
            }
            Entry::Vacant(entry) => {
                let reserved = self
                    .cells
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                        admit(n).then_some(n + 1)
                    })
                    .is_ok();
                if reserved {
                    entry.insert(AtomicI64::new(addition));
                }
                reserved
            }
        }
    }
}

impl BulkIncrementer for DefaultBulkIncrementer {
    fn increment(&self, row: RowInfo, addition: i64) -> bool {
        self.increment_if(row, addition, |_| true)
    }

    fn restore(&self, row: RowInfo, addition: i64) -> bool {
        self.increment_if(row, addition, |_| true)
    }

    fn drain(&self) -> Vec<(RowInfo, i64)> {
        let mut snapshot = Vec::with_capacity(self.counters.len());
        let mut drained = Vec::new();
        for entry in self.counters.iter() {
            let delta = entry.value().swap(0, Ordering::AcqRel);
            drained.push(entry.key().clone());
            if delta != 0 {
                snapshot.push((entry.key().clone(), delta));
            }
        }
        // cells incremented after the swap are non-zero and survive until the next flush
        for row in drained {
            if self
                .counters
                .remove_if(&row, |_, counter| counter.load(Ordering::Acquire) == 0)
                .is_some()
            {
                self.cells.fetch_sub(1, Ordering::AcqRel);
            }
        }
        snapshot
    }

    fn len(&self) -> usize {
        self.cells.load(Ordering::Acquire)
    }
}

/// Bounds the number of pending cells. New cells beyond `limit_size` are dropped and
/// counted; existing cells keep accumulating since they cost no memory.
#[derive(Debug)]
pub struct SizeLimitedBulkIncrementer {
    delegate: DefaultBulkIncrementer,
    reporter: Arc<BulkOperationReporter>,
    limit_size: usize,
}

impl SizeLimitedBulkIncrementer {
    pub fn new(
        delegate: DefaultBulkIncrementer,
        reporter: Arc<BulkOperationReporter>,
        limit_size: usize,
    ) -> Self {
        Self {
            delegate,
            reporter,
            limit_size,
        }
    }

    pub fn limit_size(&self) -> usize {
        self.limit_size
    }
}

impl BulkIncrementer for SizeLimitedBulkIncrementer {
    fn increment(&self, row: RowInfo, addition: i64) -> bool {
        let limit_size = self.limit_size;
        let accepted = self
            .delegate
            .increment_if(row, addition, |pending| pending < limit_size);
        if !accepted {
            self.reporter.reporting_increment_reject();
            debug!(
                "{}: increment rejected, {} cells pending (limit {})",
                self.reporter.name(),
                self.delegate.len(),
                limit_size
            );
        }
        accepted
    }

    /// Restored deltas merge into cells that still exist; new cells only fill free room, so
    /// cells admitted while the failed request was in flight keep precedence.
    fn restore(&self, row: RowInfo, addition: i64) -> bool {
        let limit_size = self.limit_size;
        let restored = self
            .delegate
            .increment_if(row, addition, |pending| pending < limit_size);
        if !restored {
            self.reporter.reporting_restore_reject(1);
        }
        restored
    }

    fn drain(&self) -> Vec<(RowInfo, i64)> {
        let rejected = self.reporter.take_recent_rejects();
        if rejected > 0 {
            warn!(
                "{}: {} increments dropped since last flush, limit size {} reached",
                self.reporter.name(),
                rejected,
                self.limit_size
            );
        }
        self.delegate.drain()
    }

    fn len(&self) -> usize {
        self.delegate.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::TableKey;
    use std::thread;
    use tracing_test::traced_test;

    fn row(key: u32) -> RowInfo {
        RowInfo::new(
            TableKey {
                table: TableName::new("test", "Callee"),
                family: b"C",
            },
            key.to_be_bytes().to_vec(),
            b"column".to_vec(),
        )
    }

    fn total(snapshot: &[(RowInfo, i64)]) -> i64 {
        snapshot.iter().map(|(_, delta)| delta).sum()
    }

    #[test]
    fn test_increment_and_drain() {
        let incrementer = DefaultBulkIncrementer::new();
        assert!(incrementer.increment(row(1), 1));
        assert!(incrementer.increment(row(1), 2));
        assert!(incrementer.increment(row(2), 5));
        assert_eq!(incrementer.len(), 2);

        let mut snapshot = incrementer.drain();
        snapshot.sort_by(|a, b| a.0.row_key.cmp(&b.0.row_key));
        assert_eq!(snapshot, vec![(row(1), 3), (row(2), 5)]);
        assert!(incrementer.is_empty());
        assert!(incrementer.drain().is_empty());
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let incrementer = Arc::new(DefaultBulkIncrementer::new());
        let mut flushed = 0;
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let incrementer = Arc::clone(&incrementer);
                thread::spawn(move || {
                    for i in 0..10_000u32 {
                        incrementer.increment(row(i % 64), 1);
                    }
                })
            })
            .collect();
        while handles.iter().any(|h| !h.is_finished()) {
            flushed += total(&incrementer.drain());
        }
        for handle in handles {
            handle.join().expect("incrementing thread");
        }
        flushed += total(&incrementer.drain());

        assert_eq!(flushed, 40_000);
        assert!(incrementer.is_empty());
    }

    #[test]
    #[traced_test]
    fn test_size_limited_rejects_new_cells() {
        let reporter = Arc::new(BulkOperationReporter::new("callee"));
        let incrementer =
            SizeLimitedBulkIncrementer::new(DefaultBulkIncrementer::new(), Arc::clone(&reporter), 2);

        assert!(incrementer.increment(row(1), 1));
        assert!(incrementer.increment(row(2), 1));
        assert!(!incrementer.increment(row(3), 1));
        // existing cells are still accepted at the limit
        assert!(incrementer.increment(row(1), 1));
        assert_eq!(reporter.increment_reject_count(), 1);
        assert_eq!(incrementer.len(), 2);

        assert_eq!(total(&incrementer.drain()), 3);
        assert!(logs_contain("1 increments dropped since last flush"));
        assert!(incrementer.increment(row(3), 1));
    }

    #[test]
    fn test_restore_respects_limit() {
        let reporter = Arc::new(BulkOperationReporter::new("caller"));
        let incrementer =
            SizeLimitedBulkIncrementer::new(DefaultBulkIncrementer::new(), Arc::clone(&reporter), 2);
        assert!(incrementer.increment(row(1), 1));
        assert!(incrementer.restore(row(2), 4));
        // existing cells absorb restored deltas at the limit
        assert!(incrementer.restore(row(1), 2));
        assert!(!incrementer.restore(row(3), 8));

        assert_eq!(incrementer.len(), 2);
        assert_eq!(reporter.restore_reject_count(), 1);
        assert_eq!(reporter.increment_reject_count(), 0);
        assert_eq!(total(&incrementer.drain()), 7);
    }
}
