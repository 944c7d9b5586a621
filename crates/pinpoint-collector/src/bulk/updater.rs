// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::reporter::BulkOperationReporter;
use super::RowInfo;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::store::CheckAndMax;
use pinpoint_common::table::TableName;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Keeps the maximum observed value per cell until the next flush.
pub trait BulkUpdater: Send + Sync {
    /// Returns `false` when the cell was rejected.
    fn update_max(&self, row: RowInfo, value: i64) -> bool;

    /// Puts back a maximum a flush failed to write. Returns `false` when the cell no longer fits.
    fn restore(&self, row: RowInfo, value: i64) -> bool;

    /// Removes every cell, returning its maximum.
    fn drain(&self) -> Vec<(RowInfo, i64)>;

    fn get_max_updates(
        &self,
        distributor: &RowKeyDistributorByHashPrefix,
    ) -> Vec<(TableName, CheckAndMax)> {
        self.drain()
            .into_iter()
            .map(|(row, value)| {
                (
                    row.table_key.table,
                    CheckAndMax {
                        row: distributor.distributed_key(&row.row_key),
                        family: row.table_key.family.to_vec(),
                        qualifier: row.column_name,
                        value,
                    },
                )
            })
            .collect()
    }

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Default)]
pub struct DefaultBulkUpdater {
    max_values: DashMap<RowInfo, AtomicI64>,
    cells: AtomicUsize,
}

impl DefaultBulkUpdater {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn update_max_if(&self, row: RowInfo, value: i64, admit: impl Fn(usize) -> bool) -> bool {
        if let Some(max) = self.max_values.get(&row) {
            max.fetch_max(value, Ordering::AcqRel);
            return true;
        }
        match self.max_values.entry(row) {
            Entry::Occupied(entry) => {
                entry.get().fetch_max(value, Ordering::AcqRel);
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
                    entry.insert(AtomicI64::new(value));
                }
                reserved
            }
        }
    }
}

impl BulkUpdater for DefaultBulkUpdater {
    fn update_max(&self, row: RowInfo, value: i64) -> bool {
        self.update_max_if(row, value, |_| true)
    }

    fn restore(&self, row: RowInfo, value: i64) -> bool {
        self.update_max_if(row, value, |_| true)
    }

    fn drain(&self) -> Vec<(RowInfo, i64)> {
        // a max is idempotent, so a cell recreated after its removal is simply written again
        let rows: Vec<RowInfo> = self
            .max_values
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        rows.into_iter()
            .filter_map(|row| {
                let (row, max) = self.max_values.remove(&row)?;
                self.cells.fetch_sub(1, Ordering::AcqRel);
                Some((row, max.into_inner()))
            })
            .collect()
    }

    fn len(&self) -> usize {
        self.cells.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct SizeLimitedBulkUpdater {
    delegate: DefaultBulkUpdater,
    reporter: Arc<BulkOperationReporter>,
    limit_size: usize,
}

impl SizeLimitedBulkUpdater {
    pub fn new(
        delegate: DefaultBulkUpdater,
        reporter: Arc<BulkOperationReporter>,
        limit_size: usize,
    ) -> Self {
        Self {
            delegate,
            reporter,
            limit_size,
        }
    }
}

impl BulkUpdater for SizeLimitedBulkUpdater {
    fn update_max(&self, row: RowInfo, value: i64) -> bool {
        let limit_size = self.limit_size;
        let accepted = self
            .delegate
            .update_max_if(row, value, |pending| pending < limit_size);
        if !accepted {
            self.reporter.reporting_increment_reject();
            debug!(
                "{}: max update rejected, limit size {} reached",
                self.reporter.name(),
                limit_size
            );
        }
        accepted
    }

    fn restore(&self, row: RowInfo, value: i64) -> bool {
        let limit_size = self.limit_size;
        let restored = self
            .delegate
            .update_max_if(row, value, |pending| pending < limit_size);
        if !restored {
            self.reporter.reporting_restore_reject(1);
        }
        restored
    }

    fn drain(&self) -> Vec<(RowInfo, i64)> {
        let drained = self.delegate.drain();
        if drained.len() >= self.limit_size {
            warn!(
                "{}: max updates reached limit size {}",
                self.reporter.name(),
                self.limit_size
            );
        }
        drained
    }

    fn len(&self) -> usize {
        self.delegate.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::TableKey;
    use proptest::prelude::*;

    fn row(column: &[u8]) -> RowInfo {
        RowInfo::new(
            TableKey {
                table: TableName::new("test", "Self"),
                family: b"C",
            },
            b"row".to_vec(),
            column.to_vec(),
        )
    }

    #[test]
    fn test_lower_values_are_ignored() {
        let updater = DefaultBulkUpdater::new();
        updater.update_max(row(b"max"), 10);
        updater.update_max(row(b"max"), 3);
        updater.update_max(row(b"max"), 12);
        assert_eq!(updater.drain(), vec![(row(b"max"), 12)]);
        assert!(updater.is_empty());
    }

    #[test]
    fn test_max_updates_are_salted() {
        let distributor = RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid");
        let updater = DefaultBulkUpdater::new();
        updater.update_max(row(b"max"), 7);

        let updates = updater.get_max_updates(&distributor);
        assert_eq!(updates.len(), 1);
        let (table, update) = &updates[0];
        assert_eq!(*table, TableName::new("test", "Self"));
        assert_eq!(update.row, distributor.distributed_key(b"row"));
        assert_eq!(update.qualifier, b"max".to_vec());
        assert_eq!(update.value, 7);
    }

    #[test]
    fn test_size_limited() {
        let reporter = Arc::new(BulkOperationReporter::new("self"));
        let updater =
            SizeLimitedBulkUpdater::new(DefaultBulkUpdater::new(), Arc::clone(&reporter), 1);
        assert!(updater.update_max(row(b"a"), 1));
        assert!(!updater.update_max(row(b"b"), 1));
        assert!(updater.update_max(row(b"a"), 5));
        assert_eq!(reporter.increment_reject_count(), 1);
        assert_eq!(updater.drain(), vec![(row(b"a"), 5)]);
    }

    #[test]
    fn test_restore_respects_limit() {
        let reporter = Arc::new(BulkOperationReporter::new("self"));
        let updater =
            SizeLimitedBulkUpdater::new(DefaultBulkUpdater::new(), Arc::clone(&reporter), 1);
        assert!(updater.update_max(row(b"a"), 3));
        assert!(updater.restore(row(b"a"), 9));
        assert!(!updater.restore(row(b"b"), 4));

        assert_eq!(reporter.restore_reject_count(), 1);
        assert_eq!(updater.drain(), vec![(row(b"a"), 9)]);
    }

    proptest! {
        #[test]
        fn test_stored_value_is_maximum(values in proptest::collection::vec(any::<i64>(), 1..64)) {
            let updater = DefaultBulkUpdater::new();
            for value in &values {
                updater.update_max(row(b"max"), *value);
            }
            let expected = values.iter().copied().max().unwrap_or_default();
            prop_assert_eq!(updater.drain(), vec![(row(b"max"), expected)]);
        }
    }
}
