// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::incrementer::BulkIncrementer;
use super::reporter::BulkOperationReporter;
use super::updater::BulkUpdater;
use super::{RowInfo, TableKey};
use async_trait::async_trait;
use pinpoint_common::collections::BoundedBatch;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::statistics::{ColumnName, RowKey};
use pinpoint_common::store::{CheckAndMax, Increment, Store};
use pinpoint_common::table::TableName;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Counter write path of one statistics table.
#[async_trait]
pub trait BulkWriter: Send + Sync {
    fn name(&self) -> &str;

    async fn increment(&self, row_key: &dyn RowKey, column_name: &dyn ColumnName) {
        self.increment_by(row_key, column_name, 1).await;
    }

    async fn increment_by(&self, row_key: &dyn RowKey, column_name: &dyn ColumnName, addition: i64);

    async fn update_max(&self, row_key: &dyn RowKey, column_name: &dyn ColumnName, value: i64);

    /// Writes pending counter deltas.
    async fn flush_link(&self);

    /// Writes pending max values.
    async fn flush_avg_max(&self);
}

/// Enqueues every mutation and writes them on flush, one `batch_increment` request per
/// `batch_size` merged rows. Cells of a failed request are put back for the next flush while
/// the pending set stays under its limit; the rest are dropped and counted as restore rejects.
pub struct DefaultBulkWriter {
    table_key: TableKey,
    distributor: Arc<RowKeyDistributorByHashPrefix>,
    store: Arc<dyn Store>,
    incrementer: Arc<dyn BulkIncrementer>,
    updater: Arc<dyn BulkUpdater>,
    reporter: Arc<BulkOperationReporter>,
    batch_size: usize,
}

impl DefaultBulkWriter {
    pub fn new(
        table_key: TableKey,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        store: Arc<dyn Store>,
        incrementer: Arc<dyn BulkIncrementer>,
        updater: Arc<dyn BulkUpdater>,
        reporter: Arc<BulkOperationReporter>,
        batch_size: usize,
    ) -> Self {
        Self {
            table_key,
            distributor,
            store,
            incrementer,
            updater,
            reporter,
            batch_size: batch_size.max(1),
        }
    }

    pub fn pending_increments(&self) -> usize {
        self.incrementer.len()
    }

    pub fn pending_max_updates(&self) -> usize {
        self.updater.len()
    }

    fn row_info(&self, row_key: &dyn RowKey, column_name: &dyn ColumnName) -> RowInfo {
        RowInfo::new(self.table_key, row_key.row_key(0), column_name.column_name())
    }

    async fn dispatch(&self, table: TableName, increments: Vec<Increment>) {
        let cells: usize = increments.iter().map(|i| i.columns.len()).sum();
        match self.store.batch_increment(table, increments.clone()).await {
            Ok(()) => {
                self.reporter.reporting_flush_all(increments.len() as u64);
                debug!("{}: flushed {} rows to {}", self.name(), increments.len(), table);
            }
            Err(e) => {
                error!(
                    "{}: failed to flush {} cells to {}, retrying on next flush: {}",
                    self.name(),
                    cells,
                    table,
                    e
                );
                self.reporter.reporting_flush_failure(cells as u64);
                for increment in increments {
                    self.restore_increment(table, increment);
                }
            }
        }
    }

    fn restore_increment(&self, table: TableName, increment: Increment) {
        let row_key = match self.distributor.original_key(&increment.row) {
            Ok(row_key) => row_key.to_vec(),
            Err(e) => {
                warn!(
                    "{}: dropping {} cells with an undecodable row key: {}",
                    self.name(),
                    increment.columns.len(),
                    e
                );
                return;
            }
        };
        let table_key = TableKey {
            table,
            family: self.table_key.family,
        };
        let dropped = increment
            .columns
            .into_iter()
            .filter(|(column_name, delta)| {
                !self.incrementer.restore(
                    RowInfo::new(table_key, row_key.clone(), column_name.clone()),
                    *delta,
                )
            })
            .count();
        if dropped > 0 {
            warn!(
                "{}: dropped {} failed cells of {}, pending cells at limit",
                self.name(),
                dropped,
                table
            );
        }
    }

    fn restore_max(&self, table: TableName, update: CheckAndMax) {
        match self.distributor.original_key(&update.row) {
            Ok(row_key) => {
                let restored = self.updater.restore(
                    RowInfo::new(
                        TableKey {
                            table,
                            family: self.table_key.family,
                        },
                        row_key.to_vec(),
                        update.qualifier,
                    ),
                    update.value,
                );
                if !restored {
                    warn!(
                        "{}: dropped failed max update of {}, pending cells at limit",
                        self.name(),
                        table
                    );
                }
            }
            Err(e) => warn!(
                "{}: dropping max update with an undecodable row key: {}",
                self.name(),
                e
            ),
        }
    }
}

#[async_trait]
impl BulkWriter for DefaultBulkWriter {
    fn name(&self) -> &str {
        self.reporter.name()
    }

    async fn increment_by(&self, row_key: &dyn RowKey, column_name: &dyn ColumnName, addition: i64) {
        self.incrementer
            .increment(self.row_info(row_key, column_name), addition);
    }

    async fn update_max(&self, row_key: &dyn RowKey, column_name: &dyn ColumnName, value: i64) {
        self.updater
            .update_max(self.row_info(row_key, column_name), value);
    }

    async fn flush_link(&self) {
        let tables = self.incrementer.get_increments(&self.distributor);
        for (table, increments) in tables {
            let mut batch = BoundedBatch::with_capacity(self.batch_size);
            for increment in increments {
                if batch.is_full() {
                    self.dispatch(table, batch.drain()).await;
                }
                if let Err((increment, e)) = batch.push(increment) {
                    warn!("{}: {}, restoring row for next flush", self.name(), e);
                    self.restore_increment(table, increment);
                }
            }
            if !batch.is_empty() {
                self.dispatch(table, batch.drain()).await;
            }
        }
    }

    async fn flush_avg_max(&self) {
        let updates = self.updater.get_max_updates(&self.distributor);
        if updates.is_empty() {
            return;
        }
        let mut written = 0u64;
        for (table, update) in updates {
            match self.store.max_column_value(table, update.clone()).await {
                Ok(()) => written += 1,
                Err(e) => {
                    error!(
                        "{}: failed to write max value to {}, retrying on next flush: {}",
                        self.name(),
                        table,
                        e
                    );
                    self.reporter.reporting_flush_failure(1);
                    self.restore_max(table, update);
                }
            }
        }
        self.reporter.reporting_flush_all(written);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::incrementer::{DefaultBulkIncrementer, SizeLimitedBulkIncrementer};
    use crate::bulk::updater::DefaultBulkUpdater;
    use pinpoint_common::statistics::{CallRowKey, ResponseColumnName};
    use pinpoint_common::store::InMemoryStore;
    use pinpoint_common::table::{ColumnFamily, TableNameProvider};
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        reporter: Arc<BulkOperationReporter>,
        writer: DefaultBulkWriter,
        table: TableName,
    }

    fn fixture(batch_size: usize, limit_size: usize) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let reporter = Arc::new(BulkOperationReporter::new("self"));
        let table_key = TableKey::new(&TableNameProvider::default(), &ColumnFamily::MAP_STATISTICS_SELF_COUNTER);
        let writer = DefaultBulkWriter::new(
            table_key,
            Arc::new(RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid")),
            store.clone(),
            Arc::new(SizeLimitedBulkIncrementer::new(
                DefaultBulkIncrementer::new(),
                Arc::clone(&reporter),
                limit_size,
            )),
            Arc::new(DefaultBulkUpdater::new()),
            Arc::clone(&reporter),
            batch_size,
        );
        Fixture {
            store,
            reporter,
            writer,
            table: table_key.table,
        }
    }

    fn row_key(slot: i64) -> CallRowKey {
        CallRowKey::new("order-api", 1010, slot).expect("valid")
    }

    fn column(agent: &str) -> ResponseColumnName {
        ResponseColumnName {
            slot: 1000,
            agent_id: agent.to_string(),
        }
    }

    #[tokio::test]
    async fn test_flush_merges_rows_into_batches() {
        let f = fixture(2, 100);
        for slot in 0..3 {
            f.writer.increment(&row_key(slot * 60_000), &column("a1")).await;
            f.writer.increment_by(&row_key(slot * 60_000), &column("a2"), 4).await;
        }
        assert_eq!(f.writer.pending_increments(), 6);

        f.writer.flush_link().await;
        // three rows in batches of two
        assert_eq!(f.store.requests(), 2);
        assert_eq!(f.store.applied_increments(), 3);
        assert_eq!(f.store.row_count(f.table), 3);
        assert_eq!(f.reporter.flush_all_count(), 3);
        assert_eq!(f.writer.pending_increments(), 0);

        f.writer.flush_link().await;
        assert_eq!(f.store.requests(), 2);
    }

    #[tokio::test]
    async fn test_failed_flush_is_retried() {
        let f = fixture(1000, 100);
        f.writer.increment_by(&row_key(0), &column("a1"), 3).await;
        f.store.fail_next(1);

        f.writer.flush_link().await;
        assert_eq!(f.store.row_count(f.table), 0);
        assert_eq!(f.reporter.flush_failure_count(), 1);
        assert_eq!(f.writer.pending_increments(), 1);

        f.writer.increment(&row_key(0), &column("a1")).await;
        f.writer.flush_link().await;
        let distributor = RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid");
        let row = f
            .store
            .get(f.table, &distributor.distributed_key(&row_key(0).row_key(0)))
            .await
            .expect("store")
            .expect("row written");
        assert_eq!(row.cells.len(), 1);
        assert_eq!(row.cells[0].value_as_i64(), Some(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_outage_keeps_pending_cells_bounded() {
        let f = fixture(1000, 10);
        f.store.set_latency(Some(Duration::from_millis(20)));
        f.store.fail_next(u64::MAX);

        let mut slot = 0;
        for _ in 0..10 {
            f.writer.increment(&row_key(slot), &column("a1")).await;
            slot += 60_000;
        }
        for _ in 0..5 {
            let fresh = async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                for i in 0..10 {
                    f.writer
                        .increment(&row_key(slot + i * 60_000), &column("a1"))
                        .await;
                }
            };
            tokio::join!(f.writer.flush_link(), fresh);
            slot += 10 * 60_000;
            assert!(f.writer.pending_increments() <= 10);
        }

        // failed cells give way to those admitted while the request was in flight
        assert_eq!(f.writer.pending_increments(), 10);
        assert_eq!(f.reporter.restore_reject_count(), 50);
        assert_eq!(f.reporter.flush_failure_count(), 50);
        assert_eq!(f.store.row_count(f.table), 0);
    }

    #[tokio::test]
    async fn test_flush_avg_max() {
        let f = fixture(1000, 100);
        f.writer.update_max(&row_key(0), &column("a1"), 40).await;
        f.writer.update_max(&row_key(0), &column("a1"), 90).await;
        f.writer.update_max(&row_key(0), &column("a1"), 10).await;
        assert_eq!(f.writer.pending_max_updates(), 1);

        f.writer.flush_avg_max().await;
        assert_eq!(f.writer.pending_max_updates(), 0);
        let distributor = RowKeyDistributorByHashPrefix::with_buckets(16).expect("valid");
        let row = f
            .store
            .get(f.table, &distributor.distributed_key(&row_key(0).row_key(0)))
            .await
            .expect("store")
            .expect("row written");
        assert_eq!(row.cells[0].value_as_i64(), Some(90));
        assert!(f.reporter.last_flush_time() > 0);
    }

    #[tokio::test]
    async fn test_failed_max_update_is_retried() {
        let f = fixture(1000, 100);
        f.writer.update_max(&row_key(0), &column("a1"), 40).await;
        f.store.fail_next(1);
        f.writer.flush_avg_max().await;
        assert_eq!(f.writer.pending_max_updates(), 1);
        f.writer.flush_avg_max().await;
        assert_eq!(f.writer.pending_max_updates(), 0);
        assert_eq!(f.store.row_count(f.table), 1);
    }
}
