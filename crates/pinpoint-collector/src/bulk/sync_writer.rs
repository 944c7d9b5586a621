// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::reporter::BulkOperationReporter;
use super::writer::BulkWriter;
use super::TableKey;
use async_trait::async_trait;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::errors::StoreError;
use pinpoint_common::statistics::{ColumnName, RowKey};
use pinpoint_common::store::{CheckAndMax, Increment, Store};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

pub const DEFAULT_SYNC_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwaitOutcome<T> {
    Completed(T),
    /// The task panicked or was aborted.
    Failed(String),
    /// The deadline passed. The task keeps running detached.
    TimedOut,
}

/// Runs `future` on its own task and waits at most `timeout` for it.
///
/// On timeout the task is abandoned, not cancelled: dropping a `JoinHandle` detaches it, so
/// work already handed to the store still completes.
pub async fn await_bounded<F, T>(future: F, timeout: Duration) -> AwaitOutcome<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(future);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(value)) => AwaitOutcome::Completed(value),
        Ok(Err(e)) => AwaitOutcome::Failed(e.to_string()),
        Err(_) => AwaitOutcome::TimedOut,
    }
}

/// Writes every mutation immediately. Used when batching is disabled.
pub struct SyncWriter {
    table_key: TableKey,
    distributor: Arc<RowKeyDistributorByHashPrefix>,
    store: Arc<dyn Store>,
    reporter: Arc<BulkOperationReporter>,
    timeout: Duration,
}

impl SyncWriter {
    pub fn new(
        table_key: TableKey,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        store: Arc<dyn Store>,
        reporter: Arc<BulkOperationReporter>,
    ) -> Self {
        Self {
            table_key,
            distributor,
            store,
            reporter,
            timeout: DEFAULT_SYNC_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn salted_row(&self, row_key: &dyn RowKey) -> Option<Vec<u8>> {
        let mut row = row_key.row_key(self.distributor.salt_size());
        match self.distributor.write_salt_key(&mut row) {
            Ok(()) => Some(row),
            Err(e) => {
                warn!("{}: dropping mutation with invalid row key: {}", self.name(), e);
                None
            }
        }
    }

    async fn await_store<F>(&self, request: F, operation: &str)
    where
        F: Future<Output = Result<(), StoreError>> + Send + 'static,
    {
        match await_bounded(request, self.timeout).await {
            AwaitOutcome::Completed(Ok(())) => {}
            AwaitOutcome::Completed(Err(e)) => {
                warn!("{}: {} failed: {}", self.name(), operation, e);
            }
            AwaitOutcome::Failed(e) => {
                error!("{}: {} task failed: {}", self.name(), operation, e);
            }
            AwaitOutcome::TimedOut => {
                self.reporter.reporting_sync_timeout();
                warn!(
                    "{}: {} did not complete within {:?}, abandoning",
                    self.name(),
                    operation,
                    self.timeout
                );
            }
        }
    }
}

#[async_trait]
impl BulkWriter for SyncWriter {
    fn name(&self) -> &str {
        self.reporter.name()
    }

    async fn increment_by(&self, row_key: &dyn RowKey, column_name: &dyn ColumnName, addition: i64) {
        let Some(row) = self.salted_row(row_key) else {
            return;
        };
        let mut increment = Increment::new(row, self.table_key.family.to_vec());
        increment.add_column(column_name.column_name(), addition);

        let store = Arc::clone(&self.store);
        let table = self.table_key.table;
        self.await_store(
            async move { store.increment(table, increment).await },
            "increment",
        )
        .await;
    }

    async fn update_max(&self, row_key: &dyn RowKey, column_name: &dyn ColumnName, value: i64) {
        let Some(row) = self.salted_row(row_key) else {
            return;
        };
        let update = CheckAndMax {
            row,
            family: self.table_key.family.to_vec(),
            qualifier: column_name.column_name(),
            value,
        };

        let store = Arc::clone(&self.store);
        let table = self.table_key.table;
        self.await_store(
            async move { store.max_column_value(table, update).await },
            "max update",
        )
        .await;
    }

    async fn flush_link(&self) {}

    async fn flush_avg_max(&self) {}
}
