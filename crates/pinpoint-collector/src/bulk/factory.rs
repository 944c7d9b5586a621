// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::incrementer::{BulkIncrementer, DefaultBulkIncrementer, SizeLimitedBulkIncrementer};
use super::reporter::{BulkOperationReporter, BulkOperationReporterFactory};
use super::sync_writer::SyncWriter;
use super::updater::{BulkUpdater, DefaultBulkUpdater, SizeLimitedBulkUpdater};
use super::writer::{BulkWriter, DefaultBulkWriter};
use super::TableKey;
use crate::config::BulkProperties;
use pinpoint_common::distributor::RowKeyDistributorByHashPrefix;
use pinpoint_common::store::Store;
use pinpoint_common::table::{ColumnFamily, TableNameProvider};
use std::sync::Arc;
use tracing::debug;

/// Builds the statistics writers from the bulk configuration.
pub struct BulkFactory {
    properties: BulkProperties,
    distributor: Arc<RowKeyDistributorByHashPrefix>,
    table_names: Arc<TableNameProvider>,
    store: Arc<dyn Store>,
    reporters: Arc<BulkOperationReporterFactory>,
}

impl BulkFactory {
    pub fn new(
        properties: BulkProperties,
        distributor: Arc<RowKeyDistributorByHashPrefix>,
        table_names: Arc<TableNameProvider>,
        store: Arc<dyn Store>,
        reporters: Arc<BulkOperationReporterFactory>,
    ) -> Self {
        Self {
            properties,
            distributor,
            table_names,
            store,
            reporters,
        }
    }

    pub fn reporters(&self) -> &Arc<BulkOperationReporterFactory> {
        &self.reporters
    }

    pub fn new_bulk_incrementer(
        &self,
        reporter: Arc<BulkOperationReporter>,
        limit_size: usize,
    ) -> Arc<dyn BulkIncrementer> {
        Arc::new(SizeLimitedBulkIncrementer::new(
            DefaultBulkIncrementer::new(),
            reporter,
            limit_size,
        ))
    }

    pub fn new_bulk_updater(&self, reporter: Arc<BulkOperationReporter>) -> Arc<dyn BulkUpdater> {
        Arc::new(SizeLimitedBulkUpdater::new(
            DefaultBulkUpdater::new(),
            reporter,
            self.properties.callee_limit_size,
        ))
    }

    /// A [`DefaultBulkWriter`] when batching is enabled, else a [`SyncWriter`].
    pub fn new_bulk_writer(
        &self,
        name: &str,
        column_family: &ColumnFamily,
        limit_size: usize,
    ) -> Arc<dyn BulkWriter> {
        let reporter = self.reporters.get_reporter(name);
        let table_key = TableKey::new(&self.table_names, column_family);
        if !self.properties.enable {
            debug!("{name}: bulk disabled, writing {} synchronously", table_key.table);
            return Arc::new(SyncWriter::new(
                table_key,
                Arc::clone(&self.distributor),
                Arc::clone(&self.store),
                reporter,
            ));
        }
        debug!(
            "{name}: bulk writer for {} with limit size {limit_size}",
            table_key.table
        );
        Arc::new(DefaultBulkWriter::new(
            table_key,
            Arc::clone(&self.distributor),
            Arc::clone(&self.store),
            self.new_bulk_incrementer(Arc::clone(&reporter), limit_size),
            self.new_bulk_updater(Arc::clone(&reporter)),
            reporter,
            self.properties.batch_size,
        ))
    }
}
