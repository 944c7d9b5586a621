// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bulk write path for the application-map statistics tables.
//!
//! Counter and max mutations accumulate in striped in-memory maps of atomic cells and are
//! drained by a periodic flush. Draining is snapshot-then-reset per cell: a flush swaps each
//! accumulator with zero and only removes cells that are still zero afterwards, so increments
//! that race with a flush land in the next one.

pub mod factory;
pub mod flusher;
pub mod incrementer;
pub mod merge;
pub mod reporter;
pub mod sync_writer;
pub mod updater;
pub mod writer;

use pinpoint_common::table::{ColumnFamily, TableName, TableNameProvider};

pub use factory::BulkFactory;
pub use flusher::BulkFlusher;
pub use incrementer::{BulkIncrementer, DefaultBulkIncrementer, SizeLimitedBulkIncrementer};
pub use merge::RowKeyMerge;
pub use reporter::{BulkOperationReporter, BulkOperationReporterFactory};
pub use sync_writer::{await_bounded, AwaitOutcome, SyncWriter};
pub use updater::{BulkUpdater, DefaultBulkUpdater, SizeLimitedBulkUpdater};
pub use writer::{BulkWriter, DefaultBulkWriter};

/// Destination of a writer: one table and one column family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableKey {
    pub table: TableName,
    pub family: &'static [u8],
}

impl TableKey {
    pub fn new(table_names: &TableNameProvider, column_family: &ColumnFamily) -> Self {
        Self {
            table: table_names.table_name(column_family),
            family: column_family.family,
        }
    }
}

/// One pending cell. `row_key` is unsalted; salting happens when the flush builds requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RowInfo {
    pub table_key: TableKey,
    pub row_key: Vec<u8>,
    pub column_name: Vec<u8>,
}

impl RowInfo {
    pub fn new(table_key: TableKey, row_key: Vec<u8>, column_name: Vec<u8>) -> Self {
        Self {
            table_key,
            row_key,
            column_name,
        }
    }
}
