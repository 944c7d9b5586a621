// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wide-column store interface shared by the collector write path and the web read path.
//!
//! Rows are sorted byte keys holding `(family, qualifier) -> value` cells. Counter cells hold an
//! `i64` in big-endian order and are only mutated through [`Store::increment`],
//! [`Store::batch_increment`] and [`Store::max_column_value`].

use crate::errors::StoreError;
use crate::table::TableName;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub value: Vec<u8>,
}

impl Cell {
    /// Reads a counter cell. Values that are not 8 bytes wide read as `None`.
    pub fn value_as_i64(&self) -> Option<i64> {
        let bytes: [u8; 8] = self.value.as_slice().try_into().ok()?;
        Some(i64::from_be_bytes(bytes))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub key: Vec<u8>,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub row: Vec<u8>,
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub value: Vec<u8>,
}

/// Atomic multi-column increment of one row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    pub row: Vec<u8>,
    pub family: Vec<u8>,
    pub columns: Vec<(Vec<u8>, i64)>,
}

impl Increment {
    pub fn new(row: Vec<u8>, family: Vec<u8>) -> Self {
        Self {
            row,
            family,
            columns: Vec::new(),
        }
    }

    pub fn add_column(&mut self, qualifier: Vec<u8>, amount: i64) {
        self.columns.push((qualifier, amount));
    }
}

/// Sets a counter cell to `max(current, value)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckAndMax {
    pub row: Vec<u8>,
    pub family: Vec<u8>,
    pub qualifier: Vec<u8>,
    pub value: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn put(&self, table: TableName, put: Put) -> Result<(), StoreError>;

    async fn get(&self, table: TableName, row: &[u8]) -> Result<Option<Row>, StoreError>;

    /// Rows with `start <= key < stop`, in key order.
    async fn scan(&self, table: TableName, start: &[u8], stop: &[u8])
        -> Result<Vec<Row>, StoreError>;

    async fn increment(&self, table: TableName, increment: Increment) -> Result<(), StoreError>;

    /// One request applying every increment of the batch.
    async fn batch_increment(
        &self,
        table: TableName,
        increments: Vec<Increment>,
    ) -> Result<(), StoreError>;

    async fn max_column_value(
        &self,
        table: TableName,
        check_and_max: CheckAndMax,
    ) -> Result<(), StoreError>;
}

type CellMap = BTreeMap<(Vec<u8>, Vec<u8>), Vec<u8>>;
type TableData = BTreeMap<Vec<u8>, CellMap>;

/// Process-local [`Store`]. Used by the standalone collector and by tests.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<TableName, TableData>>,
    requests: AtomicU64,
    applied_increments: AtomicU64,
    pending_failures: AtomicU64,
    latency: Mutex<Option<Duration>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating requests received, successful or not.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Number of single-row increments applied.
    pub fn applied_increments(&self) -> u64 {
        self.applied_increments.load(Ordering::Relaxed)
    }

    /// Makes the next `count` mutating requests fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: u64) {
        self.pending_failures.store(count, Ordering::Relaxed);
    }

    /// Delays every mutating request by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut guard) = self.latency.lock() {
            *guard = latency;
        }
    }

    pub fn row_count(&self, table: TableName) -> usize {
        self.tables
            .read()
            .map(|tables| tables.get(&table).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    async fn begin_mutation(&self) -> Result<(), StoreError> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let latency = self.latency.lock().ok().and_then(|guard| *guard);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let failed = self
            .pending_failures
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn with_table<R>(
        &self,
        table: TableName,
        f: impl FnOnce(&mut TableData) -> R,
    ) -> Result<R, StoreError> {
        let mut tables = self
            .tables
            .write()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        Ok(f(tables.entry(table).or_default()))
    }

    fn apply_increment(data: &mut TableData, increment: Increment) {
        let cells = data.entry(increment.row).or_default();
        for (qualifier, amount) in increment.columns {
            let value = cells
                .entry((increment.family.clone(), qualifier))
                .or_insert_with(|| 0i64.to_be_bytes().to_vec());
            let current = <[u8; 8]>::try_from(value.as_slice()).map_or(0, i64::from_be_bytes);
            *value = current.wrapping_add(amount).to_be_bytes().to_vec();
        }
    }

    fn to_row(key: &[u8], cells: &CellMap) -> Row {
        Row {
            key: key.to_vec(),
            cells: cells
                .iter()
                .map(|((family, qualifier), value)| Cell {
                    family: family.clone(),
                    qualifier: qualifier.clone(),
                    value: value.clone(),
                })
                .collect(),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn put(&self, table: TableName, put: Put) -> Result<(), StoreError> {
        self.begin_mutation().await?;
        self.with_table(table, |data| {
            data.entry(put.row)
                .or_default()
                .insert((put.family, put.qualifier), put.value);
        })
    }

    async fn get(&self, table: TableName, row: &[u8]) -> Result<Option<Row>, StoreError> {
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        Ok(tables
            .get(&table)
            .and_then(|data| data.get(row))
            .map(|cells| Self::to_row(row, cells)))
    }

    async fn scan(
        &self,
        table: TableName,
        start: &[u8],
        stop: &[u8],
    ) -> Result<Vec<Row>, StoreError> {
        if start > stop {
            return Err(StoreError::InvalidRequest(format!(
                "scan start {start:?} is after stop {stop:?}"
            )));
        }
        let tables = self
            .tables
            .read()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))?;
        let Some(data) = tables.get(&table) else {
            return Ok(Vec::new());
        };
        Ok(data
            .range(start.to_vec()..stop.to_vec())
            .map(|(key, cells)| Self::to_row(key, cells))
            .collect())
    }

    async fn increment(&self, table: TableName, increment: Increment) -> Result<(), StoreError> {
        self.batch_increment(table, vec![increment]).await
    }

    async fn batch_increment(
        &self,
        table: TableName,
        increments: Vec<Increment>,
    ) -> Result<(), StoreError> {
        self.begin_mutation().await?;
        let count = increments.len() as u64;
        self.with_table(table, |data| {
            for increment in increments {
                Self::apply_increment(data, increment);
            }
        })?;
        self.applied_increments.fetch_add(count, Ordering::Relaxed);
        debug!("applied {count} increments to {table}");
        Ok(())
    }

    async fn max_column_value(
        &self,
        table: TableName,
        check_and_max: CheckAndMax,
    ) -> Result<(), StoreError> {
        self.begin_mutation().await?;
        self.with_table(table, |data| {
            let cells = data.entry(check_and_max.row).or_default();
            let value = cells
                .entry((check_and_max.family, check_and_max.qualifier))
                .or_insert_with(|| i64::MIN.to_be_bytes().to_vec());
            let current =
                <[u8; 8]>::try_from(value.as_slice()).map_or(i64::MIN, i64::from_be_bytes);
            if check_and_max.value > current {
                *value = check_and_max.value.to_be_bytes().to_vec();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> TableName {
        TableName::new("test", "Counters")
    }

    fn increment(row: &[u8], qualifier: &[u8], amount: i64) -> Increment {
        let mut increment = Increment::new(row.to_vec(), b"C".to_vec());
        increment.add_column(qualifier.to_vec(), amount);
        increment
    }

    #[tokio::test]
    async fn test_increment_accumulates() {
        let store = InMemoryStore::new();
        store
            .batch_increment(
                table(),
                vec![increment(b"r1", b"q", 2), increment(b"r1", b"q", 3)],
            )
            .await
            .expect("increment");
        store
            .increment(table(), increment(b"r1", b"q", -1))
            .await
            .expect("increment");

        let row = store.get(table(), b"r1").await.expect("get").expect("row");
        assert_eq!(row.cells[0].value_as_i64(), Some(4));
        assert_eq!(store.requests(), 2);
        assert_eq!(store.applied_increments(), 3);
    }

    #[tokio::test]
    async fn test_max_column_value() {
        let store = InMemoryStore::new();
        for value in [5, 9, 2] {
            store
                .max_column_value(
                    table(),
                    CheckAndMax {
                        row: b"r".to_vec(),
                        family: b"C".to_vec(),
                        qualifier: b"max".to_vec(),
                        value,
                    },
                )
                .await
                .expect("max");
        }
        let row = store.get(table(), b"r").await.expect("get").expect("row");
        assert_eq!(row.cells[0].value_as_i64(), Some(9));
    }

    #[tokio::test]
    async fn test_scan_is_half_open_and_sorted() {
        let store = InMemoryStore::new();
        for key in [b"c", b"a", b"b", b"d"] {
            store
                .increment(table(), increment(key, b"q", 1))
                .await
                .expect("increment");
        }
        let rows = store.scan(table(), b"a", b"c").await.expect("scan");
        let keys: Vec<_> = rows.into_iter().map(|row| row.key).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec()]);

        assert!(matches!(
            store.scan(table(), b"z", b"a").await,
            Err(StoreError::InvalidRequest(_))
        ));
        assert!(store
            .scan(TableName::new("test", "Missing"), b"a", b"z")
            .await
            .expect("scan")
            .is_empty());
    }

    #[tokio::test]
    async fn test_injected_failures() {
        let store = InMemoryStore::new();
        store.fail_next(1);
        assert!(store
            .increment(table(), increment(b"r", b"q", 1))
            .await
            .is_err());
        assert!(store
            .increment(table(), increment(b"r", b"q", 1))
            .await
            .is_ok());
        assert_eq!(store.row_count(table()), 1);
    }
}
