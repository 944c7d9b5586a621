// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

/// Counters witnessing the bulk write path of one writer. Every dropped mutation lands here.
#[derive(Debug, Default)]
pub struct BulkOperationReporter {
    name: String,
    flush_all: AtomicU64,
    increment_reject: AtomicU64,
    recent_reject: AtomicU64,
    flush_failure: AtomicU64,
    restore_reject: AtomicU64,
    sync_timeout: AtomicU64,
    last_flush_time: AtomicI64,
}

impl BulkOperationReporter {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Records a completed flush of `count` store mutations.
    pub fn reporting_flush_all(&self, count: u64) {
        self.flush_all.fetch_add(count, Ordering::Relaxed);
        self.last_flush_time.store(now_millis(), Ordering::Relaxed);
    }

    pub fn reporting_increment_reject(&self) {
        self.increment_reject.fetch_add(1, Ordering::Relaxed);
        self.recent_reject.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reporting_flush_failure(&self, count: u64) {
        self.flush_failure.fetch_add(count, Ordering::Relaxed);
    }

    /// Records failed cells that could not be put back because the pending set was full.
    pub fn reporting_restore_reject(&self, count: u64) {
        self.restore_reject.fetch_add(count, Ordering::Relaxed);
    }

    pub fn reporting_sync_timeout(&self) {
        self.sync_timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub fn flush_all_count(&self) -> u64 {
        self.flush_all.load(Ordering::Relaxed)
    }

    pub fn increment_reject_count(&self) -> u64 {
        self.increment_reject.load(Ordering::Relaxed)
    }

    /// Rejections since the previous call.
    pub fn take_recent_rejects(&self) -> u64 {
        self.recent_reject.swap(0, Ordering::Relaxed)
    }

    pub fn flush_failure_count(&self) -> u64 {
        self.flush_failure.load(Ordering::Relaxed)
    }

    pub fn restore_reject_count(&self) -> u64 {
        self.restore_reject.load(Ordering::Relaxed)
    }

    pub fn sync_timeout_count(&self) -> u64 {
        self.sync_timeout.load(Ordering::Relaxed)
    }

    /// Epoch millis of the last flush, `0` before the first one.
    pub fn last_flush_time(&self) -> i64 {
        self.last_flush_time.load(Ordering::Relaxed)
    }
}

/// Process-wide registry handing out one reporter per writer name.
#[derive(Debug, Default)]
pub struct BulkOperationReporterFactory {
    reporters: DashMap<String, Arc<BulkOperationReporter>>,
}

impl BulkOperationReporterFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_reporter(&self, name: &str) -> Arc<BulkOperationReporter> {
        if let Some(reporter) = self.reporters.get(name) {
            return Arc::clone(&reporter);
        }
        let reporter = self
            .reporters
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(BulkOperationReporter::new(name)));
        Arc::clone(&reporter)
    }

    pub fn reporters(&self) -> Vec<Arc<BulkOperationReporter>> {
        let mut reporters: Vec<_> = self
            .reporters
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        reporters.sort_by(|a, b| a.name().cmp(b.name()));
        reporters
    }
}
