// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use super::writer::BulkWriter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Periodically drains every registered writer.
pub struct BulkFlusher {
    writers: Vec<Arc<dyn BulkWriter>>,
    flush_interval: Duration,
}

impl BulkFlusher {
    pub fn new(writers: Vec<Arc<dyn BulkWriter>>, flush_interval: Duration) -> Self {
        Self {
            writers,
            flush_interval,
        }
    }

    pub async fn flush_all(&self) {
        for writer in &self.writers {
            writer.flush_link().await;
            writer.flush_avg_max().await;
        }
    }

    /// Flushes on every tick until `cancel_token` fires, then flushes once more.
    pub async fn run(self, cancel_token: CancellationToken) {
        let mut flush_interval = interval(self.flush_interval);
        flush_interval.tick().await; // discard first tick, which is instantaneous

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    debug!("bulk flusher stopping, flushing remaining data");
                    self.flush_all().await;
                    break;
                }
                _ = flush_interval.tick() => {
                    self.flush_all().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pinpoint_common::statistics::{ColumnName, RowKey};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingWriter {
        links: AtomicUsize,
        max_values: AtomicUsize,
    }

    #[async_trait]
    impl BulkWriter for CountingWriter {
        fn name(&self) -> &str {
            "counting"
        }

        async fn increment_by(&self, _: &dyn RowKey, _: &dyn ColumnName, _: i64) {}

        async fn update_max(&self, _: &dyn RowKey, _: &dyn ColumnName, _: i64) {}

        async fn flush_link(&self) {
            self.links.fetch_add(1, Ordering::SeqCst);
        }

        async fn flush_avg_max(&self) {
            self.max_values.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_on_interval_and_on_shutdown() {
        let writer = Arc::new(CountingWriter::default());
        let flusher = BulkFlusher::new(vec![writer.clone() as Arc<dyn BulkWriter>], Duration::from_millis(1000));
        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(flusher.run(cancel_token.clone()));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(writer.links.load(Ordering::SeqCst), 3);

        cancel_token.cancel();
        handle.await.expect("flusher task");
        assert_eq!(writer.links.load(Ordering::SeqCst), 4);
        assert_eq!(writer.max_values.load(Ordering::SeqCst), 4);
    }
}
