// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use dashmap::DashMap;
use pinpoint_common::errors::StoreError;
use pinpoint_common::id::TransactionId;
use pinpoint_common::span::{Span, SpanChunk};
use tracing::debug;

/// Raw trace storage. Chunks are kept apart from their span and merged at read.
#[async_trait]
pub trait SpanStore: Send + Sync {
    async fn insert_span(&self, span: Span) -> Result<(), StoreError>;

    async fn insert_span_chunk(&self, chunk: SpanChunk) -> Result<(), StoreError>;

    /// Spans of a transaction ordered by start time, each carrying the events of its chunks.
    async fn select_trace(&self, transaction_id: &TransactionId) -> Result<Vec<Span>, StoreError>;
}

#[derive(Debug, Default)]
struct Trace {
    spans: Vec<Span>,
    chunks: Vec<SpanChunk>,
}

#[derive(Debug, Default)]
pub struct InMemorySpanStore {
    traces: DashMap<TransactionId, Trace>,
}

impl InMemorySpanStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trace_count(&self) -> usize {
        self.traces.len()
    }
}

#[async_trait]
impl SpanStore for InMemorySpanStore {
    async fn insert_span(&self, span: Span) -> Result<(), StoreError> {
        self.traces
            .entry(span.transaction_id.clone())
            .or_default()
            .spans
            .push(span);
        Ok(())
    }

    async fn insert_span_chunk(&self, chunk: SpanChunk) -> Result<(), StoreError> {
        self.traces
            .entry(chunk.transaction_id.clone())
            .or_default()
            .chunks
            .push(chunk);
        Ok(())
    }

    async fn select_trace(&self, transaction_id: &TransactionId) -> Result<Vec<Span>, StoreError> {
        let Some(trace) = self.traces.get(transaction_id) else {
            return Ok(Vec::new());
        };
        let mut spans = trace.spans.clone();
        for chunk in &trace.chunks {
            match spans.iter_mut().find(|span| span.span_id == chunk.span_id) {
                Some(span) => span.span_events.extend(chunk.span_events.iter().cloned()),
                None => debug!(
                    "chunk of span {} in {} has no span yet",
                    chunk.span_id, transaction_id
                ),
            }
        }
        for span in &mut spans {
            span.span_events.sort_by_key(|event| event.sequence);
        }
        spans.sort_by_key(|span| span.start_time);
        Ok(spans)
    }
}
