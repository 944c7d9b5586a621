// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::binder::{BindAttribute, SpanBinder};
use crate::codec::Frame;
use crate::errors::HandlerError;
use crate::message::PAgentHandshake;
use crate::metadata_service::MetadataService;
use crate::span_store::SpanStore;
use crate::statistics::StatisticsService;
use pinpoint_common::id::validate_id;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Validates the identity an agent announces when it opens a stream.
pub fn bind_handshake(
    handshake: &PAgentHandshake,
    accepted_time: i64,
) -> Result<BindAttribute, HandlerError> {
    if !validate_id(&handshake.agent_id) {
        return Err(HandlerError::InvalidHandshake(format!(
            "invalid agent id '{}'",
            handshake.agent_id
        )));
    }
    if !validate_id(&handshake.application_name) {
        return Err(HandlerError::InvalidHandshake(format!(
            "invalid application name '{}'",
            handshake.application_name
        )));
    }
    let mut attr = BindAttribute::new(
        &handshake.agent_id,
        &handshake.application_name,
        handshake.agent_start_time,
        accepted_time,
    );
    attr.agent_name = (!handshake.agent_name.is_empty()).then(|| handshake.agent_name.clone());
    Ok(attr)
}

/// Routes bound data frames to the span store, the statistics writers and the metadata tables.
pub struct SpanHandler {
    binder: SpanBinder,
    span_store: Arc<dyn SpanStore>,
    statistics: Arc<StatisticsService>,
    metadata: Arc<MetadataService>,
    accepted: AtomicU64,
    rejected: AtomicU64,
}

impl SpanHandler {
    pub fn new(
        span_store: Arc<dyn SpanStore>,
        statistics: Arc<StatisticsService>,
        metadata: Arc<MetadataService>,
    ) -> Self {
        Self {
            binder: SpanBinder::new(),
            span_store,
            statistics,
            metadata,
            accepted: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Handles one data frame. A rejected frame is logged and counted; the stream goes on.
    pub async fn handle(&self, frame: Frame, attr: &BindAttribute) -> Result<(), HandlerError> {
        let kind = frame.name();
        match self.dispatch(frame, attr).await {
            Ok(()) => {
                self.accepted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "rejected {} from {}/{}: {}",
                    kind, attr.application_name, attr.agent_id, e
                );
                Err(e)
            }
        }
    }

    async fn dispatch(&self, frame: Frame, attr: &BindAttribute) -> Result<(), HandlerError> {
        match frame {
            Frame::Handshake(_) => Err(HandlerError::InvalidHandshake(
                "handshake already completed".to_string(),
            )),
            Frame::Span(message) => {
                let span = self.binder.bind_span(&message, attr)?;
                self.statistics.record_span(&span).await;
                debug!("span {} of {}", span.span_id, span.transaction_id);
                self.span_store.insert_span(span).await?;
                Ok(())
            }
            Frame::SpanChunk(message) => {
                let chunk = self.binder.bind_span_chunk(&message, attr)?;
                self.statistics
                    .record_events(
                        &chunk.application_name,
                        chunk.application_service_type,
                        &chunk.agent_id,
                        &chunk.span_events,
                        attr.accepted_time,
                    )
                    .await;
                self.span_store.insert_span_chunk(chunk).await?;
                Ok(())
            }
            Frame::ApiMetaData(message) => {
                let metadata = self.binder.bind_api_metadata(&message, attr);
                self.metadata.insert_api_metadata(&metadata).await
            }
            Frame::StringMetaData(message) => {
                let metadata = self.binder.bind_string_metadata(&message, attr);
                self.metadata.insert_string_metadata(&metadata).await
            }
            Frame::SqlMetaData(message) => {
                let metadata = self.binder.bind_sql_metadata(&message, attr);
                self.metadata.insert_sql_metadata(&metadata).await
            }
        }
    }
}
