// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Derives application-map statistics from bound spans.

use crate::bulk::BulkWriter;
use pinpoint_common::errors::RowError;
use pinpoint_common::histogram::SlotType;
use pinpoint_common::service_type::ServiceType;
use pinpoint_common::span::{Span, SpanEvent};
use pinpoint_common::statistics::{
    time_slot, CallRowKey, CalleeColumnName, CallerColumnName, ColumnName, ResponseColumnName,
};
use std::sync::Arc;
use tracing::warn;

/// One observed call between two applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallStat<'a> {
    pub caller_application_name: &'a str,
    pub caller_service_type: ServiceType,
    pub caller_agent_id: &'a str,
    pub callee_application_name: &'a str,
    pub callee_service_type: ServiceType,
    pub callee_host: &'a str,
    pub elapsed: i32,
    pub error: bool,
    pub timestamp: i64,
}

/// Writes the three statistics tables: outbound links (caller), inbound links (callee) and
/// per-agent response times (self).
pub struct StatisticsService {
    caller: Arc<dyn BulkWriter>,
    callee: Arc<dyn BulkWriter>,
    response: Arc<dyn BulkWriter>,
}

impl StatisticsService {
    pub fn new(
        caller: Arc<dyn BulkWriter>,
        callee: Arc<dyn BulkWriter>,
        response: Arc<dyn BulkWriter>,
    ) -> Self {
        Self {
            caller,
            callee,
            response,
        }
    }

    pub fn writers(&self) -> Vec<Arc<dyn BulkWriter>> {
        vec![
            Arc::clone(&self.caller),
            Arc::clone(&self.callee),
            Arc::clone(&self.response),
        ]
    }

    /// Records the outbound half of a call on the caller's row.
    pub async fn update_caller(&self, stat: &CallStat<'_>) -> Result<(), RowError> {
        let row_key = CallRowKey::new(
            stat.caller_application_name,
            stat.caller_service_type.code(),
            time_slot(stat.timestamp),
        )?;
        let schema = stat.callee_service_type.histogram_schema();
        let column = |slot: SlotType| CalleeColumnName {
            callee_service_type: stat.callee_service_type.code(),
            callee_application_name: stat.callee_application_name.to_string(),
            callee_host: stat.callee_host.to_string(),
            slot: schema.slot_code(slot),
            caller_agent_id: stat.caller_agent_id.to_string(),
        };
        let slot = schema.find_slot(stat.elapsed, stat.error);
        record(
            self.caller.as_ref(),
            &row_key,
            &column(slot),
            &column(SlotType::Sum),
            &column(SlotType::Max),
            stat.elapsed,
        )
        .await;
        Ok(())
    }

    /// Records the inbound half of a call on the callee's row.
    pub async fn update_callee(&self, stat: &CallStat<'_>) -> Result<(), RowError> {
        let row_key = CallRowKey::new(
            stat.callee_application_name,
            stat.callee_service_type.code(),
            time_slot(stat.timestamp),
        )?;
        let schema = stat.callee_service_type.histogram_schema();
        let column = |slot: SlotType| CallerColumnName {
            caller_service_type: stat.caller_service_type.code(),
            caller_application_name: stat.caller_application_name.to_string(),
            callee_host: stat.callee_host.to_string(),
            slot: schema.slot_code(slot),
        };
        let slot = schema.find_slot(stat.elapsed, stat.error);
        record(
            self.callee.as_ref(),
            &row_key,
            &column(slot),
            &column(SlotType::Sum),
            &column(SlotType::Max),
            stat.elapsed,
        )
        .await;
        Ok(())
    }

    pub async fn update_response_time(
        &self,
        application_name: &str,
        service_type: ServiceType,
        agent_id: &str,
        elapsed: i32,
        error: bool,
        timestamp: i64,
    ) -> Result<(), RowError> {
        let row_key = CallRowKey::new(application_name, service_type.code(), time_slot(timestamp))?;
        let schema = service_type.histogram_schema();
        let column = |slot: SlotType| ResponseColumnName {
            slot: schema.slot_code(slot),
            agent_id: agent_id.to_string(),
        };
        record(
            self.response.as_ref(),
            &row_key,
            &column(schema.find_slot(elapsed, error)),
            &column(SlotType::Sum),
            &column(SlotType::Max),
            elapsed,
        )
        .await;
        Ok(())
    }

    /// Every statistic a span carries: its response time, the inbound link from its parent
    /// (or from the user for root spans) and the outbound links of its events.
    pub async fn record_span(&self, span: &Span) {
        let timestamp = span.collector_accept_time;
        let application_type = span.application_service_type;
        let error = span.has_error();

        if let Err(e) = self
            .update_response_time(
                &span.application_name,
                application_type,
                &span.agent_id,
                span.elapsed,
                error,
                timestamp,
            )
            .await
        {
            warn!("skipping response time of {}: {}", span.transaction_id, e);
        }

        let (caller_name, caller_type, callee_host) = match &span.parent_application_name {
            Some(parent) => (
                parent.as_str(),
                span.parent_application_type.unwrap_or(ServiceType::UNKNOWN),
                span.acceptor_host.as_deref().unwrap_or(&span.agent_id),
            ),
            None => (
                span.application_name.as_str(),
                ServiceType::USER,
                span.agent_id.as_str(),
            ),
        };
        let inbound = CallStat {
            caller_application_name: caller_name,
            caller_service_type: caller_type,
            caller_agent_id: caller_name,
            callee_application_name: &span.application_name,
            callee_service_type: application_type,
            callee_host,
            elapsed: span.elapsed,
            error,
            timestamp,
        };
        if let Err(e) = self.update_callee(&inbound).await {
            warn!("skipping inbound link of {}: {}", span.transaction_id, e);
        }
        if span.parent_application_name.is_none() {
            // the user node needs the outbound half too
            if let Err(e) = self.update_caller(&inbound).await {
                warn!("skipping user link of {}: {}", span.transaction_id, e);
            }
        }

        self.record_events(
            &span.application_name,
            application_type,
            &span.agent_id,
            &span.span_events,
            timestamp,
        )
        .await;
    }

    /// Outbound links of the events that record statistics and name a destination.
    pub async fn record_events(
        &self,
        application_name: &str,
        application_type: ServiceType,
        agent_id: &str,
        events: &[SpanEvent],
        timestamp: i64,
    ) {
        for event in events {
            if !event.service_type.is_record_statistics() {
                continue;
            }
            let Some(destination) = event.destination_id.as_deref() else {
                continue;
            };
            let outbound = CallStat {
                caller_application_name: application_name,
                caller_service_type: application_type,
                caller_agent_id: agent_id,
                callee_application_name: destination,
                callee_service_type: event.service_type,
                callee_host: event.end_point.as_deref().unwrap_or(destination),
                elapsed: event.end_elapsed,
                error: event.has_exception(),
                timestamp,
            };
            if let Err(e) = self.update_caller(&outbound).await {
                warn!(
                    "skipping outbound link of {} event {}: {}",
                    application_name, event.sequence, e
                );
            }
        }
    }
}

async fn record(
    writer: &dyn BulkWriter,
    row_key: &CallRowKey,
    slot_column: &dyn ColumnName,
    sum_column: &dyn ColumnName,
    max_column: &dyn ColumnName,
    elapsed: i32,
) {
    writer.increment(row_key, slot_column).await;
    writer
        .increment_by(row_key, sum_column, i64::from(elapsed))
        .await;
    writer
        .update_max(row_key, max_column, i64::from(elapsed))
        .await;
}
