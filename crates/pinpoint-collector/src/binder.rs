// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Binds protocol messages into the canonical span model.
//!
//! Span events arrive delta encoded: `start_elapsed` is relative to the previous event in arrival
//! order and a zero `depth` repeats the previous depth. Binding restores absolute values before
//! sorting events by sequence. Offsets wrap on overflow like the agent's 32-bit arithmetic.

use crate::errors::BindError;
use crate::message::{
    p_annotation_value, p_next_event, PAnnotation, PApiMetaData, PIntStringValue, PSpan,
    PSpanChunk, PSpanEvent, PSqlMetaData, PStringMetaData, PTransactionId,
};
use pinpoint_common::id::{validate_id, TransactionId};
use pinpoint_common::service_type::ServiceType;
use pinpoint_common::span::{
    Annotation, AnnotationValue, ApiMetaData, ExceptionInfo, LocalAsyncId, MethodType, Span,
    SpanChunk, SpanEvent, SqlMetaData, StringMetaData, TRACE_V2,
};
use tracing::info;

/// Collector-side facts about the sending agent, fixed for the lifetime of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindAttribute {
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub application_name: String,
    pub agent_start_time: i64,
    pub accepted_time: i64,
}

impl BindAttribute {
    pub fn new(
        agent_id: impl Into<String>,
        application_name: impl Into<String>,
        agent_start_time: i64,
        accepted_time: i64,
    ) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: None,
            application_name: application_name.into(),
            agent_start_time,
            accepted_time,
        }
    }

    /// Same agent, stamped with a new accept time.
    pub fn accepted_at(&self, accepted_time: i64) -> Self {
        Self {
            accepted_time,
            ..self.clone()
        }
    }
}

fn check_version(version: i32) -> Result<(), BindError> {
    if version != TRACE_V2 {
        return Err(BindError::UnsupportedVersion(version));
    }
    Ok(())
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn service_type(code: i32) -> ServiceType {
    i16::try_from(code).map_or(ServiceType::UNDEFINED, ServiceType::from_code)
}

fn transaction_id(
    transaction_id: Option<&PTransactionId>,
    span_agent_id: &str,
) -> Result<TransactionId, BindError> {
    let transaction_id = transaction_id.ok_or(BindError::MissingTransactionId)?;
    // an empty agent id means the transaction started on the sending agent
    let agent_id = if transaction_id.agent_id.is_empty() {
        span_agent_id
    } else {
        transaction_id.agent_id.as_str()
    };
    Ok(TransactionId::new(
        agent_id,
        transaction_id.agent_start_time,
        transaction_id.sequence,
    ))
}

fn exception_info(value: &PIntStringValue) -> ExceptionInfo {
    ExceptionInfo {
        id: value.int_value,
        message: value.string_value.clone(),
    }
}

fn annotation(annotation: &PAnnotation) -> Annotation {
    use p_annotation_value::Field;

    let value = match annotation.value.as_ref().and_then(|value| value.field.as_ref()) {
        None => AnnotationValue::Null,
        Some(Field::StringValue(v)) => AnnotationValue::String(v.clone()),
        Some(Field::BoolValue(v)) => AnnotationValue::Bool(*v),
        Some(Field::IntValue(v)) => AnnotationValue::Int(*v),
        Some(Field::LongValue(v)) => AnnotationValue::Long(*v),
        // narrower wire types travel as int32, truncation is the wire contract
        Some(Field::ShortValue(v)) => AnnotationValue::Short(*v as i16),
        Some(Field::DoubleValue(v)) => AnnotationValue::Double(*v),
        Some(Field::BinaryValue(v)) => AnnotationValue::Bytes(v.clone()),
        Some(Field::ByteValue(v)) => AnnotationValue::Byte(*v as u8),
        Some(Field::IntStringValue(v)) => AnnotationValue::IntString {
            int_value: v.int_value,
            string_value: v.string_value.clone(),
        },
        Some(Field::StringStringValue(v)) => AnnotationValue::StringString {
            string_value1: v.string_value1.clone(),
            string_value2: v.string_value2.clone(),
        },
        Some(Field::LongIntIntByteByteStringValue(v)) => AnnotationValue::LongIntIntByteByteString {
            long_value: v.long_value,
            int_value1: v.int_value1,
            int_value2: v.int_value2,
            byte_value1: v.byte_value1 as u8,
            byte_value2: v.byte_value2 as u8,
            string_value: v.string_value.clone(),
        },
    };
    Annotation::new(annotation.key, value)
}

/// Annotations sorted by key. The sort is stable, repeated keys keep their arrival order.
fn annotations(annotations: &[PAnnotation]) -> Vec<Annotation> {
    let mut result: Vec<Annotation> = annotations.iter().map(annotation).collect();
    result.sort_by_key(|annotation| annotation.key);
    result
}

/// Converts ingest messages into spans, chunks, events and metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanBinder;

impl SpanBinder {
    pub fn new() -> Self {
        Self
    }

    pub fn bind_span(&self, message: &PSpan, attr: &BindAttribute) -> Result<Span, BindError> {
        check_version(message.version)?;
        let transaction_id = transaction_id(message.transaction_id.as_ref(), &attr.agent_id)?;

        let mut span = Span {
            transaction_id,
            agent_id: attr.agent_id.clone(),
            application_name: attr.application_name.clone(),
            agent_start_time: attr.agent_start_time,
            collector_accept_time: attr.accepted_time,
            span_id: message.span_id,
            parent_span_id: message.parent_span_id,
            start_time: message.start_time,
            elapsed: message.elapsed,
            service_type: service_type(message.service_type),
            application_service_type: service_type(message.application_service_type),
            api_id: message.api_id,
            rpc: None,
            end_point: None,
            remote_addr: None,
            acceptor_host: None,
            parent_application_name: None,
            parent_application_type: None,
            // flag and logging info are narrow fields widened for the wire
            flag: message.flag as i16,
            err_code: message.err,
            logging_transaction_info: message.logging_transaction_info as u8,
            exception_info: message.exception_info.as_ref().map(exception_info),
            annotations: annotations(&message.annotation),
            span_events: self.bind_span_events(&message.span_event),
        };

        if let Some(accept_event) = &message.accept_event {
            span.rpc = non_empty(&accept_event.rpc);
            span.remote_addr = non_empty(&accept_event.remote_addr);
            span.end_point = non_empty(&accept_event.end_point);

            if let Some(parent_info) = &accept_event.parent_info {
                span.acceptor_host = non_empty(&parent_info.acceptor_host);

                let parent_application_name = &parent_info.parent_application_name;
                // root spans carry no parent application
                if !parent_application_name.is_empty() {
                    if !validate_id(parent_application_name) {
                        return Err(BindError::InvalidParentApplication {
                            parent_application_name: parent_application_name.clone(),
                            application_name: attr.application_name.clone(),
                            agent_id: attr.agent_id.clone(),
                        });
                    }
                    span.parent_application_name = Some(parent_application_name.clone());
                    span.parent_application_type =
                        Some(service_type(parent_info.parent_application_type));
                }
            }
        }

        Ok(span)
    }

    pub fn bind_span_chunk(
        &self,
        message: &PSpanChunk,
        attr: &BindAttribute,
    ) -> Result<SpanChunk, BindError> {
        check_version(message.version)?;
        let transaction_id = transaction_id(message.transaction_id.as_ref(), &attr.agent_id)?;

        Ok(SpanChunk {
            transaction_id,
            agent_id: attr.agent_id.clone(),
            application_name: attr.application_name.clone(),
            agent_start_time: attr.agent_start_time,
            span_id: message.span_id,
            key_time: message.key_time,
            end_point: non_empty(&message.end_point),
            application_service_type: service_type(message.application_service_type),
            local_async_id: message.local_async_id.as_ref().map(|id| LocalAsyncId {
                async_id: id.async_id,
                sequence: id.sequence,
            }),
            span_events: self.bind_span_events(&message.span_event),
        })
    }

    /// Decodes events in arrival order, then sorts them by sequence.
    pub fn bind_span_events(&self, messages: &[PSpanEvent]) -> Vec<SpanEvent> {
        let mut events: Vec<SpanEvent> = Vec::with_capacity(messages.len());
        for message in messages {
            let event = self.build_span_event(message, events.last());
            events.push(event);
        }
        events.sort_by_key(|event| event.sequence);
        events
    }

    pub fn build_span_event(&self, message: &PSpanEvent, prev: Option<&SpanEvent>) -> SpanEvent {
        let start_elapsed = match prev {
            Some(prev) => prev.start_elapsed.wrapping_add(message.start_elapsed),
            None => message.start_elapsed,
        };
        let depth = match (message.depth, prev) {
            (0, Some(prev)) => prev.depth,
            (0, None) => 0,
            (depth, _) => depth,
        };

        let mut event = SpanEvent {
            sequence: message.sequence,
            start_elapsed,
            end_elapsed: message.end_elapsed,
            depth,
            service_type: service_type(message.service_type),
            api_id: message.api_id,
            rpc: None,
            end_point: None,
            destination_id: None,
            next_span_id: None,
            next_async_id: (message.async_event != 0).then_some(message.async_event),
            annotations: annotations(&message.annotation),
            exception_info: message.exception_info.as_ref().map(exception_info),
        };

        if let Some(next_event) = &message.next_event {
            match &next_event.field {
                Some(p_next_event::Field::MessageEvent(message_event)) => {
                    event.next_span_id = Some(message_event.next_span_id);
                    event.destination_id = non_empty(&message_event.destination_id);
                    event.end_point = non_empty(&message_event.end_point);
                }
                None => info!("unknown nextEvent: {next_event:?}"),
            }
        }
        event
    }

    pub fn bind_api_metadata(&self, message: &PApiMetaData, attr: &BindAttribute) -> ApiMetaData {
        ApiMetaData {
            agent_id: attr.agent_id.clone(),
            agent_start_time: attr.agent_start_time,
            api_id: message.api_id,
            api_info: message.api_info.clone(),
            line_number: message.line,
            method_type: MethodType::from_code(message.method_type),
            location: non_empty(&message.location),
        }
    }

    pub fn bind_string_metadata(
        &self,
        message: &PStringMetaData,
        attr: &BindAttribute,
    ) -> StringMetaData {
        StringMetaData {
            agent_id: attr.agent_id.clone(),
            agent_start_time: attr.agent_start_time,
            string_id: message.string_id,
            value: message.string_value.clone(),
        }
    }

    pub fn bind_sql_metadata(&self, message: &PSqlMetaData, attr: &BindAttribute) -> SqlMetaData {
        SqlMetaData {
            agent_id: attr.agent_id.clone(),
            agent_start_time: attr.agent_start_time,
            sql_id: message.sql_id,
            sql: message.sql.clone(),
        }
    }
}
