// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Canonical span object model produced by the collector's binder.

use crate::id::TransactionId;
use crate::service_type::ServiceType;
use serde::Serialize;

/// The only trace format version accepted on ingest.
pub const TRACE_V2: i32 = 1;

/// `parent_span_id` of a root span.
pub const ROOT_PARENT_SPAN_ID: i64 = -1;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AnnotationValue {
    Null,
    String(String),
    Bool(bool),
    Int(i32),
    Long(i64),
    Short(i16),
    Double(f64),
    Bytes(Vec<u8>),
    Byte(u8),
    IntString {
        int_value: i32,
        string_value: Option<String>,
    },
    StringString {
        string_value1: Option<String>,
        string_value2: Option<String>,
    },
    LongIntIntByteByteString {
        long_value: i64,
        int_value1: i32,
        int_value2: i32,
        byte_value1: u8,
        byte_value2: u8,
        string_value: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Annotation {
    pub key: i32,
    pub value: AnnotationValue,
}

impl Annotation {
    pub fn new(key: i32, value: AnnotationValue) -> Self {
        Self { key, value }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionInfo {
    pub id: i32,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalAsyncId {
    pub async_id: i32,
    pub sequence: i32,
}

/// A nested operation inside a span, with absolute offsets after binding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanEvent {
    pub sequence: i32,
    pub start_elapsed: i32,
    pub end_elapsed: i32,
    pub depth: i32,
    pub service_type: ServiceType,
    pub api_id: i32,
    pub rpc: Option<String>,
    pub end_point: Option<String>,
    pub destination_id: Option<String>,
    pub next_span_id: Option<i64>,
    pub next_async_id: Option<i32>,
    pub annotations: Vec<Annotation>,
    pub exception_info: Option<ExceptionInfo>,
}

impl SpanEvent {
    pub fn new(sequence: i32, service_type: ServiceType) -> Self {
        Self {
            sequence,
            start_elapsed: 0,
            end_elapsed: 0,
            depth: 0,
            service_type,
            api_id: 0,
            rpc: None,
            end_point: None,
            destination_id: None,
            next_span_id: None,
            next_async_id: None,
            annotations: Vec::new(),
            exception_info: None,
        }
    }

    pub fn has_exception(&self) -> bool {
        self.exception_info.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Span {
    pub transaction_id: TransactionId,
    pub agent_id: String,
    pub application_name: String,
    pub agent_start_time: i64,
    pub collector_accept_time: i64,
    pub span_id: i64,
    pub parent_span_id: i64,
    pub start_time: i64,
    pub elapsed: i32,
    pub service_type: ServiceType,
    pub application_service_type: ServiceType,
    pub api_id: i32,
    pub rpc: Option<String>,
    pub end_point: Option<String>,
    pub remote_addr: Option<String>,
    pub acceptor_host: Option<String>,
    pub parent_application_name: Option<String>,
    pub parent_application_type: Option<ServiceType>,
    pub flag: i16,
    pub err_code: i32,
    pub logging_transaction_info: u8,
    pub exception_info: Option<ExceptionInfo>,
    pub annotations: Vec<Annotation>,
    pub span_events: Vec<SpanEvent>,
}

impl Span {
    pub fn is_root(&self) -> bool {
        self.parent_span_id == ROOT_PARENT_SPAN_ID
    }

    pub fn has_error(&self) -> bool {
        self.err_code != 0
    }
}

/// Continuation of a span, typically from an async context.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpanChunk {
    pub transaction_id: TransactionId,
    pub agent_id: String,
    pub application_name: String,
    pub agent_start_time: i64,
    pub span_id: i64,
    pub key_time: i64,
    pub end_point: Option<String>,
    pub application_service_type: ServiceType,
    pub local_async_id: Option<LocalAsyncId>,
    pub span_events: Vec<SpanEvent>,
}

/// How an API was captured by the agent. Unknown codes read as [`MethodType::Default`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum MethodType {
    #[default]
    Default,
    Exception,
    Annotation,
    Parameter,
    WebRequest,
    InvocationTrace,
    Corrupted,
}

impl MethodType {
    pub fn code(&self) -> i32 {
        match self {
            MethodType::Default => 0,
            MethodType::Exception => 1,
            MethodType::Annotation => 2,
            MethodType::Parameter => 3,
            MethodType::WebRequest => 100,
            MethodType::InvocationTrace => 200,
            MethodType::Corrupted => 900,
        }
    }

    pub fn from_code(code: i32) -> MethodType {
        match code {
            1 => MethodType::Exception,
            2 => MethodType::Annotation,
            3 => MethodType::Parameter,
            100 => MethodType::WebRequest,
            200 => MethodType::InvocationTrace,
            900 => MethodType::Corrupted,
            _ => MethodType::Default,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMetaData {
    pub agent_id: String,
    pub agent_start_time: i64,
    pub api_id: i32,
    pub api_info: String,
    pub line_number: i32,
    pub method_type: MethodType,
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StringMetaData {
    pub agent_id: String,
    pub agent_start_time: i64,
    pub string_id: i32,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SqlMetaData {
    pub agent_id: String,
    pub agent_start_time: i64,
    pub sql_id: i32,
    pub sql: String,
}
