// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Ingest protocol messages.

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PTransactionId {
    /// Empty when the transaction started on the sending agent.
    #[prost(string, tag = "1")]
    pub agent_id: ::prost::alloc::string::String,
    #[prost(int64, tag = "2")]
    pub agent_start_time: i64,
    #[prost(int64, tag = "3")]
    pub sequence: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PParentInfo {
    #[prost(string, tag = "1")]
    pub parent_application_name: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub parent_application_type: i32,
    #[prost(string, tag = "3")]
    pub acceptor_host: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PAcceptEvent {
    #[prost(string, tag = "1")]
    pub rpc: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub end_point: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub remote_addr: ::prost::alloc::string::String,
    #[prost(message, optional, tag = "4")]
    pub parent_info: ::core::option::Option<PParentInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PMessageEvent {
    #[prost(int64, tag = "1")]
    pub next_span_id: i64,
    #[prost(string, tag = "2")]
    pub end_point: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub destination_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PNextEvent {
    #[prost(oneof = "p_next_event::Field", tags = "1")]
    pub field: ::core::option::Option<p_next_event::Field>,
}

/// Nested message and enum types in `PNextEvent`.
pub mod p_next_event {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Field {
        #[prost(message, tag = "1")]
        MessageEvent(super::PMessageEvent),
    }
}

/// An int paired with an optional string; carries exception id and message.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PIntStringValue {
    #[prost(int32, tag = "1")]
    pub int_value: i32,
    #[prost(string, optional, tag = "2")]
    pub string_value: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PStringStringValue {
    #[prost(string, optional, tag = "1")]
    pub string_value1: ::core::option::Option<::prost::alloc::string::String>,
    #[prost(string, optional, tag = "2")]
    pub string_value2: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PLongIntIntByteByteStringValue {
    #[prost(int64, tag = "1")]
    pub long_value: i64,
    #[prost(int32, tag = "2")]
    pub int_value1: i32,
    #[prost(int32, tag = "3")]
    pub int_value2: i32,
    #[prost(sint32, tag = "4")]
    pub byte_value1: i32,
    #[prost(sint32, tag = "5")]
    pub byte_value2: i32,
    #[prost(string, optional, tag = "6")]
    pub string_value: ::core::option::Option<::prost::alloc::string::String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PAnnotationValue {
    #[prost(oneof = "p_annotation_value::Field", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11")]
    pub field: ::core::option::Option<p_annotation_value::Field>,
}

/// Nested message and enum types in `PAnnotationValue`.
pub mod p_annotation_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Field {
        #[prost(string, tag = "1")]
        StringValue(::prost::alloc::string::String),
        #[prost(bool, tag = "2")]
        BoolValue(bool),
        #[prost(int32, tag = "3")]
        IntValue(i32),
        #[prost(int64, tag = "4")]
        LongValue(i64),
        #[prost(sint32, tag = "5")]
        ShortValue(i32),
        #[prost(double, tag = "6")]
        DoubleValue(f64),
        #[prost(bytes, tag = "7")]
        BinaryValue(::prost::alloc::vec::Vec<u8>),
        #[prost(sint32, tag = "8")]
        ByteValue(i32),
        #[prost(message, tag = "9")]
        IntStringValue(super::PIntStringValue),
        #[prost(message, tag = "10")]
        StringStringValue(super::PStringStringValue),
        #[prost(message, tag = "11")]
        LongIntIntByteByteStringValue(super::PLongIntIntByteByteStringValue),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PAnnotation {
    #[prost(int32, tag = "1")]
    pub key: i32,
    #[prost(message, optional, tag = "2")]
    pub value: ::core::option::Option<PAnnotationValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PSpanEvent {
    #[prost(int32, tag = "1")]
    pub sequence: i32,
    /// Zero means "same depth as the previous event".
    #[prost(int32, tag = "2")]
    pub depth: i32,
    /// Delta from the previous event's start offset.
    #[prost(int32, tag = "3")]
    pub start_elapsed: i32,
    #[prost(int32, tag = "4")]
    pub end_elapsed: i32,
    #[prost(int32, tag = "5")]
    pub service_type: i32,
    #[prost(message, repeated, tag = "6")]
    pub annotation: ::prost::alloc::vec::Vec<PAnnotation>,
    #[prost(int32, tag = "10")]
    pub api_id: i32,
    #[prost(message, optional, tag = "11")]
    pub exception_info: ::core::option::Option<PIntStringValue>,
    #[prost(message, optional, tag = "12")]
    pub next_event: ::core::option::Option<PNextEvent>,
    #[prost(int32, tag = "13")]
    pub async_event: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PSpan {
    #[prost(int32, tag = "1")]
    pub version: i32,
    #[prost(message, optional, tag = "2")]
    pub transaction_id: ::core::option::Option<PTransactionId>,
    #[prost(sfixed64, tag = "3")]
    pub span_id: i64,
    #[prost(sfixed64, tag = "4")]
    pub parent_span_id: i64,
    #[prost(int64, tag = "5")]
    pub start_time: i64,
    #[prost(int32, tag = "6")]
    pub elapsed: i32,
    #[prost(int32, tag = "7")]
    pub api_id: i32,
    #[prost(int32, tag = "8")]
    pub service_type: i32,
    #[prost(message, optional, tag = "9")]
    pub accept_event: ::core::option::Option<PAcceptEvent>,
    #[prost(message, repeated, tag = "10")]
    pub annotation: ::prost::alloc::vec::Vec<PAnnotation>,
    #[prost(int32, tag = "11")]
    pub flag: i32,
    #[prost(sint32, tag = "12")]
    pub err: i32,
    #[prost(message, repeated, tag = "13")]
    pub span_event: ::prost::alloc::vec::Vec<PSpanEvent>,
    #[prost(message, optional, tag = "14")]
    pub exception_info: ::core::option::Option<PIntStringValue>,
    #[prost(int32, tag = "15")]
    pub application_service_type: i32,
    #[prost(int32, tag = "16")]
    pub logging_transaction_info: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PLocalAsyncId {
    #[prost(int32, tag = "1")]
    pub async_id: i32,
    #[prost(int32, tag = "2")]
    pub sequence: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PSpanChunk {
    #[prost(int32, tag = "1")]
    pub version: i32,
    #[prost(message, optional, tag = "2")]
    pub transaction_id: ::core::option::Option<PTransactionId>,
    #[prost(sfixed64, tag = "3")]
    pub span_id: i64,
    #[prost(string, tag = "4")]
    pub end_point: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "5")]
    pub span_event: ::prost::alloc::vec::Vec<PSpanEvent>,
    #[prost(int32, tag = "6")]
    pub application_service_type: i32,
    #[prost(int64, tag = "7")]
    pub key_time: i64,
    #[prost(message, optional, tag = "8")]
    pub local_async_id: ::core::option::Option<PLocalAsyncId>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PApiMetaData {
    #[prost(int32, tag = "1")]
    pub api_id: i32,
    #[prost(string, tag = "2")]
    pub api_info: ::prost::alloc::string::String,
    #[prost(int32, tag = "3")]
    pub line: i32,
    #[prost(int32, tag = "4")]
    pub method_type: i32,
    #[prost(string, tag = "5")]
    pub location: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PStringMetaData {
    #[prost(int32, tag = "1")]
    pub string_id: i32,
    #[prost(string, tag = "2")]
    pub string_value: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PSqlMetaData {
    #[prost(int32, tag = "1")]
    pub sql_id: i32,
    #[prost(string, tag = "2")]
    pub sql: ::prost::alloc::string::String,
}

/// First frame of every ingest stream: the identity of the sending agent.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PAgentHandshake {
    #[prost(string, tag = "1")]
    pub agent_id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub agent_name: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub application_name: ::prost::alloc::string::String,
    #[prost(int64, tag = "4")]
    pub agent_start_time: i64,
    #[prost(int32, tag = "5")]
    pub service_type: i32,
}
