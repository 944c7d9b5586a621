// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use pinpoint_common::errors::{RowError, StoreError};

/// A protocol message rejected by the span binder. Only the offending message is dropped.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum BindError {
    #[error("unsupported version: {0}")]
    UnsupportedVersion(i32),
    #[error("transaction id is not set")]
    MissingTransactionId,
    #[error("invalid parent application name '{parent_application_name}' from {application_name}/{agent_id}")]
    InvalidParentApplication {
        parent_application_name: String,
        application_name: String,
        agent_id: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("unknown frame kind {0}")]
    UnknownKind(u8),
    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    TooLarge { len: usize, max: usize },
    #[error("malformed length prefix")]
    InvalidLength,
    #[error("malformed frame body: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("frame body encoding failed: {0}")]
    Encode(#[from] prost::EncodeError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Bind(#[from] BindError),
    #[error(transparent)]
    Row(#[from] RowError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("data frame received before the agent handshake")]
    HandshakeRequired,
    #[error("invalid handshake: {0}")]
    InvalidHandshake(String),
}
