// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::string::FromUtf8Error;

/// Error reading a length-prefixed buffer.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("buffer underflow: need {needed} bytes, {remaining} remaining")]
    Underflow { needed: usize, remaining: usize },
    #[error("invalid string length: {0}")]
    InvalidLength(i32),
    #[error("invalid utf-8 in prefixed string")]
    InvalidUtf8(#[from] FromUtf8Error),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DistributorError {
    #[error("bucket count must be within 1..=256, got {0}")]
    InvalidBucketCount(usize),
    #[error("key of {len} bytes is shorter than the {salt_size} byte salt")]
    KeyTooShort { len: usize, salt_size: usize },
}

/// Error decoding a metadata or statistics row.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RowError {
    #[error(transparent)]
    Buffer(#[from] BufferError),
    #[error(transparent)]
    Distributor(#[from] DistributorError),
    #[error("agent id '{0}' exceeds the fixed row key width")]
    AgentIdTooLong(String),
    #[error("application name '{0}' exceeds the fixed row key width")]
    ApplicationNameTooLong(String),
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store request timed out")]
    Timeout,
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("batch is full: capacity {capacity}")]
pub struct CapacityError {
    pub capacity: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = BufferError::Underflow {
            needed: 4,
            remaining: 1,
        };
        assert_eq!(
            error.to_string(),
            "buffer underflow: need 4 bytes, 1 remaining"
        );

        let error = ConfigError::InvalidConfig("bulk.limit.size must be positive".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: bulk.limit.size must be positive"
        );
    }

    #[test]
    fn test_row_error_wraps_sources() {
        let error: RowError = DistributorError::KeyTooShort {
            len: 0,
            salt_size: 1,
        }
        .into();
        assert!(matches!(error, RowError::Distributor(_)));
        assert_eq!(error.to_string(), "key of 0 bytes is shorter than the 1 byte salt");
    }
}
