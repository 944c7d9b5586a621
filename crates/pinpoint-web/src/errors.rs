// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::alarm::rule::{CheckerCategory, DataCollectorCategory};
use http::{Response, StatusCode};
use pinpoint_common::errors::{RowError, StoreError};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error};

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
#[error("invalid range: from {from} is after to {to}")]
pub struct RangeError {
    pub from: i64,
    pub to: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error(
        "Too many link data. Reduce the inbound/outbound depth or do not select the bidirectional \
         option. limiter=LinkDataLimiter{{count={count}, threshold={threshold}}}"
    )]
    LinkLimitExceeded { count: usize, threshold: usize },
    #[error("application map build exceeded {}ms", .0.as_millis())]
    BuildTimeout(Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl MapError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            MapError::LinkLimitExceeded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            MapError::BuildTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            MapError::Store(StoreError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            MapError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// JSON error response carrying the diagnostic message.
    pub fn to_response(&self) -> http::Result<Response<String>> {
        log_and_create_response(&self.to_string(), self.status_code())
    }
}

pub fn log_and_create_response(message: &str, status: StatusCode) -> http::Result<Response<String>> {
    if status.is_success() {
        debug!("{message}");
    } else {
        error!("{message}");
    }
    let body = json!({ "message": message }).to_string();
    Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body)
}

#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Row(#[from] RowError),
}

#[derive(Debug, thiserror::Error)]
pub enum AlarmError {
    #[error("unknown checker '{0}'")]
    UnknownChecker(String),
    #[error("{checker} needs {expected} data, got {actual}")]
    CollectorMismatch {
        checker: CheckerCategory,
        expected: DataCollectorCategory,
        actual: DataCollectorCategory,
    },
    #[error(transparent)]
    Range(#[from] RangeError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_map_error_is_a_server_error() {
        let errors = [
            MapError::LinkLimitExceeded {
                count: 12,
                threshold: 10,
            },
            MapError::BuildTimeout(Duration::from_millis(600)),
            MapError::Store(StoreError::Timeout),
            MapError::Store(StoreError::Unavailable("down".to_string())),
        ];
        for error in errors {
            assert!(error.status_code().is_server_error(), "{error}");
        }
    }

    #[test]
    fn test_response_carries_limiter_state() {
        let error = MapError::LinkLimitExceeded {
            count: 12,
            threshold: 10,
        };
        let response = error.to_response().expect("response");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(response.body()).expect("json");
        let message = body["message"].as_str().expect("message");
        assert!(message.contains("LinkDataLimiter{count=12, threshold=10}"));
    }

    #[test]
    fn test_build_timeout_display() {
        let error = MapError::BuildTimeout(Duration::from_secs(2));
        assert_eq!(error.to_string(), "application map build exceeded 2000ms");
    }
}
