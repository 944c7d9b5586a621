// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Agent/application identifiers and the transaction id.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Maximum length of an agent id or application name.
pub const MAX_ID_LENGTH: usize = 24;

const ID_PATTERN: &str = r"^[a-zA-Z0-9._\-]+$";
const TRANSACTION_ID_DELIMITER: char = '^';

fn id_regex() -> &'static Regex {
    static ID_REGEX: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    ID_REGEX.get_or_init(|| Regex::new(ID_PATTERN).expect("id pattern must compile"))
}

/// Checks an agent id or application name against the charset and length rules.
///
/// ```
/// use pinpoint_common::id::validate_id;
///
/// assert!(validate_id("order-api.v2"));
/// assert!(!validate_id(""));
/// assert!(!validate_id("has space"));
/// assert!(!validate_id("this-name-is-far-too-long-to-fit"));
/// ```
pub fn validate_id(id: &str) -> bool {
    validate_id_with_max_length(id, MAX_ID_LENGTH)
}

pub fn validate_id_with_max_length(id: &str, max_length: usize) -> bool {
    !id.is_empty() && id.len() <= max_length && id_regex().is_match(id)
}

/// Globally unique id of a traced transaction: `(agentId, agentStartTime, sequence)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionId {
    agent_id: String,
    agent_start_time: i64,
    sequence: i64,
}

impl TransactionId {
    pub fn new(agent_id: impl Into<String>, agent_start_time: i64, sequence: i64) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_start_time,
            sequence,
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn agent_start_time(&self) -> i64 {
        self.agent_start_time
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{TRANSACTION_ID_DELIMITER}{}{TRANSACTION_ID_DELIMITER}{}",
            self.agent_id, self.agent_start_time, self.sequence
        )
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid transaction id: '{0}'")]
pub struct ParseTransactionIdError(String);

impl FromStr for TransactionId {
    type Err = ParseTransactionIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseTransactionIdError(s.to_string());
        // agent ids never contain the delimiter, so split from the right
        let mut parts = s.rsplitn(3, TRANSACTION_ID_DELIMITER);
        let sequence = parts.next().ok_or_else(invalid)?;
        let start_time = parts.next().ok_or_else(invalid)?;
        let agent_id = parts.next().ok_or_else(invalid)?;
        if agent_id.is_empty() {
            return Err(invalid());
        }
        Ok(TransactionId::new(
            agent_id,
            start_time.parse().map_err(|_| invalid())?,
            sequence.parse().map_err(|_| invalid())?,
        ))
    }
}
