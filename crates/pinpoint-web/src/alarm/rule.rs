// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::AlarmError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Data a checker reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::Display)]
pub enum DataCollectorCategory {
    #[display("RESPONSE_TIME")]
    ResponseTime,
    #[display("CALLER_STAT")]
    CallerStat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckerCategory {
    #[serde(rename = "SLOW COUNT")]
    SlowCount,
    #[serde(rename = "SLOW RATE")]
    SlowRate,
    #[serde(rename = "ERROR COUNT")]
    ErrorCount,
    #[serde(rename = "ERROR RATE")]
    ErrorRate,
    #[serde(rename = "TOTAL COUNT")]
    TotalCount,
    #[serde(rename = "SLOW COUNT TO CALLEE")]
    SlowCountToCallee,
    #[serde(rename = "SLOW RATE TO CALLEE")]
    SlowRateToCallee,
    #[serde(rename = "ERROR COUNT TO CALLEE")]
    ErrorCountToCallee,
    #[serde(rename = "ERROR RATE TO CALLEE")]
    ErrorRateToCallee,
    #[serde(rename = "TOTAL COUNT TO CALLEE")]
    TotalCountToCallee,
}

impl CheckerCategory {
    pub const ALL: [CheckerCategory; 10] = [
        CheckerCategory::SlowCount,
        CheckerCategory::SlowRate,
        CheckerCategory::ErrorCount,
        CheckerCategory::ErrorRate,
        CheckerCategory::TotalCount,
        CheckerCategory::SlowCountToCallee,
        CheckerCategory::SlowRateToCallee,
        CheckerCategory::ErrorCountToCallee,
        CheckerCategory::ErrorRateToCallee,
        CheckerCategory::TotalCountToCallee,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CheckerCategory::SlowCount => "SLOW COUNT",
            CheckerCategory::SlowRate => "SLOW RATE",
            CheckerCategory::ErrorCount => "ERROR COUNT",
            CheckerCategory::ErrorRate => "ERROR RATE",
            CheckerCategory::TotalCount => "TOTAL COUNT",
            CheckerCategory::SlowCountToCallee => "SLOW COUNT TO CALLEE",
            CheckerCategory::SlowRateToCallee => "SLOW RATE TO CALLEE",
            CheckerCategory::ErrorCountToCallee => "ERROR COUNT TO CALLEE",
            CheckerCategory::ErrorRateToCallee => "ERROR RATE TO CALLEE",
            CheckerCategory::TotalCountToCallee => "TOTAL COUNT TO CALLEE",
        }
    }

    pub fn from_name(name: &str) -> Option<CheckerCategory> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|category| category.name().eq_ignore_ascii_case(name))
    }

    pub fn collector_category(&self) -> DataCollectorCategory {
        match self {
            CheckerCategory::SlowCount
            | CheckerCategory::SlowRate
            | CheckerCategory::ErrorCount
            | CheckerCategory::ErrorRate
            | CheckerCategory::TotalCount => DataCollectorCategory::ResponseTime,
            _ => DataCollectorCategory::CallerStat,
        }
    }

    pub fn is_rate(&self) -> bool {
        matches!(
            self,
            CheckerCategory::SlowRate
                | CheckerCategory::ErrorRate
                | CheckerCategory::SlowRateToCallee
                | CheckerCategory::ErrorRateToCallee
        )
    }

    /// Checkers scoped to the callee named by the rule notes.
    pub fn is_to_callee(&self) -> bool {
        self.collector_category() == DataCollectorCategory::CallerStat
    }

    pub fn unit(&self) -> &'static str {
        if self.is_rate() {
            "%"
        } else {
            ""
        }
    }
}

impl fmt::Display for CheckerCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CheckerCategory {
    type Err = AlarmError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Self::from_name(name).ok_or_else(|| AlarmError::UnknownChecker(name.to_string()))
    }
}

/// A checker bound to an application and a threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub application_id: String,
    pub service_type: String,
    pub checker_name: String,
    pub threshold: i64,
    pub user_group_id: String,
    #[serde(default)]
    pub sms_send: bool,
    #[serde(default)]
    pub email_send: bool,
    #[serde(default)]
    pub webhook_send: bool,
    /// Callee application name for the `TO CALLEE` checkers.
    #[serde(default)]
    pub notes: String,
}

impl Rule {
    pub fn checker_category(&self) -> Result<CheckerCategory, AlarmError> {
        self.checker_name.parse()
    }
}
