// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::alarm::collector::{CallCount, DataCollector};
use crate::alarm::rule::{CheckerCategory, Rule};
use crate::errors::AlarmError;
use tracing::{debug, info};

/// Evaluates one rule against collected data.
#[derive(Debug, Clone)]
pub struct AlarmChecker {
    category: CheckerCategory,
    rule: Rule,
    detected_value: Option<i64>,
    detected: bool,
}

impl AlarmChecker {
    pub fn new(rule: Rule) -> Result<Self, AlarmError> {
        Ok(Self {
            category: rule.checker_category()?,
            rule,
            detected_value: None,
            detected: false,
        })
    }

    pub fn category(&self) -> CheckerCategory {
        self.category
    }

    pub fn rule(&self) -> &Rule {
        &self.rule
    }

    /// Detected when the derived value reaches the threshold.
    pub fn check(&mut self, collector: &DataCollector) -> Result<bool, AlarmError> {
        let expected = self.category.collector_category();
        let count = match collector {
            DataCollector::ResponseTime(collector) if !self.category.is_to_callee() => {
                collector.count()
            }
            DataCollector::CallerStat(collector) if self.category.is_to_callee() => {
                collector.callee_count(&self.rule.notes)
            }
            _ => {
                return Err(AlarmError::CollectorMismatch {
                    checker: self.category,
                    expected,
                    actual: collector.category(),
                })
            }
        };

        let value = self.derive_value(count);
        self.detected_value = Some(value);
        self.detected = value >= self.rule.threshold;
        if self.detected {
            info!(
                "{} {} detected: {}{} (threshold {}{})",
                self.rule.application_id,
                self.category,
                value,
                self.category.unit(),
                self.rule.threshold,
                self.category.unit()
            );
        } else {
            debug!(
                "{} {} not detected: {}{}",
                self.rule.application_id,
                self.category,
                value,
                self.category.unit()
            );
        }
        Ok(self.detected)
    }

    fn derive_value(&self, count: CallCount) -> i64 {
        match self.category {
            CheckerCategory::SlowCount | CheckerCategory::SlowCountToCallee => count.slow,
            CheckerCategory::ErrorCount | CheckerCategory::ErrorCountToCallee => count.error,
            CheckerCategory::TotalCount | CheckerCategory::TotalCountToCallee => count.total,
            CheckerCategory::SlowRate | CheckerCategory::SlowRateToCallee => {
                percent(count.slow, count.total)
            }
            CheckerCategory::ErrorRate | CheckerCategory::ErrorRateToCallee => {
                percent(count.error, count.total)
            }
        }
    }

    pub fn is_detected(&self) -> bool {
        self.detected
    }

    /// The value of the last check.
    pub fn detected_value(&self) -> Option<i64> {
        self.detected_value
    }

    pub fn checker_detected_value(&self) -> String {
        format!(
            "{}{}",
            self.detected_value.unwrap_or_default(),
            self.category.unit()
        )
    }

    pub fn sms_message(&self) -> String {
        format!(
            "[PINPOINT Alarm - {}] {} is {} (Threshold : {}{})",
            self.rule.application_id,
            self.subject(),
            self.checker_detected_value(),
            self.rule.threshold,
            self.category.unit()
        )
    }

    pub fn email_message(&self) -> String {
        format!(
            "{} value is {} during the past 5 mins.(Threshold : {}{})",
            self.subject(),
            self.checker_detected_value(),
            self.rule.threshold,
            self.category.unit()
        )
    }

    fn subject(&self) -> String {
        if self.category.is_to_callee() {
            format!("{} {}", self.category, self.rule.notes)
        } else {
            self.category.to_string()
        }
    }
}

fn percent(count: i64, total: i64) -> i64 {
    if total == 0 {
        0
    } else {
        count * 100 / total
    }
}
