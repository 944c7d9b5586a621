// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use pinpoint_common::config::{InstrumentConfig, Properties, INSTRUMENT_KEYS};
use pinpoint_common::distributor::DEFAULT_BUCKETS;
use pinpoint_common::errors::ConfigError;
use std::env;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "PINPOINT_CONFIG";

pub const BULK_ENABLE: &str = "bulk.enable";
pub const BULK_LIMIT_SIZE: &str = "bulk.limit.size";
pub const BULK_CALLEE_LIMIT_SIZE: &str = "bulk.callee.limit.size";
pub const BULK_FLUSH_INTERVAL_MS: &str = "bulk.flush.interval.ms";
pub const BULK_BATCH_SIZE: &str = "bulk.batch.size";
pub const RECEIVER_BIND: &str = "collector.receiver.bind";
pub const ROWKEY_BUCKETS: &str = "collector.rowkey.buckets";
pub const TABLE_NAMESPACE: &str = "collector.table.namespace";

pub const COLLECTOR_KEYS: &[&str] = &[
    BULK_ENABLE,
    BULK_LIMIT_SIZE,
    BULK_CALLEE_LIMIT_SIZE,
    BULK_FLUSH_INTERVAL_MS,
    BULK_BATCH_SIZE,
    RECEIVER_BIND,
    ROWKEY_BUCKETS,
    TABLE_NAMESPACE,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkProperties {
    pub enable: bool,
    /// Pending cells per caller/self writer before new cells are dropped.
    pub limit_size: usize,
    /// Pending cells of the callee writer before new cells are dropped.
    pub callee_limit_size: usize,
    pub flush_interval_ms: u64,
    /// Merged rows per store request.
    pub batch_size: usize,
}

impl Default for BulkProperties {
    fn default() -> Self {
        Self {
            enable: true,
            limit_size: 100_000,
            callee_limit_size: 100_000,
            flush_interval_ms: 1000,
            batch_size: 1000,
        }
    }
}

impl BulkProperties {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectorConfig {
    pub bulk: BulkProperties,
    pub receiver_bind: String,
    pub rowkey_buckets: usize,
    pub table_namespace: String,
    pub instrument: InstrumentConfig,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bulk: BulkProperties::default(),
            receiver_bind: "0.0.0.0:9993".to_string(),
            rowkey_buckets: DEFAULT_BUCKETS,
            table_namespace: "default".to_string(),
            instrument: InstrumentConfig::default(),
        }
    }
}

impl CollectorConfig {
    pub fn from_properties(properties: &Properties) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            bulk: BulkProperties {
                enable: properties.get_bool(BULK_ENABLE, defaults.bulk.enable)?,
                limit_size: properties.get_parsed(BULK_LIMIT_SIZE, defaults.bulk.limit_size)?,
                callee_limit_size: properties
                    .get_parsed(BULK_CALLEE_LIMIT_SIZE, defaults.bulk.callee_limit_size)?,
                flush_interval_ms: properties
                    .get_parsed(BULK_FLUSH_INTERVAL_MS, defaults.bulk.flush_interval_ms)?,
                batch_size: properties.get_parsed(BULK_BATCH_SIZE, defaults.bulk.batch_size)?,
            },
            receiver_bind: properties.get_string(RECEIVER_BIND, &defaults.receiver_bind),
            rowkey_buckets: properties.get_parsed(ROWKEY_BUCKETS, defaults.rowkey_buckets)?,
            table_namespace: properties.get_string(TABLE_NAMESPACE, &defaults.table_namespace),
            instrument: InstrumentConfig::from_properties(properties)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Loads the file named by `PINPOINT_CONFIG`, if any, then applies `PINPOINT_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut properties = match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Properties::load(path)?,
            _ => Properties::default(),
        };
        properties.apply_env_overrides(COLLECTOR_KEYS);
        properties.apply_env_overrides(INSTRUMENT_KEYS);
        Self::from_properties(&properties)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bulk.limit_size == 0 || self.bulk.callee_limit_size == 0 {
            return Err(ConfigError::InvalidConfig(
                "bulk limit sizes must be positive".to_string(),
            ));
        }
        if self.bulk.flush_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(format!(
                "{BULK_FLUSH_INTERVAL_MS} must be positive"
            )));
        }
        if self.bulk.batch_size == 0 {
            return Err(ConfigError::InvalidConfig(format!(
                "{BULK_BATCH_SIZE} must be positive"
            )));
        }
        if !(1..=256).contains(&self.rowkey_buckets) {
            return Err(ConfigError::InvalidConfig(format!(
                "{ROWKEY_BUCKETS} must be within 1..=256, got {}",
                self.rowkey_buckets
            )));
        }
        if self.receiver_bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "{RECEIVER_BIND} is not a socket address: {}",
                self.receiver_bind
            )));
        }
        Ok(())
    }
}
