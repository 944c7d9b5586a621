// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use pinpoint_common::config::Properties;
use pinpoint_common::distributor::DEFAULT_BUCKETS;
use pinpoint_common::errors::ConfigError;
use std::env;
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "PINPOINT_CONFIG";

pub const BUILD_TIMEOUT: &str = "web.servermap.build.timeout";
pub const LINK_DATA_LIMIT: &str = "web.servermap.linkdata.limit";
pub const ROWKEY_BUCKETS: &str = "web.rowkey.buckets";
pub const TABLE_NAMESPACE: &str = "web.table.namespace";

pub const WEB_KEYS: &[&str] = &[BUILD_TIMEOUT, LINK_DATA_LIMIT, ROWKEY_BUCKETS, TABLE_NAMESPACE];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebConfig {
    pub build_timeout_ms: u64,
    /// Link entries a map query may collect before it is refused.
    pub link_data_limit: usize,
    pub rowkey_buckets: usize,
    pub table_namespace: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            build_timeout_ms: 600_000,
            link_data_limit: 500_000_000,
            rowkey_buckets: DEFAULT_BUCKETS,
            table_namespace: "default".to_string(),
        }
    }
}

impl WebConfig {
    pub fn from_properties(properties: &Properties) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let config = Self {
            build_timeout_ms: properties.get_parsed(BUILD_TIMEOUT, defaults.build_timeout_ms)?,
            link_data_limit: properties.get_parsed(LINK_DATA_LIMIT, defaults.link_data_limit)?,
            rowkey_buckets: properties.get_parsed(ROWKEY_BUCKETS, defaults.rowkey_buckets)?,
            table_namespace: properties.get_string(TABLE_NAMESPACE, &defaults.table_namespace),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut properties = match env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.is_empty() => Properties::load(path)?,
            _ => Properties::default(),
        };
        properties.apply_env_overrides(WEB_KEYS);
        Self::from_properties(&properties)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_millis(self.build_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.build_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(format!(
                "{BUILD_TIMEOUT} must be positive"
            )));
        }
        if !(1..=256).contains(&self.rowkey_buckets) {
            return Err(ConfigError::InvalidConfig(format!(
                "{ROWKEY_BUCKETS} must be within 1..=256, got {}",
                self.rowkey_buckets
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_defaults() {
        let config = WebConfig::from_properties(&Properties::default()).expect("valid");
        assert_eq!(config, WebConfig::default());
        assert_eq!(config.build_timeout(), Duration::from_secs(600));
        assert_eq!(config.link_data_limit, 500_000_000);
    }

    #[test]
    fn test_from_properties() {
        let properties = Properties::parse(
            "web.servermap.build.timeout=3000\nweb.servermap.linkdata.limit=20\n",
        );
        let config = WebConfig::from_properties(&properties).expect("valid");
        assert_eq!(config.build_timeout(), Duration::from_secs(3));
        assert_eq!(config.link_data_limit, 20);

        for content in ["web.servermap.build.timeout=0", "web.rowkey.buckets=300"] {
            assert!(WebConfig::from_properties(&Properties::parse(content)).is_err());
        }
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        env::remove_var(CONFIG_PATH_ENV);
        env::set_var("PINPOINT_WEB_SERVERMAP_LINKDATA_LIMIT", "7");
        let config = WebConfig::from_env();
        env::remove_var("PINPOINT_WEB_SERVERMAP_LINKDATA_LIMIT");
        assert_eq!(config.expect("valid").link_data_limit, 7);
    }
}
