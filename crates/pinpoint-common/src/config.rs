// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `.properties` files with environment overrides, and the instrumentation settings every
//! component reads from them.

use crate::errors::ConfigError;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

pub const ENV_PREFIX: &str = "PINPOINT_";

/// Environment variable overriding `key`: `bulk.limit.size` reads `PINPOINT_BULK_LIMIT_SIZE`.
pub fn env_key(key: &str) -> String {
    format!("{ENV_PREFIX}{}", key.to_uppercase().replace(['.', '-'], "_"))
}

/// `key=value` pairs. Lines starting with `#` or `!` are comments; `:` also separates keys from
/// values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    pub fn parse(content: &str) -> Self {
        let entries = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
            .filter_map(|line| {
                let split = line.find(['=', ':'])?;
                let (key, value) = line.split_at(split);
                Some((key.trim().to_string(), value[1..].trim().to_string()))
            })
            .collect();
        Self { entries }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::parse(&content))
    }

    /// Replaces the values of `keys` with the matching environment variables, when set.
    pub fn apply_overrides<F>(&mut self, keys: &[&str], lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in keys {
            if let Some(value) = lookup(&env_key(key)) {
                debug!("configuration override for {key} from the environment");
                self.entries.insert((*key).to_string(), value);
            }
        }
    }

    pub fn apply_env_overrides(&mut self, keys: &[&str]) {
        self.apply_overrides(keys, |name| std::env::var(name).ok());
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn get_string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or(default).to_string()
    }

    pub fn get_parsed<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| {
                ConfigError::InvalidConfig(format!("{key} has an invalid value '{value}'"))
            }),
        }
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key).map(str::to_lowercase).as_deref() {
            None => Ok(default),
            Some("true") => Ok(true),
            Some("false") => Ok(false),
            Some(other) => Err(ConfigError::InvalidConfig(format!(
                "{key} must be true or false, got '{other}'"
            ))),
        }
    }

    /// Comma separated list, trimmed, empty items dropped.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

pub const INSTRUMENT_ENGINE: &str = "profiler.instrument.engine";
pub const INTERCEPTOR_REGISTRY_SIZE: &str = "profiler.interceptorregistry.size";
pub const CALL_STACK_MAX_DEPTH: &str = "profiler.callstack.max.depth";
pub const CALL_STACK_MAX_SEQUENCE: &str = "profiler.callstack.max.sequence";
pub const CALL_STACK_OVERFLOW_LOG_RATION: &str = "profiler.callstack.overflow.log.ration";
pub const INTERCEPTOR_EXCEPTION_PROPAGATE: &str = "profiler.interceptor.exception.propagate";
pub const LAMBDA_EXPRESSIONS_SUPPORT: &str = "profiler.lambda.expressions.support";
pub const JDK_ALLOW_CLASS_NAMES: &str = "profiler.instrument.jdk.allow.classnames";

pub const INSTRUMENT_KEYS: &[&str] = &[
    INSTRUMENT_ENGINE,
    INTERCEPTOR_REGISTRY_SIZE,
    CALL_STACK_MAX_DEPTH,
    CALL_STACK_MAX_SEQUENCE,
    CALL_STACK_OVERFLOW_LOG_RATION,
    INTERCEPTOR_EXCEPTION_PROPAGATE,
    LAMBDA_EXPRESSIONS_SUPPORT,
    JDK_ALLOW_CLASS_NAMES,
];

pub const UNBOUNDED_CALL_STACK_DEPTH: i32 = -1;
const MIN_CALL_STACK_DEPTH: i32 = 2;
const MIN_CALL_STACK_SEQUENCE: i32 = 4;
const MAX_CALL_STACK_SEQUENCE: i32 = i16::MAX as i32;
const MIN_OVERFLOW_LOG_RATION: i32 = 1;

/// Call-stack and interceptor limits shared with agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentConfig {
    pub instrument_engine: String,
    pub interceptor_registry_size: usize,
    pub call_stack_max_depth: i32,
    pub call_stack_max_sequence: i32,
    pub call_stack_overflow_log_ration: i32,
    pub propagate_interceptor_exception: bool,
    pub lambda_expressions_support: bool,
    pub allow_jdk_class_names: Vec<String>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            instrument_engine: "ASM".to_string(),
            interceptor_registry_size: 8192,
            call_stack_max_depth: 64,
            call_stack_max_sequence: 5000,
            call_stack_overflow_log_ration: 100,
            propagate_interceptor_exception: false,
            lambda_expressions_support: true,
            allow_jdk_class_names: Vec::new(),
        }
    }
}

impl InstrumentConfig {
    pub fn from_properties(properties: &Properties) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            instrument_engine: properties.get_string(INSTRUMENT_ENGINE, &defaults.instrument_engine),
            interceptor_registry_size: properties
                .get_parsed(INTERCEPTOR_REGISTRY_SIZE, defaults.interceptor_registry_size)?,
            call_stack_max_depth: clamp_call_stack_depth(
                properties.get_parsed(CALL_STACK_MAX_DEPTH, defaults.call_stack_max_depth)?,
            ),
            call_stack_max_sequence: clamp_call_stack_sequence(
                properties.get_parsed(CALL_STACK_MAX_SEQUENCE, defaults.call_stack_max_sequence)?,
            ),
            call_stack_overflow_log_ration: properties
                .get_parsed(
                    CALL_STACK_OVERFLOW_LOG_RATION,
                    defaults.call_stack_overflow_log_ration,
                )?
                .max(MIN_OVERFLOW_LOG_RATION),
            propagate_interceptor_exception: properties.get_bool(
                INTERCEPTOR_EXCEPTION_PROPAGATE,
                defaults.propagate_interceptor_exception,
            )?,
            lambda_expressions_support: properties
                .get_bool(LAMBDA_EXPRESSIONS_SUPPORT, defaults.lambda_expressions_support)?,
            allow_jdk_class_names: properties.get_list(JDK_ALLOW_CLASS_NAMES),
        })
    }
}

/// `-1` means unbounded; anything else is at least 2.
fn clamp_call_stack_depth(depth: i32) -> i32 {
    if depth != UNBOUNDED_CALL_STACK_DEPTH && depth < MIN_CALL_STACK_DEPTH {
        MIN_CALL_STACK_DEPTH
    } else {
        depth
    }
}

/// Within `[4, 32767]`; negative values mean "as many as possible".
fn clamp_call_stack_sequence(sequence: i32) -> i32 {
    if (0..MIN_CALL_STACK_SEQUENCE).contains(&sequence) {
        MIN_CALL_STACK_SEQUENCE
    } else if !(0..=MAX_CALL_STACK_SEQUENCE).contains(&sequence) {
        MAX_CALL_STACK_SEQUENCE
    } else {
        sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_properties() {
        let properties = Properties::parse(
            "# comment\n! also a comment\n\nbulk.enable = false\nweb.servermap.build.timeout:1000\nempty=\n",
        );
        assert_eq!(properties.get("bulk.enable"), Some("false"));
        assert_eq!(properties.get("web.servermap.build.timeout"), Some("1000"));
        assert_eq!(properties.get("empty"), None);
        assert_eq!(properties.get("# comment"), None);
    }

    #[test]
    fn test_typed_getters() {
        let mut properties = Properties::default();
        properties.set("size", "12");
        properties.set("flag", "TRUE");
        properties.set("bad", "twelve");
        properties.set("list", " a, b ,,c ");

        assert_eq!(properties.get_parsed("size", 0usize).expect("valid"), 12);
        assert_eq!(properties.get_parsed("missing", 7i64).expect("default"), 7);
        assert!(properties.get_parsed::<i32>("bad", 0).is_err());
        assert!(properties.get_bool("flag", false).expect("valid"));
        assert!(properties.get_bool("bad", false).is_err());
        assert_eq!(properties.get_list("list"), vec!["a", "b", "c"]);
        assert!(properties.get_list("missing").is_empty());
    }

    #[test]
    fn test_overrides() {
        assert_eq!(env_key("bulk.limit.size"), "PINPOINT_BULK_LIMIT_SIZE");

        let mut properties = Properties::parse("bulk.enable=true\nbulk.limit.size=10");
        properties.apply_overrides(&["bulk.enable", "bulk.limit.size"], |name| {
            (name == "PINPOINT_BULK_ENABLE").then(|| "false".to_string())
        });
        assert_eq!(properties.get("bulk.enable"), Some("false"));
        assert_eq!(properties.get("bulk.limit.size"), Some("10"));
    }

    #[test]
    fn test_instrument_defaults() {
        let config =
            InstrumentConfig::from_properties(&Properties::default()).expect("defaults are valid");
        assert_eq!(config, InstrumentConfig::default());
    }

    #[test]
    fn test_instrument_clamping() {
        assert_eq!(clamp_call_stack_depth(-1), -1);
        assert_eq!(clamp_call_stack_depth(-5), 2);
        assert_eq!(clamp_call_stack_depth(0), 2);
        assert_eq!(clamp_call_stack_depth(100), 100);

        assert_eq!(clamp_call_stack_sequence(0), 4);
        assert_eq!(clamp_call_stack_sequence(3), 4);
        assert_eq!(clamp_call_stack_sequence(4), 4);
        assert_eq!(clamp_call_stack_sequence(-1), 32767);
        assert_eq!(clamp_call_stack_sequence(40_000), 32767);

        let properties = Properties::parse(
            "profiler.callstack.overflow.log.ration=0\nprofiler.instrument.jdk.allow.classnames=java.net.URL, java.util.concurrent.",
        );
        let config = InstrumentConfig::from_properties(&properties).expect("valid");
        assert_eq!(config.call_stack_overflow_log_ration, 1);
        assert_eq!(
            config.allow_jdk_class_names,
            vec!["java.net.URL", "java.util.concurrent."]
        );
    }
}
