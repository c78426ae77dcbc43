//! Engine configuration
//!
//! Settings come from code (`EngineConfig::default()` plus field updates), from a YAML or
//! JSON document, or from `SIFT_*` environment variables.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// When changed facts become settled during a tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// One commit after every rule has run; all rules of a tick share its changed set
    #[default]
    TickEnd,
    /// Settle each rule's output when the rule finishes; a later rule sees it as settled.
    /// Facts changed at tick start stay changed for every rule until the tick ends.
    AfterEachRule,
}

impl FromStr for CommitPolicy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tick_end" | "tick-end" => Ok(CommitPolicy::TickEnd),
            "after_each_rule" | "after-each-rule" => Ok(CommitPolicy::AfterEachRule),
            other => Err(EngineError::configuration(
                "commit_policy",
                format!("unknown commit policy `{other}`"),
            )),
        }
    }
}

/// How the incremental join decides which types count as touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TouchedTypes {
    /// Types with changed facts when the tick starts
    #[default]
    Snapshot,
    /// Re-checked for every join pass, so types first touched mid-tick are joined too
    Live,
}

impl FromStr for TouchedTypes {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "snapshot" => Ok(TouchedTypes::Snapshot),
            "live" => Ok(TouchedTypes::Live),
            other => Err(EngineError::configuration(
                "touched_types",
                format!("unknown touched-type mode `{other}`"),
            )),
        }
    }
}

/// Log output settings used by [`crate::telemetry::init_tracing`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `sift_core=debug`
    pub filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { filter: "info".to_string(), json: false }
    }
}

/// Configuration for a [`crate::World`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub commit_policy: CommitPolicy,
    pub touched_types: TouchedTypes,
    /// Dedupe flag for rules that do not set one
    pub default_dedupe: bool,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Create configuration from environment variables
    pub fn from_environment() -> EngineResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> EngineResult<Self> {
        let mut config = Self::default();
        if let Some(value) = lookup("SIFT_COMMIT_POLICY") {
            config.commit_policy = value.parse()?;
        }
        if let Some(value) = lookup("SIFT_TOUCHED_TYPES") {
            config.touched_types = value.parse()?;
        }
        if let Some(value) = lookup("SIFT_DEFAULT_DEDUPE") {
            config.default_dedupe = parse_flag("default_dedupe", &value)?;
        }
        if let Some(value) = lookup("SIFT_LOG") {
            config.logging.filter = value;
        }
        if let Some(value) = lookup("SIFT_LOG_JSON") {
            config.logging.json = parse_flag("logging.json", &value)?;
        }
        Ok(config)
    }

    pub fn from_yaml_str(document: &str) -> anyhow::Result<Self> {
        Ok(serde_yaml::from_str(document)?)
    }

    pub fn from_json_str(document: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(document)?)
    }
}

fn parse_flag(setting: &str, value: &str) -> EngineResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(EngineError::configuration(setting, format!("`{other}` is not a flag"))),
    }
}
