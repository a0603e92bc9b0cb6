/// `config.rs` — construction-time settings for a `ModRunner`
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scripting::TrustLevel;

pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_SCRIPT_LOG_CAPACITY: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RunnerConfig {
    /// Propagate script faults and tear the session down instead of logging them.
    pub crash_on_error: bool,
    /// Re-execute a reload even when the fetched text is unchanged.
    pub same_code_execution: bool,
    /// Forward engine log / error occurrences to the `log` facade.
    pub log_engine_messages: bool,
    /// Fallback poll interval when a watch is requested with a bogus interval.
    pub default_watch_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    /// Number of script output lines kept for `ModRunner::script_log`.
    pub script_log_capacity: usize,
    /// Standard libraries handed to mods.
    pub trust: TrustLevel,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            crash_on_error: false,
            same_code_execution: false,
            log_engine_messages: true,
            default_watch_interval_ms: DEFAULT_WATCH_INTERVAL_MS,
            fetch_timeout_ms: DEFAULT_FETCH_TIMEOUT_MS,
            script_log_capacity: DEFAULT_SCRIPT_LOG_CAPACITY,
            trust: TrustLevel::Basic,
        }
    }
}

impl RunnerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_crash_on_error(mut self, crash: bool) -> Self {
        self.crash_on_error = crash;
        self
    }

    pub fn with_same_code_execution(mut self, enabled: bool) -> Self {
        self.same_code_execution = enabled;
        self
    }

    pub fn with_engine_logging(mut self, enabled: bool) -> Self {
        self.log_engine_messages = enabled;
        self
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

/// Polling request attached to a `load_from_*` call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct WatchOptions {
    pub enabled: bool,
    /// Milliseconds between polls; NaN or non-positive falls back to the default.
    pub interval_ms: f64,
}

impl WatchOptions {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            interval_ms: DEFAULT_WATCH_INTERVAL_MS as f64,
        }
    }

    pub fn every(interval_ms: f64) -> Self {
        Self {
            enabled: true,
            interval_ms,
        }
    }
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let cfg = RunnerConfig::from_json(r#"{ "crash_on_error": true }"#).unwrap();
        assert!(cfg.crash_on_error);
        assert!(cfg.log_engine_messages);
        assert_eq!(cfg.default_watch_interval_ms, 5_000);
        assert_eq!(cfg.script_log_capacity, 200);
        assert_eq!(cfg.trust, TrustLevel::Basic);
    }

    #[test]
    fn trust_level_parses_from_snake_case() {
        let cfg = RunnerConfig::from_json(r#"{ "trust": "elevated" }"#).unwrap();
        assert_eq!(cfg.trust, TrustLevel::Elevated);
    }

    #[test]
    fn builder_flags() {
        let cfg = RunnerConfig::default()
            .with_same_code_execution(true)
            .with_engine_logging(false);
        assert!(cfg.same_code_execution);
        assert!(!cfg.log_engine_messages);
        assert!(!cfg.crash_on_error);
    }
}
