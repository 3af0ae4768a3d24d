use std::env;

use serde::{Deserialize, Serialize};

use crate::error::history;

/// Interpreter and bridge settings applied at setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Entries kept in the error history.
    pub error_history: usize,
    pub gc_enabled: bool,
    /// Allocations between automatic collections.
    pub gc_threshold: usize,
    /// Log every dispatch at `debug` instead of `trace`.
    pub trace_dispatch: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            error_history: history::DEFAULT_CAPACITY,
            gc_enabled: true,
            gc_threshold: 10_000,
            trace_dispatch: false,
        }
    }
}

fn flag(name: &str) -> bool {
    matches!(
        env::var(name).ok().as_deref().map(str::trim),
        Some("1") | Some("true") | Some("yes") | Some("on")
    )
}

fn number(name: &str) -> Option<usize> {
    env::var(name).ok().and_then(|raw| raw.trim().parse().ok())
}

impl BridgeConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Defaults overridden by `RBGATE_ERROR_HISTORY`, `RBGATE_NO_GC`,
    /// `RBGATE_GC_THRESHOLD` and `RBGATE_TRACE`. Unparsable values are
    /// ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(n) = number("RBGATE_ERROR_HISTORY") {
            config.error_history = n;
        }
        if flag("RBGATE_NO_GC") {
            config.gc_enabled = false;
        }
        if let Some(n) = number("RBGATE_GC_THRESHOLD") {
            config.gc_threshold = n;
        }
        if flag("RBGATE_TRACE") {
            config.trace_dispatch = true;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = BridgeConfig::from_json(r#"{ "gc_threshold": 2048 }"#).unwrap();
        assert_eq!(config.gc_threshold, 2048);
        assert_eq!(config.error_history, 12);
        assert!(config.gc_enabled);
        assert!(!config.trace_dispatch);
    }

    #[test]
    fn unknown_types_are_rejected() {
        assert!(BridgeConfig::from_json(r#"{ "gc_enabled": "maybe" }"#).is_err());
    }

    #[test]
    fn round_trips_through_json() {
        let config = BridgeConfig {
            error_history: 3,
            gc_enabled: false,
            gc_threshold: 4096,
            trace_dispatch: true,
        };
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(BridgeConfig::from_json(&text).unwrap(), config);
    }
}
