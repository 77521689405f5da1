//! Player configuration loading

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::events::ActionAtItemEnd;

/// Default position-check interval (milliseconds).
const DEFAULT_TICK_INTERVAL_MS: u64 = 500;

/// Tunable player configuration, loadable from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Interval between playhead position checks. Mid-roll cue point
    /// detection is late by at most one interval.
    pub tick_interval_ms: u64,

    /// Initial action taken when the current item finishes.
    pub action_at_item_end: ActionAtItemEnd,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            action_at_item_end: ActionAtItemEnd::Advance,
        }
    }
}

impl PlayerConfig {
    /// Parse a configuration from a TOML string.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| Error::Config(e.to_string()))
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.tick_interval_ms, 500);
        assert_eq!(config.action_at_item_end, ActionAtItemEnd::Advance);
    }

    #[test]
    fn test_from_toml_str() {
        let config = PlayerConfig::from_toml_str(
            r#"
            tick_interval_ms = 250
            action_at_item_end = "pause"
            "#,
        )
        .unwrap();
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.action_at_item_end, ActionAtItemEnd::Pause);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = PlayerConfig::from_toml_str("tick_interval_ms = 100").unwrap();
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.action_at_item_end, ActionAtItemEnd::Advance);
    }

    #[test]
    fn test_bad_toml_is_a_config_error() {
        let err = PlayerConfig::from_toml_str("tick_interval_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
