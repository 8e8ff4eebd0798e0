//! Server configuration.

use serde::Deserialize;
use trialworks_game::{EngineConfig, HubSpec};
use trialworks_tick::TickConfig;

use crate::TrialworksError;

/// Everything the server needs before it starts.
///
/// Deserializes with `#[serde(default)]`, so `{}` is a valid config: one
/// lobby-only hub ticking at 20 Hz.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The clock that advances every game timer.
    pub tick: TickConfig,
    /// Capacity of the command channel in front of the server task.
    pub command_channel_size: usize,
    /// Default `tracing` directive when `RUST_LOG` is unset.
    pub log_filter: String,
    pub engine: EngineConfig,
    /// Hubs created at startup, in order. The first one is where new
    /// clients land.
    pub hubs: Vec<HubSpec>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick: TickConfig::with_rate(20),
            command_channel_size: 256,
            log_filter: "info".into(),
            engine: EngineConfig::default(),
            hubs: vec![HubSpec::default()],
        }
    }
}

impl ServerConfig {
    /// Parses and validates a JSON config.
    pub fn from_json_str(text: &str) -> Result<Self, TrialworksError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TrialworksError> {
        if self.command_channel_size == 0 {
            return Err(TrialworksError::InvalidConfig(
                "command_channel_size must be at least 1".into(),
            ));
        }
        if let Some(i) = self.hubs.iter().position(|hub| hub.areas.is_empty()) {
            return Err(TrialworksError::InvalidConfig(format!(
                "hub {i} has no areas"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_str_empty_object_uses_defaults() {
        let config = ServerConfig::from_json_str("{}").unwrap();
        assert_eq!(config.tick.tick_rate_hz, 20);
        assert_eq!(config.command_channel_size, 256);
        assert_eq!(config.log_filter, "info");
        assert!(config.engine.validate_structure);
        assert_eq!(config.hubs.len(), 1);
    }

    #[test]
    fn test_from_json_str_reads_hubs_and_areas() {
        let config = ServerConfig::from_json_str(
            r#"{
                "log_filter": "trialworks_game=debug",
                "tick": { "tick_rate_hz": 10, "late_policy": "keep_cadence" },
                "hubs": [
                    { "name": "Courthouse", "areas": [
                        { "name": "Lobby" },
                        { "name": "Courtroom", "bullet": true }
                    ] },
                    { "areas": [{ "name": "Annex" }] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.log_filter, "trialworks_game=debug");
        assert_eq!(config.tick.tick_rate_hz, 10);
        assert_eq!(config.hubs.len(), 2);
        assert_eq!(config.hubs[0].name, "Courthouse");
        assert_eq!(config.hubs[0].areas[1].name, "Courtroom");
        assert_eq!(config.hubs[1].areas.len(), 1);
    }

    #[test]
    fn test_from_json_str_zero_channel_fails() {
        let err = ServerConfig::from_json_str(r#"{ "command_channel_size": 0 }"#).unwrap_err();
        assert!(matches!(err, TrialworksError::InvalidConfig(_)));
    }

    #[test]
    fn test_from_json_str_hub_without_areas_fails() {
        let err = ServerConfig::from_json_str(r#"{ "hubs": [{ "areas": [] }] }"#).unwrap_err();
        assert!(err.to_string().contains("hub 0 has no areas"));
    }

    #[test]
    fn test_from_json_str_malformed_fails() {
        let err = ServerConfig::from_json_str("{ tick: 20 }").unwrap_err();
        assert!(matches!(err, TrialworksError::ConfigParse(_)));
    }
}
