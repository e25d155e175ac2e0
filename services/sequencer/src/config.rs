//! Sequencer configuration

use std::time::Duration;

use serde::Deserialize;

use types::ids::{LogId, MapId};

use crate::error::SequencerError;

/// Configuration of one sequencer instance.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    pub map_id: MapId,
    pub log_id: LogId,
    /// Tick cadence and per-RPC deadline.
    pub min_interval_ms: u64,
    /// Longest allowed gap between epochs.
    pub max_interval_ms: u64,
    /// Use backend leaves without checking their proofs.
    pub trust_backend: bool,
    /// Hex Ed25519 key of the map backend; required when `trust_backend`
    /// is false.
    pub map_public_key: Option<String>,
    pub witness_timeout_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            map_id: MapId::new(1),
            log_id: LogId::new(2),
            min_interval_ms: 1_000,
            max_interval_ms: 60_000,
            trust_backend: true,
            map_public_key: None,
            witness_timeout_ms: 2_000,
        }
    }
}

impl SequencerConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }

    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms)
    }

    pub fn witness_timeout(&self) -> Duration {
        Duration::from_millis(self.witness_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), SequencerError> {
        if self.min_interval_ms == 0 {
            return Err(SequencerError::Config("min_interval_ms must be positive".into()));
        }
        if self.max_interval_ms < self.min_interval_ms {
            return Err(SequencerError::Config(format!(
                "max_interval_ms ({}) is below min_interval_ms ({})",
                self.max_interval_ms, self.min_interval_ms
            )));
        }
        if !self.trust_backend && self.map_public_key.is_none() {
            return Err(SequencerError::Config(
                "untrusted backend mode needs map_public_key".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SequencerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_max_below_min_rejected() {
        let config = SequencerConfig {
            min_interval_ms: 5_000,
            max_interval_ms: 1_000,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SequencerError::Config(_))));
    }

    #[test]
    fn test_zero_min_rejected() {
        let config = SequencerConfig {
            min_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_untrusted_requires_key() {
        let mut config = SequencerConfig {
            trust_backend: false,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        config.map_public_key = Some("00".repeat(32));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: SequencerConfig =
            serde_json::from_str(r#"{"map_id": 9, "min_interval_ms": 250}"#).unwrap();
        assert_eq!(config.map_id, MapId::new(9));
        assert_eq!(config.min_interval(), Duration::from_millis(250));
        assert_eq!(config.max_interval_ms, 60_000);
        assert!(config.trust_backend);
    }
}
