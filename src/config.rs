//! Engine configuration.
//!
//! All parties of a computation must use the same strategy and batch size, since both determine
//! which protocols exchange messages together.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Errors in an [`EngineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration is not valid JSON or has unknown fields.
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// Batches must hold at least one protocol.
    #[error("the maximum batch size must be at least 1")]
    ZeroBatchSize,
    /// Receives must be allowed to wait.
    #[error("the round timeout must be at least 1ms")]
    ZeroTimeout,
}

/// The order in which ready protocols are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStrategy {
    /// Evaluates one protocol through all of its rounds before starting the next.
    Sequential,
    /// Evaluates one round of every ready protocol, then exchanges all messages at once.
    #[default]
    SequentialBatched,
}

/// Configuration of an [`crate::engine::Engine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How ready protocols are scheduled.
    pub strategy: EvaluationStrategy,
    /// The maximum number of protocols evaluated in one batch.
    pub max_batch_size: usize,
    /// How long to wait for the messages of a round, in milliseconds.
    pub round_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategy: EvaluationStrategy::default(),
            max_batch_size: 4096,
            round_timeout_ms: 10 * 60 * 1000,
        }
    }
}

impl EngineConfig {
    /// A default configuration using `strategy`.
    pub fn with_strategy(strategy: EvaluationStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration. Missing fields take their default values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that the configuration can be used.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_batch_size == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        if self.round_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }

    /// The round timeout as a [`Duration`].
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_fills_in_defaults() -> Result<(), ConfigError> {
        let config = EngineConfig::from_json(r#"{"strategy": "sequential"}"#)?;
        assert_eq!(config.strategy, EvaluationStrategy::Sequential);
        assert_eq!(config.max_batch_size, 4096);
        assert_eq!(config.round_timeout(), Duration::from_secs(600));

        let config = EngineConfig::from_json(r#"{"max_batch_size": 8, "round_timeout_ms": 50}"#)?;
        assert_eq!(config.strategy, EvaluationStrategy::SequentialBatched);
        assert_eq!(config.max_batch_size, 8);
        assert_eq!(config.round_timeout(), Duration::from_millis(50));
        Ok(())
    }

    #[test]
    fn invalid_configs_are_rejected() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"max_batch_size": 0}"#),
            Err(ConfigError::ZeroBatchSize)
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"round_timeout_ms": 0}"#),
            Err(ConfigError::ZeroTimeout)
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"strategy": "parallel"}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"batch": 1}"#),
            Err(ConfigError::Parse(_))
        ));
    }
}
