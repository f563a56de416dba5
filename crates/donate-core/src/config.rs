//! client configuration

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::history::HistoryConfig;
use crate::retry::RetryPolicy;
use crate::transaction::FeeConfig;

/// retry settings as written in config files
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
            retry_delay_ms: 2_000,
        }
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(s: &RetrySettings) -> Self {
        RetryPolicy {
            timeout: Duration::from_millis(s.timeout_ms),
            max_attempts: s.max_attempts,
            retry_delay: Duration::from_millis(s.retry_delay_ms),
        }
    }
}

/// history polling settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub poll_interval_ms: u64,
    pub optimistic_delay_ms: u64,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            optimistic_delay_ms: 2_000,
        }
    }
}

/// client configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// donation program on chain
    pub program_id: String,
    /// network the wallet must be connected to
    pub chain_id: String,
    /// fee per transaction
    pub fee_microcredits: u64,
    /// pay fees from a private record instead of the public balance
    pub fee_private: bool,
    pub retry: RetrySettings,
    pub history: HistorySettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            program_id: "donation_v1.aleo".into(),
            chain_id: "testnetbeta".into(),
            fee_microcredits: 500_000,
            fee_private: false,
            retry: RetrySettings::default(),
            history: HistorySettings::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn fee(&self) -> FeeConfig {
        FeeConfig {
            chain_id: self.chain_id.clone(),
            fee_microcredits: self.fee_microcredits,
            fee_private: self.fee_private,
        }
    }

    pub fn history(&self) -> HistoryConfig {
        HistoryConfig {
            program_id: self.program_id.clone(),
            retry: self.retry_policy(),
            poll_interval: Duration::from_millis(self.history.poll_interval_ms),
            optimistic_delay: Duration::from_millis(self.history.optimistic_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_runtime_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.retry_policy(), RetryPolicy::default());

        let history = config.history();
        assert_eq!(history.poll_interval, crate::history::DEFAULT_POLL_INTERVAL);
        assert_eq!(history.optimistic_delay, crate::history::DEFAULT_OPTIMISTIC_DELAY);
    }

    #[test]
    fn test_partial_toml() {
        let config = ClientConfig::from_toml_str(
            r#"
            program_id = "tips_v2.aleo"

            [retry]
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.program_id, "tips_v2.aleo");
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.timeout_ms, 30_000);
        assert_eq!(config.history, HistorySettings::default());
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err = ClientConfig::from_toml_str("program_id = [").unwrap_err();
        assert!(matches!(err, crate::error::DonateError::Config(_)));
    }
}
