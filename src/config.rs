use crate::application::charger::RetryPolicy;
use crate::application::dispatcher::DispatchSettings;
use crate::error::{BillingError, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Tunables of the billing engine.
///
/// Loaded from a TOML file; every key is optional and falls back to its
/// default.
///
/// ```toml
/// batch_size = 500
/// delay_between_batches_ms = 2000
/// max_attempts = 3
/// retry_backoff_ms = 3000
/// agent_name = "agent-2"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BillingConfig {
    pub batch_size: usize,
    pub delay_between_batches_ms: u64,
    /// Total provider calls per invoice, retries included.
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    pub agent_name: String,
    pub progress_interval_ms: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            delay_between_batches_ms: 0,
            max_attempts: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
            retry_backoff_ms: RetryPolicy::DEFAULT_BACKOFF.as_millis() as u64,
            agent_name: "agent-1".to_string(),
            progress_interval_ms: 1000,
        }
    }
}

impl BillingConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(raw).map_err(|e| BillingError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(BillingError::ConfigError(
                "batch_size must be greater than zero".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(BillingError::ConfigError(
                "max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            batch_size: self.batch_size,
            delay_between_batches: Duration::from_millis(self.delay_between_batches_ms),
            retry: RetryPolicy::new(
                self.max_attempts,
                Duration::from_millis(self.retry_backoff_ms),
            ),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms.max(1))
    }
}
