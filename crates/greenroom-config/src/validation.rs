//! Startup validation. Everything here is fatal: a relay that cannot
//! trust its configuration must not start.

use crate::types::RelayConfig;
use crate::ConfigError;

impl RelayConfig {
    /// Validate the configuration. Called by `from_yaml`/`from_file`;
    /// programmatically-built configs should call it before use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::NoServices);
        }

        for (name, service) in &self.services {
            if service.command.trim().is_empty() {
                return Err(ConfigError::EmptyCommand(name.clone()));
            }
        }

        if self.latency_floor_ms > self.latency_ceiling_ms {
            return Err(ConfigError::InvalidLatencyWindow(
                self.latency_floor_ms,
                self.latency_ceiling_ms,
            ));
        }

        if self.call_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "call_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.retained_events == 0 {
            return Err(ConfigError::InvalidConfig(
                "retained_events must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
