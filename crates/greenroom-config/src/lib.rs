mod secret;
mod types;
mod validation;

use std::path::Path;

pub use secret::Secret;
pub use types::*;

/// Configuration errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("No services configured")]
    NoServices,

    #[error("Service '{0}' has an empty spawn command")]
    EmptyCommand(String),

    #[error("Unknown service: {0}")]
    UnknownService(String),

    #[error("Invalid latency window: floor {0}ms exceeds ceiling {1}ms")]
    InvalidLatencyWindow(u64, u64),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RelayConfig {
    /// Parse a relay configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a relay configuration from a file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Look up a configured service by name. An unknown name is a fatal
    /// configuration error, not a runtime condition.
    pub fn service(&self, name: &str) -> Result<&ServiceConfig, ConfigError> {
        self.services
            .get(name)
            .ok_or_else(|| ConfigError::UnknownService(name.to_string()))
    }
}
