//! Configuration types consumed by the relay at startup.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::secret::Secret;

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Services to spawn, keyed by service name. Order is preserved and
    /// determines catalog merge order.
    pub services: IndexMap<String, ServiceConfig>,

    /// Observer channel listener.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Path of the shared embedded state store. `None` keeps state
    /// in-memory (single-process runs and tests).
    #[serde(default)]
    pub state_path: Option<PathBuf>,

    /// Bounded await for each forwarded backend call.
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Randomized latency floor applied to non-silent, non-intercepted
    /// calls so the rehearsal feels like a real API.
    #[serde(default = "default_latency_floor_ms")]
    pub latency_floor_ms: u64,

    #[serde(default = "default_latency_ceiling_ms")]
    pub latency_ceiling_ms: u64,

    /// Retained event log capacity, oldest-evicted.
    #[serde(default = "default_retained_events")]
    pub retained_events: usize,

    /// Recipient domains considered internal by the PII scanner. A match
    /// downgrades exfiltration findings from CRITICAL to HIGH.
    #[serde(default)]
    pub internal_domains: Vec<String>,

    /// Optional scenario file evaluated when the run ends. Without one,
    /// the severity-count heuristic scores the run.
    #[serde(default)]
    pub scenario_path: Option<PathBuf>,
}

/// One simulated backend process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Executable to spawn.
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the child process.
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

/// Observer WebSocket listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObserverConfig {
    #[serde(default = "default_observer_host")]
    pub host: String,
    #[serde(default = "default_observer_port")]
    pub port: u16,
    /// When set, unauthenticated observer connections are rejected at
    /// accept time.
    #[serde(default)]
    pub shared_secret: Option<Secret>,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        ObserverConfig {
            host: default_observer_host(),
            port: default_observer_port(),
            shared_secret: None,
        }
    }
}

fn default_observer_host() -> String {
    "127.0.0.1".to_string()
}

fn default_observer_port() -> u16 {
    8765
}

fn default_call_timeout_secs() -> u64 {
    30
}

fn default_latency_floor_ms() -> u64 {
    80
}

fn default_latency_ceiling_ms() -> u64 {
    180
}

fn default_retained_events() -> usize {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_config_default() {
        let config = ObserverConfig::default();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8765);
        assert!(config.shared_secret.is_none());
    }

    #[test]
    fn test_service_config_defaults() {
        let yaml = "command: greenroom-payments\n";
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.args.is_empty());
        assert!(config.env.is_empty());
    }
}
