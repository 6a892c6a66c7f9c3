//! Configuration management for Atoll
//!
//! Provides hierarchical configuration loading from multiple sources:
//! 1. Environment variables (ATOLL_* prefix, highest precedence)
//! 2. atoll.local.toml (gitignored, local overrides)
//! 3. atoll.toml (git-tracked, project config)
//! 4. ~/.config/atoll/config.toml (user defaults)
//! 5. Built-in defaults (lowest precedence)

use std::time::Duration;

use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

/// Main Atoll configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AtollConfig {
    pub project: ProjectConfig,
    pub topology: TopologyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: "atoll-cluster".to_string(),
        }
    }
}

/// Tunables of the topology-change coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Back-off between ring-lock acquisition attempts, in milliseconds.
    pub lock_retry_interval_ms: u64,

    /// Maximum lock acquisition attempts before the lock step gives up and
    /// surfaces contention to the operator. 0 means retry forever.
    pub lock_retry_limit: u32,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            lock_retry_interval_ms: 10_000,
            lock_retry_limit: 0,
        }
    }
}

impl TopologyConfig {
    /// The lock retry back-off as a [`Duration`].
    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = AtollConfig::default();
        assert_eq!(config.project.name, "atoll-cluster");
        assert_eq!(config.topology.lock_retry_interval(), Duration::from_secs(10));
        assert_eq!(config.topology.lock_retry_limit, 0);
    }

    #[test]
    fn partial_toml_keeps_defaults_for_missing_fields() {
        let config: AtollConfig =
            toml::from_str("[topology]\nlock_retry_interval_ms = 250\n").unwrap();
        assert_eq!(config.topology.lock_retry_interval(), Duration::from_millis(250));
        assert_eq!(config.topology.lock_retry_limit, 0);
        assert_eq!(config.project.name, "atoll-cluster");
    }
}
