//! Configuration loader with multi-source merging

use crate::{AtollConfig, Paths};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default project directory (current dir)
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "ATOLL".to_string(),
        }
    }

    /// Set the project directory
    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the environment variable prefix (default: "ATOLL")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<AtollConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = AtollConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/atoll/config.toml)
        let paths = Paths::new();
        if let Ok(user_config_file) = paths.user_config_file() {
            if user_config_file.exists() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 3. Project config (atoll.toml)
        let project_config_file = Paths::project_config_file(&self.project_dir);
        if project_config_file.exists() {
            builder = builder.add_source(
                config::File::from(project_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Local config (atoll.local.toml, gitignored)
        let local_config_file = Paths::local_config_file(&self.project_dir);
        if local_config_file.exists() {
            builder = builder.add_source(
                config::File::from(local_config_file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment variables (ATOLL_*)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .separator("_")
                .try_parsing(true),
        );

        // Build and deserialize
        let config = builder.build().context("Failed to build configuration")?;

        let atoll_config: AtollConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        Ok(atoll_config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default(self) -> AtollConfig {
        self.load().unwrap_or_default()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .load()
            .expect("Failed to load config");

        assert_eq!(config.project.name, "atoll-cluster");
        assert_eq!(config.topology.lock_retry_interval_ms, 10_000);
    }

    #[test]
    fn test_project_config_overrides_defaults() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            Paths::project_config_file(temp_dir.path()),
            "[topology]\nlock_retry_interval_ms = 500\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .load()
            .expect("Failed to load config");

        assert_eq!(config.topology.lock_retry_interval_ms, 500);
        // Untouched sections keep their defaults.
        assert_eq!(config.topology.lock_retry_limit, 0);
    }

    #[test]
    fn test_local_config_overrides_project_config() {
        let temp_dir = tempdir().expect("Failed to create temp dir");
        fs::write(
            Paths::project_config_file(temp_dir.path()),
            "[project]\nname = \"ring-a\"\n",
        )
        .unwrap();
        fs::write(
            Paths::local_config_file(temp_dir.path()),
            "[project]\nname = \"ring-local\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .load()
            .expect("Failed to load config");

        assert_eq!(config.project.name, "ring-local");
    }
}
