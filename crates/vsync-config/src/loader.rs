//! Configuration loader with multi-source merging

use crate::{Paths, VsyncConfig};
use anyhow::{Context, Result};
use std::env;
use std::path::{Path, PathBuf};

/// Loads a [`VsyncConfig`] from defaults, files, and the environment.
pub struct ConfigLoader {
    project_dir: PathBuf,
    env_prefix: String,
    user_config: bool,
}

impl ConfigLoader {
    /// Loader rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            env_prefix: "VSYNC".to_string(),
            user_config: true,
        }
    }

    pub fn with_project_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.project_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Sets the environment variable prefix (default: `VSYNC`).
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skips `~/.config/vsync/config.toml`.
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Merges every source, lowest precedence first, then validates.
    ///
    /// Environment keys use `__` between section and field:
    /// `VSYNC_NODE__ID=3`, `VSYNC_MEMBERSHIP__POLL_INTERVAL_MS=50`.
    pub fn load(self) -> Result<VsyncConfig> {
        let mut builder = config::Config::builder();

        // 1. Built-in defaults
        let defaults = VsyncConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config
        if self.user_config {
            if let Ok(user_config_file) = Paths::new().user_config_file() {
                builder = builder.add_source(
                    config::File::from(user_config_file)
                        .required(false)
                        .format(config::FileFormat::Toml),
                );
            }
        }

        // 3. Project config, then 4. local overrides
        for file in [
            Paths::project_config_file(&self.project_dir),
            Paths::local_config_file(&self.project_dir),
        ] {
            builder = builder.add_source(
                config::File::from(file)
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        // 5. Environment
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let merged = builder.build().context("failed to build configuration")?;
        let mut config: VsyncConfig = merged
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        config.resolve_paths(&self.project_dir);
        config.validate()?;
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
