//! Configuration management for vsync
//!
//! Sources, highest precedence first:
//! 1. Environment variables (`VSYNC_<SECTION>__<KEY>`)
//! 2. `vsync.local.toml` (local overrides, not checked in)
//! 3. `vsync.toml` (project config)
//! 4. `~/.config/vsync/config.toml` (user defaults)
//! 5. Built-in defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::{LOCAL_CONFIG_FILE, PROJECT_CONFIG_FILE, Paths};
pub use vsync_membership::{MembershipConfig, WedgePolicy};

use vsync_types::{NodeAddress, NodeId};

/// Complete node configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VsyncConfig {
    pub node: NodeConfig,
    pub membership: MembershipConfig,
}

/// Identity and storage of the local node (the `[node]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub id: u32,
    pub address: String,
    pub data_dir: PathBuf,
    /// File name of the persisted view inside `data_dir`.
    pub view_file: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: 0,
            address: "127.0.0.1:7000".to_string(),
            data_dir: PathBuf::from(".vsync"),
            view_file: "view".to_string(),
        }
    }
}

impl NodeConfig {
    pub fn node_id(&self) -> NodeId {
        NodeId::new(self.id)
    }

    pub fn node_address(&self) -> Result<NodeAddress, ConfigError> {
        NodeAddress::new(self.address.as_str())
            .map_err(|e| ConfigError::ValidationError(format!("node.address: {e}")))
    }
}

impl VsyncConfig {
    /// Loads from the current directory.
    pub fn load() -> anyhow::Result<Self> {
        ConfigLoader::new().load()
    }

    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        ConfigLoader::new().with_project_dir(project_dir).load()
    }

    /// Where this node's view is persisted.
    pub fn view_path(&self) -> PathBuf {
        self.node.data_dir.join(&self.node.view_file)
    }

    pub fn resolve_paths(&mut self, base_dir: impl AsRef<Path>) {
        if self.node.data_dir.is_relative() {
            self.node.data_dir = base_dir.as_ref().join(&self.node.data_dir);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.node.id == NodeId::RESERVED {
            return Err(ConfigError::ValidationError(format!(
                "node.id {} is reserved",
                self.node.id
            )));
        }
        self.node.node_address()?;
        if self.node.view_file.is_empty() || self.node.view_file.contains(['/', '\\']) {
            return Err(ConfigError::ValidationError(format!(
                "node.view_file {:?} must be a plain file name",
                self.node.view_file
            )));
        }
        if self.membership.change_log_capacity == Some(0) {
            return Err(ConfigError::ValidationError(
                "membership.change_log_capacity must be at least 1".to_string(),
            ));
        }
        if self.membership.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "membership.poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Renders the config as a `vsync.toml` document.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the config to `vsync.toml` in `project_dir`.
    pub fn write_project_file(&self, project_dir: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
        let path = Paths::project_config_file(project_dir);
        std::fs::write(&path, self.to_toml()?).map_err(|source| ConfigError::WriteError {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = VsyncConfig::default();
        config.validate().unwrap();
        assert_eq!(config.view_path(), PathBuf::from(".vsync/view"));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut config = VsyncConfig::default();
        config.membership.change_log_capacity = Some(0);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));

        let mut config = VsyncConfig::default();
        config.node.address = String::new();
        assert!(config.validate().is_err());

        let mut config = VsyncConfig::default();
        config.node.view_file = "nested/view".to_string();
        assert!(config.validate().is_err());

        let mut config = VsyncConfig::default();
        config.membership.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn path_resolution() {
        let mut config = VsyncConfig::default();
        config.resolve_paths("/srv/group");
        assert_eq!(config.node.data_dir, PathBuf::from("/srv/group/.vsync"));
        assert_eq!(config.view_path(), PathBuf::from("/srv/group/.vsync/view"));
    }

    #[test]
    fn rendered_file_loads_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = VsyncConfig::default();
        config.node.id = 7;
        config.membership.wedge_policy = WedgePolicy::Local;
        config.write_project_file(temp_dir.path()).unwrap();

        let loaded = ConfigLoader::new()
            .with_project_dir(temp_dir.path())
            .with_env_prefix("VSYNC_RENDER_TEST")
            .without_user_config()
            .load()
            .unwrap();
        assert_eq!(loaded.node.id, 7);
        assert_eq!(loaded.membership.wedge_policy, WedgePolicy::Local);
    }
}
