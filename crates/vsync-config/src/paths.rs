//! Path utilities and XDG directory discovery

use crate::ConfigError;
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// Project config file name.
pub const PROJECT_CONFIG_FILE: &str = "vsync.toml";

/// Local override file name (not checked in).
pub const LOCAL_CONFIG_FILE: &str = "vsync.local.toml";

/// XDG-compliant paths for vsync
pub struct Paths {
    project_dirs: Option<ProjectDirs>,
}

impl Paths {
    pub fn new() -> Self {
        Self {
            project_dirs: ProjectDirs::from("org", "vsync", "vsync"),
        }
    }

    /// User config directory (~/.config/vsync/)
    pub fn user_config_dir(&self) -> Result<PathBuf, ConfigError> {
        self.project_dirs
            .as_ref()
            .map(|p| p.config_dir().to_path_buf())
            .ok_or_else(|| ConfigError::XdgError("cannot determine user config directory".to_string()))
    }

    /// User config file (~/.config/vsync/config.toml)
    pub fn user_config_file(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.user_config_dir()?.join("config.toml"))
    }

    pub fn project_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(PROJECT_CONFIG_FILE)
    }

    pub fn local_config_file(project_dir: impl AsRef<Path>) -> PathBuf {
        project_dir.as_ref().join(LOCAL_CONFIG_FILE)
    }

    /// True if `project_dir` has a `vsync.toml`.
    pub fn is_initialized(project_dir: impl AsRef<Path>) -> bool {
        Self::project_config_file(project_dir).exists()
    }
}

impl Default for Paths {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn user_dirs_mention_vsync() {
        if let Ok(dir) = Paths::new().user_config_dir() {
            assert!(dir.to_string_lossy().contains("vsync"));
        }
    }

    #[test]
    fn project_files() {
        let temp_dir = tempdir().unwrap();
        let project_dir = temp_dir.path();

        assert_eq!(
            Paths::project_config_file(project_dir),
            project_dir.join("vsync.toml")
        );
        assert_eq!(
            Paths::local_config_file(project_dir),
            project_dir.join("vsync.local.toml")
        );

        assert!(!Paths::is_initialized(project_dir));
        std::fs::write(Paths::project_config_file(project_dir), "[node]\nid = 1\n").unwrap();
        assert!(Paths::is_initialized(project_dir));
    }
}
