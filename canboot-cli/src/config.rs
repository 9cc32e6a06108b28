//! Configuration file support for canboot.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (CANBOOT_*)
//! 3. Local config file (./canboot.toml)
//! 4. Global config file (~/.config/canboot/config.toml)
//!
//! An explicit `--config PATH` replaces both files.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default CAN interface.
pub const DEFAULT_INTERFACE: &str = "can0";

/// Default number of shell history entries kept on disk.
pub const DEFAULT_HISTORY_SIZE: usize = 500;

/// Bus configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BusConfig {
    /// CAN interface name (e.g., "can0" or "vcan0").
    pub interface: Option<String>,
}

/// Device configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Bootloader node id, hex ("0x02") or decimal ("2").
    pub target: Option<String>,
}

/// Interactive shell configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellConfig {
    /// Line history file.
    pub history_file: Option<PathBuf>,
    /// Maximum number of history entries.
    pub history_size: Option<usize>,
    /// Per-frame protocol logging at startup.
    pub verbose: Option<bool>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bus configuration.
    #[serde(default)]
    pub bus: BusConfig,
    /// Device configuration.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Shell configuration.
    #[serde(default)]
    pub shell: ShellConfig,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        // Load global config
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        // Load local config (overrides global)
        if let Some(local_config) = Self::load_from_file(Path::new("canboot.toml")) {
            debug!("Loaded local config from canboot.toml");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "canboot")
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Interface to use when none is given on the command line.
    pub fn interface(&self) -> &str {
        self.bus
            .interface
            .as_deref()
            .unwrap_or(DEFAULT_INTERFACE)
    }

    /// Shell history file, falling back to the per-user data directory.
    pub fn history_path(&self) -> Option<PathBuf> {
        self.shell
            .history_file
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join("history")))
    }

    /// Maximum number of history entries.
    pub fn history_size(&self) -> usize {
        self.shell
            .history_size
            .unwrap_or(DEFAULT_HISTORY_SIZE)
    }

    /// Merge another config into this one.
    fn merge(&mut self, other: Self) {
        if other.bus.interface.is_some() {
            self.bus.interface = other.bus.interface;
        }
        if other.device.target.is_some() {
            self.device.target = other.device.target;
        }
        if other.shell.history_file.is_some() {
            self.shell.history_file = other.shell.history_file;
        }
        if other.shell.history_size.is_some() {
            self.shell.history_size = other.shell.history_size;
        }
        if other.shell.verbose.is_some() {
            self.shell.verbose = other.shell.verbose;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.bus.interface.is_none());
        assert!(config.device.target.is_none());
        assert!(config.shell.history_file.is_none());
        assert_eq!(config.interface(), "can0");
        assert_eq!(config.history_size(), DEFAULT_HISTORY_SIZE);
    }

    #[test]
    fn test_config_merge_overrides() {
        let mut base = Config::default();
        base.bus.interface = Some("can0".to_string());
        base.shell.verbose = Some(true);

        let mut other = Config::default();
        other.bus.interface = Some("vcan0".to_string());
        other.device.target = Some("0x03".to_string());

        base.merge(other);

        assert_eq!(base.interface(), "vcan0");
        assert_eq!(base.device.target.as_deref(), Some("0x03"));
        assert_eq!(base.shell.verbose, Some(true));
    }

    #[test]
    fn test_config_merge_does_not_overwrite_with_none() {
        let mut base = Config::default();
        base.bus.interface = Some("can1".to_string());
        base.shell.history_size = Some(10);

        base.merge(Config::default());

        assert_eq!(base.interface(), "can1");
        assert_eq!(base.history_size(), 10);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[bus]
interface = "vcan0"

[device]
target = "0x1F"

[shell]
history_file = "/tmp/canboot_history"
history_size = 50
verbose = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.interface(), "vcan0");
        assert_eq!(config.device.target.as_deref(), Some("0x1F"));
        assert_eq!(
            config.history_path(),
            Some(PathBuf::from("/tmp/canboot_history"))
        );
        assert_eq!(config.history_size(), 50);
        assert_eq!(config.shell.verbose, Some(false));
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.bus.interface.is_none());
        assert!(config.shell.verbose.is_none());
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("canboot.toml");
        fs::write(&path, "[bus]\ninterface = \"can7\"\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.interface(), "can7");
    }

    #[test]
    fn test_load_from_path_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[bus\ninterface = ").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.bus.interface.is_none());
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.bus.interface.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            assert!(p.to_string_lossy().contains("canboot"));
            assert!(p.to_string_lossy().ends_with("config.toml"));
        }
    }

    #[test]
    fn test_default_history_path() {
        if let Some(p) = Config::default().history_path() {
            assert!(p.to_string_lossy().contains("canboot"));
            assert!(p.ends_with("history"));
        }
    }
}
