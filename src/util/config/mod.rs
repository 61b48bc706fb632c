//! Host configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Environment (JEPATH for the engine library)
//! 2. CLI arguments
//! 3. Config file (--config, or ~/.config/jsm/config.toml)
//! 4. Default values
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use jsm::util::config::{load_user_config, HostConfig};
//!
//! let config: HostConfig = load_user_config().unwrap();
//! let library = config.library_path(std::env::var_os("JEPATH")).unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::console::ConsoleConfig;
use crate::engine::default_library_path;
use crate::registry::RegistryConfig;
use crate::util::logger::LogLevel;

/// Environment variable naming the engine library.
pub const LIBRARY_ENV: &str = "JEPATH";

/// Configuration of the console host
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HostConfig {
    /// Engine library settings
    #[serde(default)]
    pub engine: EngineConfig,
    /// Session registry settings
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Console settings
    #[serde(default)]
    pub console: ConsoleConfig,
    /// Log settings
    #[serde(default)]
    pub log: LogConfig,
    /// Interrupt settings
    #[serde(default)]
    pub interrupt: InterruptConfig,
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Engine library path; defaults to the binary directory
    #[serde(default)]
    pub library: Option<PathBuf>,
}

/// Log configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Interrupt configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptConfig {
    /// Route SIGINT to the session's break cell
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for InterruptConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl HostConfig {
    /// Engine library to load: `env` (the `JEPATH` value) wins, then the
    /// configured path, then the platform library next to the binary.
    pub fn library_path(
        &self,
        env: Option<OsString>,
    ) -> io::Result<PathBuf> {
        if let Some(path) = env.filter(|value| !value.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        match &self.engine.library {
            Some(path) => Ok(path.clone()),
            None => default_library_path(),
        }
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::SerializeError)
    }
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    // Try XDG config directory on Unix
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("jsm"));
    }

    // Fallback to ~/.config/jsm
    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("jsm"));
    }

    // On Windows, try %APPDATA%
    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("jsm"));
    }

    None
}

/// Get the user config file path (~/.config/jsm/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load user-level configuration
/// Returns default config if file doesn't exist
pub fn load_user_config() -> Result<HostConfig, ConfigError> {
    let path = match get_config_path() {
        Some(p) => p,
        None => return Ok(HostConfig::default()),
    };

    if !path.exists() {
        return Ok(HostConfig::default());
    }

    load_from_path(&path)
}

/// Load configuration from an explicit file, which must exist
pub fn load_from_path(path: &Path) -> Result<HostConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::IoError)?;
    parse(&content)
}

/// Parse configuration text
pub fn parse(content: &str) -> Result<HostConfig, ConfigError> {
    toml::from_str(content).map_err(ConfigError::ParseError)
}

/// Write configuration to `path`, creating parent directories
pub fn save_config(
    config: &HostConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir).map_err(ConfigError::IoError)?;
        }
    }

    let content = config.to_toml_string()?;
    fs::write(path, content).map_err(ConfigError::IoError)?;

    Ok(())
}

/// Write configuration to the user config path
pub fn save_user_config(config: &HostConfig) -> Result<(), ConfigError> {
    let path = get_config_path().ok_or(ConfigError::NoConfigDir)?;
    save_config(config, &path)
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    ParseError(toml::de::Error),
    SerializeError(toml::ser::Error),
    NoConfigDir,
}

impl std::fmt::Display for ConfigError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::ParseError(e) => write!(f, "Config parse error: {}", e),
            ConfigError::SerializeError(e) => write!(f, "Config serialize error: {}", e),
            ConfigError::NoConfigDir => write!(f, "Cannot determine config directory"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::IoError(e) => Some(e),
            ConfigError::ParseError(e) => Some(e),
            ConfigError::SerializeError(e) => Some(e),
            ConfigError::NoConfigDir => None,
        }
    }
}
