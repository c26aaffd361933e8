//! Configuration loader with file resolution and environment overrides.

use super::error::{ConfigError, ConfigResult};
use super::schema::Config;
use std::path::{Path, PathBuf};

/// Config file name
const CONFIG_FILE_NAME: &str = "bridge.toml";

/// Environment variable for an explicit config path
const CONFIG_PATH_ENV: &str = "SERIAL_BRIDGE_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `SERIAL_BRIDGE_CONFIG` environment variable (explicit path)
    /// 2. `./bridge.toml` (current directory)
    /// 3. `~/.config/serial-tcp-bridge/bridge.toml` (or `%APPDATA%`)
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables can then override individual values.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = match config_path {
            Some(ref path) => load_from_file(path)?,
            None => Config::default(),
        };
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path,
            config,
        })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    ///
    /// Environment overrides still apply, so a malformed override is an
    /// error here just as it is in [`ConfigLoader::load`].
    pub fn with_defaults() -> ConfigResult<Self> {
        let mut config = Config::default();
        apply_env_overrides(&mut config)?;

        Ok(Self {
            config_path: None,
            config,
        })
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    if let Some(config_dir) = get_config_dir() {
        let app_config = config_dir.join("serial-tcp-bridge").join(CONFIG_FILE_NAME);
        if app_config.exists() {
            return Some(app_config);
        }
    }

    None
}

fn get_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(not(target_os = "windows"))]
    {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            return Some(PathBuf::from(xdg));
        }
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join(".config"))
    }
}

fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&contents)?)
}

/// Apply `SERIAL_BRIDGE_<SECTION>_<KEY>` environment overrides.
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    if let Ok(host) = std::env::var("SERIAL_BRIDGE_BRIDGE_HOST") {
        config.bridge.host = host;
    }
    if let Ok(port) = std::env::var("SERIAL_BRIDGE_BRIDGE_PORT") {
        config.bridge.port = port
            .parse()
            .map_err(|_| ConfigError::env_parse("SERIAL_BRIDGE_BRIDGE_PORT", "expected a port number"))?;
    }
    if let Ok(device) = std::env::var("SERIAL_BRIDGE_BRIDGE_DEVICE") {
        config.bridge.device = device;
    }
    if let Ok(baud) = std::env::var("SERIAL_BRIDGE_BRIDGE_BAUD_RATE") {
        config.bridge.baud_rate = baud.parse().map_err(|_| {
            ConfigError::env_parse("SERIAL_BRIDGE_BRIDGE_BAUD_RATE", "expected an integer baud rate")
        })?;
    }
    if let Ok(level) = std::env::var("SERIAL_BRIDGE_LOGGING_LEVEL") {
        config.logging.level = level;
    }
    Ok(())
}
