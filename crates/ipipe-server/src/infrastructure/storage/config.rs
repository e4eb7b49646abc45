//! TOML configuration for the Input Pipe server.
//!
//! The file is looked up in this order:
//!
//! 1. The path given as the first command-line argument.
//! 2. `$XDG_CONFIG_HOME/inputpipe/server.toml` (or `~/.config/inputpipe/server.toml`).
//! 3. Built-in defaults when neither exists.
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 7192
//! max_payload_len = 65535
//! log_level = "info"
//! device_backend = "uinput"   # or "logging"
//! ```
//!
//! Every field has a serde default, so a file containing only `[server]`
//! (or nothing at all) is valid.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use ipipe_core::protocol::{DEFAULT_PORT, MAX_PAYLOAD_LEN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    /// `bind_address` is not an IP address.
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),
    /// `max_payload_len` is zero or larger than the length field allows.
    #[error("max_payload_len must be between 1 and 65535, got {0}")]
    InvalidPayloadLimit(usize),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
}

/// Listener and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// IP address to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest packet payload accepted before the session is dropped.
    #[serde(default = "default_max_payload_len")]
    pub max_payload_len: usize,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Where forwarded devices are created.
    #[serde(default)]
    pub device_backend: DeviceBackend,
}

/// How the server realises forwarded devices.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceBackend {
    /// Kernel devices through `/dev/uinput` (Linux only).
    #[default]
    Uinput,
    /// Devices that only log what they receive.
    Logging,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_payload_len() -> usize {
    MAX_PAYLOAD_LEN
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            max_payload_len: default_max_payload_len(),
            log_level: default_log_level(),
            device_backend: DeviceBackend::default(),
        }
    }
}

impl ServerConfig {
    /// Socket address the listener binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] if `bind_address` does not parse.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Checks the values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;
        if self.max_payload_len == 0 || self.max_payload_len > MAX_PAYLOAD_LEN {
            return Err(ConfigError::InvalidPayloadLimit(self.max_payload_len));
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if neither `XDG_CONFIG_HOME`
/// nor `HOME` is set.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("server.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `explicit`, or from the default location when `None`.
///
/// A missing file at the default location yields `AppConfig::default()`; a
/// missing explicit file is an error.
///
/// # Errors
///
/// [`ConfigError::Io`], [`ConfigError::Parse`], or a validation error.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let cfg = match explicit {
        Some(path) => load_config_from(path)?,
        None => match config_file_path() {
            Ok(path) if path.exists() => load_config_from(&path)?,
            _ => AppConfig::default(),
        },
    };
    cfg.server.validate()?;
    Ok(cfg)
}

/// Reads and parses the config file at `path`.
///
/// # Errors
///
/// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`] if
/// it is not valid TOML for this schema.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

fn platform_config_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("inputpipe"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listens_on_all_interfaces_port_7192() {
        let cfg = AppConfig::default();
        assert_eq!(
            cfg.server.listen_addr().unwrap(),
            "0.0.0.0:7192".parse::<SocketAddr>().unwrap()
        );
        assert_eq!(cfg.server.max_payload_len, 65535);
        assert_eq!(cfg.server.log_level, "info");
        assert_eq!(cfg.server.device_backend, DeviceBackend::Uinput);
    }

    #[test]
    fn test_device_backend_parses_lowercase_names() {
        let cfg: AppConfig =
            toml::from_str("[server]\ndevice_backend = \"logging\"\n").expect("deserialize");
        assert_eq!(cfg.server.device_backend, DeviceBackend::Logging);

        let bad: Result<AppConfig, _> = toml::from_str("[server]\ndevice_backend = \"hid\"\n");
        assert!(bad.is_err());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("deserialize");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_fills_missing_fields() {
        // Arrange
        let text = "[server]\nport = 9000\n";

        // Act
        let cfg: AppConfig = toml::from_str(text).expect("deserialize");

        // Assert
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_round_trip() {
        let mut cfg = AppConfig::default();
        cfg.server.bind_address = "127.0.0.1".into();
        cfg.server.max_payload_len = 1024;

        let text = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&text).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let mut cfg = ServerConfig::default();
        cfg.bind_address = "not-an-ip".into();
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidBindAddress(_))));
    }

    #[test]
    fn test_payload_limit_bounds() {
        let mut cfg = ServerConfig::default();
        cfg.max_payload_len = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::InvalidPayloadLimit(0))));
        cfg.max_payload_len = 70_000;
        assert!(cfg.validate().is_err());
        cfg.max_payload_len = 16;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let result = load_config(Some(Path::new("/nonexistent/inputpipe/server.toml")));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_explicit_file_is_loaded() {
        // Arrange
        let path = std::env::temp_dir().join(format!("ipipe-server-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[server]\nport = 7300\nlog_level = \"debug\"\n").unwrap();

        // Act
        let cfg = load_config(Some(&path)).unwrap();
        std::fs::remove_file(&path).ok();

        // Assert
        assert_eq!(cfg.server.port, 7300);
        assert_eq!(cfg.server.log_level, "debug");
    }
}
