//! TOML configuration for the Input Pipe client.
//!
//! The file is looked up in this order:
//!
//! 1. The path given as the first command-line argument.
//! 2. `$XDG_CONFIG_HOME/inputpipe/client.toml` (or `~/.config/inputpipe/client.toml`).
//! 3. Built-in defaults when neither exists.
//!
//! # Example (for beginners)
//!
//! ```toml
//! [client]
//! server_address = "192.168.1.20:7192"
//! reconnect = true
//! reconnect_interval_secs = 5
//! log_level = "info"
//!
//! [source]
//! evdev_path = "/dev/input/event5"
//!
//! [device]
//! name = "Logitech Gamepad F310"
//! ff_effects_max = 0
//!
//! [device.id]
//! bustype = 3
//! vendor = 0x046d
//! product = 0xc21d
//! version = 0x4014
//!
//! [[device.bits]]
//! category = 0          # event types: EV_SYN, EV_KEY, EV_ABS
//! codes = [0, 1, 3]
//!
//! [[device.bits]]
//! category = 1          # keys / buttons
//! codes = [304, 305, 307, 308]
//!
//! [[device.axes]]
//! axis = 0
//! min = -32768
//! max = 32767
//! fuzz = 16
//! flat = 128
//! ```
//!
//! The client asks the input device for its own description.  Every field
//! set in `[device]` replaces the matching queried one: `name`, `id` and
//! `ff_effects_max` as a whole, `[[device.bits]]` per category and
//! `[[device.axes]]` per axis.  Fields left out keep what the device reported.

use std::path::{Path, PathBuf};
use std::time::Duration;

use ipipe_core::protocol::DEFAULT_PORT;
use ipipe_core::{AbsInfo, CapabilityBits, DeviceDescriptor, InputId};
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
    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level client configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub device: DeviceConfig,
}

/// Connection and logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    /// `host:port` of the server.
    #[serde(default = "default_server_address")]
    pub server_address: String,
    /// Reconnect after the connection drops.
    #[serde(default = "default_true")]
    pub reconnect: bool,
    /// Seconds between connection attempts.
    #[serde(default = "default_reconnect_interval_secs")]
    pub reconnect_interval_secs: u64,
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Where events are captured from.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SourceConfig {
    /// Linux event device node, e.g. `/dev/input/event3`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evdev_path: Option<PathBuf>,
}

/// Description of the forwarded device.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<InputId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ff_effects_max: Option<u32>,
    #[serde(default)]
    pub bits: Vec<BitsConfig>,
    #[serde(default)]
    pub axes: Vec<AbsInfo>,
}

/// One capability category, listed as the codes that are present.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BitsConfig {
    pub category: u16,
    #[serde(default)]
    pub codes: Vec<u16>,
    /// Bitmap width in bits.  Defaults to just past the highest code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u16>,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_server_address() -> String {
    format!("127.0.0.1:{DEFAULT_PORT}")
}

fn default_true() -> bool {
    true
}

fn default_reconnect_interval_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_address: default_server_address(),
            reconnect: default_true(),
            reconnect_interval_secs: default_reconnect_interval_secs(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }
}

impl BitsConfig {
    pub fn to_capability(&self) -> CapabilityBits {
        let mut bits = CapabilityBits::new(self.category, self.count.unwrap_or(0));
        for &code in &self.codes {
            bits.set(code);
        }
        bits
    }
}

impl DeviceConfig {
    /// Builds a descriptor from this section alone.
    pub fn to_descriptor(&self) -> DeviceDescriptor {
        self.apply_to(DeviceDescriptor::default())
    }

    /// Overrides the fields of `queried` that this section sets.
    ///
    /// Later entries for the same axis or category replace earlier ones.
    pub fn apply_to(&self, queried: DeviceDescriptor) -> DeviceDescriptor {
        let mut descriptor = queried;
        if let Some(name) = &self.name {
            descriptor.name = Some(name.clone());
        }
        if self.id.is_some() {
            descriptor.id = self.id;
        }
        if self.ff_effects_max.is_some() {
            descriptor.ff_effects_max = self.ff_effects_max;
        }
        for bits in &self.bits {
            descriptor.set_capability(bits.to_capability());
        }
        for axis in &self.axes {
            descriptor.set_axis(*axis);
        }
        descriptor
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
        .map(|dir| dir.join("client.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `explicit`, or from the default location when `None`.
///
/// A missing file at the default location yields `AppConfig::default()`; a
/// missing explicit file is an error.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Parse`].
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match explicit {
        Some(path) => load_config_from(path),
        None => match config_file_path() {
            Ok(path) if path.exists() => load_config_from(&path),
            _ => Ok(AppConfig::default()),
        },
    }
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

/// Writes `config` to `path`, creating parent directories as needed.
///
/// Used by `ipipe-client --write-config <path>` to produce a starting file.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(base.join("inputpipe"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
