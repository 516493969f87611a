//! File and environment configuration for bluelane.
//!
//! TOML profiles plus `BLUELANE_*` environment overrides, translated into
//! `bluelane_core::EngineConfig`. The engine itself never reads files.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bluelane_core::{EngineConfig, OperationTimeouts, Platform};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no profile named '{profile}'")]
    UnknownProfile { profile: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when none is named.
    pub default_profile: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

/// Values every profile starts from.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    /// Native stack name; detected from the build target when absent.
    pub platform: Option<String>,

    #[serde(default)]
    pub timeouts: Timeouts,

    #[serde(default = "default_mtu_request_delay_ms")]
    pub mtu_request_delay_ms: u64,

    #[serde(default = "default_disconnect_min_gap_ms")]
    pub disconnect_min_gap_ms: u64,

    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    #[serde(default = "default_true")]
    pub subscribe_to_services_changed: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            platform: None,
            timeouts: Timeouts::default(),
            mtu_request_delay_ms: default_mtu_request_delay_ms(),
            disconnect_min_gap_ms: default_disconnect_min_gap_ms(),
            event_channel_capacity: default_event_channel_capacity(),
            subscribe_to_services_changed: true,
        }
    }
}

fn default_mtu_request_delay_ms() -> u64 {
    350
}
fn default_disconnect_min_gap_ms() -> u64 {
    2000
}
fn default_event_channel_capacity() -> usize {
    256
}
fn default_true() -> bool {
    true
}

/// Per-operation deadlines in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Timeouts {
    pub connect: u64,
    pub disconnect: u64,
    pub discover_services: u64,
    pub read_rssi: u64,
    pub request_mtu: u64,
    pub create_bond: u64,
    pub remove_bond: u64,
    pub set_notify_value: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: 35,
            disconnect: 35,
            discover_services: 15,
            read_rssi: 15,
            request_mtu: 15,
            create_bond: 90,
            remove_bond: 30,
            set_notify_value: 15,
        }
    }
}

/// Profile-level overrides; unset fields fall back to [`Timeouts`] defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TimeoutOverrides {
    pub connect: Option<u64>,
    pub disconnect: Option<u64>,
    pub discover_services: Option<u64>,
    pub read_rssi: Option<u64>,
    pub request_mtu: Option<u64>,
    pub create_bond: Option<u64>,
    pub remove_bond: Option<u64>,
    pub set_notify_value: Option<u64>,
}

/// A named profile. Every field overrides the matching default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Profile {
    pub platform: Option<String>,

    #[serde(default)]
    pub timeouts: TimeoutOverrides,

    pub mtu_request_delay_ms: Option<u64>,
    pub disconnect_min_gap_ms: Option<u64>,
    pub event_channel_capacity: Option<usize>,
    pub subscribe_to_services_changed: Option<bool>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("rs", "bluelane", "bluelane").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("bluelane");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` + environment. A missing file yields the defaults.
///
/// Environment keys nest with a double underscore, e.g.
/// `BLUELANE_DEFAULTS__TIMEOUTS__CONNECT=20`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("BLUELANE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Translation to EngineConfig ─────────────────────────────────────

/// Build the `EngineConfig` for `name`, or for the default profile.
///
/// A missing default profile means "defaults only"; a missing profile
/// that was asked for by name is an error.
pub fn engine_config(cfg: &Config, name: Option<&str>) -> Result<EngineConfig, ConfigError> {
    let profile = match name {
        Some(name) => cfg
            .profiles
            .get(name)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownProfile {
                profile: name.into(),
            })?,
        None => cfg
            .default_profile
            .as_deref()
            .and_then(|name| cfg.profiles.get(name))
            .cloned()
            .unwrap_or_default(),
    };
    profile_to_engine_config(&cfg.defaults, &profile)
}

/// Merge `profile` over `defaults` and validate the result.
pub fn profile_to_engine_config(
    defaults: &Defaults,
    profile: &Profile,
) -> Result<EngineConfig, ConfigError> {
    let platform = match profile.platform.as_deref().or(defaults.platform.as_deref()) {
        Some(name) => name.parse::<Platform>().map_err(|_| ConfigError::Validation {
            field: "platform".into(),
            reason: format!(
                "expected one of android, ios, macos, linux, windows, web; got '{name}'"
            ),
        })?,
        None => Platform::current(),
    };

    let base = &defaults.timeouts;
    let over = &profile.timeouts;
    let timeouts = OperationTimeouts {
        connect: seconds("timeouts.connect", over.connect.unwrap_or(base.connect))?,
        disconnect: seconds("timeouts.disconnect", over.disconnect.unwrap_or(base.disconnect))?,
        discover_services: seconds(
            "timeouts.discover_services",
            over.discover_services.unwrap_or(base.discover_services),
        )?,
        read_rssi: seconds("timeouts.read_rssi", over.read_rssi.unwrap_or(base.read_rssi))?,
        request_mtu: seconds("timeouts.request_mtu", over.request_mtu.unwrap_or(base.request_mtu))?,
        create_bond: seconds("timeouts.create_bond", over.create_bond.unwrap_or(base.create_bond))?,
        remove_bond: seconds("timeouts.remove_bond", over.remove_bond.unwrap_or(base.remove_bond))?,
        set_notify_value: seconds(
            "timeouts.set_notify_value",
            over.set_notify_value.unwrap_or(base.set_notify_value),
        )?,
    };

    let event_channel_capacity = profile
        .event_channel_capacity
        .unwrap_or(defaults.event_channel_capacity);
    if event_channel_capacity == 0 {
        return Err(ConfigError::Validation {
            field: "event_channel_capacity".into(),
            reason: "must be at least 1".into(),
        });
    }

    Ok(EngineConfig {
        platform,
        timeouts,
        mtu_request_delay: Duration::from_millis(
            profile
                .mtu_request_delay_ms
                .unwrap_or(defaults.mtu_request_delay_ms),
        ),
        disconnect_min_gap: Duration::from_millis(
            profile
                .disconnect_min_gap_ms
                .unwrap_or(defaults.disconnect_min_gap_ms),
        ),
        event_channel_capacity,
        subscribe_to_services_changed: profile
            .subscribe_to_services_changed
            .unwrap_or(defaults.subscribe_to_services_changed),
    })
}

fn seconds(field: &str, value: u64) -> Result<Duration, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: "timeout must be greater than zero".into(),
        });
    }
    Ok(Duration::from_secs(value))
}
