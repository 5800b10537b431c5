//! Configuration loading utilities
//!
//! Both binaries resolve their settings in the same priority order:
//! 1. CLI arguments (highest priority)
//! 2. Environment variables
//! 3. Config file (searched in standard locations)
//! 4. Built-in defaults (lowest priority)

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use serde::de::DeserializeOwned;

use crate::APP_NAME;

/// Describes where a configuration was loaded from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// Explicit path provided via CLI or env var
    Explicit(PathBuf),
    /// Found in current working directory
    CurrentDir(PathBuf),
    /// Found in XDG config home (~/.config/pet-estimator/)
    XdgConfig(PathBuf),
    /// Found in system config (/etc/pet-estimator/)
    System(PathBuf),
    /// No config file found, using defaults
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConfigSource::Explicit(p)
            | ConfigSource::CurrentDir(p)
            | ConfigSource::XdgConfig(p)
            | ConfigSource::System(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path() {
            Some(p) => write!(f, "{}", p.display()),
            None => write!(f, "(defaults)"),
        }
    }
}

/// Find a configuration file in standard locations
///
/// Search order:
/// 1. Environment variable (`PET_ESTIMATOR_CONFIG` or `PET_DAEMON_CONFIG`)
/// 2. Current directory (`estimator.toml` or `daemon.toml`)
/// 3. XDG config home (`$XDG_CONFIG_HOME/pet-estimator/` or `~/.config/pet-estimator/`)
/// 4. System config (`/etc/pet-estimator/`)
pub fn find_config_file(env_var: &str, filename: &str) -> ConfigSource {
    if let Ok(path) = env::var(env_var) {
        let p = PathBuf::from(&path);
        if p.exists() {
            return ConfigSource::Explicit(p);
        }
    }

    let local = PathBuf::from(filename);
    if local.exists() {
        return ConfigSource::CurrentDir(local);
    }

    let xdg_path = get_xdg_config_path(filename);
    if xdg_path.exists() {
        return ConfigSource::XdgConfig(xdg_path);
    }

    let system = PathBuf::from(format!("/etc/{}/{}", APP_NAME, filename));
    if system.exists() {
        return ConfigSource::System(system);
    }

    ConfigSource::Defaults
}

fn get_xdg_config_path(filename: &str) -> PathBuf {
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_NAME).join(filename)
    } else if let Ok(home) = env::var("HOME") {
        PathBuf::from(home)
            .join(".config")
            .join(APP_NAME)
            .join(filename)
    } else {
        // Fallback - won't exist but keeps the code simple
        PathBuf::from(format!(".config/{}/{}", APP_NAME, filename))
    }
}

/// Load and parse a TOML configuration file
///
/// Returns `T::default()` when `source` is [`ConfigSource::Defaults`], and an
/// error when the file cannot be read or is not valid TOML for `T`.
pub fn load_config<T: DeserializeOwned + Default>(source: &ConfigSource) -> anyhow::Result<T> {
    match source.path() {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let config: T = toml::from_str(&content)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            Ok(config)
        }
        None => Ok(T::default()),
    }
}
