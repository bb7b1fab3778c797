//! Application-level configuration loading: round defaults, lobby code
//! generation and notification buffering.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

use crate::state::scheduler::{DEFAULT_ROUND_SECONDS, clamp_round_seconds};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ELIMINATION_LOBBY_CONFIG_PATH";
const DEFAULT_CODE_ATTEMPTS: u32 = 5;
const DEFAULT_HUB_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    default_round_seconds: u32,
    code_attempts: u32,
    hub_capacity: usize,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        round_seconds = app_config.default_round_seconds,
                        code_attempts = app_config.code_attempts,
                        hub_capacity = app_config.hub_capacity,
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Round length given to new lobbies, already clamped.
    pub fn default_round_seconds(&self) -> u32 {
        self.default_round_seconds
    }

    /// How many random codes lobby creation tries before giving up.
    pub fn code_attempts(&self) -> u32 {
        self.code_attempts
    }

    /// Snapshots buffered per lobby before slow subscribers skip ahead.
    pub fn hub_capacity(&self) -> usize {
        self.hub_capacity
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_round_seconds: DEFAULT_ROUND_SECONDS,
            code_attempts: DEFAULT_CODE_ATTEMPTS,
            hub_capacity: DEFAULT_HUB_CAPACITY,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    round_seconds: Option<i64>,
    code_attempts: Option<u32>,
    hub_capacity: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            default_round_seconds: value
                .round_seconds
                .map(clamp_round_seconds)
                .unwrap_or(DEFAULT_ROUND_SECONDS),
            code_attempts: value
                .code_attempts
                .filter(|attempts| *attempts > 0)
                .unwrap_or(DEFAULT_CODE_ATTEMPTS),
            hub_capacity: value
                .hub_capacity
                .filter(|capacity| *capacity > 0)
                .unwrap_or(DEFAULT_HUB_CAPACITY),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let raw: RawConfig = serde_json::from_str(r#"{ "round_seconds": 5 }"#).unwrap();
        let config = AppConfig::from(raw);
        assert_eq!(config.default_round_seconds(), 30);
        assert_eq!(config.code_attempts(), 5);
        assert_eq!(config.hub_capacity(), 16);
    }

    #[test]
    fn zero_values_fall_back() {
        let raw: RawConfig =
            serde_json::from_str(r#"{ "code_attempts": 0, "hub_capacity": 0 }"#).unwrap();
        assert_eq!(AppConfig::from(raw), AppConfig::default());
    }
}
