use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const AUTO_LOAD_ENV_VAR: &str = "GAME_SERIALIZER_AUTO_LOAD";
pub const SAVE_PREFIX_ENV_VAR: &str = "GAME_SERIALIZER_SAVE_PREFIX";
pub const MAX_SLOTS_ENV_VAR: &str = "GAME_SERIALIZER_MAX_SLOTS";

pub const DEFAULT_RECORD_TYPE: &str = "SavedGameState";
pub const DEFAULT_MAX_SLOT_SCAN: u32 = 25;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializerSettings {
    /// Flavour stamped on every slot record this session creates.
    pub record_type: String,
    /// Load slot 0 on `initialize` instead of starting a session save.
    pub auto_load_on_begin: bool,
    /// Highest slot index `get_slots` will probe.
    pub max_slot_scan: u32,
    pub save_prefix: String,
}

impl Default for SerializerSettings {
    fn default() -> Self {
        Self {
            record_type: DEFAULT_RECORD_TYPE.to_string(),
            auto_load_on_begin: false,
            max_slot_scan: DEFAULT_MAX_SLOT_SCAN,
            save_prefix: String::new(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse settings file {path} at {field}: {message}")]
    Parse {
        path: PathBuf,
        field: String,
        message: String,
    },
    #[error("environment variable {var} has invalid value {value:?}: expected {expected}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
}

impl SerializerSettings {
    /// Defaults overridden by any `GAME_SERIALIZER_*` variables that are set.
    pub fn from_env() -> Result<Self, SettingsError> {
        let mut settings = Self::default();
        settings.apply_env()?;
        Ok(settings)
    }

    pub fn apply_env(&mut self) -> Result<(), SettingsError> {
        if let Some(raw) = read_env(AUTO_LOAD_ENV_VAR)? {
            self.auto_load_on_begin = parse_flag(&raw).ok_or_else(|| SettingsError::InvalidEnv {
                var: AUTO_LOAD_ENV_VAR,
                value: raw.clone(),
                expected: "one of 1, 0, true, false",
            })?;
        }
        if let Some(raw) = read_env(SAVE_PREFIX_ENV_VAR)? {
            self.save_prefix = raw;
        }
        if let Some(raw) = read_env(MAX_SLOTS_ENV_VAR)? {
            self.max_slot_scan = raw.trim().parse().map_err(|_| SettingsError::InvalidEnv {
                var: MAX_SLOTS_ENV_VAR,
                value: raw.clone(),
                expected: "a non-negative integer",
            })?;
        }
        Ok(())
    }

    /// Reads a JSON settings file. Missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let raw = fs::read_to_string(path).map_err(|source| SettingsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw, path)
    }

    fn parse(raw: &str, path: &Path) -> Result<Self, SettingsError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        serde_path_to_error::deserialize::<_, Self>(&mut deserializer).map_err(|error| {
            let field = error.path().to_string();
            SettingsError::Parse {
                path: path.to_path_buf(),
                field,
                message: error.into_inner().to_string(),
            }
        })
    }
}

fn read_env(var: &'static str) -> Result<Option<String>, SettingsError> {
    match env::var(var) {
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(SettingsError::EnvVar { var, source }),
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
