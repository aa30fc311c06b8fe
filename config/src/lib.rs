//! Configuration loading for formstate.
//!
//! The TOML file is parsed into private raw structs and resolved once into
//! [`Settings`]. Ranges are checked here, so a `Settings` value that came out
//! of this crate is always usable as-is.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use formstate_types::{
    DispatchMode, EngineOptions, InitialValueRevalidation, LateRegistration, ReducerOptions,
    RegisterPolicy, Settings, SubmitFailureStatus,
};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "FORMSTATE_CONFIG";

/// Upper bound for `engine.batch_window_ms`.
pub const MAX_BATCH_WINDOW_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config at {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. }
            | ConfigError::Parse { path, .. }
            | ConfigError::Invalid { path, .. } => path,
        }
    }
}

// Default value function for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    reducer: RawReducer,
    #[serde(default)]
    engine: RawEngine,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawReducer {
    #[serde(default)]
    register_existing: RegisterPolicy,
    #[serde(default)]
    submit_failure_status: SubmitFailureStatus,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawEngine {
    #[serde(default = "default_true")]
    validate_late_registrations: bool,
    #[serde(default = "default_true")]
    revalidate_on_initial_change: bool,
    validator_timeout_ms: Option<u64>,
    #[serde(default)]
    batch_window_ms: u64,
}

impl Default for RawEngine {
    fn default() -> Self {
        Self {
            validate_late_registrations: true,
            revalidate_on_initial_change: true,
            validator_timeout_ms: None,
            batch_window_ms: 0,
        }
    }
}

impl RawConfig {
    fn resolve(self) -> Result<Settings, String> {
        let reducer = ReducerOptions {
            register: self.reducer.register_existing,
            submit_failure: self.reducer.submit_failure_status,
        };

        let engine = self.engine;
        let validator_timeout = match engine.validator_timeout_ms {
            Some(0) => return Err("engine.validator_timeout_ms must be greater than 0".into()),
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };
        let dispatch = match engine.batch_window_ms {
            0 => DispatchMode::Immediate,
            ms if ms > MAX_BATCH_WINDOW_MS => {
                return Err(format!(
                    "engine.batch_window_ms must be at most {MAX_BATCH_WINDOW_MS}, got {ms}"
                ));
            }
            ms => DispatchMode::Batched(Duration::from_millis(ms)),
        };

        Ok(Settings {
            reducer,
            engine: EngineOptions {
                late_registration: if engine.validate_late_registrations {
                    LateRegistration::Validate
                } else {
                    LateRegistration::Skip
                },
                initial_value_revalidation: if engine.revalidate_on_initial_change {
                    InitialValueRevalidation::Enabled
                } else {
                    InitialValueRevalidation::Disabled
                },
                validator_timeout,
                dispatch,
            },
        })
    }
}

/// Location of the config file: `$FORMSTATE_CONFIG`, else
/// `<config dir>/formstate/config.toml`.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV).filter(|path| !path.is_empty()) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|dir| dir.join("formstate").join("config.toml"))
}

/// Load settings from the default location.
///
/// Returns `Ok(None)` when no config file exists.
pub fn load() -> Result<Option<Settings>, ConfigError> {
    let Some(path) = config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    load_from(&path).map(Some)
}

/// Load settings from an explicit file.
pub fn load_from(path: &Path) -> Result<Settings, ConfigError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            tracing::warn!("Failed to read config at {}: {err}", path.display());
            return Err(ConfigError::Read {
                path: path.to_path_buf(),
                source: err,
            });
        }
    };
    parse(&content, path)
}

/// Parse and resolve config text. `path` is only used for error reporting.
pub fn parse(content: &str, path: &Path) -> Result<Settings, ConfigError> {
    let raw: RawConfig = match toml::from_str(content) {
        Ok(raw) => raw,
        Err(err) => {
            tracing::warn!("Failed to parse config at {}: {err}", path.display());
            return Err(ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            });
        }
    };
    raw.resolve().map_err(|reason| {
        tracing::warn!("Invalid config at {}: {reason}", path.display());
        ConfigError::Invalid {
            path: path.to_path_buf(),
            reason,
        }
    })
}
