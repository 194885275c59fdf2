//! TOML configuration file loading
//!
//! Supports `~/.config/omni/parley/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct ParleyConfigFile {
    /// Dispatch gate tuning
    #[serde(default)]
    pub dispatch: DispatchFileConfig,

    /// HTTP/WebSocket server
    #[serde(default)]
    pub server: ServerFileConfig,

    /// Main agent bridge
    #[serde(default)]
    pub agent: AgentFileConfig,
}

/// Dispatch gate configuration
#[derive(Debug, Default, Deserialize)]
pub struct DispatchFileConfig {
    /// Seconds a queued task waits before it may be dispatched
    pub delay_seconds: Option<u64>,

    /// Hold dispatch until the previous run's brief was shown
    pub require_brief: Option<bool>,

    /// Automatic dispatch attempts before the task is held
    pub max_dispatch_attempts: Option<u32>,

    /// Longest completion brief forwarded to the user
    pub brief_max_chars: Option<usize>,

    /// Timer resolution for countdowns and the delay gate
    pub tick_interval_ms: Option<u64>,
}

/// Server configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Main agent configuration
#[derive(Debug, Default, Deserialize)]
pub struct AgentFileConfig {
    /// Base URL of the main agent API
    pub url: Option<String>,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Request timeout
    pub timeout_seconds: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ParleyConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ParleyConfigFile {
    let Some(path) = config_file_path() else {
        return ParleyConfigFile::default();
    };

    if !path.exists() {
        return ParleyConfigFile::default();
    }

    match load_from_path(&path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "loaded config file");
            config
        }
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ParleyConfigFile::default()
        }
    }
}

/// Read and parse a config file at an explicit path
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML
pub fn load_from_path(path: &Path) -> crate::Result<ParleyConfigFile> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Return the config file path: `~/.config/omni/parley/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| {
        d.config_dir()
            .join("omni")
            .join("parley")
            .join("config.toml")
    })
}
