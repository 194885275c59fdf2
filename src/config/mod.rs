//! Configuration management for the Parley gateway

pub mod file;

use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};

/// Parley gateway configuration
#[derive(Debug, Default)]
pub struct Config {
    /// Dispatch gate tuning
    pub dispatch: DispatchConfig,

    /// HTTP/WebSocket server
    pub server: ServerConfig,

    /// Main agent bridge
    pub agent: AgentConfig,
}

/// Dispatch gate configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Minimum wait between queueing and dispatch
    pub delay: Duration,

    /// Hold dispatch while a completion brief is outstanding
    pub require_brief: bool,

    /// Automatic attempts before a failing task is held
    pub max_dispatch_attempts: u32,

    /// Completion briefs are truncated to this many characters
    pub brief_max_chars: usize,

    /// Timer resolution of the coordinator loop
    pub tick_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(10),
            require_brief: true,
            max_dispatch_attempts: 3,
            brief_max_chars: 500,
            tick_interval: Duration::from_secs(1),
        }
    }
}

/// HTTP/WebSocket server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 18795,
        }
    }
}

/// Main agent bridge configuration
#[derive(Debug)]
pub struct AgentConfig {
    /// Base URL of the main agent API; dispatch is unavailable without it
    pub url: Option<String>,

    /// Bearer token for the main agent API
    pub token: Option<SecretString>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            url: None,
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from environment and config file
    ///
    /// # Errors
    ///
    /// Returns error if an environment variable holds an unparsable value
    pub fn load() -> Result<Self> {
        Self::from_sources(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Resolve configuration from a parsed file and an environment lookup
    ///
    /// Precedence is env > toml > default.
    ///
    /// # Errors
    ///
    /// Returns error if an environment value cannot be parsed or the resolved
    /// configuration is invalid
    pub fn from_sources(
        fc: file::ParleyConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();

        let dispatch = DispatchConfig {
            delay: Duration::from_secs(
                parse_env(&env, "PARLEY_DISPATCH_DELAY_SECONDS")?
                    .or(fc.dispatch.delay_seconds)
                    .unwrap_or(defaults.dispatch.delay.as_secs()),
            ),
            require_brief: parse_env(&env, "PARLEY_REQUIRE_BRIEF")?
                .or(fc.dispatch.require_brief)
                .unwrap_or(defaults.dispatch.require_brief),
            max_dispatch_attempts: parse_env(&env, "PARLEY_MAX_DISPATCH_ATTEMPTS")?
                .or(fc.dispatch.max_dispatch_attempts)
                .unwrap_or(defaults.dispatch.max_dispatch_attempts),
            brief_max_chars: parse_env(&env, "PARLEY_BRIEF_MAX_CHARS")?
                .or(fc.dispatch.brief_max_chars)
                .unwrap_or(defaults.dispatch.brief_max_chars),
            tick_interval: parse_env(&env, "PARLEY_TICK_INTERVAL_MS")?
                .or(fc.dispatch.tick_interval_ms)
                .map_or(defaults.dispatch.tick_interval, Duration::from_millis),
        };

        let server = ServerConfig {
            host: env("PARLEY_HOST")
                .or(fc.server.host)
                .unwrap_or(defaults.server.host),
            port: parse_env(&env, "PARLEY_PORT")?
                .or(fc.server.port)
                .unwrap_or(defaults.server.port),
        };

        let agent = AgentConfig {
            url: env("PARLEY_AGENT_URL")
                .or(fc.agent.url)
                .filter(|url| !url.trim().is_empty()),
            token: env("PARLEY_AGENT_TOKEN")
                .or(fc.agent.token)
                .filter(|token| !token.is_empty())
                .map(SecretString::from),
            timeout: parse_env(&env, "PARLEY_AGENT_TIMEOUT_SECONDS")?
                .or(fc.agent.timeout_seconds)
                .map_or(defaults.agent.timeout, Duration::from_secs),
        };

        let config = Self {
            dispatch,
            server,
            agent,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot run with
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.max_dispatch_attempts == 0 {
            return Err(Error::Config(
                "max_dispatch_attempts must be at least 1".to_string(),
            ));
        }
        if self.dispatch.tick_interval.is_zero() {
            return Err(Error::Config(
                "tick_interval_ms must be greater than 0".to_string(),
            ));
        }
        if let Some(url) = &self.agent.url {
            url::Url::parse(url)?;
        }
        Ok(())
    }

    /// Socket address string for the server
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn parse_env<T>(env: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    env(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {key}={raw:?}: {e}")))
        })
        .transpose()
}
