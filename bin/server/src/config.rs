//! Centralized server configuration.
//!
//! Strongly-typed configuration loaded via the `config` crate from
//! environment variables with `__` separators, e.g.
//! `ENGINE__APPLY_TIMEOUT_MS=5000` or `EVENT_LOG__DIR=/var/lib/shellflow`.

use serde::Deserialize;

/// Server configuration composed from section configs.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Engine tuning.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Event log location.
    #[serde(default)]
    pub event_log: EventLogConfig,

    /// Process self-termination when nothing is connected.
    #[serde(default)]
    pub idle_exit: IdleExitConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:7420".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            engine: EngineConfig::default(),
            event_log: EventLogConfig::default(),
            idle_exit: IdleExitConfig::default(),
        }
    }
}

/// Engine-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// How long a handler waits on a mutation's apply-latch, in
    /// milliseconds. A timed-out mutation may still apply eventually.
    #[serde(default = "default_apply_timeout_ms")]
    pub apply_timeout_ms: u64,

    /// Grace period before an idle workspace is torn down, in milliseconds.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

fn default_apply_timeout_ms() -> u64 {
    10_000
}

fn default_grace_period_ms() -> u64 {
    1_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            apply_timeout_ms: default_apply_timeout_ms(),
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

/// Event log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EventLogConfig {
    /// Whether events are written to disk at all.
    #[serde(default = "default_event_log_enabled")]
    pub enabled: bool,

    /// Log directory; defaults to the per-user state directory.
    #[serde(default)]
    pub dir: Option<String>,
}

fn default_event_log_enabled() -> bool {
    true
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            enabled: default_event_log_enabled(),
            dir: None,
        }
    }
}

/// Idle self-termination configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct IdleExitConfig {
    /// Whether the process exits when no workspaces remain.
    #[serde(default)]
    pub enabled: bool,

    /// Quiet period before exiting, in seconds.
    #[serde(default = "default_idle_after_secs")]
    pub after_secs: u64,
}

fn default_idle_after_secs() -> u64 {
    60
}

impl Default for IdleExitConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            after_secs: default_idle_after_secs(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a provided value cannot be parsed.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr, "127.0.0.1:7420");
        assert_eq!(config.engine.apply_timeout_ms, 10_000);
        assert_eq!(config.engine.grace_period_ms, 1_000);
        assert!(config.event_log.enabled);
        assert!(!config.idle_exit.enabled);
    }
}
