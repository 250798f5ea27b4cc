//! Engine configuration loaded from the environment.
//!
//! | Variable | Default |
//! | --- | --- |
//! | `TABLEKEEP_BIND` | `0.0.0.0:3000` |
//! | `TABLEKEEP_COMMAND_BUFFER` | `256` |
//! | `TABLEKEEP_CONNECTION_BUFFER` | `256` |
//! | `TABLEKEEP_APPROVAL_TIMEOUT_SECS` | `1800` |
//! | `TABLEKEEP_APPROVAL_SWEEP_SECS` | `30` |
//! | `TABLEKEEP_CHECKPOINT_ACTIONS` | `stop-encounter` |
//! | `TABLEKEEP_LOG` | unset (falls back to `RUST_LOG`, then the built-in filter) |
//! | `TABLEKEEP_CORS_ALLOWED_ORIGINS` | unset (no CORS layer); `*` or a comma separated list |

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::Duration;

use crate::use_cases::encounter::STOP_ENCOUNTER;

const DEFAULT_BIND: &str = "0.0.0.0:3000";
const DEFAULT_COMMAND_BUFFER: usize = 256;
const DEFAULT_CONNECTION_BUFFER: usize = 256;
const DEFAULT_APPROVAL_TIMEOUT_SECS: u64 = 30 * 60;
const DEFAULT_APPROVAL_SWEEP_SECS: u64 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got '{value}'")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Settings for one session pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Capacity of the pipeline's command channel
    pub command_buffer: usize,
    /// How long a request may wait for the leader before it is implicitly denied
    pub approval_timeout: Duration,
    /// How often pending approvals are checked for expiry
    pub approval_sweep: Duration,
    /// Actions after which the snapshot is written to the store
    pub checkpoint_actions: BTreeSet<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            command_buffer: DEFAULT_COMMAND_BUFFER,
            approval_timeout: Duration::from_secs(DEFAULT_APPROVAL_TIMEOUT_SECS),
            approval_sweep: Duration::from_secs(DEFAULT_APPROVAL_SWEEP_SECS),
            checkpoint_actions: BTreeSet::from([STOP_ENCOUNTER.to_string()]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub bind: SocketAddr,
    /// Per-connection outbound channel capacity
    pub connection_buffer: usize,
    pub pipeline: PipelineConfig,
    /// Tracing filter directive, when set explicitly
    pub log_filter: Option<String>,
    pub cors_allowed_origins: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 3000)),
            connection_buffer: DEFAULT_CONNECTION_BUFFER,
            pipeline: PipelineConfig::default(),
            log_filter: None,
            cors_allowed_origins: None,
        }
    }
}

impl EngineConfig {
    /// Load `.env` (if present) and read settings from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                tracing::warn!(error = %e, "Failed to load .env file");
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup (environment, map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("TABLEKEEP_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string());
        let bind = bind_raw.parse().map_err(|_| ConfigError::Invalid {
            var: "TABLEKEEP_BIND",
            expected: "socket address",
            value: bind_raw.clone(),
        })?;

        let connection_buffer = positive(
            &lookup,
            "TABLEKEEP_CONNECTION_BUFFER",
            DEFAULT_CONNECTION_BUFFER as u64,
        )? as usize;
        let command_buffer =
            positive(&lookup, "TABLEKEEP_COMMAND_BUFFER", DEFAULT_COMMAND_BUFFER as u64)? as usize;
        let approval_timeout = Duration::from_secs(positive(
            &lookup,
            "TABLEKEEP_APPROVAL_TIMEOUT_SECS",
            DEFAULT_APPROVAL_TIMEOUT_SECS,
        )?);
        let approval_sweep = Duration::from_secs(positive(
            &lookup,
            "TABLEKEEP_APPROVAL_SWEEP_SECS",
            DEFAULT_APPROVAL_SWEEP_SECS,
        )?);

        let checkpoint_actions = match lookup("TABLEKEEP_CHECKPOINT_ACTIONS") {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
            None => PipelineConfig::default().checkpoint_actions,
        };

        let log_filter = lookup("TABLEKEEP_LOG").filter(|s| !s.trim().is_empty());
        let cors_allowed_origins = lookup("TABLEKEEP_CORS_ALLOWED_ORIGINS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Ok(Self {
            bind,
            connection_buffer,
            pipeline: PipelineConfig {
                command_buffer,
                approval_timeout,
                approval_sweep,
                checkpoint_actions,
            },
            log_filter,
            cors_allowed_origins,
        })
    }
}

fn positive<F>(lookup: &F, var: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    let value: u64 = raw.trim().parse().map_err(|_| ConfigError::Invalid {
        var,
        expected: "non-negative integer",
        value: raw.clone(),
    })?;
    if value == 0 {
        return Err(ConfigError::Zero(var));
    }
    Ok(value)
}
