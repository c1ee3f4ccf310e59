//! Configuration for walletbridge.
//!
//! Settings are loaded with priority: env var > default. `.env` files are
//! loaded via dotenvy early in startup; nothing here reads the database.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::ConfigError;

/// Default session validity window: 30 minutes from creation.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 30 * 60;

/// Default bound on a single receipt lookup.
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 15;

/// Default interval for the expired-session sweep.
pub const DEFAULT_EXPIRY_SWEEP_SECS: u64 = 300;

/// Main configuration for the gateway.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host for the HTTP server.
    pub host: String,
    /// Bind port for the HTTP server.
    pub port: u16,
    /// Session validity window in seconds.
    pub session_ttl_secs: i64,
    /// Timeout for a single receipt lookup, in seconds.
    pub rpc_timeout_secs: u64,
    /// Optional TOML file describing the chain registry.
    pub chains_file: Option<PathBuf>,
    /// Interval between expired-session sweeps, in seconds.
    pub expiry_sweep_secs: u64,
    pub store: StoreConfig,
}

/// Which session store backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    #[cfg(feature = "libsql")]
    LibSql,
}

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Path of the embedded database file (libsql backend only).
    pub libsql_path: PathBuf,
}

impl Config {
    /// Resolve configuration from the environment.
    pub fn resolve() -> Result<Self, ConfigError> {
        let host = optional_env("BRIDGE_HOST")?.unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_env("BRIDGE_PORT")?.unwrap_or(3170);

        let session_ttl_secs: i64 =
            parse_env("SESSION_TTL_SECS")?.unwrap_or(DEFAULT_SESSION_TTL_SECS);
        if session_ttl_secs <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "SESSION_TTL_SECS".to_string(),
                message: "must be a positive number of seconds".to_string(),
            });
        }

        let rpc_timeout_secs: u64 =
            parse_env("RPC_TIMEOUT_SECS")?.unwrap_or(DEFAULT_RPC_TIMEOUT_SECS);
        if rpc_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "RPC_TIMEOUT_SECS".to_string(),
                message: "must be a positive number of seconds".to_string(),
            });
        }

        let expiry_sweep_secs: u64 =
            parse_env("EXPIRY_SWEEP_SECS")?.unwrap_or(DEFAULT_EXPIRY_SWEEP_SECS);

        let chains_file = optional_env("CHAINS_FILE")?.map(PathBuf::from);

        Ok(Self {
            host,
            port,
            session_ttl_secs,
            rpc_timeout_secs,
            chains_file,
            expiry_sweep_secs,
            store: StoreConfig::resolve()?,
        })
    }
}

impl StoreConfig {
    fn resolve() -> Result<Self, ConfigError> {
        let backend = match optional_env("STORE_BACKEND")?.as_deref() {
            None => default_backend(),
            Some("memory") => StoreBackend::Memory,
            #[cfg(feature = "libsql")]
            Some("libsql") => StoreBackend::LibSql,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "STORE_BACKEND".to_string(),
                    message: format!("unknown backend '{other}'"),
                });
            }
        };

        let libsql_path = optional_env("LIBSQL_PATH")?
            .map(PathBuf::from)
            .unwrap_or_else(default_libsql_path);

        Ok(Self {
            backend,
            libsql_path,
        })
    }
}

fn default_backend() -> StoreBackend {
    #[cfg(feature = "libsql")]
    {
        StoreBackend::LibSql
    }
    #[cfg(not(feature = "libsql"))]
    {
        StoreBackend::Memory
    }
}

/// Default embedded database path: `~/.walletbridge/sessions.db`.
pub fn default_libsql_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".walletbridge")
        .join("sessions.db")
}

/// Read an env var, treating unset and blank values as absent.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "value is not valid unicode".to_string(),
        }),
    }
}

/// Read and parse an env var.
fn parse_env<T>(key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|raw| {
            raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("cannot parse '{raw}': {e}"),
            })
        })
        .transpose()
}
