//! Error types for walletbridge.

use uuid::Uuid;

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Chain registry error: {0}")]
    Chain(#[from] ChainError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),

    #[error("Deployment plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("Hook error: {0}")]
    Hook(#[from] HookError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chain registry errors.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Unknown chain reference: {chain_ref}")]
    Unknown { chain_ref: String },

    #[error("Invalid RPC endpoint for chain {chain_ref}: {reason}")]
    InvalidRpcUrl { chain_ref: String, reason: String },

    #[error("Failed to load chain registry: {0}")]
    Load(String),
}

/// Session storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Session row not found: {id}")]
    RowNotFound { id: Uuid },

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[cfg(feature = "libsql")]
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),
}

/// Transaction verification errors.
///
/// `NotMined` (no receipt yet) is deliberately distinct from `Reverted`
/// (mined and failed): callers must not conflate "not found yet" with
/// "permanently failed".
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("Malformed transaction hash: {tx_hash}")]
    InvalidHash { tx_hash: String },

    #[error("No receipt for transaction {tx_hash} (not yet mined)")]
    NotMined { tx_hash: String },

    #[error("Transaction {tx_hash} was mined but reverted")]
    Reverted { tx_hash: String },

    #[error("Receipt for {tx_hash} has unrecognized status {status}")]
    Unclassifiable { tx_hash: String, status: String },

    #[error("RPC request failed: {reason}")]
    Rpc { reason: String },
}

/// Session lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Unknown or expired session. Expiry is indistinguishable from
    /// absence at the boundary.
    #[error("Session not found: {id}")]
    NotFound { id: Uuid },

    #[error("Session requires at least one deployment")]
    EmptyDeployments,

    #[error("Deployment index {index} out of range (session has {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("Session {id} already failed; it must be recreated")]
    AlreadyFailed { id: Uuid },

    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("Verification failed: {0}")]
    Verification(#[from] VerifyError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Deployment plan error: {0}")]
    Plan(#[from] PlanError),
}

/// Deployment plan errors.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Deployment plan has no steps")]
    EmptyPlan,

    #[error("Step {step} out of range (plan has {len})")]
    OutOfRange { step: usize, len: usize },

    #[error("Step {step} depends on step {depends_on}, which comes later")]
    ForwardDependency { step: usize, depends_on: usize },

    #[error("Step {step} depends on step {depends_on}, which has not produced an address")]
    DependencyUnresolved { step: usize, depends_on: usize },

    #[error("Plan is poisoned: step {step} failed verification")]
    StepFailed { step: usize },

    #[error("Invalid bytecode for step {step}: {reason}")]
    InvalidBytecode { step: usize, reason: String },

    #[error("Invalid address {address} for step {step}")]
    InvalidAddress { step: usize, address: String },
}

/// Errors raised by confirmation hooks. These are logged, never
/// propagated to the confirming caller.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("Hook {hook} failed: {reason}")]
    Failed { hook: String, reason: String },
}

/// HTTP server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {reason}")]
    BindFailed { addr: String, reason: String },
}

/// Result type alias for the gateway.
pub type Result<T> = std::result::Result<T, Error>;
