use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    NotLeader,
    NoQuorum,
    DoubleSign,
    StateRegression,
    NonceReused,
    NonceNotFound,
    BadPartial,
    BadSignature,
    Busy,
    Timeout,
    CorruptStateFile,
    InsecureFilePermissions,
    ShareDecryptFailed,
    KeyNotFound,
    InvalidShardId,
    StorageError,
    SerializationError,
    CryptoError,
    TransportError,
    ConfigError,
    Message,
}

#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum VigilError {
    #[error("not the leader{}", .leader.as_deref().map(|l| format!(", leader is {l}")).unwrap_or_default())]
    NotLeader { leader: Option<String> },

    #[error("quorum not assembled: required {required}, reachable {reachable}")]
    NoQuorum { required: u8, reachable: u8 },

    #[error("double sign attempt on chain {chain_id} at height {height} round {round} step {step}")]
    DoubleSign { chain_id: String, height: u64, round: u64, step: u8 },

    #[error("sign state regression on chain {chain_id}: stored {stored}, attempted {attempted}")]
    StateRegression { chain_id: String, stored: String, attempted: String },

    #[error("nonce already consumed for height {height} round {round} step {step}")]
    NonceReused { height: u64, round: u64, step: u8 },

    #[error("no nonce prepared for height {height} round {round} step {step}")]
    NonceNotFound { height: u64, round: u64, step: u8 },

    #[error("partial signatures do not combine to a valid signature: {details}")]
    BadPartial { details: String },

    #[error("aggregated signature failed verification under the group key")]
    BadSignature,

    #[error("chain {chain_id} is at its in-flight request limit ({in_flight})")]
    Busy { chain_id: String, in_flight: usize },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("corrupt sign state file {path}: {details}")]
    CorruptStateFile { path: String, details: String },

    #[error("insecure file permissions: {path} has mode {mode:o}, expected 0600")]
    InsecureFilePermissions { path: String, mode: u32 },

    #[error("failed to decrypt nonce share from shard {source_id}")]
    ShareDecryptFailed { source_id: u8 },

    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("invalid shard id {shard_id}: {reason}")]
    InvalidShardId { shard_id: u8, reason: String },

    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("crypto error during {operation}: {details}")]
    CryptoError { operation: String, details: String },

    #[error("transport error during {operation}: {details}")]
    TransportError { operation: String, details: String },

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Message(String),
}

pub type Result<T> = std::result::Result<T, VigilError>;

impl VigilError {
    pub fn code(&self) -> ErrorCode {
        match self {
            VigilError::NotLeader { .. } => ErrorCode::NotLeader,
            VigilError::NoQuorum { .. } => ErrorCode::NoQuorum,
            VigilError::DoubleSign { .. } => ErrorCode::DoubleSign,
            VigilError::StateRegression { .. } => ErrorCode::StateRegression,
            VigilError::NonceReused { .. } => ErrorCode::NonceReused,
            VigilError::NonceNotFound { .. } => ErrorCode::NonceNotFound,
            VigilError::BadPartial { .. } => ErrorCode::BadPartial,
            VigilError::BadSignature => ErrorCode::BadSignature,
            VigilError::Busy { .. } => ErrorCode::Busy,
            VigilError::Timeout { .. } => ErrorCode::Timeout,
            VigilError::CorruptStateFile { .. } => ErrorCode::CorruptStateFile,
            VigilError::InsecureFilePermissions { .. } => ErrorCode::InsecureFilePermissions,
            VigilError::ShareDecryptFailed { .. } => ErrorCode::ShareDecryptFailed,
            VigilError::KeyNotFound(_) => ErrorCode::KeyNotFound,
            VigilError::InvalidShardId { .. } => ErrorCode::InvalidShardId,
            VigilError::StorageError { .. } => ErrorCode::StorageError,
            VigilError::SerializationError { .. } => ErrorCode::SerializationError,
            VigilError::CryptoError { .. } => ErrorCode::CryptoError,
            VigilError::TransportError { .. } => ErrorCode::TransportError,
            VigilError::ConfigError(_) => ErrorCode::ConfigError,
            VigilError::Message(_) => ErrorCode::Message,
        }
    }

    pub fn context(&self) -> ErrorContext {
        ErrorContext { code: self.code(), message: self.to_string() }
    }

    /// Transient failures the caller may retry (with fresh nonces where applicable).
    /// Double-sign and nonce-reuse refusals are never transient.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            VigilError::NoQuorum { .. }
                | VigilError::Busy { .. }
                | VigilError::Timeout { .. }
                | VigilError::NotLeader { .. }
                | VigilError::TransportError { .. }
        )
    }
}

impl From<io::Error> for VigilError {
    fn from(err: io::Error) -> Self {
        VigilError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for VigilError {
    fn from(err: serde_json::Error) -> Self {
        VigilError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<hex::FromHexError> for VigilError {
    fn from(err: hex::FromHexError) -> Self {
        VigilError::SerializationError { format: "hex".to_string(), details: err.to_string() }
    }
}

impl From<base64::DecodeError> for VigilError {
    fn from(err: base64::DecodeError) -> Self {
        VigilError::SerializationError { format: "base64".to_string(), details: err.to_string() }
    }
}

impl From<ed25519_dalek::SignatureError> for VigilError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        VigilError::CryptoError { operation: "ed25519".to_string(), details: err.to_string() }
    }
}

impl From<reqwest::Error> for VigilError {
    fn from(err: reqwest::Error) -> Self {
        VigilError::TransportError { operation: "http".to_string(), details: err.to_string() }
    }
}

// NOTE: Avoid adding generic "stringly" error conversions here.
// Use structured `VigilError` variants at the call site to preserve context.

#[macro_export]
macro_rules! crypto_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::VigilError::CryptoError { operation: $op.into(), details: $err.to_string() }
    };
}

#[macro_export]
macro_rules! storage_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::VigilError::StorageError { operation: $op.into(), details: $err.to_string() }
    };
}
