//! Error hierarchy for the in-memory KV backend
//!
//! Errors are grouped by the concern that detects them: key/value state
//! preconditions, watch registration, value encoding, configuration and the
//! hosting runtime. Every expected condition is returned, never panicked.

use std::time::Duration;

use config::ConfigError;
use tokio::runtime::TryCurrentError;

use crate::KvEntry;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Preconditions on stored state (presence, absence, CAS)
    #[error(transparent)]
    Kv(#[from] KvError),

    /// Watch registration and delivery
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// Value encode/decode failures
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Configuration loading and validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Hosting environment failures
    #[error(transparent)]
    System(#[from] SystemError),
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    /// Key absent where presence is required
    #[error("Key not found: {key}")]
    NotFound { key: String },

    /// Key present where absence is required. Carries the untouched entry.
    #[error("Key already exists: {key}")]
    AlreadyExists {
        key: String,
        existing: Box<KvEntry>,
    },

    /// Compare-and-set precondition failed (value or index)
    #[error("Value mismatch for key: {key}")]
    ValueMismatch { key: String },

    /// Operation not implemented by this backend
    #[error("Operation not supported by kv-mem: {operation}")]
    Unsupported { operation: &'static str },

    /// Lock acquisition gave up after the configured deadline
    #[error("Failed to acquire lock {key} after {waited:?}")]
    LockTimeout { key: String, waited: Duration },
}

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// A watcher is already registered on this exact key or prefix
    #[error("Watch already registered on: {key}")]
    AlreadyWatched { key: String },

    /// Delivered to a callback's final invocation once its watch is torn down
    #[error("Watch stopped")]
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to encode value: {0}")]
    Encode(String),

    #[error("Failed to decode value of {key}: {reason}")]
    Decode { key: String, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// Store constructed outside of a tokio runtime
    #[error("No tokio runtime available: {0}")]
    RuntimeUnavailable(#[from] TryCurrentError),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kv(KvError::NotFound { .. }))
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::Kv(KvError::AlreadyExists { .. }))
    }

    pub fn is_value_mismatch(&self) -> bool {
        matches!(self, Error::Kv(KvError::ValueMismatch { .. }))
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Error::Kv(KvError::Unsupported { .. }))
    }

    pub fn is_already_watched(&self) -> bool {
        matches!(self, Error::Watch(WatchError::AlreadyWatched { .. }))
    }

    pub fn is_watch_stopped(&self) -> bool {
        matches!(self, Error::Watch(WatchError::Stopped))
    }
}

// ============== Conversion Implementations ============== //
impl From<TryCurrentError> for Error {
    fn from(e: TryCurrentError) -> Self {
        Error::System(SystemError::RuntimeUnavailable(e))
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(e: serde_json::Error) -> Self {
        CodecError::Encode(e.to_string())
    }
}

impl From<bincode::Error> for CodecError {
    fn from(e: bincode::Error) -> Self {
        CodecError::Encode(e.to_string())
    }
}
