//! Error taxonomy for the storage façade.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the hash codec, registry and coordinator.
///
/// None of these are retried internally. Per-driver failures during a
/// fan-out write are not represented here; see [`crate::storage::WriteReport`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("source {path} does not exist or is unavailable for reading")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed file hash: {0}")]
    MalformedIdentifier(String),

    #[error("incorrect hash length {len} instead of 50 for {hash:?}")]
    EncodingInvariantViolation { len: usize, hash: String },

    #[error("no enabled and available storage to write to")]
    NoAvailableStorage,

    #[error("no storage could serve {hash}")]
    ContentUnavailable { hash: String },

    #[error("storage driver {0:?} does not exist")]
    UnknownDriverType(String),

    #[error("invalid driver config: {0}")]
    InvalidDriverConfig(String),

    #[error("failed to initialize storage {id}")]
    DriverInitializationFailed {
        id: i64,
        #[source]
        source: anyhow::Error,
    },
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
