//! Error types for the CA material lifecycle.
//!
//! Every fallible operation in the library returns [`Result<T>`], which wraps
//! [`CaError`]. Collaborators (the HTTP layer, the binary) use
//! [`CaError::kind`] to decide how a failure is reported.
//!
//! # Example
//!
//! ```no_run
//! use ca_console::{CaError, ErrorKind};
//!
//! fn status_for(err: &CaError) -> u16 {
//!     match err.kind() {
//!         ErrorKind::Validation | ErrorKind::Conflict | ErrorKind::Authorization => 400,
//!         ErrorKind::NotFound => 404,
//!         _ => 500,
//!     }
//! }
//! ```

use std::time::Duration;

use thiserror::Error;

/// Error type for all issuance, storage and crypto operations.
#[derive(Debug, Error)]
pub enum CaError {
    /// Request rejected before any work was done (missing name, unknown profile, ...)
    #[error("{0}")]
    Validation(String),

    /// Parent CA or requested record does not exist
    #[error("{0}")]
    NotFound(String),

    /// A record with the same deterministic id is already stored
    #[error("{0} already exists")]
    Conflict(String),

    /// Hex decoding, ciphertext shape or cipher failure
    #[error("crypto error: {0}")]
    Crypto(String),

    /// The certificate tool could not be started
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The certificate tool exited unsuccessfully; its combined output is kept
    #[error("{program} exited with {status}: {output}")]
    NonZeroExit {
        program: String,
        status: String,
        output: String,
    },

    /// The certificate tool ran past its wall-clock budget and was killed
    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    /// Scratch file or other filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Key-value substrate failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Stored document could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Operation not permitted on this record (e.g. CA key download)
    #[error("{0}")]
    Authorization(String),
}

/// Coarse classification of a [`CaError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Crypto,
    Subprocess,
    Io,
    Authorization,
}

impl CaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaError::Validation(_) => ErrorKind::Validation,
            CaError::NotFound(_) => ErrorKind::NotFound,
            CaError::Conflict(_) => ErrorKind::Conflict,
            CaError::Crypto(_) => ErrorKind::Crypto,
            CaError::Spawn { .. } | CaError::NonZeroExit { .. } | CaError::Timeout { .. } => {
                ErrorKind::Subprocess
            }
            CaError::Io(_) | CaError::Storage(_) | CaError::Serialization(_) => ErrorKind::Io,
            CaError::Authorization(_) => ErrorKind::Authorization,
        }
    }

    /// Captured tool output, when the failure came from a finished child process.
    pub fn tool_output(&self) -> Option<&str> {
        match self {
            CaError::NonZeroExit { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, CaError>;

impl From<openssl::error::ErrorStack> for CaError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        CaError::Crypto(e.to_string())
    }
}

impl From<hex::FromHexError> for CaError {
    fn from(e: hex::FromHexError) -> Self {
        CaError::Crypto(format!("invalid hex: {e}"))
    }
}

impl From<serde_json::Error> for CaError {
    fn from(e: serde_json::Error) -> Self {
        CaError::Serialization(e.to_string())
    }
}

macro_rules! storage_error_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for CaError {
                fn from(e: $ty) -> Self {
                    CaError::Storage(e.to_string())
                }
            }
        )*
    };
}

storage_error_from!(
    redb::Error,
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);
