// src/error.rs
//! Error taxonomy for the sync worker.
//!
//! | Variant | Retried | Raised by |
//! |---------|---------|-----------|
//! | `Transient` | yes | remote clients (network, non-2xx, bad body) |
//! | `RetriesExhausted` | no | retrying fetcher, bounded policy |
//! | `Interrupted` | no | retrying fetcher, stop signal during a delay |
//! | `FatalCycle` | no | polling loop, wraps whatever escaped a cycle |
//! | `Config` | no | config loading / filter parsing |
//! | `Internal` | no | task join failures, client construction |

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Network/HTTP failure or non-success status from a remote call.
    #[error("transient error on {target}: {message}")]
    Transient { target: String, message: String },

    #[error("{target}: failed after {attempts} attempts (last error: {last_error})")]
    RetriesExhausted {
        target: String,
        attempts: u32,
        last_error: String,
    },

    #[error("{target}: retry interrupted by stop signal after {attempts} attempts")]
    Interrupted { target: String, attempts: u32 },

    #[error("poll cycle {cycle} failed: {source}")]
    FatalCycle {
        cycle: u64,
        #[source]
        source: Box<SyncError>,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    pub fn transient(target: impl Into<String>, message: impl ToString) -> Self {
        SyncError::Transient {
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Only transient failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient { .. })
    }

    /// True for `Interrupted`, also when wrapped in `FatalCycle`.
    pub fn is_interrupted(&self) -> bool {
        match self {
            SyncError::Interrupted { .. } => true,
            SyncError::FatalCycle { source, .. } => source.is_interrupted(),
            _ => false,
        }
    }
}
