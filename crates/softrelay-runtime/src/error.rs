//! Runtime errors and wire error codes.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

/// Errors produced by the kernel, config manager, and portal boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Malformed request payload or wrong content type.
    #[error("invalid request '{0}'")]
    InvalidRequest(SmolStr),

    /// Configuration failed validation.
    #[error("validation failed: {0}")]
    ValidationFailed(SmolStr),

    /// A named resource (slot, card, route) does not exist.
    #[error("not found '{0}'")]
    NotFound(SmolStr),

    /// Commit could not be applied; runtime remains on the prior active.
    #[error("commit failed: {0}")]
    CommitFailed(SmolStr),

    /// Restore could not be applied; runtime remains on the prior active.
    #[error("restore failed: {0}")]
    RestoreFailed(SmolStr),

    /// Command rejected at the enqueue boundary.
    #[error("command rejected: {0}")]
    CommandRejected(SmolStr),

    /// Config store I/O error.
    #[error("config store error '{0}'")]
    ConfigStore(SmolStr),

    /// Thread spawn error.
    #[error("thread spawn error '{0}'")]
    ThreadSpawn(SmolStr),

    /// Portal transport error.
    #[error("portal error '{0}'")]
    Portal(SmolStr),
}

impl RuntimeError {
    /// Wire error code for the portal envelope.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::CommitFailed(_) => "COMMIT_FAILED",
            Self::RestoreFailed(_) => "RESTORE_FAILED",
            Self::CommandRejected(_) => "COMMAND_REJECTED",
            Self::ConfigStore(_) | Self::ThreadSpawn(_) | Self::Portal(_) => "COMMIT_FAILED",
        }
    }
}
