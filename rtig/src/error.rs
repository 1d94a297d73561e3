//! Error types for the federation coordinator
//!
//! Each variant carries the reason text that is reported back to the
//! requesting federate as a negative acknowledgment.

use thiserror::Error;

use crate::object_model::ObjectModelError;
use crate::persistence::PersistenceError;

/// Coarse classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Handle or name does not resolve to a joined federate (or federation)
    NotExecutionMember,
    /// Duplicate join
    AlreadyExecutionMember,
    /// Request is valid in shape but not allowed in the current protocol state
    ProtocolPrecondition,
    /// Malformed input or broken internal state
    InternalInconsistency,
    /// A resolved channel could not be written to
    TransientDeliveryFailure,
}

/// Primary error type for all coordinator operations
#[derive(Debug, Error)]
pub enum FederationError {
    #[error("Federate not execution member: {0}")]
    FederateNotExecutionMember(String),

    #[error("Federate already execution member: {0}")]
    FederateAlreadyExecutionMember(String),

    #[error("Federation already paused: {0}")]
    FederationAlreadyPaused(String),

    #[error("Save in progress: {0}")]
    SaveInProgress(String),

    #[error("Restore in progress: {0}")]
    RestoreInProgress(String),

    #[error("Federates currently joined: {0}")]
    FederatesCurrentlyJoined(String),

    #[error("Federation execution already exists: {0}")]
    FederationExecutionAlreadyExists(String),

    #[error("Federation execution does not exist: {0}")]
    FederationExecutionDoesNotExist(String),

    #[error("Handle space exhausted: {0}")]
    ResourceExhausted(String),

    #[error("RTI internal error: {0}")]
    RtiInternalError(String),

    #[error("Object model error: {0}")]
    ObjectModel(#[from] ObjectModelError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),
}

impl FederationError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::FederateNotExecutionMember(_) | Self::FederationExecutionDoesNotExist(_) => {
                ErrorKind::NotExecutionMember
            }
            Self::FederateAlreadyExecutionMember(_) => ErrorKind::AlreadyExecutionMember,
            Self::FederationAlreadyPaused(_)
            | Self::SaveInProgress(_)
            | Self::RestoreInProgress(_)
            | Self::FederatesCurrentlyJoined(_)
            | Self::FederationExecutionAlreadyExists(_)
            | Self::ObjectModel(_) => ErrorKind::ProtocolPrecondition,
            Self::ResourceExhausted(_) | Self::RtiInternalError(_) | Self::Persistence(_) => {
                ErrorKind::InternalInconsistency
            }
        }
    }

    /// Shorthand for the most common failure
    pub(crate) fn not_member(what: impl std::fmt::Display) -> Self {
        Self::FederateNotExecutionMember(what.to_string())
    }

    pub(crate) fn internal(reason: impl Into<String>) -> Self {
        Self::RtiInternalError(reason.into())
    }
}

/// Result type alias for coordinator operations
pub type Result<T> = std::result::Result<T, FederationError>;
