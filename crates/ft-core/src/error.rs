//! Error taxonomy for store and domain operations.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::session::SessionStatus;
use crate::types::{EntityKind, PackageId, SessionId, ValidationError};

/// Boxed backend failure carried through the store seam.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors a [`Store`](crate::Store) implementation may return.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },
    /// A conditional write found the row changed since it was read.
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: EntityKind, id: i64 },
    /// The backing store failed.
    #[error("store failure: {0}")]
    Backend(#[source] BackendError),
}

/// Errors surfaced by domain operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or missing input.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// A referenced entity does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },
    /// The session's current status does not allow the requested transition.
    #[error("session {session_id} is {from} and cannot become {to}")]
    InvalidTransition {
        session_id: SessionId,
        from: SessionStatus,
        to: SessionStatus,
    },
    /// The package has no credits left to debit, or is no longer active.
    #[error("package {package_id} has no credits available ({sessions_used} of {sessions_total} used)")]
    CapacityExceeded {
        package_id: PackageId,
        sessions_used: i64,
        sessions_total: i64,
    },
    /// A reschedule target is not in the future.
    #[error("cannot move a session to {requested}, which is not after {now}")]
    PastTime {
        requested: DateTime<Utc>,
        now: DateTime<Utc>,
    },
    /// A conditional write kept failing after a fresh read.
    #[error("{entity} {id} was modified concurrently, please retry")]
    Conflict { entity: EntityKind, id: i64 },
    /// The backing store failed.
    #[error("store failure: {0}")]
    Store(#[source] BackendError),
}

impl From<StoreError> for CoreError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::Conflict { entity, id } => Self::Conflict { entity, id },
            StoreError::Backend(source) => Self::Store(source),
        }
    }
}

impl CoreError {
    /// Whether the error came from bad caller input rather than system state.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::PastTime { .. })
    }
}
