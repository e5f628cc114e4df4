//! Moving sessions to a new time slot.

use chrono::{DateTime, Utc};

use crate::error::{CoreError, StoreError};
use crate::ledger::WRITE_ATTEMPTS;
use crate::session::{Session, SessionPatch};
use crate::store::Store;
use crate::types::{SessionId, truncate_instant};

/// Applies time-window changes to existing sessions.
pub struct Coordinator<'a, S> {
    store: &'a mut S,
}

impl<'a, S: Store> Coordinator<'a, S> {
    pub const fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Moves a session so it starts at `new_start`, keeping its length.
    pub fn reschedule(
        &mut self,
        id: SessionId,
        new_start: DateTime<Utc>,
    ) -> Result<Session, CoreError> {
        self.reschedule_at(id, new_start, Utc::now())
    }

    /// Like [`reschedule`](Self::reschedule), with an explicit current instant.
    ///
    /// The target must be strictly after `now`. Status and package linkage
    /// are left as they are, so a completed session keeps its credit.
    pub fn reschedule_at(
        &mut self,
        id: SessionId,
        new_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Session, CoreError> {
        let new_start = truncate_instant(new_start);
        if new_start <= now {
            return Err(CoreError::PastTime {
                requested: new_start,
                now,
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            let session = self.store.get_session(id)?;
            let patch = SessionPatch {
                status: None,
                start_at: Some(new_start),
                end_at: Some(new_start + session.duration()),
            };
            match self.store.update_session(id, &patch, session.status) {
                Ok(moved) => {
                    tracing::info!(
                        session_id = %id,
                        from = %session.start_at,
                        to = %new_start,
                        "session rescheduled"
                    );
                    return Ok(moved);
                }
                Err(StoreError::Conflict { .. }) if attempt < WRITE_ATTEMPTS => {
                    tracing::warn!(session_id = %id, "session changed during reschedule, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}
