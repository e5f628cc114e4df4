//! Session lifecycle: status transitions and credit consumption.
//!
//! ```text
//! scheduled <-> pending
//!     |            |
//!     +--> completed (terminal, may consume one package credit)
//!     +--> cancelled (terminal)
//! ```
//!
//! Every status write is conditional on the status that was read, so a
//! session completed or cancelled by another writer is never overwritten.

use crate::error::{CoreError, StoreError};
use crate::ledger::{WRITE_ATTEMPTS, is_package_conflict, select_from_store};
use crate::session::{NewSession, Session, SessionPatch, SessionStatus};
use crate::store::{Completion, CompletionWrite, CreditDebit, Store};
use crate::types::{EntityKind, SessionId};

/// Package selections attempted by `complete` before billing per session.
const SELECTION_ATTEMPTS: usize = 2;

/// Session state machine over a store.
pub struct SessionEngine<'a, S> {
    store: &'a mut S,
}

impl<'a, S: Store> SessionEngine<'a, S> {
    pub const fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Creates a session in the `scheduled` state.
    pub fn schedule(&mut self, new: &NewSession) -> Result<Session, CoreError> {
        let new = new.truncated();
        new.validate()?;
        let session = self.store.insert_session(&new)?;
        tracing::info!(
            session_id = %session.id,
            client_id = %session.client_id,
            start_at = %session.start_at,
            "session scheduled"
        );
        Ok(session)
    }

    /// Moves a non-terminal session to `pending`.
    pub fn mark_pending(&mut self, id: SessionId) -> Result<Session, CoreError> {
        self.transition(id, SessionStatus::Pending)
    }

    /// Moves a non-terminal session back to `scheduled`.
    pub fn mark_scheduled(&mut self, id: SessionId) -> Result<Session, CoreError> {
        self.transition(id, SessionStatus::Scheduled)
    }

    /// Cancels a non-terminal session. Package credits are never touched.
    pub fn cancel(&mut self, id: SessionId) -> Result<Session, CoreError> {
        self.transition(id, SessionStatus::Cancelled)
    }

    /// Completes a session, consuming a package credit when one is available.
    ///
    /// The debit and the status write are committed together. If another
    /// completion takes the selected package's credit first, selection is
    /// retried once on a fresh read; if that also loses, the session is
    /// completed without a package and billed per occurrence.
    pub fn complete(&mut self, id: SessionId) -> Result<Completion, CoreError> {
        let mut selections = 0;
        let mut session_conflicts = 0;
        loop {
            let session = self.store.get_session(id)?;
            ensure_open(&session, SessionStatus::Completed)?;

            let debit = if selections < SELECTION_ATTEMPTS {
                selections += 1;
                select_from_store(&*self.store, session.client_id)?.map(|p| CreditDebit {
                    package_id: p.id,
                    expected_used: p.sessions_used,
                })
            } else {
                tracing::warn!(session_id = %id, "package contended twice, billing per session");
                None
            };

            let write = CompletionWrite {
                session_id: id,
                expected_status: session.status,
                debit,
            };
            match self.store.complete_session(write) {
                Ok(completion) => {
                    tracing::info!(
                        session_id = %id,
                        package_id = ?completion.session.package_id,
                        sessions_used = ?completion.package.as_ref().map(|p| p.sessions_used),
                        "session completed"
                    );
                    return Ok(completion);
                }
                Err(err) if debit.is_some() && is_package_conflict(&err) => {
                    tracing::warn!(session_id = %id, "credit taken by a concurrent completion");
                }
                Err(StoreError::Conflict {
                    entity: EntityKind::Session,
                    ..
                }) if session_conflicts + 1 < WRITE_ATTEMPTS => {
                    session_conflicts += 1;
                    tracing::warn!(session_id = %id, "session changed during completion, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn transition(&mut self, id: SessionId, to: SessionStatus) -> Result<Session, CoreError> {
        let patch = SessionPatch {
            status: Some(to),
            ..SessionPatch::default()
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            let session = self.store.get_session(id)?;
            ensure_open(&session, to)?;
            let from = session.status;
            match self.store.update_session(id, &patch, from) {
                Ok(session) => {
                    tracing::info!(session_id = %id, %from, %to, "session status changed");
                    return Ok(session);
                }
                Err(StoreError::Conflict { .. }) if attempt < WRITE_ATTEMPTS => {
                    tracing::warn!(session_id = %id, "session changed during update, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

fn ensure_open(session: &Session, to: SessionStatus) -> Result<(), CoreError> {
    if session.status.is_terminal() {
        return Err(CoreError::InvalidTransition {
            session_id: session.id,
            from: session.status,
            to,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientFilter, ClientPatch, NewClient};
    use crate::identity::Profile;
    use crate::ledger::Ledger;
    use crate::memory::MemoryStore;
    use crate::package::{NewPackage, Package, PackageFilter, PackageStatus};
    use crate::payment::{NewPayment, Payment, PaymentFilter};
    use crate::rate::RateConfig;
    use crate::session::{SessionFilter, SessionMode};
    use crate::types::{ClientId, PackageId, PaymentId, UserId, ValidationError};
    use crate::Client;
    use chrono::{DateTime, Duration, Utc};

    struct Fixture {
        store: MemoryStore,
        trainer: UserId,
        client_id: ClientId,
    }

    impl Fixture {
        fn new() -> Self {
            let mut store = MemoryStore::new();
            let trainer = UserId::new_random();
            let client_id = store
                .insert_client(&NewClient::new(trainer, "Ana", RateConfig::PackageBased))
                .unwrap()
                .id;
            Self {
                store,
                trainer,
                client_id,
            }
        }

        fn session(&mut self) -> Session {
            let new = NewSession {
                trainer_id: self.trainer,
                client_id: self.client_id,
                start_at: start(),
                end_at: Some(start() + Duration::minutes(60)),
                mode: SessionMode::InPerson,
            };
            SessionEngine::new(&mut self.store).schedule(&new).unwrap()
        }

        fn package(&mut self, total: i64, used: i64) -> Package {
            let package = Ledger::new(&mut self.store)
                .open_package(NewPackage::new(self.client_id, total))
                .unwrap();
            self.store.set_package_usage(package.id, used).unwrap();
            self.store.get_package(package.id).unwrap()
        }
    }

    fn start() -> DateTime<Utc> {
        crate::types::parse_instant("2025-03-03T09:00:00Z").unwrap()
    }

    fn assert_invariants(store: &MemoryStore) {
        for package in store.list_packages(&PackageFilter::default()).unwrap() {
            assert!(package.sessions_used >= 0);
            assert!(package.sessions_used <= package.sessions_total);
        }
        for session in store.list_sessions(&SessionFilter::default()).unwrap() {
            if session.package_id.is_some() {
                assert_eq!(session.status, SessionStatus::Completed);
            }
        }
    }

    #[test]
    fn schedule_rejects_end_before_start() {
        let mut f = Fixture::new();
        let new = NewSession {
            trainer_id: f.trainer,
            client_id: f.client_id,
            start_at: start(),
            end_at: Some(start()),
            mode: SessionMode::Online,
        };
        let err = SessionEngine::new(&mut f.store).schedule(&new).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::EndBeforeStart { .. })
        ));
    }

    #[test]
    fn schedule_starts_scheduled_without_package() {
        let mut f = Fixture::new();
        let session = f.session();
        assert_eq!(session.status, SessionStatus::Scheduled);
        assert_eq!(session.package_id, None);
    }

    #[test]
    fn pending_and_scheduled_toggle() {
        let mut f = Fixture::new();
        let session = f.session();
        let mut engine = SessionEngine::new(&mut f.store);
        assert_eq!(
            engine.mark_pending(session.id).unwrap().status,
            SessionStatus::Pending
        );
        assert_eq!(
            engine.mark_scheduled(session.id).unwrap().status,
            SessionStatus::Scheduled
        );
    }

    #[test]
    fn completing_consumes_last_credit() {
        let mut f = Fixture::new();
        let package = f.package(10, 9);
        let session = f.session();

        let completion = SessionEngine::new(&mut f.store)
            .complete(session.id)
            .unwrap();
        assert_eq!(completion.session.status, SessionStatus::Completed);
        assert_eq!(completion.session.package_id, Some(package.id));
        assert_eq!(completion.package.unwrap().sessions_used, 10);
        assert_eq!(f.store.get_package(package.id).unwrap().sessions_used, 10);
        assert_invariants(&f.store);
    }

    #[test]
    fn completing_with_exhausted_package_bills_per_session() {
        let mut f = Fixture::new();
        let package = f.package(10, 10);
        let session = f.session();

        let completion = SessionEngine::new(&mut f.store)
            .complete(session.id)
            .unwrap();
        assert_eq!(completion.session.status, SessionStatus::Completed);
        assert_eq!(completion.session.package_id, None);
        assert!(completion.package.is_none());
        assert_eq!(f.store.get_package(package.id).unwrap().sessions_used, 10);
        assert_invariants(&f.store);
    }

    #[test]
    fn completing_without_packages_bills_per_session() {
        let mut f = Fixture::new();
        let session = f.session();
        let completion = SessionEngine::new(&mut f.store)
            .complete(session.id)
            .unwrap();
        assert_eq!(completion.session.package_id, None);
    }

    #[test]
    fn completing_twice_debits_once() {
        let mut f = Fixture::new();
        let package = f.package(10, 3);
        let session = f.session();

        let mut engine = SessionEngine::new(&mut f.store);
        engine.complete(session.id).unwrap();
        let err = engine.complete(session.id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: SessionStatus::Completed,
                to: SessionStatus::Completed,
                ..
            }
        ));
        assert_eq!(f.store.get_package(package.id).unwrap().sessions_used, 4);
    }

    #[test]
    fn completing_cancelled_session_is_rejected() {
        let mut f = Fixture::new();
        let package = f.package(10, 0);
        let session = f.session();

        let mut engine = SessionEngine::new(&mut f.store);
        engine.cancel(session.id).unwrap();
        let err = engine.complete(session.id).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                from: SessionStatus::Cancelled,
                ..
            }
        ));
        assert_eq!(f.store.get_package(package.id).unwrap().sessions_used, 0);
        assert_eq!(
            f.store.get_session(session.id).unwrap().status,
            SessionStatus::Cancelled
        );
    }

    #[test]
    fn terminal_sessions_reject_every_transition() {
        let mut f = Fixture::new();
        let session = f.session();
        let mut engine = SessionEngine::new(&mut f.store);
        engine.complete(session.id).unwrap();

        assert!(matches!(
            engine.mark_pending(session.id),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            engine.mark_scheduled(session.id),
            Err(CoreError::InvalidTransition { .. })
        ));
        assert!(matches!(
            engine.cancel(session.id),
            Err(CoreError::InvalidTransition { .. })
        ));
    }

    #[test]
    fn missing_session_is_not_found() {
        let mut f = Fixture::new();
        let err = SessionEngine::new(&mut f.store)
            .complete(SessionId::new(999).unwrap())
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::NotFound {
                entity: EntityKind::Session,
                ..
            }
        ));
    }

    /// Store wrapper that lets a rival completion run between package
    /// selection and the completion write.
    struct Racing {
        inner: MemoryStore,
        rivals: Vec<SessionId>,
    }

    impl Racing {
        fn interleave(&mut self) {
            if let Some(rival) = self.rivals.pop() {
                SessionEngine::new(&mut self.inner).complete(rival).unwrap();
            }
        }
    }

    impl Store for Racing {
        fn insert_client(&mut self, new: &NewClient) -> Result<Client, StoreError> {
            self.inner.insert_client(new)
        }
        fn get_client(&self, id: ClientId) -> Result<Client, StoreError> {
            self.inner.get_client(id)
        }
        fn list_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>, StoreError> {
            self.inner.list_clients(filter)
        }
        fn update_client(&mut self, id: ClientId, patch: &ClientPatch) -> Result<Client, StoreError> {
            self.inner.update_client(id, patch)
        }
        fn insert_package(&mut self, new: &NewPackage) -> Result<Package, StoreError> {
            self.inner.insert_package(new)
        }
        fn get_package(&self, id: PackageId) -> Result<Package, StoreError> {
            self.inner.get_package(id)
        }
        fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, StoreError> {
            self.inner.list_packages(filter)
        }
        fn debit_package(&mut self, debit: CreditDebit) -> Result<Package, StoreError> {
            self.inner.debit_package(debit)
        }
        fn close_package(
            &mut self,
            id: PackageId,
            status: PackageStatus,
        ) -> Result<Package, StoreError> {
            self.inner.close_package(id, status)
        }
        fn insert_session(&mut self, new: &NewSession) -> Result<Session, StoreError> {
            self.inner.insert_session(new)
        }
        fn get_session(&self, id: SessionId) -> Result<Session, StoreError> {
            self.inner.get_session(id)
        }
        fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError> {
            self.inner.list_sessions(filter)
        }
        fn update_session(
            &mut self,
            id: SessionId,
            patch: &SessionPatch,
            expected_status: SessionStatus,
        ) -> Result<Session, StoreError> {
            self.inner.update_session(id, patch, expected_status)
        }
        fn complete_session(&mut self, write: CompletionWrite) -> Result<Completion, StoreError> {
            self.interleave();
            self.inner.complete_session(write)
        }
        fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, StoreError> {
            self.inner.insert_payment(new)
        }
        fn get_payment(&self, id: PaymentId) -> Result<Payment, StoreError> {
            self.inner.get_payment(id)
        }
        fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StoreError> {
            self.inner.list_payments(filter)
        }
        fn upsert_profile(&mut self, profile: &Profile) -> Result<(), StoreError> {
            self.inner.upsert_profile(profile)
        }
        fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>, StoreError> {
            self.inner.get_profile(user_id)
        }
        fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
            self.inner.find_profile_by_email(email)
        }
    }

    #[test]
    fn race_for_last_credit_has_one_winner() {
        let mut f = Fixture::new();
        let package = f.package(10, 9);
        let ours = f.session();
        let rival = f.session();

        let mut racing = Racing {
            inner: f.store,
            rivals: vec![rival.id],
        };
        let completion = SessionEngine::new(&mut racing).complete(ours.id).unwrap();

        assert_eq!(completion.session.status, SessionStatus::Completed);
        assert_eq!(completion.session.package_id, None);
        let rival = racing.inner.get_session(rival.id).unwrap();
        assert_eq!(rival.package_id, Some(package.id));
        assert_eq!(racing.inner.get_package(package.id).unwrap().sessions_used, 10);
        assert_invariants(&racing.inner);
    }

    #[test]
    fn race_retries_selection_on_older_package() {
        let mut f = Fixture::new();
        let older = f.package(5, 0);
        let newer = f.package(10, 9);
        let ours = f.session();
        let rival = f.session();

        let mut racing = Racing {
            inner: f.store,
            rivals: vec![rival.id],
        };
        let completion = SessionEngine::new(&mut racing).complete(ours.id).unwrap();

        assert_eq!(completion.session.package_id, Some(older.id));
        assert_eq!(
            racing.inner.get_session(rival.id).unwrap().package_id,
            Some(newer.id)
        );
        assert_eq!(racing.inner.get_package(older.id).unwrap().sessions_used, 1);
        assert_invariants(&racing.inner);
    }

    #[test]
    fn contended_twice_falls_back_to_per_session_billing() {
        let mut f = Fixture::new();
        let older = f.package(5, 4);
        let newer = f.package(10, 9);
        let ours = f.session();
        let rival_a = f.session();
        let rival_b = f.session();

        let mut racing = Racing {
            inner: f.store,
            rivals: vec![rival_b.id, rival_a.id],
        };
        let completion = SessionEngine::new(&mut racing).complete(ours.id).unwrap();

        assert_eq!(completion.session.package_id, None);
        assert_eq!(
            racing.inner.get_session(rival_a.id).unwrap().package_id,
            Some(newer.id)
        );
        assert_eq!(
            racing.inner.get_session(rival_b.id).unwrap().package_id,
            Some(older.id)
        );
        assert_invariants(&racing.inner);
    }

    #[test]
    fn rival_completing_same_session_wins() {
        let mut f = Fixture::new();
        let package = f.package(10, 0);
        let session = f.session();

        let mut racing = Racing {
            inner: f.store,
            rivals: vec![session.id],
        };
        let err = SessionEngine::new(&mut racing)
            .complete(session.id)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(racing.inner.get_package(package.id).unwrap().sessions_used, 1);
    }
}
