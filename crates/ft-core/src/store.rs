//! Persistence seam consumed by the domain operations.
//!
//! Implementations only persist; they never trigger business logic. Callers
//! orchestrate multi-entity transitions, using the conditional writes below
//! wherever a concurrent writer could invalidate what they read.

use crate::client::{Client, ClientFilter, ClientPatch, NewClient};
use crate::error::StoreError;
use crate::identity::Profile;
use crate::package::{NewPackage, Package, PackageFilter, PackageStatus};
use crate::payment::{NewPayment, Payment, PaymentFilter};
use crate::session::{NewSession, Session, SessionFilter, SessionPatch, SessionStatus};
use crate::types::{ClientId, PackageId, PaymentId, SessionId, UserId};

/// A compare-and-set debit of one package credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditDebit {
    pub package_id: PackageId,
    /// `sessions_used` as last read; the debit only applies if unchanged.
    pub expected_used: i64,
}

/// The atomic write performed when a session completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletionWrite {
    pub session_id: SessionId,
    /// Status as last read; the write only applies if unchanged.
    pub expected_status: SessionStatus,
    pub debit: Option<CreditDebit>,
}

/// Result of a committed [`CompletionWrite`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub session: Session,
    /// The debited package, after the debit.
    pub package: Option<Package>,
}

/// Durable records for clients, packages, sessions, payments and profiles.
pub trait Store {
    fn insert_client(&mut self, new: &NewClient) -> Result<Client, StoreError>;
    fn get_client(&self, id: ClientId) -> Result<Client, StoreError>;
    fn list_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>, StoreError>;
    fn update_client(&mut self, id: ClientId, patch: &ClientPatch) -> Result<Client, StoreError>;

    fn insert_package(&mut self, new: &NewPackage) -> Result<Package, StoreError>;
    fn get_package(&self, id: PackageId) -> Result<Package, StoreError>;
    fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, StoreError>;

    /// Increments `sessions_used` by one if it still equals `expected_used`,
    /// the package is active and has capacity; otherwise returns `Conflict`.
    fn debit_package(&mut self, debit: CreditDebit) -> Result<Package, StoreError>;

    /// Moves an active package to another status; `Conflict` if not active.
    fn close_package(&mut self, id: PackageId, status: PackageStatus)
    -> Result<Package, StoreError>;

    fn insert_session(&mut self, new: &NewSession) -> Result<Session, StoreError>;
    fn get_session(&self, id: SessionId) -> Result<Session, StoreError>;
    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError>;

    /// Applies a patch if the stored status still equals `expected_status`;
    /// otherwise returns `Conflict`.
    fn update_session(
        &mut self,
        id: SessionId,
        patch: &SessionPatch,
        expected_status: SessionStatus,
    ) -> Result<Session, StoreError>;

    /// Applies the optional debit and the session's completion together.
    ///
    /// Either both writes are committed or neither is. A failed debit
    /// precondition returns `Conflict` for the package; a changed session
    /// status returns `Conflict` for the session.
    fn complete_session(&mut self, write: CompletionWrite) -> Result<Completion, StoreError>;

    fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, StoreError>;
    fn get_payment(&self, id: PaymentId) -> Result<Payment, StoreError>;
    fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StoreError>;

    /// Inserts or replaces a profile, keyed by user ID.
    fn upsert_profile(&mut self, profile: &Profile) -> Result<(), StoreError>;
    fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>, StoreError>;
    /// Looks up a profile by its lower-cased email.
    fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError>;
}
