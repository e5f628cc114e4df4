//! In-memory [`Store`] implementation.
//!
//! Keeps every entity in ordered maps and applies conditional writes with the
//! same semantics as the SQLite store. Suitable for tests and dry runs.

use std::collections::BTreeMap;

use chrono::Utc;

use crate::client::{Client, ClientFilter, ClientPatch, NewClient};
use crate::error::StoreError;
use crate::identity::Profile;
use crate::package::{NewPackage, Package, PackageFilter, PackageStatus};
use crate::payment::{NewPayment, Payment, PaymentFilter};
use crate::session::{NewSession, Session, SessionFilter, SessionPatch, SessionStatus};
use crate::store::{Completion, CompletionWrite, CreditDebit, Store};
use crate::types::{
    ClientId, EntityKind, PackageId, PaymentId, SessionId, SortOrder, UserId, ValidationError,
    truncate_instant,
};

/// A [`Store`] backed by process memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    next_id: i64,
    clients: BTreeMap<ClientId, Client>,
    packages: BTreeMap<PackageId, Package>,
    sessions: BTreeMap<SessionId, Session>,
    payments: BTreeMap<PaymentId, Payment>,
    profiles: BTreeMap<UserId, Profile>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next row ID. IDs are shared across tables and increase
    /// monotonically, so creation order is preserved.
    fn allocate(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Overwrites a package's counters directly. Test fixtures use this to
    /// set up partially consumed packages.
    pub fn set_package_usage(&mut self, id: PackageId, sessions_used: i64) -> Result<(), StoreError> {
        let package = self.packages.get_mut(&id).ok_or(StoreError::NotFound {
            entity: EntityKind::Package,
            id: id.get(),
        })?;
        package.sessions_used = sessions_used;
        Ok(())
    }
}

fn not_found(entity: EntityKind, id: i64) -> StoreError {
    StoreError::NotFound { entity, id }
}

fn conflict(entity: EntityKind, id: i64) -> StoreError {
    StoreError::Conflict { entity, id }
}

fn invalid(err: ValidationError) -> StoreError {
    StoreError::Backend(Box::new(err))
}

fn finish<T>(mut rows: Vec<T>, order: SortOrder, limit: Option<usize>) -> Vec<T> {
    if order == SortOrder::Descending {
        rows.reverse();
    }
    if let Some(limit) = limit {
        rows.truncate(limit);
    }
    rows
}

impl Store for MemoryStore {
    fn insert_client(&mut self, new: &NewClient) -> Result<Client, StoreError> {
        let id = ClientId::new(self.allocate()).map_err(invalid)?;
        let client = Client {
            id,
            trainer_id: new.trainer_id,
            name: new.name.clone(),
            email: new.email.clone(),
            phone: new.phone.clone(),
            goals: new.goals.clone(),
            start_date: new.start_date,
            preferred_mode: new.preferred_mode,
            rate: new.rate,
            user_id: None,
            created_at: Utc::now(),
        };
        self.clients.insert(id, client.clone());
        Ok(client)
    }

    fn get_client(&self, id: ClientId) -> Result<Client, StoreError> {
        self.clients
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Client, id.get()))
    }

    fn list_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>, StoreError> {
        let mut rows: Vec<Client> = self
            .clients
            .values()
            .filter(|c| filter.trainer_id.is_none_or(|t| t == c.trainer_id))
            .filter(|c| filter.user_id.is_none_or(|u| Some(u) == c.user_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(finish(rows, filter.order, filter.limit))
    }

    fn update_client(&mut self, id: ClientId, patch: &ClientPatch) -> Result<Client, StoreError> {
        let client = self
            .clients
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Client, id.get()))?;
        if let Some(name) = &patch.name {
            client.name.clone_from(name);
        }
        if let Some(email) = &patch.email {
            client.email.clone_from(email);
        }
        if let Some(phone) = &patch.phone {
            client.phone.clone_from(phone);
        }
        if let Some(goals) = &patch.goals {
            client.goals.clone_from(goals);
        }
        if let Some(rate) = patch.rate {
            client.rate = rate;
        }
        if let Some(user_id) = patch.user_id {
            client.user_id = user_id;
        }
        Ok(client.clone())
    }

    fn insert_package(&mut self, new: &NewPackage) -> Result<Package, StoreError> {
        if !self.clients.contains_key(&new.client_id) {
            return Err(not_found(EntityKind::Client, new.client_id.get()));
        }
        let id = PackageId::new(self.allocate()).map_err(invalid)?;
        let package = Package {
            id,
            client_id: new.client_id,
            name: new.name.clone(),
            price: new.price,
            sessions_total: new.sessions_total,
            sessions_used: 0,
            status: PackageStatus::Active,
            starts_on: new.starts_on,
            expires_on: new.expires_on,
            created_at: Utc::now(),
        };
        self.packages.insert(id, package.clone());
        Ok(package)
    }

    fn get_package(&self, id: PackageId) -> Result<Package, StoreError> {
        self.packages
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Package, id.get()))
    }

    fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, StoreError> {
        let rows = self
            .packages
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        Ok(finish(rows, filter.order, filter.limit))
    }

    fn debit_package(&mut self, debit: CreditDebit) -> Result<Package, StoreError> {
        let id = debit.package_id;
        let package = self
            .packages
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Package, id.get()))?;
        if package.sessions_used != debit.expected_used || !package.has_capacity() {
            return Err(conflict(EntityKind::Package, id.get()));
        }
        package.sessions_used += 1;
        Ok(package.clone())
    }

    fn close_package(
        &mut self,
        id: PackageId,
        status: PackageStatus,
    ) -> Result<Package, StoreError> {
        let package = self
            .packages
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Package, id.get()))?;
        if package.status != PackageStatus::Active {
            return Err(conflict(EntityKind::Package, id.get()));
        }
        package.status = status;
        Ok(package.clone())
    }

    fn insert_session(&mut self, new: &NewSession) -> Result<Session, StoreError> {
        if !self.clients.contains_key(&new.client_id) {
            return Err(not_found(EntityKind::Client, new.client_id.get()));
        }
        let id = SessionId::new(self.allocate()).map_err(invalid)?;
        let session = Session {
            id,
            trainer_id: new.trainer_id,
            client_id: new.client_id,
            start_at: truncate_instant(new.start_at),
            end_at: new.end_at.map(truncate_instant),
            mode: new.mode,
            status: SessionStatus::Scheduled,
            package_id: None,
        };
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    fn get_session(&self, id: SessionId) -> Result<Session, StoreError> {
        self.sessions
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Session, id.get()))
    }

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError> {
        let mut rows: Vec<Session> = self
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.start_at.cmp(&b.start_at).then_with(|| a.id.cmp(&b.id)));
        Ok(finish(rows, filter.order, filter.limit))
    }

    fn update_session(
        &mut self,
        id: SessionId,
        patch: &SessionPatch,
        expected_status: SessionStatus,
    ) -> Result<Session, StoreError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or_else(|| not_found(EntityKind::Session, id.get()))?;
        if session.status != expected_status {
            return Err(conflict(EntityKind::Session, id.get()));
        }
        if let Some(status) = patch.status {
            session.status = status;
        }
        if let Some(start_at) = patch.start_at {
            session.start_at = truncate_instant(start_at);
        }
        if let Some(end_at) = patch.end_at {
            session.end_at = Some(truncate_instant(end_at));
        }
        Ok(session.clone())
    }

    fn complete_session(&mut self, write: CompletionWrite) -> Result<Completion, StoreError> {
        let session = self.get_session(write.session_id)?;
        if session.status != write.expected_status {
            return Err(conflict(EntityKind::Session, write.session_id.get()));
        }
        // Both preconditions are checked before either write is applied.
        if let Some(debit) = write.debit {
            let package = self.get_package(debit.package_id)?;
            if package.sessions_used != debit.expected_used || !package.has_capacity() {
                return Err(conflict(EntityKind::Package, debit.package_id.get()));
            }
        }
        let package = write.debit.map(|d| self.debit_package(d)).transpose()?;
        let session = self
            .sessions
            .get_mut(&write.session_id)
            .ok_or_else(|| not_found(EntityKind::Session, write.session_id.get()))?;
        session.status = SessionStatus::Completed;
        session.package_id = write.debit.map(|d| d.package_id);
        Ok(Completion {
            session: session.clone(),
            package,
        })
    }

    fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, StoreError> {
        if !self.clients.contains_key(&new.client_id) {
            return Err(not_found(EntityKind::Client, new.client_id.get()));
        }
        let id = PaymentId::new(self.allocate()).map_err(invalid)?;
        let payment = Payment {
            id,
            trainer_id: new.trainer_id,
            client_id: new.client_id,
            amount: new.amount,
            currency: new.currency.clone(),
            method: new.method.clone(),
            paid_at: truncate_instant(new.paid_at),
            sessions_purchased: new.sessions_purchased,
            session_ids: new.session_ids.clone(),
            note: new.note.clone(),
        };
        self.payments.insert(id, payment.clone());
        Ok(payment)
    }

    fn get_payment(&self, id: PaymentId) -> Result<Payment, StoreError> {
        self.payments
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(EntityKind::Payment, id.get()))
    }

    fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StoreError> {
        let mut rows: Vec<Payment> = self
            .payments
            .values()
            .filter(|p| filter.matches(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.paid_at.cmp(&b.paid_at).then_with(|| a.id.cmp(&b.id)));
        Ok(finish(rows, filter.order, filter.limit))
    }

    fn upsert_profile(&mut self, profile: &Profile) -> Result<(), StoreError> {
        let mut profile = profile.clone();
        profile.email = profile.email.trim().to_lowercase();
        self.profiles.insert(profile.user_id, profile);
        Ok(())
    }

    fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>, StoreError> {
        Ok(self.profiles.get(&user_id).cloned())
    }

    fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        let email = email.trim().to_lowercase();
        Ok(self.profiles.values().find(|p| p.email == email).cloned())
    }
}
