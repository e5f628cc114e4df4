//! Package ledger: which package absorbs a completion, and the debit itself.
//!
//! # Selection
//!
//! Among a client's `active` packages with remaining capacity, the one with
//! the highest ID (the most recently purchased) is consumed first. A client
//! with no such package is billed per session instead; that is a normal
//! outcome, not an error.
//!
//! # Debits
//!
//! Debits are compare-and-set writes against the `sessions_used` value that
//! was read, so two writers racing for the last credit cannot both succeed
//! and `sessions_used` never exceeds `sessions_total`.

use crate::error::{CoreError, StoreError};
use crate::package::{NewPackage, Package, PackageFilter, PackageStatus};
use crate::store::{CreditDebit, Store};
use crate::types::{ClientId, EntityKind, PackageId, SortOrder, ValidationError};

/// Number of reads a conditional write gets before a conflict is surfaced.
pub(crate) const WRITE_ATTEMPTS: usize = 2;

/// Picks the package that should absorb the next completion.
///
/// Pure over a snapshot of the client's packages.
#[must_use]
pub fn select_active_package(packages: &[Package]) -> Option<&Package> {
    packages
        .iter()
        .filter(|p| p.has_capacity())
        .max_by_key(|p| p.id)
}

/// Credits left on a package, never negative.
#[must_use]
pub fn remaining_credits(package: &Package) -> i64 {
    package.remaining_credits()
}

/// Package operations over a store.
pub struct Ledger<'a, S> {
    store: &'a mut S,
}

impl<'a, S: Store> Ledger<'a, S> {
    pub const fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Opens a new active package for a client.
    pub fn open_package(&mut self, new: NewPackage) -> Result<Package, CoreError> {
        let new = new.validated()?;
        let package = self.store.insert_package(&new)?;
        tracing::info!(
            package_id = %package.id,
            client_id = %package.client_id,
            sessions_total = package.sessions_total,
            "package opened"
        );
        Ok(package)
    }

    /// Reads the package that would absorb the client's next completion.
    pub fn select_active_package(&self, client_id: ClientId) -> Result<Option<Package>, CoreError> {
        select_from_store(&*self.store, client_id)
    }

    /// Debits exactly one credit from a package.
    ///
    /// Fails with `CapacityExceeded` when the package is exhausted or no
    /// longer active at the time of the debit. A concurrent debit is retried
    /// once against a fresh read.
    pub fn consume_credit(&mut self, package_id: PackageId) -> Result<Package, CoreError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let package = self.store.get_package(package_id)?;
            if !package.has_capacity() {
                return Err(CoreError::CapacityExceeded {
                    package_id,
                    sessions_used: package.sessions_used,
                    sessions_total: package.sessions_total,
                });
            }
            let debit = CreditDebit {
                package_id,
                expected_used: package.sessions_used,
            };
            match self.store.debit_package(debit) {
                Ok(package) => {
                    tracing::info!(
                        %package_id,
                        sessions_used = package.sessions_used,
                        sessions_total = package.sessions_total,
                        "credit consumed"
                    );
                    return Ok(package);
                }
                Err(StoreError::Conflict { .. }) if attempt < WRITE_ATTEMPTS => {
                    tracing::warn!(%package_id, "package changed during debit, re-reading");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Closes an active package as expired or cancelled.
    pub fn retire_package(
        &mut self,
        package_id: PackageId,
        status: PackageStatus,
    ) -> Result<Package, CoreError> {
        let package = self.store.get_package(package_id)?;
        if status == PackageStatus::Active || package.status != PackageStatus::Active {
            return Err(ValidationError::InvalidRetirement { package_id, status }.into());
        }
        let package = self.store.close_package(package_id, status)?;
        tracing::info!(%package_id, %status, "package retired");
        Ok(package)
    }

    /// All of a client's packages, newest first.
    pub fn packages_for(&self, client_id: ClientId) -> Result<Vec<Package>, CoreError> {
        packages_for(&*self.store, client_id)
    }

    /// Remaining credits on the package that would be consumed next.
    pub fn client_balance(&self, client_id: ClientId) -> Result<i64, CoreError> {
        Ok(self
            .select_active_package(client_id)?
            .map_or(0, |p| p.remaining_credits()))
    }
}

pub(crate) fn select_from_store<S: Store + ?Sized>(
    store: &S,
    client_id: ClientId,
) -> Result<Option<Package>, CoreError> {
    let packages = store.list_packages(&PackageFilter::active_for(client_id))?;
    let selected = select_active_package(&packages).cloned();
    tracing::debug!(
        %client_id,
        candidates = packages.len(),
        selected = ?selected.as_ref().map(|p| p.id),
        "package selection"
    );
    Ok(selected)
}

pub(crate) fn packages_for<S: Store + ?Sized>(
    store: &S,
    client_id: ClientId,
) -> Result<Vec<Package>, CoreError> {
    store.get_client(client_id)?;
    Ok(store.list_packages(&PackageFilter {
        client_id: Some(client_id),
        order: SortOrder::Descending,
        ..PackageFilter::default()
    })?)
}

/// Whether a store error is a conflict on a package row.
pub(crate) const fn is_package_conflict(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::Conflict {
            entity: EntityKind::Package,
            ..
        }
    )
}
