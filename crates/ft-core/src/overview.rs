//! Read-only views assembled from several entities.

use chrono::{DateTime, Days, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::client::{Client, ClientFilter};
use crate::error::CoreError;
use crate::finance::month_revenue;
use crate::ledger::{packages_for, select_from_store};
use crate::package::Package;
use crate::payment::{Payment, PaymentFilter};
use crate::session::{Session, SessionFilter};
use crate::store::Store;
use crate::types::{ClientId, SortOrder, UserId};

/// Everything a client sees about their own training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientOverview {
    pub client: Client,
    pub packages: Vec<Package>,
    pub sessions: Vec<Session>,
    pub payments: Vec<Payment>,
    /// Credits left on the package the next completion would consume.
    pub remaining_credits: i64,
}

/// Trainer's summary for the current day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub today: Vec<Session>,
    pub month_revenue: Decimal,
    pub client_count: usize,
}

/// Builds the client-facing view. Lists are newest first.
pub fn client_overview<S: Store + ?Sized>(
    store: &S,
    client_id: ClientId,
) -> Result<ClientOverview, CoreError> {
    let client = store.get_client(client_id)?;
    let packages = packages_for(store, client_id)?;
    let sessions = store.list_sessions(&SessionFilter {
        client_id: Some(client_id),
        order: SortOrder::Descending,
        ..SessionFilter::default()
    })?;
    let payments = store.list_payments(&PaymentFilter {
        client_id: Some(client_id),
        order: SortOrder::Descending,
        ..PaymentFilter::default()
    })?;
    let remaining_credits = select_from_store(store, client_id)?.map_or(0, |p| p.remaining_credits());

    Ok(ClientOverview {
        client,
        packages,
        sessions,
        payments,
        remaining_credits,
    })
}

/// Builds the trainer dashboard for the UTC day containing `now`.
pub fn dashboard<S: Store + ?Sized>(
    store: &S,
    trainer_id: UserId,
    now: DateTime<Utc>,
) -> Result<Dashboard, CoreError> {
    let today = now.date_naive();
    let day_start = today.and_time(NaiveTime::MIN).and_utc();
    let day_end = today
        .checked_add_days(Days::new(1))
        .map_or(day_start, |d| d.and_time(NaiveTime::MIN).and_utc());

    let sessions = store.list_sessions(&SessionFilter {
        trainer_id: Some(trainer_id),
        starts_from: Some(day_start),
        starts_before: Some(day_end),
        ..SessionFilter::default()
    })?;
    let payments = store.list_payments(&PaymentFilter {
        trainer_id: Some(trainer_id),
        ..PaymentFilter::default()
    })?;
    let clients = store.list_clients(&ClientFilter::for_trainer(trainer_id))?;

    tracing::debug!(%trainer_id, sessions = sessions.len(), "dashboard assembled");
    Ok(Dashboard {
        today: sessions,
        month_revenue: month_revenue(&payments, today)?,
        client_count: clients.len(),
    })
}
