//! Payment reconciliation: suggested amounts and payment records.
//!
//! Payments and packages are independent records. A payment's
//! `sessions_purchased` is informational; opening the matching package is a
//! separate ledger operation.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::CoreError;
use crate::payment::{NewPayment, Payment, PaymentFilter};
use crate::rate::RateConfig;
use crate::session::{PackageLink, SessionFilter, SessionStatus};
use crate::store::Store;
use crate::types::{
    ClientId, SessionId, SortOrder, UserId, ValidationError, ensure_non_negative, optional_text,
    required_text,
};

pub const DEFAULT_CURRENCY: &str = "EUR";
pub const DEFAULT_METHOD: &str = "cash";

/// A payment as entered by the trainer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    pub trainer_id: UserId,
    pub client_id: ClientId,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub paid_at: DateTime<Utc>,
    pub sessions_purchased: Option<i64>,
    pub session_ids: Vec<SessionId>,
    pub note: Option<String>,
}

impl PaymentRequest {
    /// A cash payment in the default currency, paid now.
    pub fn new(trainer_id: UserId, client_id: ClientId, amount: Decimal) -> Self {
        Self {
            trainer_id,
            client_id,
            amount,
            currency: DEFAULT_CURRENCY.to_string(),
            method: DEFAULT_METHOD.to_string(),
            paid_at: Utc::now(),
            sessions_purchased: None,
            session_ids: Vec::new(),
            note: None,
        }
    }
}

/// Suggests and records payments over a store.
pub struct Billing<'a, S> {
    store: &'a mut S,
}

impl<'a, S: Store> Billing<'a, S> {
    pub const fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Amount the client currently owes according to their rate.
    ///
    /// Hourly clients are billed for completed sessions that consumed no
    /// package credit. Monthly clients owe their flat rate. Package clients
    /// get no suggestion.
    pub fn suggest_amount(&self, client_id: ClientId) -> Result<Option<Decimal>, CoreError> {
        let client = self.store.get_client(client_id)?;
        let suggestion = match client.rate {
            RateConfig::Hourly { rate } => {
                let billable = self.store.list_sessions(&SessionFilter {
                    client_id: Some(client_id),
                    status: Some(SessionStatus::Completed),
                    package: PackageLink::Unlinked,
                    ..SessionFilter::default()
                })?;
                tracing::debug!(%client_id, billable = billable.len(), "hourly sessions to bill");
                let owed = rate
                    .checked_mul(Decimal::from(billable.len()))
                    .ok_or(ValidationError::AmountOverflow {
                        field: "suggested amount",
                    })?;
                Some(owed)
            }
            RateConfig::Monthly { rate } => Some(rate),
            RateConfig::PackageBased => None,
        };
        Ok(suggestion)
    }

    /// Validates and stores a payment.
    pub fn record_payment(&mut self, request: PaymentRequest) -> Result<Payment, CoreError> {
        ensure_non_negative("amount", request.amount)?;
        if let Some(value) = request.sessions_purchased.filter(|n| *n < 0) {
            return Err(ValidationError::NegativeCount {
                field: "sessions_purchased",
                value,
            }
            .into());
        }
        let currency = required_text("currency", &request.currency)?.to_uppercase();
        let method = required_text("method", &request.method)?;

        let client = self.store.get_client(request.client_id)?;
        for &session_id in &request.session_ids {
            let session = self.store.get_session(session_id)?;
            if session.client_id != client.id {
                return Err(ValidationError::ForeignSession {
                    session_id,
                    client_id: client.id,
                }
                .into());
            }
        }

        let payment = self.store.insert_payment(&NewPayment {
            trainer_id: request.trainer_id,
            client_id: client.id,
            amount: request.amount,
            currency,
            method,
            paid_at: request.paid_at,
            sessions_purchased: request.sessions_purchased,
            session_ids: request.session_ids,
            note: optional_text(request.note.as_deref()),
        })?;
        tracing::info!(
            payment_id = %payment.id,
            client_id = %payment.client_id,
            amount = %payment.amount,
            currency = %payment.currency,
            "payment recorded"
        );
        Ok(payment)
    }

    /// A client's payments, newest first.
    pub fn payments_for(&self, client_id: ClientId) -> Result<Vec<Payment>, CoreError> {
        self.store.get_client(client_id)?;
        Ok(self.store.list_payments(&PaymentFilter {
            client_id: Some(client_id),
            order: SortOrder::Descending,
            ..PaymentFilter::default()
        })?)
    }
}
