//! Payment records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ClientId, PaymentId, SessionId, SortOrder, UserId};

/// A recorded payment. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub trainer_id: UserId,
    pub client_id: ClientId,
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
    pub paid_at: DateTime<Utc>,
    /// Credits bought with this payment, when it paid for a package.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions_purchased: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_ids: Vec<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Fields for recording a payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
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

/// Criteria for listing payments. Results are ordered by `paid_at`, then ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaymentFilter {
    pub trainer_id: Option<UserId>,
    pub client_id: Option<ClientId>,
    /// Inclusive lower bound on `paid_at`.
    pub paid_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `paid_at`.
    pub paid_before: Option<DateTime<Utc>>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl PaymentFilter {
    /// Returns whether a payment satisfies every criterion.
    #[must_use]
    pub fn matches(&self, payment: &Payment) -> bool {
        self.trainer_id.is_none_or(|t| t == payment.trainer_id)
            && self.client_id.is_none_or(|c| c == payment.client_id)
            && self.paid_from.is_none_or(|from| payment.paid_at >= from)
            && self.paid_before.is_none_or(|before| payment.paid_at < before)
    }
}
