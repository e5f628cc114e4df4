//! Prepaid session packages.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{
    ClientId, PackageId, SortOrder, ValidationError, ensure_non_negative, optional_text,
};

/// Lifecycle status of a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PackageStatus {
    #[default]
    Active,
    Expired,
    Cancelled,
}

impl PackageStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for PackageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ValidationError::UnknownVariant {
                field: "package status",
                value: s.to_string(),
            }),
        }
    }
}

/// A prepaid bundle of session credits.
///
/// `0 <= sessions_used <= sessions_total` holds for every stored package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    pub id: PackageId,
    pub client_id: ClientId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Decimal>,
    pub sessions_total: i64,
    pub sessions_used: i64,
    pub status: PackageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starts_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl Package {
    /// Credits still available, never negative.
    #[must_use]
    pub fn remaining_credits(&self) -> i64 {
        (self.sessions_total - self.sessions_used).max(0)
    }

    /// Whether this package can absorb a completion right now.
    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.status == PackageStatus::Active && self.remaining_credits() > 0
    }

    /// Human-readable label, falling back to the ID.
    #[must_use]
    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("Package #{}", self.id))
    }
}

/// Fields for opening a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPackage {
    pub client_id: ClientId,
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub sessions_total: i64,
    pub starts_on: Option<NaiveDate>,
    pub expires_on: Option<NaiveDate>,
}

impl NewPackage {
    /// Creates a package form with only a capacity.
    #[must_use]
    pub const fn new(client_id: ClientId, sessions_total: i64) -> Self {
        Self {
            client_id,
            name: None,
            price: None,
            sessions_total,
            starts_on: None,
            expires_on: None,
        }
    }

    /// Normalizes the name and checks capacity, price and validity window.
    pub fn validated(self) -> Result<Self, ValidationError> {
        if self.sessions_total < 1 {
            return Err(ValidationError::ZeroCapacity {
                value: self.sessions_total,
            });
        }
        if let Some(price) = self.price {
            ensure_non_negative("price", price)?;
        }
        if let (Some(starts_on), Some(expires_on)) = (self.starts_on, self.expires_on) {
            if expires_on < starts_on {
                return Err(ValidationError::InvertedValidity {
                    starts_on,
                    expires_on,
                });
            }
        }
        Ok(Self {
            name: optional_text(self.name.as_deref()),
            ..self
        })
    }
}

/// Criteria for listing packages. Results are ordered by ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFilter {
    pub client_id: Option<ClientId>,
    pub status: Option<PackageStatus>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl PackageFilter {
    /// Active packages of one client.
    #[must_use]
    pub fn active_for(client_id: ClientId) -> Self {
        Self {
            client_id: Some(client_id),
            status: Some(PackageStatus::Active),
            ..Self::default()
        }
    }

    /// Returns whether a package satisfies every criterion.
    #[must_use]
    pub fn matches(&self, package: &Package) -> bool {
        self.client_id.is_none_or(|c| c == package.client_id)
            && self.status.is_none_or(|s| s == package.status)
    }
}
