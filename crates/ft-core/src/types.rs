//! Core type definitions with validation.

use std::fmt;

use chrono::{DateTime, NaiveDate, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Validation errors for caller input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required text field was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An identifier was zero or negative.
    #[error("{field} must be positive, got {value}")]
    NonPositiveId { field: &'static str, value: i64 },

    /// A money figure was negative.
    #[error("{field} must be a non-negative number, got {value}")]
    NegativeAmount { field: &'static str, value: Decimal },

    /// A money figure could not be parsed.
    #[error("{field} must be a number, got {value:?}")]
    InvalidAmount { field: &'static str, value: String },

    /// A timestamp could not be parsed as an instant.
    #[error("invalid instant: {value:?}")]
    InvalidInstant { value: String },

    /// A calendar date could not be parsed.
    #[error("invalid date: {value:?}, expected YYYY-MM-DD")]
    InvalidDate { value: String },

    /// The session end was not after its start.
    #[error("end_at {end_at} must be after start_at {start_at}")]
    EndBeforeStart {
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    },

    /// A count was negative.
    #[error("{field} cannot be negative, got {value}")]
    NegativeCount { field: &'static str, value: i64 },

    /// A package was created without any capacity.
    #[error("sessions_total must be at least 1, got {value}")]
    ZeroCapacity { value: i64 },

    /// A package validity window ends before it starts.
    #[error("expires_on {expires_on} is before starts_on {starts_on}")]
    InvertedValidity {
        starts_on: NaiveDate,
        expires_on: NaiveDate,
    },

    /// A payment linked a session that belongs to another client.
    #[error("session {session_id} does not belong to client {client_id}")]
    ForeignSession {
        session_id: SessionId,
        client_id: ClientId,
    },

    /// A package was closed with a status that does not close it.
    #[error("cannot retire package {package_id} as {status}")]
    InvalidRetirement {
        package_id: PackageId,
        status: crate::PackageStatus,
    },

    /// Unknown value for an enumerated field.
    #[error("invalid {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },

    /// A money total does not fit in a decimal.
    #[error("{field} is too large to compute")]
    AmountOverflow { field: &'static str },
}

/// The kind of stored entity, used to qualify store errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Client,
    Package,
    Session,
    Payment,
    Profile,
}

impl EntityKind {
    /// String representation, matching the backing table's singular name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Package => "package",
            Self::Session => "session",
            Self::Payment => "payment",
            Self::Profile => "profile",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generates a validated row ID newtype with common trait implementations.
///
/// Row IDs are positive integers assigned by the store in creation order.
macro_rules! define_row_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "i64", into = "i64")]
        pub struct $name(i64);

        impl $name {
            /// Creates a new ID after validation.
            pub const fn new(id: i64) -> Result<Self, ValidationError> {
                if id <= 0 {
                    return Err(ValidationError::NonPositiveId {
                        field: $field_name,
                        value: id,
                    });
                }
                Ok(Self(id))
            }

            /// Returns the raw integer value.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl TryFrom<i64> for $name {
            type Error = ValidationError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s.trim().parse::<i64>().map_err(|_| ValidationError::UnknownVariant {
                    field: $field_name,
                    value: s.to_string(),
                })?;
                Self::new(value)
            }
        }
    };
}

define_row_id!(
    /// A validated client identifier.
    ClientId, "client ID"
);

define_row_id!(
    /// A validated package identifier.
    ///
    /// Higher IDs belong to more recently created packages.
    PackageId, "package ID"
);

define_row_id!(
    /// A validated session identifier.
    SessionId, "session ID"
);

define_row_id!(
    /// A validated payment identifier.
    PaymentId, "payment ID"
);

/// An account identity issued by the external identity provider.
///
/// Trainers and linked clients are both identified this way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(Uuid);

impl UserId {
    /// Wraps an existing account UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Generates a fresh random identity.
    #[must_use]
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for UserId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::UnknownVariant {
                field: "user ID",
                value: s.to_string(),
            })
    }
}

/// Ordering applied to list queries.
///
/// Each entity sorts on its natural timestamp (or name for clients) and then
/// on ID so results are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    /// SQL keyword for this ordering.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// Drops precision below one millisecond, the resolution instants are stored at.
#[must_use]
pub fn truncate_instant(instant: DateTime<Utc>) -> DateTime<Utc> {
    instant.trunc_subsecs(3)
}

/// Parses an RFC 3339 instant, truncated to milliseconds.
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>, ValidationError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|parsed| truncate_instant(parsed.with_timezone(&Utc)))
        .map_err(|_| ValidationError::InvalidInstant {
            value: value.to_string(),
        })
}

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate, ValidationError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ValidationError::InvalidDate {
        value: value.to_string(),
    })
}

/// Parses a money figure and rejects negative values.
pub fn parse_amount(field: &'static str, value: &str) -> Result<Decimal, ValidationError> {
    let amount: Decimal = value
        .trim()
        .parse()
        .map_err(|_| ValidationError::InvalidAmount {
            field,
            value: value.to_string(),
        })?;
    ensure_non_negative(field, amount)?;
    Ok(amount)
}

/// Adds two money figures, failing instead of overflowing.
pub fn checked_total(
    field: &'static str,
    total: Decimal,
    amount: Decimal,
) -> Result<Decimal, ValidationError> {
    total
        .checked_add(amount)
        .ok_or(ValidationError::AmountOverflow { field })
}

pub(crate) fn ensure_non_negative(field: &'static str, value: Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::NegativeAmount { field, value });
    }
    Ok(())
}

/// Trims a required text field, rejecting blank input.
pub(crate) fn required_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(trimmed.to_string())
}

/// Trims an optional text field, mapping blank input to `None`.
pub(crate) fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_id_rejects_zero_and_negative() {
        assert_eq!(
            ClientId::new(0),
            Err(ValidationError::NonPositiveId {
                field: "client ID",
                value: 0
            })
        );
        assert!(SessionId::new(-4).is_err());
        assert_eq!(PackageId::new(7).unwrap().get(), 7);
    }

    #[test]
    fn row_id_parses_from_str() {
        let id: SessionId = " 42 ".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert!("abc".parse::<SessionId>().is_err());
    }

    #[test]
    fn row_id_serde_rejects_invalid() {
        let parsed: Result<ClientId, _> = serde_json::from_str("0");
        assert!(parsed.is_err());
        let parsed: ClientId = serde_json::from_str("3").unwrap();
        assert_eq!(parsed.get(), 3);
    }

    #[test]
    fn parse_instant_accepts_offsets() {
        let parsed = parse_instant("2025-03-01T10:00:00+01:00").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-03-01T09:00:00+00:00");
        assert!(matches!(
            parse_instant("next tuesday"),
            Err(ValidationError::InvalidInstant { .. })
        ));
    }

    #[test]
    fn parse_instant_drops_sub_millisecond_precision() {
        let parsed = parse_instant("2025-03-03T09:00:00.0009Z").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2025-03-03T09:00:00+00:00");
        let parsed = parse_instant("2025-03-03T09:00:00.123456Z").unwrap();
        assert_eq!(parsed.timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn checked_total_reports_overflow() {
        assert_eq!(
            checked_total("total", Decimal::new(15, 1), Decimal::ONE).unwrap(),
            Decimal::new(25, 1)
        );
        assert_eq!(
            checked_total("total", Decimal::MAX, Decimal::ONE),
            Err(ValidationError::AmountOverflow { field: "total" })
        );
    }

    #[test]
    fn parse_amount_rejects_negative_and_garbage() {
        assert_eq!(parse_amount("amount", "12.50").unwrap().to_string(), "12.50");
        assert!(matches!(
            parse_amount("amount", "-1"),
            Err(ValidationError::NegativeAmount { .. })
        ));
        assert!(matches!(
            parse_amount("amount", "ten"),
            Err(ValidationError::InvalidAmount { .. })
        ));
        assert!(parse_amount("amount", "0").is_ok());
    }

    #[test]
    fn required_text_trims() {
        assert_eq!(required_text("name", "  Ana ").unwrap(), "Ana");
        assert_eq!(
            required_text("name", "   "),
            Err(ValidationError::Empty { field: "name" })
        );
    }

    #[test]
    fn user_id_roundtrips_through_str() {
        let id = UserId::new_random();
        let parsed: UserId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }
}
