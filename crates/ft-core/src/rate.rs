//! Client billing modes.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ValidationError, ensure_non_negative};

/// How a client is billed.
///
/// Only the rate relevant to the mode is carried, so a client can never hold
/// both an hourly and a monthly rate at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rate_type", rename_all = "snake_case")]
pub enum RateConfig {
    /// Billed per completed session not covered by a package credit.
    Hourly { rate: Decimal },
    /// Billed a flat amount per month.
    Monthly { rate: Decimal },
    /// Billed by selling session packages; no automatic amount.
    #[serde(rename = "package")]
    PackageBased,
}

impl RateConfig {
    /// Builds a config from its storage columns.
    ///
    /// The rate for the selected mode must be present; the other is ignored.
    pub fn from_parts(
        rate_type: &str,
        hourly_rate: Option<Decimal>,
        monthly_rate: Option<Decimal>,
    ) -> Result<Self, ValidationError> {
        let config = match rate_type {
            "hourly" => Self::Hourly {
                rate: hourly_rate.ok_or(ValidationError::Empty {
                    field: "hourly_rate",
                })?,
            },
            "monthly" => Self::Monthly {
                rate: monthly_rate.ok_or(ValidationError::Empty {
                    field: "monthly_rate",
                })?,
            },
            "package" => Self::PackageBased,
            other => {
                return Err(ValidationError::UnknownVariant {
                    field: "rate_type",
                    value: other.to_string(),
                });
            }
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses the CLI shorthand: `hourly:50`, `monthly:400` or `package`.
    pub fn parse_shorthand(input: &str) -> Result<Self, ValidationError> {
        let input = input.trim();
        let (kind, rate) = match input.split_once(':') {
            Some((kind, rate)) => (kind, Some(rate)),
            None => (input, None),
        };
        let rate = rate
            .map(|r| crate::types::parse_amount("rate", r))
            .transpose()?;
        match kind {
            "hourly" => Self::from_parts("hourly", rate, None),
            "monthly" => Self::from_parts("monthly", None, rate),
            "package" => Ok(Self::PackageBased),
            other => Err(ValidationError::UnknownVariant {
                field: "rate_type",
                value: other.to_string(),
            }),
        }
    }

    /// Checks the rate figure is non-negative.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::Hourly { rate } => ensure_non_negative("hourly_rate", *rate),
            Self::Monthly { rate } => ensure_non_negative("monthly_rate", *rate),
            Self::PackageBased => Ok(()),
        }
    }

    /// String representation for database storage.
    #[must_use]
    pub const fn rate_type(&self) -> &'static str {
        match self {
            Self::Hourly { .. } => "hourly",
            Self::Monthly { .. } => "monthly",
            Self::PackageBased => "package",
        }
    }

    #[must_use]
    pub const fn hourly_rate(&self) -> Option<Decimal> {
        match self {
            Self::Hourly { rate } => Some(*rate),
            _ => None,
        }
    }

    #[must_use]
    pub const fn monthly_rate(&self) -> Option<Decimal> {
        match self {
            Self::Monthly { rate } => Some(*rate),
            _ => None,
        }
    }
}

impl fmt::Display for RateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hourly { rate } => write!(f, "hourly {rate}"),
            Self::Monthly { rate } => write!(f, "monthly {rate}"),
            Self::PackageBased => f.write_str("package"),
        }
    }
}
