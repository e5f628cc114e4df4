//! Training sessions.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{
    ClientId, PackageId, SessionId, SortOrder, UserId, ValidationError, truncate_instant,
};

/// Duration assumed for a session stored without an end.
pub const DEFAULT_SESSION_LENGTH: Duration = Duration::minutes(60);

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Pending,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Completed and cancelled sessions accept no further status change.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ValidationError::UnknownVariant {
                field: "session status",
                value: s.to_string(),
            }),
        }
    }
}

/// Where a session takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    #[default]
    InPerson,
    Online,
}

impl SessionMode {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InPerson => "in_person",
            Self::Online => "online",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::InPerson => "In person",
            Self::Online => "Online",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionMode {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in_person" | "in-person" => Ok(Self::InPerson),
            "online" => Ok(Self::Online),
            _ => Err(ValidationError::UnknownVariant {
                field: "session mode",
                value: s.to_string(),
            }),
        }
    }
}

/// A single training appointment between a trainer and a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub trainer_id: UserId,
    pub client_id: ClientId,
    pub start_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<DateTime<Utc>>,
    pub mode: SessionMode,
    pub status: SessionStatus,
    /// Package whose credit this session consumed. Only set on completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<PackageId>,
}

impl Session {
    /// Length of the session, falling back to the default when open-ended.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_at
            .map(|end| end - self.start_at)
            .filter(|d| *d > Duration::zero())
            .unwrap_or(DEFAULT_SESSION_LENGTH)
    }

    /// End of the session, falling back to start plus the default length.
    #[must_use]
    pub fn effective_end(&self) -> DateTime<Utc> {
        self.end_at
            .unwrap_or_else(|| self.start_at + DEFAULT_SESSION_LENGTH)
    }
}

/// Fields for scheduling a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub trainer_id: UserId,
    pub client_id: ClientId,
    pub start_at: DateTime<Utc>,
    pub end_at: Option<DateTime<Utc>>,
    pub mode: SessionMode,
}

impl NewSession {
    /// Rejects a window whose end is not after its start.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_window(self.start_at, self.end_at)
    }

    /// The same session with both instants truncated to stored precision.
    #[must_use]
    pub fn truncated(&self) -> Self {
        Self {
            start_at: truncate_instant(self.start_at),
            end_at: self.end_at.map(truncate_instant),
            ..self.clone()
        }
    }
}

/// Checks `end_at > start_at` at stored precision when an end is given.
pub fn validate_window(
    start_at: DateTime<Utc>,
    end_at: Option<DateTime<Utc>>,
) -> Result<(), ValidationError> {
    let start_at = truncate_instant(start_at);
    match end_at.map(truncate_instant) {
        Some(end_at) if end_at <= start_at => {
            Err(ValidationError::EndBeforeStart { start_at, end_at })
        }
        _ => Ok(()),
    }
}

/// Partial update of a session. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub status: Option<SessionStatus>,
    pub start_at: Option<DateTime<Utc>>,
    pub end_at: Option<DateTime<Utc>>,
}

/// Package linkage criterion for session queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PackageLink {
    #[default]
    Any,
    /// Sessions that consumed no package credit.
    Unlinked,
    Linked(PackageId),
}

/// Criteria for listing sessions. Results are ordered by `start_at`, then ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionFilter {
    pub trainer_id: Option<UserId>,
    pub client_id: Option<ClientId>,
    pub status: Option<SessionStatus>,
    pub package: PackageLink,
    /// Inclusive lower bound on `start_at`.
    pub starts_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on `start_at`.
    pub starts_before: Option<DateTime<Utc>>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl SessionFilter {
    /// Returns whether a session satisfies every criterion.
    #[must_use]
    pub fn matches(&self, session: &Session) -> bool {
        self.trainer_id.is_none_or(|t| t == session.trainer_id)
            && self.client_id.is_none_or(|c| c == session.client_id)
            && self.status.is_none_or(|s| s == session.status)
            && match self.package {
                PackageLink::Any => true,
                PackageLink::Unlinked => session.package_id.is_none(),
                PackageLink::Linked(id) => session.package_id == Some(id),
            }
            && self.starts_from.is_none_or(|from| session.start_at >= from)
            && self.starts_before.is_none_or(|before| session.start_at < before)
    }
}
