//! Shared utilities for CLI commands.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Days, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use ft_core::{Client, ClientFilter, ClientId, CurrentUser, Session, SessionId, Store};
use ft_db::Database;
use regex::Regex;

/// Pre-compiled regex for relative time parsing.
static RELATIVE_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^in\s+(\d+)\s+(minute|hour|day|week)s?$").unwrap());

/// Pre-compiled regex for day-relative clock times.
static DAY_TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(today|tomorrow)\s+(\d{1,2}:\d{2})$").unwrap());

/// Conservative bounds for relative time parsing (~10 years in minutes).
const MAX_RELATIVE_MINUTES: i64 = 10 * 365 * 24 * 60;

/// Parse a datetime string relative to `now`.
///
/// Supports:
/// - ISO 8601: "2026-01-15T10:30:00Z"
/// - Local form without offset, read as UTC: "2026-01-15 10:30"
/// - Day relative: "today 18:00", "tomorrow 09:00"
/// - Relative: "in 30 minutes", "in 2 hours", "in 1 day", "in 1 week"
pub fn parse_datetime_at(s: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Ok(dt.and_utc());
    }

    let lower = s.to_lowercase();
    if let Some(caps) = DAY_TIME_RE.captures(&lower) {
        let time = NaiveTime::parse_from_str(&caps[2], "%H:%M")
            .with_context(|| format!("Invalid time of day: {}", &caps[2]))?;
        let today = now.date_naive();
        let day = if &caps[1] == "tomorrow" {
            today
                .checked_add_days(Days::new(1))
                .context("date out of range")?
        } else {
            today
        };
        return Ok(day.and_time(time).and_utc());
    }

    let Some(caps) = RELATIVE_TIME_RE.captures(&lower) else {
        anyhow::bail!(
            "Invalid datetime: {s}. Use ISO 8601 (e.g., 2026-01-15T10:30:00Z), '2026-01-15 10:30', 'tomorrow 09:00' or 'in 2 hours'"
        );
    };

    let n: i64 = caps[1]
        .parse()
        .context("failed to parse number in relative time")?;

    let (max_for_unit, minutes_per_unit) = match &caps[2] {
        "minute" => (MAX_RELATIVE_MINUTES, 1),
        "hour" => (MAX_RELATIVE_MINUTES / 60, 60),
        "day" => (MAX_RELATIVE_MINUTES / (60 * 24), 60 * 24),
        "week" => (MAX_RELATIVE_MINUTES / (60 * 24 * 7), 60 * 24 * 7),
        unit => anyhow::bail!("Unknown time unit: {unit}"),
    };

    if n > max_for_unit {
        anyhow::bail!("Relative time value too large: {n} {}", &caps[2]);
    }

    Ok(now + Duration::minutes(n * minutes_per_unit))
}

/// Parse an optional `YYYY-MM-DD` argument.
pub fn parse_day(value: Option<&str>) -> Result<Option<NaiveDate>> {
    Ok(value.map(ft_core::parse_date).transpose()?)
}

/// Maps an edit argument to a patch value: absent leaves the field, empty clears it.
pub fn clearable(value: Option<&String>) -> Option<Option<String>> {
    value.map(|v| {
        let v = v.trim();
        (!v.is_empty()).then(|| v.to_string())
    })
}

/// Reads a client owned by the trainer. Other trainers' clients read as missing.
pub fn owned_client(db: &Database, trainer: &CurrentUser, id: ClientId) -> Result<Client> {
    let client = db.get_client(id)?;
    if client.trainer_id != trainer.id {
        anyhow::bail!("client {id} not found");
    }
    Ok(client)
}

/// Reads a session owned by the trainer. Other trainers' sessions read as missing.
pub fn owned_session(db: &Database, trainer: &CurrentUser, id: SessionId) -> Result<Session> {
    let session = db.get_session(id)?;
    if session.trainer_id != trainer.id {
        anyhow::bail!("session {id} not found");
    }
    Ok(session)
}

/// Names of the trainer's clients by ID.
pub fn client_names(db: &Database, trainer: &CurrentUser) -> Result<BTreeMap<ClientId, String>> {
    Ok(db
        .list_clients(&ClientFilter::for_trainer(trainer.id))?
        .into_iter()
        .map(|c| (c.id, c.name))
        .collect())
}

/// Formats an instant for tables.
pub fn short_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}
