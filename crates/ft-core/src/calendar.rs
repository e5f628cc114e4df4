//! Calendar entries and reminders handed to an external calendar.
//!
//! Reminder deduplication is explicit: the caller owns a [`ReminderKeys`]
//! set for as long as it wants reminders to stay unique (typically one
//! process run) and passes it to [`plan_reminders`].

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::session::Session;
use crate::types::{ClientId, SessionId};

/// Lead time used when none is configured.
pub const DEFAULT_REMINDER_LEAD: Duration = Duration::minutes(120);

/// One calendar event for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEntry {
    pub session_id: SessionId,
    pub title: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub notes: String,
}

impl CalendarEntry {
    #[must_use]
    pub fn from_session(session: &Session, client_name: Option<&str>) -> Self {
        Self {
            session_id: session.id,
            title: format!("FitTrack: {}", describe(session, client_name)),
            start_at: session.start_at,
            end_at: session.effective_end(),
            notes: format!("Status: {}", session.status),
        }
    }
}

/// A notification to fire ahead of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reminder {
    pub session_id: SessionId,
    pub trigger_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

/// Item delivered to a [`CalendarSink`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CalendarItem {
    Event(CalendarEntry),
    Reminder(Reminder),
}

/// Sessions that already have a reminder planned.
#[derive(Debug, Clone, Default)]
pub struct ReminderKeys {
    seen: HashSet<SessionId>,
}

impl ReminderKeys {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contains(&self, id: SessionId) -> bool {
        self.seen.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Receives calendar items. The core never reads anything back.
pub trait CalendarSink {
    type Error;

    fn deliver(&mut self, item: &CalendarItem) -> Result<(), Self::Error>;
}

/// Counts of what an export delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub events: usize,
    pub reminders: usize,
}

/// Plans at most one reminder per session.
///
/// Terminal sessions, sessions whose trigger time has already passed and
/// sessions already in `keys` are skipped. Planned sessions are added to
/// `keys`.
pub fn plan_reminders(
    sessions: &[Session],
    lead: Duration,
    now: DateTime<Utc>,
    keys: &mut ReminderKeys,
    names: &BTreeMap<ClientId, String>,
) -> Vec<Reminder> {
    let mut planned = Vec::new();
    for session in sessions {
        if session.status.is_terminal() || keys.contains(session.id) {
            continue;
        }
        let trigger_at = session.start_at - lead;
        if trigger_at <= now {
            continue;
        }
        keys.seen.insert(session.id);
        let name = names.get(&session.client_id).map(String::as_str);
        planned.push(Reminder {
            session_id: session.id,
            trigger_at,
            title: "Upcoming session".to_string(),
            body: format!(
                "{} • {}",
                session.start_at.format("%H:%M"),
                describe(session, name)
            ),
        });
    }
    tracing::debug!(planned = planned.len(), known = keys.len(), "reminders planned");
    planned
}

/// Delivers an event for every session and the reminders still due.
pub fn export_calendar<K: CalendarSink>(
    sink: &mut K,
    sessions: &[Session],
    names: &BTreeMap<ClientId, String>,
    lead: Duration,
    now: DateTime<Utc>,
    keys: &mut ReminderKeys,
) -> Result<ExportSummary, K::Error> {
    let mut summary = ExportSummary::default();
    for session in sessions {
        let name = names.get(&session.client_id).map(String::as_str);
        sink.deliver(&CalendarItem::Event(CalendarEntry::from_session(session, name)))?;
        summary.events += 1;
    }
    for reminder in plan_reminders(sessions, lead, now, keys, names) {
        sink.deliver(&CalendarItem::Reminder(reminder))?;
        summary.reminders += 1;
    }
    tracing::info!(events = summary.events, reminders = summary.reminders, "calendar exported");
    Ok(summary)
}

fn describe(session: &Session, client_name: Option<&str>) -> String {
    match client_name {
        Some(name) => format!("{} · {name}", session.mode.label()),
        None => session.mode.label().to_string(),
    }
}
