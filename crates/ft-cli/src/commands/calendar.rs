//! Calendar export as JSON lines.
//!
//! Each line is one calendar item: every session as an event, followed by
//! the reminders still due for upcoming sessions.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use ft_core::{
    CalendarItem, CalendarSink, CurrentUser, ExportSummary, ReminderKeys, SessionFilter, Store,
    export_calendar,
};
use ft_db::Database;

use super::util::client_names;

/// Writes each item as a single JSON line.
pub struct JsonLines<W> {
    writer: W,
}

impl<W: Write> JsonLines<W> {
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> CalendarSink for JsonLines<W> {
    type Error = std::io::Error;

    fn deliver(&mut self, item: &CalendarItem) -> Result<(), Self::Error> {
        serde_json::to_writer(&mut self.writer, item)?;
        self.writer.write_all(b"\n")
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    trainer: &CurrentUser,
    lead: Duration,
    now: DateTime<Utc>,
) -> Result<ExportSummary> {
    let sessions = db.list_sessions(&SessionFilter {
        trainer_id: Some(trainer.id),
        ..SessionFilter::default()
    })?;
    let names = client_names(db, trainer)?;
    let mut keys = ReminderKeys::new();
    let mut sink = JsonLines::new(writer);
    let summary = export_calendar(&mut sink, &sessions, &names, lead, now, &mut keys)?;
    Ok(summary)
}
