//! Status command for the trainer's day at a glance.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use ft_core::CurrentUser;
use ft_db::Database;

use super::util::client_names;
use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    trainer: &CurrentUser,
    now: DateTime<Utc>,
) -> Result<()> {
    let view = ft_core::dashboard(db, trainer.id, now)?;
    let names = client_names(db, trainer)?;

    writeln!(writer, "Training tracker status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Clients: {}", view.client_count)?;
    writeln!(
        writer,
        "Revenue this month: {} {}",
        view.month_revenue, config.default_currency
    )?;

    if view.today.is_empty() {
        writeln!(writer, "No sessions today.")?;
        return Ok(());
    }

    writeln!(writer, "Today:")?;
    for session in &view.today {
        let name = names.get(&session.client_id).map_or("?", String::as_str);
        writeln!(
            writer,
            "- #{} {}-{} {name} ({}, {})",
            session.id,
            session.start_at.format("%H:%M"),
            session.effective_end().format("%H:%M"),
            session.mode.label(),
            session.status
        )?;
    }

    Ok(())
}
