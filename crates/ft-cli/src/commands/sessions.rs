//! Session scheduling and lifecycle commands.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use ft_core::{
    ClientId, Coordinator, CurrentUser, NewSession, Session, SessionEngine, SessionFilter, Store,
};
use ft_db::Database;

use super::util::{client_names, owned_client, owned_session, parse_datetime_at, short_time};
use crate::Config;
use crate::cli::SessionsAction;

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    config: &Config,
    trainer: &CurrentUser,
    action: &SessionsAction,
    now: DateTime<Utc>,
) -> Result<()> {
    match action {
        SessionsAction::List {
            client,
            status,
            limit,
            json,
        } => {
            let sessions = db.list_sessions(&SessionFilter {
                trainer_id: Some(trainer.id),
                client_id: *client,
                status: *status,
                limit: *limit,
                ..SessionFilter::default()
            })?;
            if *json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&sessions)?)?;
                return Ok(());
            }
            if sessions.is_empty() {
                writeln!(writer, "No sessions.")?;
                return Ok(());
            }
            let names = client_names(db, trainer)?;
            writeln!(
                writer,
                "{:<5} {:<17} {:<6} {:<10} {:<10} {:<16} PACKAGE",
                "ID", "START", "LENGTH", "MODE", "STATUS", "CLIENT"
            )?;
            for session in &sessions {
                writeln!(writer, "{}", row(session, &names))?;
            }
            Ok(())
        }
        SessionsAction::Schedule {
            client,
            at,
            minutes,
            mode,
        } => {
            let client = owned_client(db, trainer, *client)?;
            let start_at = parse_datetime_at(at, now)?;
            let minutes = minutes.unwrap_or(config.default_session_minutes);
            let session = SessionEngine::new(db).schedule(&NewSession {
                trainer_id: trainer.id,
                client_id: client.id,
                start_at,
                end_at: Some(start_at + Duration::minutes(minutes)),
                mode: *mode,
            })?;
            writeln!(
                writer,
                "Scheduled session #{} with {} at {} ({minutes} min, {})",
                session.id,
                client.name,
                short_time(session.start_at),
                session.mode.label()
            )?;
            Ok(())
        }
        SessionsAction::Complete { id } => {
            owned_session(db, trainer, *id)?;
            let completion = SessionEngine::new(db).complete(*id)?;
            match &completion.package {
                Some(package) => writeln!(
                    writer,
                    "Completed session #{id}; used a credit from {} ({} of {} used)",
                    package.label(),
                    package.sessions_used,
                    package.sessions_total
                )?,
                None => writeln!(
                    writer,
                    "Completed session #{id}; no package credit available, billed per session"
                )?,
            }
            Ok(())
        }
        SessionsAction::Cancel { id } => {
            owned_session(db, trainer, *id)?;
            let session = SessionEngine::new(db).cancel(*id)?;
            writeln!(writer, "Session #{id} is now {}", session.status)?;
            Ok(())
        }
        SessionsAction::Pending { id } => {
            owned_session(db, trainer, *id)?;
            let session = SessionEngine::new(db).mark_pending(*id)?;
            writeln!(writer, "Session #{id} is now {}", session.status)?;
            Ok(())
        }
        SessionsAction::Resume { id } => {
            owned_session(db, trainer, *id)?;
            let session = SessionEngine::new(db).mark_scheduled(*id)?;
            writeln!(writer, "Session #{id} is now {}", session.status)?;
            Ok(())
        }
        SessionsAction::Reschedule { id, to } => {
            owned_session(db, trainer, *id)?;
            let new_start = parse_datetime_at(to, now)?;
            let session = Coordinator::new(db).reschedule_at(*id, new_start, now)?;
            writeln!(
                writer,
                "Moved session #{id} to {} - {}",
                short_time(session.start_at),
                session.effective_end().format("%H:%M")
            )?;
            Ok(())
        }
    }
}

fn row(session: &Session, names: &BTreeMap<ClientId, String>) -> String {
    let length = format!("{}m", session.duration().num_minutes());
    format!(
        "{:<5} {:<17} {:<6} {:<10} {:<10} {:<16} {}",
        session.id.get(),
        short_time(session.start_at),
        length,
        session.mode.as_str(),
        session.status.as_str(),
        names.get(&session.client_id).map_or("?", String::as_str),
        session
            .package_id
            .map_or_else(|| "-".to_string(), |p| format!("#{p}"))
    )
}
