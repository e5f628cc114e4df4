//! Client overview command.
//!
//! Trainers pick one of their clients; client accounts see the record their
//! trainer linked to them.

use std::io::Write;

use anyhow::{Result, bail};
use ft_core::{ClientFilter, ClientId, ClientOverview, CurrentUser, Role, Store, client_overview};
use ft_db::Database;

use super::util::{owned_client, short_time};

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    user: &CurrentUser,
    client: Option<ClientId>,
    json: bool,
) -> Result<()> {
    let client_id = resolve_client(db, user, client)?;
    let view = client_overview(db, client_id)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&view)?)?;
        return Ok(());
    }
    render(writer, &view)
}

fn resolve_client(db: &Database, user: &CurrentUser, requested: Option<ClientId>) -> Result<ClientId> {
    match user.role {
        Role::Trainer => {
            let Some(id) = requested else {
                bail!("Pass --client to choose which client to show");
            };
            Ok(owned_client(db, user, id)?.id)
        }
        Role::Client => {
            let linked = db.list_clients(&ClientFilter {
                user_id: Some(user.id),
                ..ClientFilter::default()
            })?;
            let Some(own) = linked.first() else {
                bail!("No client record is linked to this account yet");
            };
            if let Some(id) = requested.filter(|id| *id != own.id) {
                bail!("client {id} not found");
            }
            Ok(own.id)
        }
    }
}

fn render<W: Write>(writer: &mut W, view: &ClientOverview) -> Result<()> {
    let client = &view.client;
    writeln!(writer, "{} (#{})", client.name, client.id)?;
    writeln!(writer, "Billing: {}", client.rate)?;
    if let Some(goals) = &client.goals {
        writeln!(writer, "Goals: {goals}")?;
    }
    writeln!(writer, "Remaining credits: {}", view.remaining_credits)?;

    writeln!(writer, "Packages:")?;
    if view.packages.is_empty() {
        writeln!(writer, "  none")?;
    }
    for package in &view.packages {
        writeln!(
            writer,
            "  {}: {} of {} used, {}",
            package.label(),
            package.sessions_used,
            package.sessions_total,
            package.status
        )?;
    }

    writeln!(writer, "Sessions:")?;
    if view.sessions.is_empty() {
        writeln!(writer, "  none")?;
    }
    for session in &view.sessions {
        writeln!(
            writer,
            "  #{} {} {} {}",
            session.id,
            short_time(session.start_at),
            session.mode.label(),
            session.status
        )?;
    }

    writeln!(writer, "Payments:")?;
    if view.payments.is_empty() {
        writeln!(writer, "  none")?;
    }
    for payment in &view.payments {
        writeln!(
            writer,
            "  {} {} {} ({})",
            short_time(payment.paid_at),
            payment.amount,
            payment.currency,
            payment.method
        )?;
    }
    Ok(())
}
