//! Client roster commands.

use std::io::Write;

use anyhow::Result;
use ft_core::{Client, ClientPatch, CurrentUser, NewClient, RateConfig, Roster};
use ft_db::Database;

use super::util::{clearable, owned_client, parse_day};
use crate::cli::ClientsAction;

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    trainer: &CurrentUser,
    action: &ClientsAction,
) -> Result<()> {
    match action {
        ClientsAction::List { json } => list(writer, db, trainer, *json),
        ClientsAction::Add {
            name,
            rate,
            email,
            phone,
            goals,
            start_date,
            mode,
        } => {
            let new = NewClient {
                email: email.clone(),
                phone: phone.clone(),
                goals: goals.clone(),
                start_date: parse_day(start_date.as_deref())?,
                preferred_mode: *mode,
                ..NewClient::new(trainer.id, name.as_str(), RateConfig::parse_shorthand(rate)?)
            };
            let client = Roster::new(db).create(new)?;
            writeln!(
                writer,
                "Created client #{} {} ({})",
                client.id, client.name, client.rate
            )?;
            Ok(())
        }
        ClientsAction::Edit {
            id,
            name,
            rate,
            email,
            phone,
            goals,
        } => {
            owned_client(db, trainer, *id)?;
            let patch = ClientPatch {
                name: name.clone(),
                email: clearable(email.as_ref()),
                phone: clearable(phone.as_ref()),
                goals: clearable(goals.as_ref()),
                rate: rate.as_deref().map(RateConfig::parse_shorthand).transpose()?,
                user_id: None,
            };
            let client = Roster::new(db).update(*id, patch)?;
            writeln!(
                writer,
                "Updated client #{} {} ({})",
                client.id, client.name, client.rate
            )?;
            Ok(())
        }
        ClientsAction::Link { id, email } => {
            owned_client(db, trainer, *id)?;
            let outcome = Roster::new(db).link_account(*id, email)?;
            let client = &outcome.client;
            let email = client.email.as_deref().unwrap_or_default();
            if outcome.linked {
                writeln!(writer, "Linked client #{} {} to {email}", client.id, client.name)?;
            } else {
                writeln!(
                    writer,
                    "Saved {email} for client #{} {}; no client account uses it yet",
                    client.id, client.name
                )?;
            }
            Ok(())
        }
    }
}

fn list<W: Write>(writer: &mut W, db: &mut Database, trainer: &CurrentUser, json: bool) -> Result<()> {
    let clients = Roster::new(db).list(trainer.id)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&clients)?)?;
        return Ok(());
    }

    if clients.is_empty() {
        writeln!(writer, "No clients.")?;
        return Ok(());
    }

    writeln!(writer, "{:<5} {:<20} {:<14} {:<24} ACCOUNT", "ID", "NAME", "RATE", "EMAIL")?;
    for client in &clients {
        writeln!(writer, "{}", row(client))?;
    }
    Ok(())
}

fn row(client: &Client) -> String {
    format!(
        "{:<5} {:<20} {:<14} {:<24} {}",
        client.id.get(),
        client.name,
        client.rate.to_string(),
        client.email.as_deref().unwrap_or("-"),
        if client.user_id.is_some() { "linked" } else { "-" }
    )
}
