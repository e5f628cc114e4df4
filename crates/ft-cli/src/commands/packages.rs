//! Session package commands.

use std::io::Write;

use anyhow::Result;
use ft_core::{CurrentUser, Ledger, NewPackage, Package, Store, parse_amount};
use ft_db::Database;

use super::util::{owned_client, parse_day};
use crate::cli::PackagesAction;

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    trainer: &CurrentUser,
    action: &PackagesAction,
) -> Result<()> {
    match action {
        PackagesAction::List { client, json } => {
            let client = owned_client(db, trainer, *client)?;
            let ledger = Ledger::new(db);
            let packages = ledger.packages_for(client.id)?;

            if *json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&packages)?)?;
                return Ok(());
            }
            if packages.is_empty() {
                writeln!(writer, "No packages for {}.", client.name)?;
                return Ok(());
            }

            writeln!(writer, "{:<5} {:<20} {:<7} {:<10} EXPIRES", "ID", "NAME", "USED", "STATUS")?;
            for package in &packages {
                writeln!(writer, "{}", row(package))?;
            }
            writeln!(
                writer,
                "Remaining credits for {}: {}",
                client.name,
                ledger.client_balance(client.id)?
            )?;
            Ok(())
        }
        PackagesAction::Add {
            client,
            sessions,
            name,
            price,
            starts_on,
            expires_on,
        } => {
            let client = owned_client(db, trainer, *client)?;
            let new = NewPackage {
                name: name.clone(),
                price: price.as_deref().map(|p| parse_amount("price", p)).transpose()?,
                starts_on: parse_day(starts_on.as_deref())?,
                expires_on: parse_day(expires_on.as_deref())?,
                ..NewPackage::new(client.id, *sessions)
            };
            let package = Ledger::new(db).open_package(new)?;
            writeln!(
                writer,
                "Opened package #{} for {}: {} sessions",
                package.id, client.name, package.sessions_total
            )?;
            Ok(())
        }
        PackagesAction::Retire { id, status } => {
            let package = db.get_package(*id)?;
            owned_client(db, trainer, package.client_id)?;
            let package = Ledger::new(db).retire_package(*id, *status)?;
            writeln!(
                writer,
                "Package #{} is now {} ({} of {} used)",
                package.id, package.status, package.sessions_used, package.sessions_total
            )?;
            Ok(())
        }
    }
}

fn row(package: &Package) -> String {
    let used = format!("{}/{}", package.sessions_used, package.sessions_total);
    format!(
        "{:<5} {:<20} {:<7} {:<10} {}",
        package.id.get(),
        package.label(),
        used,
        package.status.as_str(),
        package
            .expires_on
            .map_or_else(|| "-".to_string(), |d| d.to_string())
    )
}
