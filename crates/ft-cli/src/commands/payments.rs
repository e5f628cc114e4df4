//! Payment commands.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use ft_core::{Billing, CurrentUser, Payment, PaymentRequest, parse_amount};
use ft_db::Database;

use super::util::{owned_client, parse_datetime_at, short_time};
use crate::Config;
use crate::cli::PaymentsAction;

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    config: &Config,
    trainer: &CurrentUser,
    action: &PaymentsAction,
    now: DateTime<Utc>,
) -> Result<()> {
    match action {
        PaymentsAction::List { client, json } => {
            let client = owned_client(db, trainer, *client)?;
            let payments = Billing::new(db).payments_for(client.id)?;
            if *json {
                writeln!(writer, "{}", serde_json::to_string_pretty(&payments)?)?;
                return Ok(());
            }
            if payments.is_empty() {
                writeln!(writer, "No payments from {}.", client.name)?;
                return Ok(());
            }
            writeln!(
                writer,
                "{:<5} {:<17} {:>12} {:<10} {:<9} NOTE",
                "ID", "PAID", "AMOUNT", "METHOD", "SESSIONS"
            )?;
            for payment in &payments {
                writeln!(writer, "{}", row(payment))?;
            }
            Ok(())
        }
        PaymentsAction::Suggest { client } => {
            let client = owned_client(db, trainer, *client)?;
            match Billing::new(db).suggest_amount(client.id)? {
                Some(amount) => writeln!(
                    writer,
                    "Suggested amount for {} ({}): {amount} {}",
                    client.name, client.rate, config.default_currency
                )?,
                None => writeln!(
                    writer,
                    "{} is billed by package; no amount to suggest",
                    client.name
                )?,
            }
            Ok(())
        }
        PaymentsAction::Record {
            client,
            amount,
            currency,
            method,
            paid_at,
            sessions_purchased,
            sessions,
            note,
        } => {
            let client = owned_client(db, trainer, *client)?;
            let request = PaymentRequest {
                currency: currency
                    .clone()
                    .unwrap_or_else(|| config.default_currency.clone()),
                method: method.clone().unwrap_or_else(|| config.default_method.clone()),
                paid_at: paid_at
                    .as_deref()
                    .map(|p| parse_datetime_at(p, now))
                    .transpose()?
                    .unwrap_or(now),
                sessions_purchased: *sessions_purchased,
                session_ids: sessions.clone(),
                note: note.clone(),
                ..PaymentRequest::new(trainer.id, client.id, parse_amount("amount", amount)?)
            };
            let payment = Billing::new(db).record_payment(request)?;
            writeln!(
                writer,
                "Recorded payment #{}: {} {} ({}) from {}",
                payment.id, payment.amount, payment.currency, payment.method, client.name
            )?;
            Ok(())
        }
    }
}

fn row(payment: &Payment) -> String {
    let amount = format!("{} {}", payment.amount, payment.currency);
    let sessions = if payment.session_ids.is_empty() {
        payment
            .sessions_purchased
            .map_or_else(|| "-".to_string(), |n| format!("+{n}"))
    } else {
        payment
            .session_ids
            .iter()
            .map(|id| format!("#{id}"))
            .collect::<Vec<_>>()
            .join(",")
    };
    format!(
        "{:<5} {:<17} {:>12} {:<10} {:<9} {}",
        payment.id.get(),
        short_time(payment.paid_at),
        amount,
        payment.method,
        sessions,
        payment.note.as_deref().unwrap_or("")
    )
    .trim_end()
    .to_string()
}
