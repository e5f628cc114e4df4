//! Revenue summary command.

use std::io::Write;

use anyhow::Result;
use chrono::NaiveDate;
use ft_core::{CurrentUser, PaymentFilter, Store, revenue_summary};
use ft_db::Database;

use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    config: &Config,
    trainer: &CurrentUser,
    today: NaiveDate,
    json: bool,
) -> Result<()> {
    let payments = db.list_payments(&PaymentFilter {
        trainer_id: Some(trainer.id),
        paid_from: Some(ft_core::finance::window_start(today)),
        ..PaymentFilter::default()
    })?;
    let summary = revenue_summary(&payments, today)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&summary)?)?;
        return Ok(());
    }

    let currency = &config.default_currency;
    writeln!(writer, "This month: {} {currency}", summary.month_total)?;
    writeln!(
        writer,
        "Last 12 months: {} {currency} ({} payments)",
        summary.trailing_year_total, summary.payment_count
    )?;
    if summary.by_month.is_empty() {
        return Ok(());
    }
    writeln!(writer, "By month:")?;
    for month in &summary.by_month {
        writeln!(writer, "- {}: {} {currency}", month.month, month.total)?;
    }
    Ok(())
}
