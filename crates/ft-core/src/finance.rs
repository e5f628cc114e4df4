//! Revenue figures over recorded payments.
//!
//! Amounts are summed as recorded, without currency conversion.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::payment::Payment;
use crate::types::{ValidationError, checked_total};

/// A calendar month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthTotal {
    pub month: YearMonth,
    pub total: Decimal,
}

/// Revenue for the current month and the trailing year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevenueSummary {
    pub month_total: Decimal,
    /// Sum since the first day of the month twelve months back.
    pub trailing_year_total: Decimal,
    pub payment_count: usize,
    /// Newest month first; months without payments are omitted.
    pub by_month: Vec<MonthTotal>,
}

/// First instant counted in the trailing-year window for `today`.
#[must_use]
pub fn window_start(today: NaiveDate) -> DateTime<Utc> {
    let first = today.with_day(1).unwrap_or(today);
    first
        .checked_sub_months(Months::new(12))
        .unwrap_or(first)
        .and_time(chrono::NaiveTime::MIN)
        .and_utc()
}

/// Summarizes payments relative to `today`. Payments before the window are ignored.
pub fn revenue_summary(
    payments: &[Payment],
    today: NaiveDate,
) -> Result<RevenueSummary, ValidationError> {
    let since = window_start(today);
    let current = YearMonth::of(today);

    let mut month_total = Decimal::ZERO;
    let mut trailing_year_total = Decimal::ZERO;
    let mut payment_count = 0;
    let mut months: BTreeMap<YearMonth, Decimal> = BTreeMap::new();

    for payment in payments.iter().filter(|p| p.paid_at >= since) {
        let month = YearMonth::of(payment.paid_at.date_naive());
        trailing_year_total =
            checked_total("trailing year total", trailing_year_total, payment.amount)?;
        payment_count += 1;
        if month == current {
            month_total = checked_total("month total", month_total, payment.amount)?;
        }
        let bucket = months.entry(month).or_default();
        *bucket = checked_total("month total", *bucket, payment.amount)?;
    }

    Ok(RevenueSummary {
        month_total,
        trailing_year_total,
        payment_count,
        by_month: months
            .into_iter()
            .rev()
            .map(|(month, total)| MonthTotal { month, total })
            .collect(),
    })
}

/// Sum of payments made in the month containing `today`.
pub fn month_revenue(
    payments: &[Payment],
    today: NaiveDate,
) -> Result<Decimal, ValidationError> {
    let current = YearMonth::of(today);
    payments
        .iter()
        .filter(|p| YearMonth::of(p.paid_at.date_naive()) == current)
        .try_fold(Decimal::ZERO, |total, p| checked_total("month total", total, p.amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientId, PaymentId, UserId, parse_instant};
    use rust_decimal_macros::dec;

    fn payment(id: i64, paid_at: &str, amount: Decimal) -> Payment {
        Payment {
            id: PaymentId::new(id).unwrap(),
            trainer_id: UserId::new_random(),
            client_id: ClientId::new(1).unwrap(),
            amount,
            currency: "EUR".to_string(),
            method: "cash".to_string(),
            paid_at: parse_instant(paid_at).unwrap(),
            sessions_purchased: None,
            session_ids: Vec::new(),
            note: None,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 15).unwrap()
    }

    #[test]
    fn window_starts_at_month_boundary_a_year_back() {
        assert_eq!(
            window_start(today()).to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
    }

    #[test]
    fn summary_groups_by_month_newest_first() {
        let payments = vec![
            payment(1, "2025-03-02T10:00:00Z", dec!(50)),
            payment(2, "2025-03-14T10:00:00Z", dec!(25.50)),
            payment(3, "2025-01-20T10:00:00Z", dec!(100)),
            payment(4, "2024-03-01T00:00:00Z", dec!(10)),
            payment(5, "2024-02-28T23:59:59Z", dec!(999)),
        ];
        let summary = revenue_summary(&payments, today()).unwrap();

        assert_eq!(summary.month_total, dec!(75.50));
        assert_eq!(summary.trailing_year_total, dec!(185.50));
        assert_eq!(summary.payment_count, 4);
        let months: Vec<String> = summary
            .by_month
            .iter()
            .map(|m| format!("{} {}", m.month, m.total))
            .collect();
        assert_eq!(months, vec!["2025-03 75.50", "2025-01 100", "2024-03 10"]);
    }

    #[test]
    fn empty_summary_is_zero() {
        let summary = revenue_summary(&[], today()).unwrap();
        assert_eq!(summary.month_total, Decimal::ZERO);
        assert_eq!(summary.payment_count, 0);
        assert!(summary.by_month.is_empty());
    }

    #[test]
    fn month_revenue_ignores_other_months() {
        let payments = vec![
            payment(1, "2025-03-01T00:00:00Z", dec!(30)),
            payment(2, "2025-02-28T23:00:00Z", dec!(70)),
        ];
        assert_eq!(month_revenue(&payments, today()).unwrap(), dec!(30));
    }

    #[test]
    fn totals_beyond_decimal_range_are_errors() {
        let payments = vec![
            payment(1, "2025-03-02T10:00:00Z", Decimal::MAX),
            payment(2, "2025-03-03T10:00:00Z", Decimal::ONE),
        ];
        assert!(matches!(
            revenue_summary(&payments, today()),
            Err(ValidationError::AmountOverflow { .. })
        ));
        assert!(matches!(
            month_revenue(&payments, today()),
            Err(ValidationError::AmountOverflow { .. })
        ));
    }
}
