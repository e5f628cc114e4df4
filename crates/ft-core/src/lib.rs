//! Core domain logic for the personal-training tracker.
//!
//! This crate contains the fundamental types and logic for:
//! - Package ledger: which package absorbs a completed session, and the debit
//! - Session lifecycle: status transitions and atomic completion
//! - Rescheduling, payment suggestions and payment records
//! - Client roster and account linking, finance summaries, calendar export
//!
//! Persistence goes through the [`Store`] trait; [`MemoryStore`] is an
//! in-process implementation.

pub mod billing;
pub mod calendar;
pub mod client;
mod error;
pub mod finance;
pub mod identity;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod overview;
pub mod package;
pub mod payment;
pub mod rate;
pub mod schedule;
pub mod session;
mod store;
pub mod types;

pub use billing::{Billing, DEFAULT_CURRENCY, DEFAULT_METHOD, PaymentRequest};
pub use calendar::{
    CalendarEntry, CalendarItem, CalendarSink, DEFAULT_REMINDER_LEAD, ExportSummary, Reminder,
    ReminderKeys, export_calendar, plan_reminders,
};
pub use client::{Client, ClientFilter, ClientPatch, LinkOutcome, NewClient, Roster};
pub use error::{BackendError, CoreError, StoreError};
pub use finance::{MonthTotal, RevenueSummary, YearMonth, revenue_summary};
pub use identity::{CurrentUser, Identity, Profile, Role};
pub use ledger::{Ledger, remaining_credits, select_active_package};
pub use lifecycle::SessionEngine;
pub use memory::MemoryStore;
pub use overview::{ClientOverview, Dashboard, client_overview, dashboard};
pub use package::{NewPackage, Package, PackageFilter, PackageStatus};
pub use payment::{NewPayment, Payment, PaymentFilter};
pub use rate::RateConfig;
pub use schedule::Coordinator;
pub use session::{
    DEFAULT_SESSION_LENGTH, NewSession, PackageLink, Session, SessionFilter, SessionMode,
    SessionPatch, SessionStatus,
};
pub use store::{Completion, CompletionWrite, CreditDebit, Store};
pub use types::{
    ClientId, EntityKind, PackageId, PaymentId, SessionId, SortOrder, UserId, ValidationError,
    checked_total, parse_amount, parse_date, parse_instant, truncate_instant,
};
