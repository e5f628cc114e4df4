//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ft_core::{ClientId, PackageId, PackageStatus, Role, SessionId, SessionMode, SessionStatus, UserId};

/// Personal-training tracker.
///
/// Keeps a trainer's clients, sessions, session packages and payments
/// consistent with each other.
#[derive(Debug, Parser)]
#[command(name = "ft", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Register an account and print its user ID.
    Signup {
        /// Sign-up email.
        email: String,

        /// Account role: trainer or client.
        #[arg(long, default_value = "trainer")]
        role: Role,

        /// Register an existing account ID instead of generating one.
        #[arg(long)]
        user_id: Option<UserId>,
    },

    /// Show the signed-in account.
    Whoami,

    /// Show today's sessions, this month's revenue and the client count.
    Status,

    /// Manage clients.
    #[command(subcommand)]
    Clients(ClientsAction),

    /// Manage session packages.
    #[command(subcommand)]
    Packages(PackagesAction),

    /// Schedule and track sessions.
    #[command(subcommand)]
    Sessions(SessionsAction),

    /// Record payments and suggest amounts.
    #[command(subcommand)]
    Payments(PaymentsAction),

    /// Show revenue for this month and the trailing year.
    Finances {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show a client's packages, sessions and payments.
    Overview {
        /// Client to show. Client accounts see their own record.
        #[arg(long)]
        client: Option<ClientId>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Export sessions and reminders as JSON lines.
    Calendar {
        /// Write to this file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Minutes before a session its reminder fires.
        #[arg(long)]
        lead_minutes: Option<i64>,
    },
}

/// Client roster actions.
#[derive(Debug, Subcommand)]
pub enum ClientsAction {
    /// List clients ordered by name.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add a client.
    Add {
        /// Client name.
        name: String,

        /// Billing mode: `hourly:<rate>`, `monthly:<rate>` or `package`.
        #[arg(long, default_value = "package")]
        rate: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        goals: Option<String>,

        /// First training day (YYYY-MM-DD).
        #[arg(long)]
        start_date: Option<String>,

        /// Preferred mode: in-person or online.
        #[arg(long)]
        mode: Option<SessionMode>,
    },

    /// Edit a client's details.
    Edit {
        /// Client ID.
        id: ClientId,

        #[arg(long)]
        name: Option<String>,

        /// Billing mode: `hourly:<rate>`, `monthly:<rate>` or `package`.
        #[arg(long)]
        rate: Option<String>,

        /// New email; an empty value clears it.
        #[arg(long)]
        email: Option<String>,

        /// New phone; an empty value clears it.
        #[arg(long)]
        phone: Option<String>,

        /// New goals; an empty value clears them.
        #[arg(long)]
        goals: Option<String>,
    },

    /// Link a client record to the client account using an email.
    Link {
        /// Client ID.
        id: ClientId,

        /// Email the client signed up with.
        email: String,
    },
}

/// Package actions.
#[derive(Debug, Subcommand)]
pub enum PackagesAction {
    /// List a client's packages, newest first.
    List {
        /// Client ID.
        #[arg(long)]
        client: ClientId,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Open a package of session credits.
    Add {
        /// Client ID.
        #[arg(long)]
        client: ClientId,

        /// Number of sessions in the package.
        #[arg(long)]
        sessions: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        price: Option<String>,

        /// First valid day (YYYY-MM-DD).
        #[arg(long)]
        starts_on: Option<String>,

        /// Last valid day (YYYY-MM-DD).
        #[arg(long)]
        expires_on: Option<String>,
    },

    /// Close an active package.
    Retire {
        /// Package ID.
        id: PackageId,

        /// Closing status: expired or cancelled.
        #[arg(long, default_value = "expired")]
        status: PackageStatus,
    },
}

/// Session actions.
#[derive(Debug, Subcommand)]
pub enum SessionsAction {
    /// List sessions ordered by start time.
    List {
        /// Only this client's sessions.
        #[arg(long)]
        client: Option<ClientId>,

        /// Only sessions with this status.
        #[arg(long)]
        status: Option<SessionStatus>,

        /// Maximum number of sessions to show.
        #[arg(long)]
        limit: Option<usize>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Schedule a session.
    Schedule {
        /// Client ID.
        #[arg(long)]
        client: ClientId,

        /// Start time: ISO 8601, "YYYY-MM-DD HH:MM", "tomorrow 09:00" or "in 2 hours".
        #[arg(long)]
        at: String,

        /// Length in minutes. Defaults to the configured session length.
        #[arg(long)]
        minutes: Option<i64>,

        /// Mode: in-person or online.
        #[arg(long, default_value = "in-person")]
        mode: SessionMode,
    },

    /// Complete a session, consuming a package credit when available.
    Complete {
        /// Session ID.
        id: SessionId,
    },

    /// Cancel a session.
    Cancel {
        /// Session ID.
        id: SessionId,
    },

    /// Mark a session as awaiting confirmation.
    Pending {
        /// Session ID.
        id: SessionId,
    },

    /// Confirm a pending session.
    Resume {
        /// Session ID.
        id: SessionId,
    },

    /// Move a session to a new start time, keeping its length.
    Reschedule {
        /// Session ID.
        id: SessionId,

        /// New start time, in the same formats as `schedule --at`.
        #[arg(long)]
        to: String,
    },
}

/// Payment actions.
#[derive(Debug, Subcommand)]
pub enum PaymentsAction {
    /// List a client's payments, newest first.
    List {
        /// Client ID.
        #[arg(long)]
        client: ClientId,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Suggest the amount a client owes.
    Suggest {
        /// Client ID.
        #[arg(long)]
        client: ClientId,
    },

    /// Record a payment.
    Record {
        /// Client ID.
        #[arg(long)]
        client: ClientId,

        /// Amount paid.
        #[arg(long)]
        amount: String,

        /// Currency code. Defaults to the configured currency.
        #[arg(long)]
        currency: Option<String>,

        /// Payment method. Defaults to the configured method.
        #[arg(long)]
        method: Option<String>,

        /// When the payment was made. Defaults to now.
        #[arg(long)]
        paid_at: Option<String>,

        /// Credits bought with this payment.
        #[arg(long)]
        sessions_purchased: Option<i64>,

        /// Session covered by this payment. Repeat for several.
        #[arg(long = "session")]
        sessions: Vec<SessionId>,

        #[arg(long)]
        note: Option<String>,
    },
}
