//! Storage layer for the training tracker.
//!
//! Provides the SQLite implementation of [`ft_core::Store`] using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Processes or threads that share a database file should each open their own
//! `Database`. Conditional writes and the completion transaction keep concurrent
//! writers consistent; a busy timeout makes them wait for each other instead of
//! failing immediately.
//!
//! # Schema
//!
//! ## Value Formats
//!
//! - Instants are TEXT in RFC 3339 with millisecond precision and a `Z` suffix,
//!   so lexicographic order matches chronological order.
//! - Calendar dates are TEXT `YYYY-MM-DD`.
//! - Money is TEXT holding the exact decimal, never a float.
//! - Account identities are TEXT UUIDs.
//! - `payments.session_ids` is a JSON array of session IDs.
//!
//! ## Counters
//!
//! `packages.sessions_used` is only ever changed by a single conditional
//! `UPDATE`, and a `CHECK` constraint keeps it within `0..=sessions_total`.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use ft_core::{
    Client, ClientFilter, ClientId, ClientPatch, Completion, CompletionWrite, CreditDebit,
    EntityKind, NewClient, NewPackage, NewPayment, NewSession, Package, PackageFilter, PackageId,
    PackageLink, PackageStatus, Payment, PaymentFilter, PaymentId, Profile, RateConfig, Role,
    Session, SessionFilter, SessionId, SessionMode, SessionPatch, SessionStatus, SortOrder, Store,
    StoreError, UserId, truncate_instant,
};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter};
use rust_decimal::Decimal;
use thiserror::Error;

/// How long a connection waits for another writer before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// The referenced row does not exist.
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: i64 },
    /// A conditional write matched no row.
    #[error("{entity} {id} was modified concurrently")]
    Conflict { entity: EntityKind, id: i64 },
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {entity} {id}: {timestamp}")]
    TimestampParse {
        entity: EntityKind,
        id: i64,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// The entity is not stored under a numeric row id.
    #[error("{entity} rows are not keyed by a numeric id")]
    NotRowKeyed { entity: EntityKind },
    /// A stored value could not be decoded into its domain type.
    #[error("invalid {entity} row {id}: {message}")]
    InvalidRow {
        entity: EntityKind,
        id: i64,
        message: String,
    },
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => Self::NotFound { entity, id },
            DbError::Conflict { entity, id } => Self::Conflict { entity, id },
            other => Self::Backend(Box::new(other)),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.busy_timeout(BUSY_TIMEOUT)?;
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS profiles (
                user_id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                role TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_profiles_email ON profiles(email);

            -- rate_type: 'hourly' | 'monthly' | 'package'; only the matching rate is set
            CREATE TABLE IF NOT EXISTS clients (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trainer_id TEXT NOT NULL,
                name TEXT NOT NULL,
                email TEXT,
                phone TEXT,
                goals TEXT,
                start_date TEXT,
                preferred_mode TEXT,
                rate_type TEXT NOT NULL,
                hourly_rate TEXT,
                monthly_rate TEXT,
                user_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_clients_trainer ON clients(trainer_id);
            CREATE INDEX IF NOT EXISTS idx_clients_user ON clients(user_id);

            CREATE TABLE IF NOT EXISTS packages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                client_id INTEGER NOT NULL,
                name TEXT,
                price TEXT,
                sessions_total INTEGER NOT NULL CHECK (sessions_total >= 1),
                sessions_used INTEGER NOT NULL DEFAULT 0
                    CHECK (sessions_used >= 0 AND sessions_used <= sessions_total),
                status TEXT NOT NULL DEFAULT 'active',
                starts_on TEXT,
                expires_on TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_packages_client ON packages(client_id, status);

            -- package_id is only set on completed sessions
            CREATE TABLE IF NOT EXISTS sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trainer_id TEXT NOT NULL,
                client_id INTEGER NOT NULL,
                start_at TEXT NOT NULL,
                end_at TEXT,
                mode TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'scheduled',
                package_id INTEGER,
                CHECK (package_id IS NULL OR status = 'completed'),
                FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE,
                FOREIGN KEY (package_id) REFERENCES packages(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_client ON sessions(client_id, status);
            CREATE INDEX IF NOT EXISTS idx_sessions_trainer_start ON sessions(trainer_id, start_at);

            CREATE TABLE IF NOT EXISTS payments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                trainer_id TEXT NOT NULL,
                client_id INTEGER NOT NULL,
                amount TEXT NOT NULL,
                currency TEXT NOT NULL,
                method TEXT NOT NULL,
                paid_at TEXT NOT NULL,
                sessions_purchased INTEGER,
                session_ids TEXT NOT NULL DEFAULT '[]',
                note TEXT,
                FOREIGN KEY (client_id) REFERENCES clients(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_payments_client ON payments(client_id);
            CREATE INDEX IF NOT EXISTS idx_payments_trainer_paid ON payments(trainer_id, paid_at);
            ",
        )?;
        Ok(())
    }
}

impl Store for Database {
    fn insert_client(&mut self, new: &NewClient) -> Result<Client, StoreError> {
        self.conn.execute(
            "
            INSERT INTO clients (
                trainer_id, name, email, phone, goals, start_date, preferred_mode,
                rate_type, hourly_rate, monthly_rate, user_id, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, NULL, ?11)
            ",
            params![
                new.trainer_id.to_string(),
                new.name,
                new.email,
                new.phone,
                new.goals,
                new.start_date.map(|d| d.to_string()),
                new.preferred_mode.map(|m| m.as_str()),
                new.rate.rate_type(),
                new.rate.hourly_rate().map(|r| r.to_string()),
                new.rate.monthly_rate().map(|r| r.to_string()),
                format_timestamp(Utc::now()),
            ],
        )
        .map_err(DbError::from)?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(client_id = id, "client row inserted");
        Ok(client_by_id(&self.conn, id)?)
    }

    fn get_client(&self, id: ClientId) -> Result<Client, StoreError> {
        Ok(client_by_id(&self.conn, id.get())?)
    }

    fn list_clients(&self, filter: &ClientFilter) -> Result<Vec<Client>, StoreError> {
        let mut query = Query::default();
        if let Some(trainer_id) = filter.trainer_id {
            query.push("trainer_id = ?", trainer_id.to_string());
        }
        if let Some(user_id) = filter.user_id {
            query.push("user_id = ?", user_id.to_string());
        }
        let sql = query.sql(CLIENT_COLUMNS, "clients", "name", filter.order, filter.limit);
        Ok(query.rows(&self.conn, &sql, ClientRow::from_row, ClientRow::into_client)?)
    }

    fn update_client(&mut self, id: ClientId, patch: &ClientPatch) -> Result<Client, StoreError> {
        let tx = self.conn.transaction().map_err(DbError::from)?;
        let mut client = client_by_id(&tx, id.get())?;
        if let Some(name) = &patch.name {
            client.name.clone_from(name);
        }
        if let Some(email) = &patch.email {
            client.email.clone_from(email);
        }
        if let Some(phone) = &patch.phone {
            client.phone.clone_from(phone);
        }
        if let Some(goals) = &patch.goals {
            client.goals.clone_from(goals);
        }
        if let Some(rate) = patch.rate {
            client.rate = rate;
        }
        if let Some(user_id) = patch.user_id {
            client.user_id = user_id;
        }
        tx.execute(
            "
            UPDATE clients
            SET name = ?2, email = ?3, phone = ?4, goals = ?5,
                rate_type = ?6, hourly_rate = ?7, monthly_rate = ?8, user_id = ?9
            WHERE id = ?1
            ",
            params![
                id.get(),
                client.name,
                client.email,
                client.phone,
                client.goals,
                client.rate.rate_type(),
                client.rate.hourly_rate().map(|r| r.to_string()),
                client.rate.monthly_rate().map(|r| r.to_string()),
                client.user_id.map(|u| u.to_string()),
            ],
        )
        .map_err(DbError::from)?;
        tx.commit().map_err(DbError::from)?;
        Ok(client)
    }

    fn insert_package(&mut self, new: &NewPackage) -> Result<Package, StoreError> {
        ensure_exists(&self.conn, EntityKind::Client, new.client_id.get())?;
        self.conn.execute(
            "
            INSERT INTO packages (
                client_id, name, price, sessions_total, sessions_used, status,
                starts_on, expires_on, created_at
            )
            VALUES (?1, ?2, ?3, ?4, 0, 'active', ?5, ?6, ?7)
            ",
            params![
                new.client_id.get(),
                new.name,
                new.price.map(|p| p.to_string()),
                new.sessions_total,
                new.starts_on.map(|d| d.to_string()),
                new.expires_on.map(|d| d.to_string()),
                format_timestamp(Utc::now()),
            ],
        )
        .map_err(DbError::from)?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(package_id = id, "package row inserted");
        Ok(package_by_id(&self.conn, id)?)
    }

    fn get_package(&self, id: PackageId) -> Result<Package, StoreError> {
        Ok(package_by_id(&self.conn, id.get())?)
    }

    fn list_packages(&self, filter: &PackageFilter) -> Result<Vec<Package>, StoreError> {
        let mut query = Query::default();
        if let Some(client_id) = filter.client_id {
            query.push("client_id = ?", client_id.get());
        }
        if let Some(status) = filter.status {
            query.push("status = ?", status.as_str().to_string());
        }
        let sql = query.sql(PACKAGE_COLUMNS, "packages", "id", filter.order, filter.limit);
        Ok(query.rows(&self.conn, &sql, PackageRow::from_row, PackageRow::into_package)?)
    }

    fn debit_package(&mut self, debit: CreditDebit) -> Result<Package, StoreError> {
        apply_debit(&self.conn, debit)?;
        Ok(package_by_id(&self.conn, debit.package_id.get())?)
    }

    fn close_package(
        &mut self,
        id: PackageId,
        status: PackageStatus,
    ) -> Result<Package, StoreError> {
        let changed = self
            .conn
            .execute(
                "UPDATE packages SET status = ?2 WHERE id = ?1 AND status = 'active'",
                params![id.get(), status.as_str()],
            )
            .map_err(DbError::from)?;
        if changed == 0 {
            return Err(missing_or_conflict(&self.conn, EntityKind::Package, id.get())?.into());
        }
        Ok(package_by_id(&self.conn, id.get())?)
    }

    fn insert_session(&mut self, new: &NewSession) -> Result<Session, StoreError> {
        ensure_exists(&self.conn, EntityKind::Client, new.client_id.get())?;
        self.conn.execute(
            "
            INSERT INTO sessions (trainer_id, client_id, start_at, end_at, mode, status, package_id)
            VALUES (?1, ?2, ?3, ?4, ?5, 'scheduled', NULL)
            ",
            params![
                new.trainer_id.to_string(),
                new.client_id.get(),
                format_timestamp(new.start_at),
                new.end_at.map(format_timestamp),
                new.mode.as_str(),
            ],
        )
        .map_err(DbError::from)?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(session_id = id, "session row inserted");
        Ok(session_by_id(&self.conn, id)?)
    }

    fn get_session(&self, id: SessionId) -> Result<Session, StoreError> {
        Ok(session_by_id(&self.conn, id.get())?)
    }

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>, StoreError> {
        let mut query = Query::default();
        if let Some(trainer_id) = filter.trainer_id {
            query.push("trainer_id = ?", trainer_id.to_string());
        }
        if let Some(client_id) = filter.client_id {
            query.push("client_id = ?", client_id.get());
        }
        if let Some(status) = filter.status {
            query.push("status = ?", status.as_str().to_string());
        }
        match filter.package {
            PackageLink::Any => {}
            PackageLink::Unlinked => query.clause("package_id IS NULL"),
            PackageLink::Linked(id) => query.push("package_id = ?", id.get()),
        }
        if let Some(from) = filter.starts_from {
            query.push("start_at >= ?", format_bound(from));
        }
        if let Some(before) = filter.starts_before {
            query.push("start_at < ?", format_bound(before));
        }
        let sql = query.sql(SESSION_COLUMNS, "sessions", "start_at", filter.order, filter.limit);
        Ok(query.rows(&self.conn, &sql, SessionRow::from_row, SessionRow::into_session)?)
    }

    fn update_session(
        &mut self,
        id: SessionId,
        patch: &SessionPatch,
        expected_status: SessionStatus,
    ) -> Result<Session, StoreError> {
        let changed = self
            .conn
            .execute(
                "
                UPDATE sessions
                SET status = COALESCE(?2, status),
                    start_at = COALESCE(?3, start_at),
                    end_at = COALESCE(?4, end_at)
                WHERE id = ?1 AND status = ?5
                ",
                params![
                    id.get(),
                    patch.status.map(|s| s.as_str()),
                    patch.start_at.map(format_timestamp),
                    patch.end_at.map(format_timestamp),
                    expected_status.as_str(),
                ],
            )
            .map_err(DbError::from)?;
        if changed == 0 {
            return Err(missing_or_conflict(&self.conn, EntityKind::Session, id.get())?.into());
        }
        Ok(session_by_id(&self.conn, id.get())?)
    }

    fn complete_session(&mut self, write: CompletionWrite) -> Result<Completion, StoreError> {
        // IMMEDIATE takes the write lock up front, so the debit and the
        // status write below see no interleaved writer.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(DbError::from)?;
        let session_id = write.session_id.get();

        let package = match write.debit {
            Some(debit) => {
                apply_debit(&tx, debit)?;
                Some(package_by_id(&tx, debit.package_id.get())?)
            }
            None => None,
        };

        let changed = tx
            .execute(
                "
                UPDATE sessions SET status = 'completed', package_id = ?2
                WHERE id = ?1 AND status = ?3
                ",
                params![
                    session_id,
                    write.debit.map(|d| d.package_id.get()),
                    write.expected_status.as_str(),
                ],
            )
            .map_err(DbError::from)?;
        if changed == 0 {
            // Dropping the transaction rolls back the debit.
            return Err(missing_or_conflict(&tx, EntityKind::Session, session_id)?.into());
        }

        let session = session_by_id(&tx, session_id)?;
        tx.commit().map_err(DbError::from)?;
        Ok(Completion { session, package })
    }

    fn insert_payment(&mut self, new: &NewPayment) -> Result<Payment, StoreError> {
        ensure_exists(&self.conn, EntityKind::Client, new.client_id.get())?;
        let session_ids = serde_json::to_string(&new.session_ids)
            .map_err(|err| StoreError::Backend(Box::new(err)))?;
        self.conn.execute(
            "
            INSERT INTO payments (
                trainer_id, client_id, amount, currency, method, paid_at,
                sessions_purchased, session_ids, note
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ",
            params![
                new.trainer_id.to_string(),
                new.client_id.get(),
                new.amount.to_string(),
                new.currency,
                new.method,
                format_timestamp(new.paid_at),
                new.sessions_purchased,
                session_ids,
                new.note,
            ],
        )
        .map_err(DbError::from)?;
        let id = self.conn.last_insert_rowid();
        tracing::debug!(payment_id = id, "payment row inserted");
        Ok(payment_by_id(&self.conn, id)?)
    }

    fn get_payment(&self, id: PaymentId) -> Result<Payment, StoreError> {
        Ok(payment_by_id(&self.conn, id.get())?)
    }

    fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<Payment>, StoreError> {
        let mut query = Query::default();
        if let Some(trainer_id) = filter.trainer_id {
            query.push("trainer_id = ?", trainer_id.to_string());
        }
        if let Some(client_id) = filter.client_id {
            query.push("client_id = ?", client_id.get());
        }
        if let Some(from) = filter.paid_from {
            query.push("paid_at >= ?", format_bound(from));
        }
        if let Some(before) = filter.paid_before {
            query.push("paid_at < ?", format_bound(before));
        }
        let sql = query.sql(PAYMENT_COLUMNS, "payments", "paid_at", filter.order, filter.limit);
        Ok(query.rows(&self.conn, &sql, PaymentRow::from_row, PaymentRow::into_payment)?)
    }

    fn upsert_profile(&mut self, profile: &Profile) -> Result<(), StoreError> {
        self.conn
            .execute(
                "
                INSERT INTO profiles (user_id, email, role) VALUES (?1, ?2, ?3)
                ON CONFLICT(user_id) DO UPDATE SET email = excluded.email, role = excluded.role
                ",
                params![
                    profile.user_id.to_string(),
                    profile.email.trim().to_lowercase(),
                    profile.role.as_str(),
                ],
            )
            .map_err(DbError::from)?;
        Ok(())
    }

    fn get_profile(&self, user_id: UserId) -> Result<Option<Profile>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, email, role FROM profiles WHERE user_id = ?1",
                [user_id.to_string()],
                ProfileRow::from_row,
            )
            .optional()
            .map_err(DbError::from)?;
        Ok(row.map(ProfileRow::into_profile).transpose()?)
    }

    fn find_profile_by_email(&self, email: &str) -> Result<Option<Profile>, StoreError> {
        let row = self
            .conn
            .query_row(
                "SELECT user_id, email, role FROM profiles WHERE email = ?1 ORDER BY user_id LIMIT 1",
                [email.trim().to_lowercase()],
                ProfileRow::from_row,
            )
            .optional()
            .map_err(DbError::from)?;
        Ok(row.map(ProfileRow::into_profile).transpose()?)
    }
}

/// Compare-and-set increment of `sessions_used`.
fn apply_debit(conn: &Connection, debit: CreditDebit) -> Result<(), DbError> {
    let id = debit.package_id.get();
    let changed = conn.execute(
        "
        UPDATE packages SET sessions_used = sessions_used + 1
        WHERE id = ?1
          AND sessions_used = ?2
          AND sessions_used < sessions_total
          AND status = 'active'
        ",
        params![id, debit.expected_used],
    )?;
    if changed == 0 {
        return Err(missing_or_conflict(conn, EntityKind::Package, id)?);
    }
    tracing::debug!(package_id = id, expected_used = debit.expected_used, "package debited");
    Ok(())
}

/// Table holding rows keyed by an integer `id`. Profiles are keyed by user ID.
fn table(entity: EntityKind) -> Result<&'static str, DbError> {
    match entity {
        EntityKind::Client => Ok("clients"),
        EntityKind::Package => Ok("packages"),
        EntityKind::Session => Ok("sessions"),
        EntityKind::Payment => Ok("payments"),
        EntityKind::Profile => Err(DbError::NotRowKeyed { entity }),
    }
}

fn exists(conn: &Connection, entity: EntityKind, id: i64) -> Result<bool, DbError> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?1", table(entity)?);
    Ok(conn
        .query_row(&sql, [id], |_| Ok(()))
        .optional()?
        .is_some())
}

fn ensure_exists(conn: &Connection, entity: EntityKind, id: i64) -> Result<(), DbError> {
    if exists(conn, entity, id)? {
        Ok(())
    } else {
        Err(DbError::NotFound { entity, id })
    }
}

/// Explains why a conditional write matched no row.
fn missing_or_conflict(conn: &Connection, entity: EntityKind, id: i64) -> Result<DbError, DbError> {
    if exists(conn, entity, id)? {
        tracing::debug!(%entity, id, "conditional write lost");
        Ok(DbError::Conflict { entity, id })
    } else {
        Ok(DbError::NotFound { entity, id })
    }
}

/// A `SELECT` with optional `WHERE` clauses and bound values.
#[derive(Default)]
struct Query {
    clauses: Vec<&'static str>,
    values: Vec<Value>,
}

impl Query {
    fn push(&mut self, clause: &'static str, value: impl Into<Value>) {
        self.clauses.push(clause);
        self.values.push(value.into());
    }

    fn clause(&mut self, clause: &'static str) {
        self.clauses.push(clause);
    }

    fn sql(
        &mut self,
        columns: &str,
        table: &str,
        sort: &str,
        order: SortOrder,
        limit: Option<usize>,
    ) -> String {
        let mut sql = format!("SELECT {columns} FROM {table}");
        if !self.clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.clauses.join(" AND "));
        }
        let order = order.as_sql();
        sql.push_str(&format!(" ORDER BY {sort} {order}, id {order}"));
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            self.values
                .push(Value::Integer(i64::try_from(limit).unwrap_or(i64::MAX)));
        }
        sql
    }

    fn rows<R, T>(
        &self,
        conn: &Connection,
        sql: &str,
        read: fn(&Row<'_>) -> rusqlite::Result<R>,
        decode: fn(R) -> Result<T, DbError>,
    ) -> Result<Vec<T>, DbError> {
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map(params_from_iter(self.values.iter()), read)?;
        let mut decoded = Vec::new();
        for row in rows {
            decoded.push(decode(row?)?);
        }
        Ok(decoded)
    }
}

const CLIENT_COLUMNS: &str = "id, trainer_id, name, email, phone, goals, start_date, preferred_mode, \
     rate_type, hourly_rate, monthly_rate, user_id, created_at";

const PACKAGE_COLUMNS: &str = "id, client_id, name, price, sessions_total, sessions_used, status, \
     starts_on, expires_on, created_at";

const SESSION_COLUMNS: &str = "id, trainer_id, client_id, start_at, end_at, mode, status, package_id";

const PAYMENT_COLUMNS: &str = "id, trainer_id, client_id, amount, currency, method, paid_at, \
     sessions_purchased, session_ids, note";

fn client_by_id(conn: &Connection, id: i64) -> Result<Client, DbError> {
    let sql = format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1");
    conn.query_row(&sql, [id], ClientRow::from_row)
        .optional()?
        .ok_or(DbError::NotFound {
            entity: EntityKind::Client,
            id,
        })?
        .into_client()
}

fn package_by_id(conn: &Connection, id: i64) -> Result<Package, DbError> {
    let sql = format!("SELECT {PACKAGE_COLUMNS} FROM packages WHERE id = ?1");
    conn.query_row(&sql, [id], PackageRow::from_row)
        .optional()?
        .ok_or(DbError::NotFound {
            entity: EntityKind::Package,
            id,
        })?
        .into_package()
}

fn session_by_id(conn: &Connection, id: i64) -> Result<Session, DbError> {
    let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
    conn.query_row(&sql, [id], SessionRow::from_row)
        .optional()?
        .ok_or(DbError::NotFound {
            entity: EntityKind::Session,
            id,
        })?
        .into_session()
}

fn payment_by_id(conn: &Connection, id: i64) -> Result<Payment, DbError> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = ?1");
    conn.query_row(&sql, [id], PaymentRow::from_row)
        .optional()?
        .ok_or(DbError::NotFound {
            entity: EntityKind::Payment,
            id,
        })?
        .into_payment()
}

/// Raw `clients` row as stored.
struct ClientRow {
    id: i64,
    trainer_id: String,
    name: String,
    email: Option<String>,
    phone: Option<String>,
    goals: Option<String>,
    start_date: Option<String>,
    preferred_mode: Option<String>,
    rate_type: String,
    hourly_rate: Option<String>,
    monthly_rate: Option<String>,
    user_id: Option<String>,
    created_at: String,
}

impl ClientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            trainer_id: row.get(1)?,
            name: row.get(2)?,
            email: row.get(3)?,
            phone: row.get(4)?,
            goals: row.get(5)?,
            start_date: row.get(6)?,
            preferred_mode: row.get(7)?,
            rate_type: row.get(8)?,
            hourly_rate: row.get(9)?,
            monthly_rate: row.get(10)?,
            user_id: row.get(11)?,
            created_at: row.get(12)?,
        })
    }

    fn into_client(self) -> Result<Client, DbError> {
        let ctx = Ctx::new(EntityKind::Client, self.id);
        let hourly = self.hourly_rate.as_deref().map(|r| ctx.decimal(r)).transpose()?;
        let monthly = self.monthly_rate.as_deref().map(|r| ctx.decimal(r)).transpose()?;
        let rate = RateConfig::from_parts(&self.rate_type, hourly, monthly)
            .map_err(|err| ctx.invalid(err))?;
        Ok(Client {
            id: ctx.parse(self.id, ClientId::new)?,
            trainer_id: ctx.field(&self.trainer_id)?,
            name: self.name,
            email: self.email,
            phone: self.phone,
            goals: self.goals,
            start_date: self.start_date.as_deref().map(|d| ctx.date(d)).transpose()?,
            preferred_mode: self
                .preferred_mode
                .as_deref()
                .map(|m| ctx.field::<SessionMode>(m))
                .transpose()?,
            rate,
            user_id: self.user_id.as_deref().map(|u| ctx.field(u)).transpose()?,
            created_at: ctx.timestamp(&self.created_at)?,
        })
    }
}

/// Raw `packages` row as stored.
struct PackageRow {
    id: i64,
    client_id: i64,
    name: Option<String>,
    price: Option<String>,
    sessions_total: i64,
    sessions_used: i64,
    status: String,
    starts_on: Option<String>,
    expires_on: Option<String>,
    created_at: String,
}

impl PackageRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            client_id: row.get(1)?,
            name: row.get(2)?,
            price: row.get(3)?,
            sessions_total: row.get(4)?,
            sessions_used: row.get(5)?,
            status: row.get(6)?,
            starts_on: row.get(7)?,
            expires_on: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_package(self) -> Result<Package, DbError> {
        let ctx = Ctx::new(EntityKind::Package, self.id);
        Ok(Package {
            id: ctx.parse(self.id, PackageId::new)?,
            client_id: ctx.parse(self.client_id, ClientId::new)?,
            name: self.name,
            price: self.price.as_deref().map(|p| ctx.decimal(p)).transpose()?,
            sessions_total: self.sessions_total,
            sessions_used: self.sessions_used,
            status: ctx.field::<PackageStatus>(&self.status)?,
            starts_on: self.starts_on.as_deref().map(|d| ctx.date(d)).transpose()?,
            expires_on: self.expires_on.as_deref().map(|d| ctx.date(d)).transpose()?,
            created_at: ctx.timestamp(&self.created_at)?,
        })
    }
}

/// Raw `sessions` row as stored.
struct SessionRow {
    id: i64,
    trainer_id: String,
    client_id: i64,
    start_at: String,
    end_at: Option<String>,
    mode: String,
    status: String,
    package_id: Option<i64>,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            trainer_id: row.get(1)?,
            client_id: row.get(2)?,
            start_at: row.get(3)?,
            end_at: row.get(4)?,
            mode: row.get(5)?,
            status: row.get(6)?,
            package_id: row.get(7)?,
        })
    }

    fn into_session(self) -> Result<Session, DbError> {
        let ctx = Ctx::new(EntityKind::Session, self.id);
        Ok(Session {
            id: ctx.parse(self.id, SessionId::new)?,
            trainer_id: ctx.field(&self.trainer_id)?,
            client_id: ctx.parse(self.client_id, ClientId::new)?,
            start_at: ctx.timestamp(&self.start_at)?,
            end_at: self.end_at.as_deref().map(|t| ctx.timestamp(t)).transpose()?,
            mode: ctx.field::<SessionMode>(&self.mode)?,
            status: ctx.field::<SessionStatus>(&self.status)?,
            package_id: self
                .package_id
                .map(|p| ctx.parse(p, PackageId::new))
                .transpose()?,
        })
    }
}

/// Raw `payments` row as stored.
struct PaymentRow {
    id: i64,
    trainer_id: String,
    client_id: i64,
    amount: String,
    currency: String,
    method: String,
    paid_at: String,
    sessions_purchased: Option<i64>,
    session_ids: String,
    note: Option<String>,
}

impl PaymentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            trainer_id: row.get(1)?,
            client_id: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            method: row.get(5)?,
            paid_at: row.get(6)?,
            sessions_purchased: row.get(7)?,
            session_ids: row.get(8)?,
            note: row.get(9)?,
        })
    }

    fn into_payment(self) -> Result<Payment, DbError> {
        let ctx = Ctx::new(EntityKind::Payment, self.id);
        let session_ids: Vec<SessionId> =
            serde_json::from_str(&self.session_ids).map_err(|err| ctx.invalid(err))?;
        Ok(Payment {
            id: ctx.parse(self.id, PaymentId::new)?,
            trainer_id: ctx.field(&self.trainer_id)?,
            client_id: ctx.parse(self.client_id, ClientId::new)?,
            amount: ctx.decimal(&self.amount)?,
            currency: self.currency,
            method: self.method,
            paid_at: ctx.timestamp(&self.paid_at)?,
            sessions_purchased: self.sessions_purchased,
            session_ids,
            note: self.note,
        })
    }
}

/// Raw `profiles` row as stored.
struct ProfileRow {
    user_id: String,
    email: String,
    role: String,
}

impl ProfileRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            email: row.get(1)?,
            role: row.get(2)?,
        })
    }

    fn into_profile(self) -> Result<Profile, DbError> {
        let ctx = Ctx::new(EntityKind::Profile, 0);
        Ok(Profile {
            user_id: ctx.field(&self.user_id)?,
            email: self.email,
            role: ctx.field::<Role>(&self.role)?,
        })
    }
}

/// Row identity attached to decoding errors.
#[derive(Clone, Copy)]
struct Ctx {
    entity: EntityKind,
    id: i64,
}

impl Ctx {
    const fn new(entity: EntityKind, id: i64) -> Self {
        Self { entity, id }
    }

    fn invalid(self, err: impl std::fmt::Display) -> DbError {
        DbError::InvalidRow {
            entity: self.entity,
            id: self.id,
            message: err.to_string(),
        }
    }

    fn parse<I, T, E: std::fmt::Display>(
        self,
        input: I,
        parse: impl FnOnce(I) -> Result<T, E>,
    ) -> Result<T, DbError> {
        parse(input).map_err(|err| self.invalid(err))
    }

    fn field<T>(self, value: &str) -> Result<T, DbError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        value.parse().map_err(|err| self.invalid(err))
    }

    fn decimal(self, value: &str) -> Result<Decimal, DbError> {
        Decimal::from_str(value).map_err(|err| self.invalid(err))
    }

    fn date(self, value: &str) -> Result<NaiveDate, DbError> {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| self.invalid(err))
    }

    fn timestamp(self, value: &str) -> Result<DateTime<Utc>, DbError> {
        parse_timestamp(value, self.entity, self.id)
    }
}

fn parse_timestamp(timestamp: &str, entity: EntityKind, id: i64) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            entity,
            id,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Formats a query bound, rounding up to the next stored millisecond so that
/// `>=` and `<` against stored values agree with full-precision comparison.
fn format_bound(bound: DateTime<Utc>) -> String {
    let truncated = truncate_instant(bound);
    if truncated == bound {
        return format_timestamp(bound);
    }
    format_timestamp(
        truncated
            .checked_add_signed(chrono::Duration::milliseconds(1))
            .unwrap_or(truncated),
    )
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};
    use std::thread;

    use ft_core::{CoreError, Ledger, SessionEngine, ValidationError, parse_instant};
    use rust_decimal_macros::dec;

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "clients"),
            vec![
                "id",
                "trainer_id",
                "name",
                "email",
                "phone",
                "goals",
                "start_date",
                "preferred_mode",
                "rate_type",
                "hourly_rate",
                "monthly_rate",
                "user_id",
                "created_at",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "packages"),
            vec![
                "id",
                "client_id",
                "name",
                "price",
                "sessions_total",
                "sessions_used",
                "status",
                "starts_on",
                "expires_on",
                "created_at",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "sessions"),
            vec![
                "id",
                "trainer_id",
                "client_id",
                "start_at",
                "end_at",
                "mode",
                "status",
                "package_id",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "payments"),
            vec![
                "id",
                "trainer_id",
                "client_id",
                "amount",
                "currency",
                "method",
                "paid_at",
                "sessions_purchased",
                "session_ids",
                "note",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "profiles"),
            vec!["user_id", "email", "role"]
        );

        let session_indexes = index_names(&db.conn, "sessions");
        let expected: HashSet<String> = ["idx_sessions_client", "idx_sessions_trainer_start"]
            .into_iter()
            .map(String::from)
            .collect();
        assert!(expected.is_subset(&session_indexes));
        assert!(index_names(&db.conn, "packages").contains("idx_packages_client"));
        assert!(index_names(&db.conn, "payments").contains("idx_payments_trainer_paid"));
        assert!(index_names(&db.conn, "profiles").contains("idx_profiles_email"));

        let mut session_fks = foreign_keys(&db.conn, "sessions");
        session_fks.sort();
        assert_eq!(
            session_fks,
            vec![
                (
                    "clients".to_string(),
                    "client_id".to_string(),
                    "id".to_string(),
                    "CASCADE".to_string(),
                ),
                (
                    "packages".to_string(),
                    "package_id".to_string(),
                    "id".to_string(),
                    "SET NULL".to_string(),
                ),
            ]
        );
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }

    fn foreign_keys(conn: &Connection, table: &str) -> Vec<(String, String, String, String)> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA foreign_key_list({table})"))
            .expect("prepare foreign_key_list");
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .expect("query foreign_key_list");
        rows.map(|row| row.expect("foreign_key_list row")).collect()
    }

    struct Seed {
        trainer: UserId,
        client: ClientId,
    }

    fn seed(db: &mut Database, rate: RateConfig) -> Seed {
        let trainer = UserId::new_random();
        let client = db
            .insert_client(&NewClient::new(trainer, "Ana", rate))
            .expect("insert client")
            .id;
        Seed { trainer, client }
    }

    fn package(db: &mut Database, client: ClientId, total: i64, used: i64) -> Package {
        let package = db
            .insert_package(&NewPackage::new(client, total))
            .expect("insert package");
        db.conn
            .execute(
                "UPDATE packages SET sessions_used = ?2 WHERE id = ?1",
                params![package.id.get(), used],
            )
            .expect("set usage");
        db.get_package(package.id).expect("reload package")
    }

    fn session(db: &mut Database, seed: &Seed, start: &str) -> Session {
        db.insert_session(&NewSession {
            trainer_id: seed.trainer,
            client_id: seed.client,
            start_at: parse_instant(start).expect("instant"),
            end_at: None,
            mode: SessionMode::InPerson,
        })
        .expect("insert session")
    }

    #[test]
    fn client_rows_roundtrip_rate_and_patch() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::Hourly { rate: dec!(42.50) });

        let client = db.get_client(seed.client).expect("get client");
        assert_eq!(client.rate, RateConfig::Hourly { rate: dec!(42.50) });
        assert_eq!(client.user_id, None);

        let linked = UserId::new_random();
        let patch = ClientPatch {
            email: Some(Some("ana@example.com".to_string())),
            rate: Some(RateConfig::Monthly { rate: dec!(300) }),
            user_id: Some(Some(linked)),
            ..ClientPatch::default()
        };
        let updated = db.update_client(seed.client, &patch).expect("update");
        assert_eq!(updated.rate, RateConfig::Monthly { rate: dec!(300) });
        assert_eq!(db.get_client(seed.client).expect("reload"), updated);

        let found = db
            .list_clients(&ClientFilter {
                user_id: Some(linked),
                ..ClientFilter::default()
            })
            .expect("list by user");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Ana");
    }

    #[test]
    fn list_clients_orders_by_name_and_limits() {
        let mut db = Database::open_in_memory().expect("open");
        let trainer = UserId::new_random();
        for name in ["Carla", "Ana", "Bea"] {
            db.insert_client(&NewClient::new(trainer, name, RateConfig::PackageBased))
                .expect("insert");
        }
        let names = |order, limit| -> Vec<String> {
            db.list_clients(&ClientFilter {
                trainer_id: Some(trainer),
                order,
                limit,
                ..ClientFilter::default()
            })
            .expect("list")
            .into_iter()
            .map(|c| c.name)
            .collect()
        };
        assert_eq!(names(SortOrder::Ascending, None), vec!["Ana", "Bea", "Carla"]);
        assert_eq!(names(SortOrder::Descending, Some(2)), vec!["Carla", "Bea"]);
    }

    #[test]
    fn inserts_require_existing_client() {
        let mut db = Database::open_in_memory().expect("open");
        let missing = ClientId::new(9).expect("id");
        let err = db.insert_package(&NewPackage::new(missing, 5)).unwrap_err();
        assert!(matches!(
            err,
            StoreError::NotFound {
                entity: EntityKind::Client,
                id: 9
            }
        ));
    }

    #[test]
    fn debit_is_compare_and_set() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let pkg = package(&mut db, seed.client, 10, 9);

        let stale = CreditDebit {
            package_id: pkg.id,
            expected_used: 8,
        };
        assert!(matches!(
            db.debit_package(stale),
            Err(StoreError::Conflict {
                entity: EntityKind::Package,
                ..
            })
        ));

        let fresh = CreditDebit {
            package_id: pkg.id,
            expected_used: 9,
        };
        assert_eq!(db.debit_package(fresh).expect("debit").sessions_used, 10);

        let full = CreditDebit {
            package_id: pkg.id,
            expected_used: 10,
        };
        assert!(matches!(
            db.debit_package(full),
            Err(StoreError::Conflict { .. })
        ));
        assert_eq!(db.get_package(pkg.id).expect("reload").sessions_used, 10);

        let missing = CreditDebit {
            package_id: PackageId::new(404).expect("id"),
            expected_used: 0,
        };
        assert!(matches!(
            db.debit_package(missing),
            Err(StoreError::NotFound { id: 404, .. })
        ));
    }

    #[test]
    fn closed_package_cannot_be_debited_or_closed_again() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let pkg = package(&mut db, seed.client, 5, 0);

        let closed = db
            .close_package(pkg.id, PackageStatus::Expired)
            .expect("close");
        assert_eq!(closed.status, PackageStatus::Expired);
        assert!(matches!(
            db.close_package(pkg.id, PackageStatus::Cancelled),
            Err(StoreError::Conflict { .. })
        ));
        assert!(matches!(
            db.debit_package(CreditDebit {
                package_id: pkg.id,
                expected_used: 0
            }),
            Err(StoreError::Conflict { .. })
        ));
        assert!(
            db.list_packages(&PackageFilter::active_for(seed.client))
                .expect("list")
                .is_empty()
        );
    }

    #[test]
    fn update_session_requires_expected_status() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let s = session(&mut db, &seed, "2025-03-03T09:00:00Z");

        let patch = SessionPatch {
            status: Some(SessionStatus::Pending),
            ..SessionPatch::default()
        };
        let err = db
            .update_session(s.id, &patch, SessionStatus::Pending)
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        let updated = db
            .update_session(s.id, &patch, SessionStatus::Scheduled)
            .expect("update");
        assert_eq!(updated.status, SessionStatus::Pending);
        assert_eq!(updated.start_at, s.start_at);

        let err = db
            .update_session(SessionId::new(999).expect("id"), &patch, SessionStatus::Scheduled)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn completion_rolls_back_debit_when_session_changed() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let pkg = package(&mut db, seed.client, 10, 3);
        let s = session(&mut db, &seed, "2025-03-03T09:00:00Z");

        let write = CompletionWrite {
            session_id: s.id,
            expected_status: SessionStatus::Pending,
            debit: Some(CreditDebit {
                package_id: pkg.id,
                expected_used: 3,
            }),
        };
        let err = db.complete_session(write).unwrap_err();
        assert!(matches!(
            err,
            StoreError::Conflict {
                entity: EntityKind::Session,
                ..
            }
        ));
        assert_eq!(db.get_package(pkg.id).expect("reload").sessions_used, 3);
        assert_eq!(
            db.get_session(s.id).expect("reload").status,
            SessionStatus::Scheduled
        );
    }

    #[test]
    fn completion_writes_debit_and_status_together() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let pkg = package(&mut db, seed.client, 10, 9);
        let s = session(&mut db, &seed, "2025-03-03T09:00:00Z");

        let completion = db
            .complete_session(CompletionWrite {
                session_id: s.id,
                expected_status: SessionStatus::Scheduled,
                debit: Some(CreditDebit {
                    package_id: pkg.id,
                    expected_used: 9,
                }),
            })
            .expect("complete");
        assert_eq!(completion.session.status, SessionStatus::Completed);
        assert_eq!(completion.session.package_id, Some(pkg.id));
        assert_eq!(completion.package.map(|p| p.sessions_used), Some(10));
    }

    #[test]
    fn engine_over_sqlite_handles_exhausted_and_cancelled() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let pkg = package(&mut db, seed.client, 10, 10);
        let first = session(&mut db, &seed, "2025-03-03T09:00:00Z");
        let second = session(&mut db, &seed, "2025-03-04T09:00:00Z");

        let mut engine = SessionEngine::new(&mut db);
        let completion = engine.complete(first.id).expect("complete");
        assert_eq!(completion.session.package_id, None);

        engine.cancel(second.id).expect("cancel");
        let err = engine.complete(second.id).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(db.get_package(pkg.id).expect("reload").sessions_used, 10);
    }

    #[test]
    fn payments_roundtrip_linked_sessions() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::Hourly { rate: dec!(50) });
        let s = session(&mut db, &seed, "2025-03-03T09:00:00Z");

        let new = NewPayment {
            trainer_id: seed.trainer,
            client_id: seed.client,
            amount: dec!(99.90),
            currency: "EUR".to_string(),
            method: "card".to_string(),
            paid_at: parse_instant("2025-03-04T12:00:00Z").expect("instant"),
            sessions_purchased: Some(0),
            session_ids: vec![s.id],
            note: Some("march".to_string()),
        };
        let payment = db.insert_payment(&new).expect("insert payment");
        assert_eq!(payment.amount, dec!(99.90));
        assert_eq!(payment.amount.to_string(), "99.90");
        assert_eq!(payment.session_ids, vec![s.id]);
        assert_eq!(db.get_payment(payment.id).expect("reload"), payment);

        let in_range = db
            .list_payments(&PaymentFilter {
                trainer_id: Some(seed.trainer),
                paid_from: Some(parse_instant("2025-03-01T00:00:00Z").expect("instant")),
                paid_before: Some(parse_instant("2025-04-01T00:00:00Z").expect("instant")),
                ..PaymentFilter::default()
            })
            .expect("list");
        assert_eq!(in_range, vec![payment]);
    }

    #[test]
    fn session_filters_cover_window_and_linkage() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let pkg = package(&mut db, seed.client, 5, 0);
        let early = session(&mut db, &seed, "2025-03-03T09:00:00Z");
        let late = session(&mut db, &seed, "2025-03-05T09:00:00Z");
        SessionEngine::new(&mut db).complete(early.id).expect("complete");

        let linked = db
            .list_sessions(&SessionFilter {
                package: PackageLink::Linked(pkg.id),
                ..SessionFilter::default()
            })
            .expect("linked");
        assert_eq!(linked.iter().map(|s| s.id).collect::<Vec<_>>(), vec![early.id]);

        let window = db
            .list_sessions(&SessionFilter {
                client_id: Some(seed.client),
                starts_from: Some(parse_instant("2025-03-04T00:00:00Z").expect("instant")),
                starts_before: Some(parse_instant("2025-03-06T00:00:00Z").expect("instant")),
                package: PackageLink::Unlinked,
                ..SessionFilter::default()
            })
            .expect("window");
        assert_eq!(window.iter().map(|s| s.id).collect::<Vec<_>>(), vec![late.id]);
    }

    #[test]
    fn sub_millisecond_window_is_rejected_before_storage() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let base = parse_instant("2025-03-03T09:00:00Z").expect("instant");
        let start = base + chrono::Duration::microseconds(100);

        let err = SessionEngine::new(&mut db)
            .schedule(&NewSession {
                trainer_id: seed.trainer,
                client_id: seed.client,
                start_at: start,
                end_at: Some(base + chrono::Duration::microseconds(900)),
                mode: SessionMode::InPerson,
            })
            .expect_err("window collapses at stored precision");
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::EndBeforeStart { .. })
        ));
        assert!(db.list_sessions(&SessionFilter::default()).expect("list").is_empty());

        let scheduled = SessionEngine::new(&mut db)
            .schedule(&NewSession {
                trainer_id: seed.trainer,
                client_id: seed.client,
                start_at: start,
                end_at: Some(base + chrono::Duration::microseconds(1_900)),
                mode: SessionMode::InPerson,
            })
            .expect("schedule");
        let stored = db.get_session(scheduled.id).expect("get");
        assert_eq!(stored, scheduled);
        assert_eq!(stored.start_at, base);
        assert!(stored.end_at.expect("end") > stored.start_at);
    }

    #[test]
    fn sub_millisecond_bounds_match_stored_instants() {
        let mut db = Database::open_in_memory().expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let at_nine = session(&mut db, &seed, "2025-03-03T09:00:00Z");
        let bound = at_nine.start_at + chrono::Duration::microseconds(500);

        let from = db
            .list_sessions(&SessionFilter {
                starts_from: Some(bound),
                ..SessionFilter::default()
            })
            .expect("from");
        assert!(from.is_empty());

        let before = db
            .list_sessions(&SessionFilter {
                starts_before: Some(bound),
                ..SessionFilter::default()
            })
            .expect("before");
        assert_eq!(before, vec![at_nine]);
    }

    #[test]
    fn profiles_are_not_looked_up_by_row_id() {
        let db = Database::open_in_memory().expect("open");
        assert!(matches!(
            exists(&db.conn, EntityKind::Profile, 1),
            Err(DbError::NotRowKeyed {
                entity: EntityKind::Profile
            })
        ));
        assert!(!exists(&db.conn, EntityKind::Client, 1).expect("clients table"));
    }

    #[test]
    fn profiles_are_found_by_normalized_email() {
        let mut db = Database::open_in_memory().expect("open");
        let user = UserId::new_random();
        db.upsert_profile(&Profile {
            user_id: user,
            email: " Ana@Example.com ".to_string(),
            role: Role::Client,
        })
        .expect("upsert");

        let found = db
            .find_profile_by_email("ANA@example.COM")
            .expect("find")
            .expect("profile present");
        assert_eq!(found.user_id, user);
        assert_eq!(found.email, "ana@example.com");
        assert_eq!(db.get_profile(user).expect("get"), Some(found));
        assert_eq!(db.find_profile_by_email("bea@example.com").expect("find"), None);
    }

    #[test]
    fn concurrent_completions_share_last_credit_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ft.db");

        let mut db = Database::open(&path).expect("open");
        let seed = seed(&mut db, RateConfig::PackageBased);
        let pkg = package(&mut db, seed.client, 10, 9);
        let ids = [
            session(&mut db, &seed, "2025-03-03T09:00:00Z").id,
            session(&mut db, &seed, "2025-03-04T09:00:00Z").id,
        ];
        drop(db);

        let barrier = Arc::new(Barrier::new(ids.len()));
        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let path = path.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    let mut db = Database::open(&path).expect("open per thread");
                    barrier.wait();
                    SessionEngine::new(&mut db).complete(id).expect("complete")
                })
            })
            .collect();
        let completions: Vec<Completion> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();

        let linked = completions
            .iter()
            .filter(|c| c.session.package_id == Some(pkg.id))
            .count();
        assert_eq!(linked, 1);
        assert!(
            completions
                .iter()
                .all(|c| c.session.status == SessionStatus::Completed)
        );

        let mut db = Database::open(&path).expect("reopen");
        assert_eq!(db.get_package(pkg.id).expect("reload").sessions_used, 10);
        let balance = Ledger::new(&mut db)
            .client_balance(seed.client)
            .expect("balance");
        assert_eq!(balance, 0);
    }
}
