//! Clients and the trainer's roster.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::identity::Role;
use crate::rate::RateConfig;
use crate::session::SessionMode;
use crate::store::Store;
use crate::types::{ClientId, SortOrder, UserId, optional_text, required_text};

/// A person trained by a trainer.
///
/// A client may exist before the person has an account; `user_id` is set
/// once the account is linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub trainer_id: UserId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goals: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_mode: Option<SessionMode>,
    #[serde(flatten)]
    pub rate: RateConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

/// Fields for creating a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    pub trainer_id: UserId,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub goals: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub preferred_mode: Option<SessionMode>,
    pub rate: RateConfig,
}

impl NewClient {
    /// Creates the minimal form: a name and a billing mode.
    pub fn new(trainer_id: UserId, name: impl Into<String>, rate: RateConfig) -> Self {
        Self {
            trainer_id,
            name: name.into(),
            email: None,
            phone: None,
            goals: None,
            start_date: None,
            preferred_mode: None,
            rate,
        }
    }

    /// Normalizes text fields and checks required ones.
    pub fn validated(self) -> Result<Self, CoreError> {
        self.rate.validate()?;
        Ok(Self {
            name: required_text("name", &self.name)?,
            email: optional_text(self.email.as_deref()),
            phone: optional_text(self.phone.as_deref()),
            goals: optional_text(self.goals.as_deref()),
            ..self
        })
    }
}

/// Partial update of a client. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientPatch {
    pub name: Option<String>,
    /// `Some(None)` clears the email.
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub goals: Option<Option<String>>,
    pub rate: Option<RateConfig>,
    /// `Some(None)` unlinks the account.
    pub user_id: Option<Option<UserId>>,
}

impl ClientPatch {
    fn validated(self) -> Result<Self, CoreError> {
        if let Some(rate) = &self.rate {
            rate.validate()?;
        }
        Ok(Self {
            name: self
                .name
                .as_deref()
                .map(|n| required_text("name", n))
                .transpose()?,
            email: self.email.map(|e| optional_text(e.as_deref())),
            phone: self.phone.map(|p| optional_text(p.as_deref())),
            goals: self.goals.map(|g| optional_text(g.as_deref())),
            ..self
        })
    }
}

/// Criteria for listing clients. Results are ordered by name, then ID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientFilter {
    pub trainer_id: Option<UserId>,
    pub user_id: Option<UserId>,
    pub order: SortOrder,
    pub limit: Option<usize>,
}

impl ClientFilter {
    #[must_use]
    pub fn for_trainer(trainer_id: UserId) -> Self {
        Self {
            trainer_id: Some(trainer_id),
            ..Self::default()
        }
    }
}

/// Outcome of linking a client record to an account by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOutcome {
    pub client: Client,
    /// Whether a client account with that email existed and was linked.
    pub linked: bool,
}

/// Trainer-side roster operations.
pub struct Roster<'a, S> {
    store: &'a mut S,
}

impl<'a, S: Store> Roster<'a, S> {
    pub const fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    /// Creates a client owned by the given trainer.
    pub fn create(&mut self, new: NewClient) -> Result<Client, CoreError> {
        let new = new.validated()?;
        let client = self.store.insert_client(&new)?;
        tracing::info!(client_id = %client.id, rate = %client.rate, "client created");
        Ok(client)
    }

    /// Applies a partial edit.
    pub fn update(&mut self, id: ClientId, patch: ClientPatch) -> Result<Client, CoreError> {
        let patch = patch.validated()?;
        Ok(self.store.update_client(id, &patch)?)
    }

    /// Lists the trainer's clients ordered by name.
    pub fn list(&self, trainer_id: UserId) -> Result<Vec<Client>, CoreError> {
        Ok(self.store.list_clients(&ClientFilter::for_trainer(trainer_id))?)
    }

    /// Stores the email on the client and links the matching client account.
    ///
    /// If no client-role account uses the email yet, the linkage is cleared
    /// and only the email is saved; linking again after sign-up completes it.
    pub fn link_account(&mut self, id: ClientId, email: &str) -> Result<LinkOutcome, CoreError> {
        let email = required_text("email", email)?;
        let profile = self.store.find_profile_by_email(&email.to_lowercase())?;
        let user_id = profile
            .filter(|p| p.role == Role::Client)
            .map(|p| p.user_id);

        let patch = ClientPatch {
            email: Some(Some(email)),
            user_id: Some(user_id),
            ..ClientPatch::default()
        };
        let client = self.store.update_client(id, &patch)?;
        tracing::info!(client_id = %id, linked = user_id.is_some(), "client account link updated");
        Ok(LinkOutcome {
            client,
            linked: user_id.is_some(),
        })
    }
}
