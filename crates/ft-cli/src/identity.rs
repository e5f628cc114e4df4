//! Resolves the signed-in account from configuration and stored profiles.

use anyhow::{Result, bail};
use ft_core::{CurrentUser, Identity, Role, Store, UserId};

/// The account named by `user_id` in the config, with its stored profile.
pub struct AccountIdentity<'a, S: ?Sized> {
    user_id: Option<UserId>,
    store: &'a S,
}

impl<'a, S: Store + ?Sized> AccountIdentity<'a, S> {
    pub const fn new(user_id: Option<UserId>, store: &'a S) -> Self {
        Self { user_id, store }
    }

    fn email(&self, user_id: UserId) -> Option<String> {
        self.profile(user_id).map(|p| p.email)
    }

    fn profile(&self, user_id: UserId) -> Option<ft_core::Profile> {
        match self.store.get_profile(user_id) {
            Ok(profile) => profile,
            Err(err) => {
                tracing::warn!(%user_id, error = %err, "failed to read profile");
                None
            }
        }
    }
}

impl<S: Store + ?Sized> Identity for AccountIdentity<'_, S> {
    fn current_user(&self) -> Option<(UserId, Option<String>)> {
        let id = self.user_id?;
        Some((id, self.email(id)))
    }

    fn role(&self, user_id: UserId) -> Option<Role> {
        self.profile(user_id).map(|p| p.role)
    }
}

/// Resolves the caller or explains how to sign in.
pub fn require_user(identity: &impl Identity) -> Result<CurrentUser> {
    let Some(user) = identity.whoami() else {
        bail!("Not signed in. Run `ft signup <email>` and set user_id in the config (or FT_USER_ID)");
    };
    Ok(user)
}

/// Resolves the caller and checks they are a trainer.
pub fn require_trainer(identity: &impl Identity) -> Result<CurrentUser> {
    let user = require_user(identity)?;
    if user.role != Role::Trainer {
        bail!("This command requires a trainer account; {} is a {}", user.id, user.role);
    }
    Ok(user)
}
