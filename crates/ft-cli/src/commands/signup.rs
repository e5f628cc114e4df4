//! Account registration and the `whoami` command.

use std::io::Write;

use anyhow::{Result, bail};
use ft_core::{Identity, Profile, Role, Store, UserId};
use ft_db::Database;

/// Records the profile for a new account and prints its ID.
///
/// Registering the same account again updates its email and role. An email
/// already used by another account is rejected.
pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    email: &str,
    role: Role,
    user_id: Option<UserId>,
) -> Result<UserId> {
    let email = email.trim().to_lowercase();
    if email.is_empty() || !email.contains('@') {
        bail!("Invalid email: {email:?}");
    }
    let user_id = user_id.unwrap_or_else(UserId::new_random);
    if let Some(existing) = db.find_profile_by_email(&email)? {
        if existing.user_id != user_id {
            bail!("{email} is already registered");
        }
    }

    db.upsert_profile(&Profile {
        user_id,
        email: email.clone(),
        role,
    })?;
    tracing::info!(%user_id, %role, "account registered");

    writeln!(writer, "Signed up {email} as {role}")?;
    writeln!(writer, "User ID: {user_id}")?;
    writeln!(
        writer,
        "Set user_id = \"{user_id}\" in your config or export FT_USER_ID={user_id}"
    )?;
    Ok(user_id)
}

/// Prints the signed-in account.
pub fn whoami<W: Write>(writer: &mut W, identity: &impl Identity) -> Result<()> {
    let Some(me) = identity.whoami() else {
        writeln!(writer, "Not signed in.")?;
        return Ok(());
    };
    writeln!(writer, "User: {}", me.id)?;
    writeln!(writer, "Email: {}", me.email.as_deref().unwrap_or("-"))?;
    writeln!(writer, "Role: {}", me.role)?;
    Ok(())
}
