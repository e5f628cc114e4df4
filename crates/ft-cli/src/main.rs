use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ft_cli::commands::{
    calendar, clients, finances, overview, packages, payments, sessions, signup, status,
};
use ft_cli::{AccountIdentity, Cli, Commands, Config, require_trainer, require_user};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(ft_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = ft_db::Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))?;
    Ok((db, config))
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let now = Utc::now();

    match &cli.command {
        Some(Commands::Signup {
            email,
            role,
            user_id,
        }) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            signup::run(&mut out, &mut db, email, *role, *user_id)?;
        }
        Some(Commands::Whoami) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            signup::whoami(&mut out, &AccountIdentity::new(config.user_id, &db))?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let trainer = require_trainer(&AccountIdentity::new(config.user_id, &db))?;
            status::run(&mut out, &db, &config, &trainer, now)?;
        }
        Some(Commands::Clients(action)) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let trainer = require_trainer(&AccountIdentity::new(config.user_id, &db))?;
            clients::run(&mut out, &mut db, &trainer, action)?;
        }
        Some(Commands::Packages(action)) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let trainer = require_trainer(&AccountIdentity::new(config.user_id, &db))?;
            packages::run(&mut out, &mut db, &trainer, action)?;
        }
        Some(Commands::Sessions(action)) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let trainer = require_trainer(&AccountIdentity::new(config.user_id, &db))?;
            sessions::run(&mut out, &mut db, &config, &trainer, action, now)?;
        }
        Some(Commands::Payments(action)) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            let trainer = require_trainer(&AccountIdentity::new(config.user_id, &db))?;
            payments::run(&mut out, &mut db, &config, &trainer, action, now)?;
        }
        Some(Commands::Finances { json }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let trainer = require_trainer(&AccountIdentity::new(config.user_id, &db))?;
            finances::run(&mut out, &db, &config, &trainer, now.date_naive(), *json)?;
        }
        Some(Commands::Overview { client, json }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let user = require_user(&AccountIdentity::new(config.user_id, &db))?;
            overview::run(&mut out, &db, &user, *client, *json)?;
        }
        Some(Commands::Calendar {
            output,
            lead_minutes,
        }) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            let trainer = require_trainer(&AccountIdentity::new(config.user_id, &db))?;
            let lead = Duration::minutes(lead_minutes.unwrap_or(config.reminder_lead_minutes));
            if let Some(path) = output {
                let file = File::create(path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let mut file = BufWriter::new(file);
                let summary = calendar::run(&mut file, &db, &trainer, lead, now)?;
                file.flush()?;
                writeln!(
                    out,
                    "Exported {} events and {} reminders to {}",
                    summary.events,
                    summary.reminders,
                    path.display()
                )?;
            } else {
                calendar::run(&mut out, &db, &trainer, lead, now)?;
            }
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(out)?;
        }
    }

    Ok(())
}
