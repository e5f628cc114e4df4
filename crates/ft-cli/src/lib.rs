//! Personal-training tracker CLI library.
//!
//! This crate provides the CLI interface for the training tracker.

mod cli;
pub mod commands;
mod config;
mod identity;

pub use cli::{ClientsAction, Cli, Commands, PackagesAction, PaymentsAction, SessionsAction};
pub use config::Config;
pub use identity::{AccountIdentity, require_trainer, require_user};
