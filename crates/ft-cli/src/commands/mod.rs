//! CLI subcommand implementations.

pub mod calendar;
pub mod clients;
pub mod finances;
pub mod overview;
pub mod packages;
pub mod payments;
pub mod sessions;
pub mod signup;
pub mod status;
pub mod util;
