//! Data layer module
//!
//! Persists everything the auth provider owns:
//! - Users and their linked provider accounts
//! - Sessions
//! - Pending OAuth state (verification records)

mod database;
mod models;

pub use database::Database;
pub use models::*;

#[cfg(test)]
mod database_test;
