//! # CFP Common Library
//!
//! Shared code for the CFP service crates:
//! - Error and result types
//! - Root folder resolution and TOML bootstrap configuration
//! - Database initialization, migrations and the settings table
//! - Timestamp helpers

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
