//! # Daybreak Core
//!
//! Shared building blocks for the briefing runner:
//! - `config`: process configuration (TOML + env overrides)
//! - `error`: the `DaybreakError` taxonomy
//! - `types`: domain values exchanged between adapters, pipeline and delivery
//! - `traits`: the seams the core calls (data sources, delivery, recorder, config store)
//! - `db`: the injected SQLite handle and the key/value config store

pub mod config;
pub mod db;
pub mod error;
pub mod traits;
pub mod types;

pub use config::DaybreakConfig;
pub use db::Database;
pub use error::{DaybreakError, Result};
