//! # Daybreak Sources
//!
//! Concrete data sources behind the core adapter traits:
//! - [`yahoo::YahooMarket`]: CAC 40 quotes and histories from the Yahoo chart API
//! - [`weather::OpenWeather`]: current conditions from OpenWeatherMap
//! - [`holdings::HoldingsBook`]: the user's positions and their ledger, stored in SQLite

pub mod holdings;
pub mod weather;
pub mod yahoo;

pub use holdings::{
    HISTORY_LIMIT, Holding, HoldingsBook, LedgerEntry, PricedHoldings, TransactionKind,
};
pub use weather::OpenWeather;
pub use yahoo::YahooMarket;
