//! Daybreak error taxonomy.

use thiserror::Error;

/// Errors raised by Daybreak crates.
///
/// `Adapter` and `Timeout` never escape the pipeline: each stage turns them
/// into an entry of the run's error list. `Delivery` is recovered by the
/// briefing job. `Critical` is the only kind that takes the alert path.
#[derive(Debug, Error)]
pub enum DaybreakError {
    #[error("{source_name}: {message}")]
    Adapter { source_name: String, message: String },

    #[error("{0} timed out after {1}s")]
    Timeout(String, u64),

    #[error("Composition error: {0}")]
    Composition(String),

    #[error("Scheduling error: {0}")]
    Scheduling(String),

    #[error("Delivery error: {0}")]
    Delivery(String),

    #[error("Critical error: {0}")]
    Critical(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DaybreakError {
    /// Shorthand for an adapter failure tagged with its source name.
    pub fn adapter(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Adapter {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for DaybreakError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DaybreakError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_error_names_its_source() {
        let e = DaybreakError::adapter("yahoo", "no data");
        assert_eq!(e.to_string(), "yahoo: no data");
    }

    #[test]
    fn timeout_mentions_seconds() {
        let e = DaybreakError::Timeout("ollama".into(), 60);
        assert_eq!(e.to_string(), "ollama timed out after 60s");
    }
}
