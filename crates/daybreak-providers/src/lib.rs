//! # Daybreak Providers
//!
//! Local inference providers. Ollama is the only backend today; it is
//! reached over its native `/api/generate` endpoint.

pub mod ollama;

use daybreak_core::config::DaybreakConfig;
use daybreak_core::error::Result;
use daybreak_core::traits::InferenceProvider;

pub use ollama::OllamaProvider;

/// Create the inference provider described by the configuration.
pub fn create_provider(config: &DaybreakConfig) -> Result<Box<dyn InferenceProvider>> {
    Ok(Box::new(OllamaProvider::from_config(&config.inference)?))
}
