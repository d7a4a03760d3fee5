//! Runtime settings loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use super::settings::RuntimeSettings;
use super::validation::{validate_settings, ValidationError};

/// Error type for settings loading.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate runtime settings from a TOML file.
pub fn load_settings(path: &Path) -> Result<RuntimeSettings, SettingsError> {
    let content = fs::read_to_string(path)?;
    let settings: RuntimeSettings = toml::from_str(&content)?;

    validate_settings(&settings).map_err(SettingsError::Validation)?;

    Ok(settings)
}
