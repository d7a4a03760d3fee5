//! Runtime settings validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, non-empty paths)
//! - Check that the log filter parses
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: RuntimeSettings → Result<(), Vec<ValidationError>>
//! - Runs before settings are accepted by the runtime

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use super::settings::RuntimeSettings;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("data_dir must not be empty")]
    EmptyDataDir,

    #[error("default_format {0:?} must be a non-empty alphanumeric extension")]
    InvalidFormat(String),

    #[error("shutdown_timeout_ms must be greater than zero")]
    ZeroShutdownTimeout,

    #[error("log_filter {filter:?} is invalid: {reason}")]
    InvalidLogFilter { filter: String, reason: String },
}

pub fn validate_settings(settings: &RuntimeSettings) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if settings.data_dir.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyDataDir);
    }

    let format = &settings.default_format;
    if format.is_empty() || !format.chars().all(|c| c.is_ascii_alphanumeric()) {
        errors.push(ValidationError::InvalidFormat(format.clone()));
    }

    if settings.shutdown_timeout_ms == 0 {
        errors.push(ValidationError::ZeroShutdownTimeout);
    }

    if let Err(e) = EnvFilter::try_new(&settings.log_filter) {
        errors.push(ValidationError::InvalidLogFilter {
            filter: settings.log_filter.clone(),
            reason: e.to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
