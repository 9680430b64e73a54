//! Session configuration validation.

use crate::schema::{LATEST_VERSION, SessionConfig};

/// Upper limit on a single poll wait.
pub const MAX_POLL_TIMEOUT_MS: u64 = 60_000;

#[derive(thiserror::Error, Debug)]
pub enum ValidationError {
    #[error("Invalid value: {field} = {value} ({reason})")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Unsupported version: {version}")]
    UnsupportedVersion { version: u32 },
}

pub fn validate_config(config: &SessionConfig) -> Result<(), ValidationError> {
    if config.version == 0 || config.version > LATEST_VERSION {
        return Err(ValidationError::UnsupportedVersion {
            version: config.version,
        });
    }

    if config.retry.max_rounds == 0 {
        return Err(ValidationError::InvalidValue {
            field: "retry.max_rounds".to_string(),
            value: "0".to_string(),
            reason: "at least one poll round is required".to_string(),
        });
    }

    if config.retry.poll_timeout_ms > MAX_POLL_TIMEOUT_MS {
        return Err(ValidationError::InvalidValue {
            field: "retry.poll_timeout_ms".to_string(),
            value: config.retry.poll_timeout_ms.to_string(),
            reason: format!("must not exceed {MAX_POLL_TIMEOUT_MS}"),
        });
    }

    Ok(())
}
