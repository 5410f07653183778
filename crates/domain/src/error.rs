/// Shared error type used across all Dayloom crates.
///
/// Variants follow how the error is recovered, not where it came from:
/// `Validation`/`NotFound`/`Conflict`/`Auth` are turned into structured
/// tool-error messages the model can react to, `Upstream` is retried when
/// `retryable`, `Deadline` ends the turn with the fixed timeout notice.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("auth: {0}")]
    Auth(String),

    #[error("upstream {service}: {message}")]
    Upstream {
        service: String,
        message: String,
        retryable: bool,
    },

    #[error("deadline: {0}")]
    Deadline(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl Error {
    /// Transient upstream failure that a backoff loop may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Upstream { retryable: true, .. })
    }

    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Upstream {
            service: service.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn upstream_retryable(service: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Upstream {
            service: service.into(),
            message: message.into(),
            retryable: true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
