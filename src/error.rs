use thiserror::Error;

/// Startup configuration failure. The process exits before binding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Failures talking to the external product index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The index could not be reached (connection refused, DNS, timeout).
    #[error("search index unreachable: {0}")]
    Unavailable(String),

    /// The index answered with a non-success status.
    #[error("search index returned HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    /// The index answered but the body did not have the expected shape.
    #[error("unexpected search index response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for IndexError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            IndexError::Unavailable(err.to_string())
        } else if err.is_decode() {
            IndexError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            IndexError::Upstream {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            IndexError::Unavailable(err.to_string())
        }
    }
}

/// Errors produced while serving a search or click.
///
/// `code` is the machine-readable category that ends up in the response body.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    InvalidInput { code: &'static str, message: String },

    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    #[error(transparent)]
    Index(#[from] IndexError),
}

impl AppError {
    pub fn invalid(code: &'static str, message: impl Into<String>) -> Self {
        AppError::InvalidInput {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        AppError::NotFound {
            code,
            message: message.into(),
        }
    }
}
