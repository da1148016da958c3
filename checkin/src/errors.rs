use thiserror::Error as ThisError;

/// Errors raised at the client boundaries.
///
/// None of these escape a run: the console client folds them into typed outcomes and the
/// runner folds anything left into a failed [`CheckinOutcome`](crate::api::models::outcome::CheckinOutcome).
#[derive(ThisError, Debug)]
pub enum Error {
    /// Network failure, timeout or an unreachable session
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Response body could not be decoded into the expected shape
    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    /// HTTP 200 but the application reported failure
    #[error("{message}")]
    Rejected { message: String },

    /// Request could not be built from the given input
    #[error("{message}")]
    InvalidRequest { message: String },

    /// Browser session could not be opened or has been closed
    #[error("Session error: {message}")]
    Session { message: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Generic fallback used when the remote rejects without a message.
    pub fn rejected(message: Option<String>, fallback: &str) -> Self {
        Error::Rejected {
            message: message.filter(|m| !m.is_empty()).unwrap_or_else(|| fallback.to_string()),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport { message: err.to_string() }
    }
}

/// Type alias for client operation results
pub type Result<T> = std::result::Result<T, Error>;
