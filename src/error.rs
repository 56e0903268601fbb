use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("metrics API answered with HTTP {0}")]
    Status(u16),
    #[error("session is no longer valid (HTTP 401), log in again")]
    Unauthorized,
    #[error("malformed response body: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid range: start {start} is after end {end}")]
    InvalidRange { start: String, end: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not persist preference `{key}`: {reason}")]
    Preference { key: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether the next scheduled tick should simply try again.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Error::Unauthorized | Error::InvalidRange { .. } | Error::Preference { .. }
        )
    }

    pub(crate) fn from_status(code: u16) -> Option<Self> {
        match code {
            200..=299 => None,
            401 => Some(Error::Unauthorized),
            other => Some(Error::Status(other)),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 => Error::Unauthorized,
            Some(status) => Error::Status(status.as_u16()),
            None => Error::Transport(err.to_string()),
        }
    }
}
