//! Failure types for calls against the banking service.

use thiserror::Error;

/// Result type alias using CallError.
pub type CallResult<T> = Result<T, CallError>;

/// Why a call to the service did not produce its expected result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// No HTTP response was obtained (connect, timeout, protocol).
    #[error("transport fault: {0}")]
    Transport(String),

    /// A response arrived with a status other than the documented success code.
    #[error("unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// Success status, but the body could not be read as the expected payload.
    #[error("malformed response body: {0}")]
    Decode(String),
}

impl CallError {
    /// True when no response was received at all.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// HTTP status, if a response was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::UnexpectedStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for CallError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
