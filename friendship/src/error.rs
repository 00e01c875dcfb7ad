use serde::{Deserialize, Serialize};

use crate::transition::TransitionError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> ValidationError {
        ValidationError(msg.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Error shape shared by the wire (`{message, code?}`) and the store buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>, code: Option<&str>) -> ErrorInfo {
        ErrorInfo {
            message: message.into(),
            code: code.map(str::to_string),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("{message}")]
    Remote {
        status: u16,
        message: String,
        code: Option<String>,
    },

    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl Error {
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Validation(_) => Some("validation"),
            Error::Transition(err) => Some(err.code()),
            Error::Remote { code, .. } => code.as_deref(),
            Error::Transport(_) => Some("transport"),
            Error::Decode(_) => Some("decode"),
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo::new(self.to_string(), self.code())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Decode(err.to_string())
    }
}
