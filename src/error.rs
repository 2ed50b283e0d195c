//! Error types for the consensus engine.
//!
//! No error in this module is fatal to the process:
//! - `TransientError`: exchange or messaging call failed; the data is treated as absent
//! - `ValidationError`: bad command argument; reported on the command's reply only
//! - `PersistenceError`: state file write failed; in-memory settings stay authoritative
//! - `ActorError`: the config actor's mailbox is gone

use thiserror::Error;

/// A network call that produced no usable data this time.
#[derive(Debug, Error)]
pub enum TransientError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("API rejected request: {0}")]
    Api(String),
}

impl TransientError {
    /// Whether this error is a plain timeout (normal for long-polling).
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransientError::Timeout(_))
    }
}

impl From<reqwest::Error> for TransientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransientError::Timeout(e.to_string())
        } else if e.is_decode() {
            TransientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            TransientError::Status {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            TransientError::Transport(e.to_string())
        }
    }
}

/// A rejected operator command or settings mutation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing argument, usage: {usage}")]
    MissingArgument { usage: &'static str },

    #[error("invalid wallet address: {0}")]
    InvalidWallet(String),

    #[error("wallet already tracked: {0}")]
    DuplicateWallet(String),

    #[error("no tracked wallet matches: {0}")]
    WalletNotFound(String),

    #[error("symbol already tracked: {0}")]
    DuplicateSymbol(String),

    #[error("symbol not tracked: {0}")]
    SymbolNotFound(String),

    #[error("not a whole number: {0}")]
    NotANumber(String),

    #[error("{name} must be between {min} and {max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Failure to load or save the persisted state document.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("state file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("state file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The config actor stopped and can no longer answer requests.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("config actor is not running")]
pub struct ActorError;

/// Why a settings mutation did not apply.
#[derive(Debug, Error)]
pub enum MutateError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Actor(#[from] ActorError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_range_message() {
        let err = ValidationError::OutOfRange {
            name: "poll interval",
            value: 5,
            min: 10,
            max: 600,
        };
        assert_eq!(
            err.to_string(),
            "poll interval must be between 10 and 600, got 5"
        );
    }

    #[test]
    fn test_timeout_detection() {
        assert!(TransientError::Timeout("30s".into()).is_timeout());
        assert!(!TransientError::Api("bad".into()).is_timeout());
    }
}
