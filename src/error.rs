//! Crate-level errors

use rustyline::error::ReadlineError;
use thiserror::Error;

/// Result type used across the bridge.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("unsupported connection type: {0}")]
    UnsupportedConnectType(String),

    #[error("readline failure: {0}")]
    Readline(#[from] ReadlineError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readline_errors_keep_their_source() {
        let err: Error = ReadlineError::Eof.into();
        assert!(matches!(err, Error::Readline(ReadlineError::Eof)));
        assert!(std::error::Error::source(&err).is_some());
    }
}
