use crate::state::ConnectionState;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unusable broadcast URL
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Command issued while the connection is in the wrong state
    #[error("Precondition failed: cannot {operation} while {state}")]
    Precondition {
        operation: &'static str,
        state: ConnectionState,
    },

    #[error("Method not implemented: {0}")]
    NotImplemented(String),

    #[error("Invalid arguments for {method}: {source}")]
    InvalidArguments {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn precondition(operation: &'static str, state: ConnectionState) -> Self {
        Self::Precondition { operation, state }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
