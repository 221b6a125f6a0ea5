use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `barter-orderflow`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Error)]
pub enum OrderflowError {
    #[error("tick could not be mapped to a primary bar (bar_index: {0})")]
    UnresolvableBarIndex(i64),

    #[error("invalid tick: {0}")]
    InvalidTick(String),

    #[error("no BarRecord exists for bar_index: {bar_index}")]
    MissingBarRecord { bar_index: u64 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to decode feed event: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl OrderflowError {
    /// Determine if an error must stop the pipeline rather than skip a single event.
    #[allow(clippy::match_like_matches_macro)]
    pub fn is_terminal(&self) -> bool {
        match self {
            OrderflowError::InvalidConfig(_) | OrderflowError::Io(_) => true,
            _ => false,
        }
    }
}

impl From<serde_json::Error> for OrderflowError {
    fn from(value: serde_json::Error) -> Self {
        Self::Decode(value.to_string())
    }
}

impl From<std::io::Error> for OrderflowError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}
