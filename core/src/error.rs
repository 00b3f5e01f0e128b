use crate::types::{ContainerId, StreamKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConsoleError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown report category '{0}'")]
    UnknownCategory(String),

    #[error("Unknown category filter '{0}'")]
    UnknownFilter(String),

    #[error("No rows with text/URL/phone to run predictions on.")]
    NoScoringRows,

    #[error("A scoring batch is already in flight")]
    ScoringInFlight,

    #[error("View is not mounted")]
    NotMounted,

    #[error("View already mounted on container '{0}'")]
    AlreadyMounted(ContainerId),

    #[error("No {0} provider attached")]
    NoProvider(StreamKind),

    #[error("{stream} fetch failed: {reason}")]
    Fetch { stream: StreamKind, reason: String },

    #[error("Model API failed: {0}")]
    Scoring(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type ConsoleResult<T> = Result<T, ConsoleError>;
