//! Crate-wide error type

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown level {level} (tables available: {available})")]
    UnknownLevel { level: u32, available: u32 },

    #[error("malformed table layout: {0}")]
    Layout(#[from] serde_json::Error),

    #[error("invalid table layout: {0}")]
    InvalidLayout(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("a game is already in progress")]
    GameInProgress,

    #[error("field must be reset before starting a new game")]
    FieldNotReset,
}

pub type Result<T> = std::result::Result<T, Error>;
