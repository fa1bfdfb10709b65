use thiserror::Error;

/// Errors raised by the poll store.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to parse timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("poll not found: {0}")]
    PollNotFound(String),

    #[error("poll {0} is closed for voting")]
    PollInactive(String),

    #[error("option not found: {0}")]
    OptionNotFound(String),

    #[error("a poll needs at least 2 options, got {0}")]
    TooFewOptions(usize),

    #[error("only {available} options available, {requested} requested")]
    NotEnoughOptions { requested: usize, available: usize },

    #[error("voter {0} is anonymous in this poll")]
    VoterNotPublic(String),

    #[error("option id {0:?} contains the pair separator")]
    InvalidOptionId(String),

    #[error("conviction score {0} is outside 0..=10")]
    ConvictionOutOfRange(i64),
}

pub type PollResult<T> = Result<T, PollError>;
