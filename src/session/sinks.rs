//! Contracts for the collaborators a tournament session talks to.
//!
//! The session never touches storage or identity itself. Whatever backs these
//! traits is responsible for knowing the current user.
use async_trait::async_trait;

use crate::models::{Conviction, PollOption};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Everything the vote sink needs to record one decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteSubmission {
    pub winner_id: String,
    pub loser_id: String,
    pub conviction: Conviction,
    pub pair_hash: String,
    pub poll_id: Option<String>,
}

#[async_trait]
pub trait OptionSource: Send + Sync {
    /// Options of `poll_id`, or the global option set when `None`.
    async fn fetch_options(&self, poll_id: Option<&str>) -> Result<Vec<PollOption>, BoxError>;
}

#[async_trait]
pub trait PriorVoteSource: Send + Sync {
    /// Pair hashes the current user has already voted on in this scope.
    async fn voted_pair_hashes(&self, poll_id: Option<&str>) -> Result<Vec<String>, BoxError>;
}

#[async_trait]
pub trait VoteSink: Send + Sync {
    /// Upsert keyed on (user, poll, pair hash).
    async fn submit_vote(&self, vote: &VoteSubmission) -> Result<(), BoxError>;
}

#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Record that the current user finished `poll_id`. Safe to repeat.
    async fn mark_completed(&self, poll_id: &str) -> Result<(), BoxError>;
}
