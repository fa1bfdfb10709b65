use std::sync::Arc;

use async_trait::async_trait;

use super::Database;
use crate::error::PollError;
use crate::models::PollOption;
use crate::session::{BoxError, CompletionSink, OptionSource, PriorVoteSource, VoteSink, VoteSubmission};

/// The store seen through one authenticated user.
#[derive(Clone)]
pub struct Voter {
    database: Arc<Database>,
    user_id: String,
}

impl Voter {
    pub fn new(database: Arc<Database>, user_id: impl Into<String>) -> Self {
        Self {
            database,
            user_id: user_id.into(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

#[async_trait]
impl OptionSource for Voter {
    async fn fetch_options(&self, poll_id: Option<&str>) -> Result<Vec<PollOption>, BoxError> {
        let Some(poll_id) = poll_id else {
            return Ok(self.database.get_options().await?);
        };

        let poll = self.database.get_poll(poll_id).await?;
        if !poll.is_active {
            return Err(PollError::PollInactive(poll.id).into());
        }
        Ok(poll.options)
    }
}

#[async_trait]
impl PriorVoteSource for Voter {
    async fn voted_pair_hashes(&self, poll_id: Option<&str>) -> Result<Vec<String>, BoxError> {
        Ok(self.database.get_voted_pair_hashes(&self.user_id, poll_id).await?)
    }
}

#[async_trait]
impl VoteSink for Voter {
    async fn submit_vote(&self, vote: &VoteSubmission) -> Result<(), BoxError> {
        Ok(self.database.save_vote(&self.user_id, vote).await?)
    }
}

#[async_trait]
impl CompletionSink for Voter {
    async fn mark_completed(&self, poll_id: &str) -> Result<(), BoxError> {
        Ok(self.database.mark_poll_completed(&self.user_id, poll_id).await?)
    }
}
