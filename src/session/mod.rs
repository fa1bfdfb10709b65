//! One user's pass over the not-yet-voted pairs of a poll.
//!
//! The pending list is computed and shuffled once when the session starts and
//! is never refreshed. Each accepted vote advances the position by exactly one;
//! a failed submission leaves everything where it was so it can be retried.
pub mod sinks;
pub mod state;

use std::collections::HashSet;

use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::models::{Conviction, PollOption};
use crate::voting::{calculate_pair_count, generate_all_pairs, get_unvoted_pairs, shuffle_with, Pair};

pub use sinks::{BoxError, CompletionSink, OptionSource, PriorVoteSource, VoteSink, VoteSubmission};
pub use state::{Cursor, Event, SessionState};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("option {0} is not part of the current pair")]
    NotInPair(String),

    #[error("conviction {0} is outside 0..=10")]
    ConvictionOutOfRange(i64),

    #[error("cannot {event} while {state}")]
    InvalidTransition { state: &'static str, event: &'static str },

    #[error("failed to load session data: {0}")]
    LoadFailed(#[source] BoxError),

    #[error("vote submission failed: {0}")]
    SubmissionFailed(#[source] BoxError),
}

/// How far along the user is, counting votes from earlier sessions.
///
/// `total` comes from the current option count, so if options were added
/// after earlier votes were cast `completed` can run past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn percent(&self) -> f64 {
        self.fraction() * 100.0
    }
}

#[derive(Debug)]
pub struct TournamentSession {
    poll_id: Option<String>,
    pending: Vec<Pair>,
    position: usize,
    state: SessionState,
    option_count: usize,
    prior_completed: usize,
    completion_signaled: bool,
}

impl TournamentSession {
    /// Start a session shuffled with the thread-local RNG.
    pub fn new(
        options: &[PollOption],
        voted_hashes: &HashSet<String>,
        prior_completed: usize,
        poll_id: Option<String>,
    ) -> Self {
        Self::with_rng(options, voted_hashes, prior_completed, poll_id, &mut rand::rng())
    }

    pub fn with_rng<R: Rng + ?Sized>(
        options: &[PollOption],
        voted_hashes: &HashSet<String>,
        prior_completed: usize,
        poll_id: Option<String>,
        rng: &mut R,
    ) -> Self {
        let all_pairs = generate_all_pairs(options);
        let pending = shuffle_with(&get_unvoted_pairs(&all_pairs, voted_hashes), rng);
        let state = if pending.is_empty() {
            SessionState::Complete
        } else {
            SessionState::AwaitingSelection
        };

        Self {
            poll_id,
            pending,
            position: 0,
            state,
            option_count: options.len(),
            prior_completed,
            completion_signaled: false,
        }
    }

    /// Load options and prior votes from `backend` and start a session.
    ///
    /// With a `seed` the shuffle is reproducible. A session that starts out
    /// complete signals completion before returning.
    pub async fn open<B>(backend: &B, poll_id: Option<&str>, seed: Option<u64>) -> Result<Self, SessionError>
    where
        B: OptionSource + PriorVoteSource + CompletionSink + ?Sized,
    {
        let options = backend
            .fetch_options(poll_id)
            .await
            .map_err(SessionError::LoadFailed)?;
        let voted = backend
            .voted_pair_hashes(poll_id)
            .await
            .map_err(SessionError::LoadFailed)?;

        let prior_completed = voted.len();
        let voted: HashSet<String> = voted.into_iter().collect();
        let poll_id = poll_id.map(str::to_string);

        let mut session = match seed {
            Some(seed) => Self::with_rng(&options, &voted, prior_completed, poll_id, &mut StdRng::seed_from_u64(seed)),
            None => Self::new(&options, &voted, prior_completed, poll_id),
        };

        info!(
            "Session opened for {}: {} of {} pairs pending",
            session.poll_id.as_deref().unwrap_or("global options"),
            session.pending.len(),
            calculate_pair_count(session.option_count)
        );

        session.finish(backend).await;
        Ok(session)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn poll_id(&self) -> Option<&str> {
        self.poll_id.as_deref()
    }

    pub fn is_complete(&self) -> bool {
        self.state == SessionState::Complete
    }

    pub fn current_pair(&self) -> Option<&Pair> {
        match self.state {
            SessionState::Complete => None,
            _ => self.pending.get(self.position),
        }
    }

    pub fn selected_winner(&self) -> Option<&str> {
        match &self.state {
            SessionState::AwaitingConviction { winner_id, .. } => Some(winner_id),
            _ => None,
        }
    }

    pub fn conviction(&self) -> Option<Conviction> {
        match &self.state {
            SessionState::AwaitingConviction { conviction, .. } => Some(*conviction),
            _ => None,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len().saturating_sub(self.position)
    }

    pub fn progress(&self) -> Progress {
        Progress {
            completed: self.prior_completed + self.position,
            total: calculate_pair_count(self.option_count),
        }
    }

    pub fn select_winner(&mut self, option_id: &str) -> Result<&SessionState, SessionError> {
        self.apply(Event::SelectWinner(option_id))
    }

    pub fn set_conviction(&mut self, score: i64) -> Result<Conviction, SessionError> {
        self.apply(Event::SetConviction(score))?;
        // apply only succeeds into AwaitingConviction here
        Ok(self.conviction().unwrap_or_default())
    }

    /// The vote that `submit` would send right now.
    pub fn pending_submission(&self) -> Result<VoteSubmission, SessionError> {
        let (winner_id, conviction) = match &self.state {
            SessionState::AwaitingConviction { winner_id, conviction } => (winner_id, *conviction),
            other => {
                return Err(SessionError::InvalidTransition {
                    state: other.name(),
                    event: "submit a vote",
                });
            }
        };

        let pair = self.pending.get(self.position).ok_or(SessionError::InvalidTransition {
            state: self.state.name(),
            event: "submit a vote",
        })?;
        let loser = pair
            .opponent_of(winner_id)
            .ok_or_else(|| SessionError::NotInPair(winner_id.clone()))?;

        Ok(VoteSubmission {
            winner_id: winner_id.clone(),
            loser_id: loser.id.clone(),
            conviction,
            pair_hash: pair.pair_hash.clone(),
            poll_id: self.poll_id.clone(),
        })
    }

    /// Send the current decision to `backend` and move on to the next pair.
    ///
    /// On failure nothing changes. Reaching the end signals completion.
    pub async fn submit<B>(&mut self, backend: &B) -> Result<&SessionState, SessionError>
    where
        B: VoteSink + CompletionSink + ?Sized,
    {
        let vote = self.pending_submission()?;

        if let Err(e) = backend.submit_vote(&vote).await {
            error!("Vote submission error for pair {}: {}", vote.pair_hash, e);
            return Err(SessionError::SubmissionFailed(e));
        }

        self.apply(Event::VoteAccepted)?;
        self.position += 1;

        self.finish(backend).await;
        Ok(&self.state)
    }

    /// Signal completion if the session is complete and has not done so yet.
    /// Returns whether the sink was called.
    pub async fn finish<B>(&mut self, backend: &B) -> bool
    where
        B: CompletionSink + ?Sized,
    {
        if !self.is_complete() || self.completion_signaled {
            return false;
        }
        self.completion_signaled = true;

        let Some(poll_id) = self.poll_id.as_deref() else {
            return false;
        };

        info!("All pairs voted for poll {}", poll_id);
        if let Err(e) = backend.mark_completed(poll_id).await {
            warn!("Failed to mark poll {} completed: {}", poll_id, e);
        }
        true
    }

    fn apply(&mut self, event: Event<'_>) -> Result<&SessionState, SessionError> {
        let cursor = Cursor {
            current: self.current_pair(),
            remaining_after: self.remaining().saturating_sub(1),
        };

        match state::transition(&self.state, cursor, event) {
            Ok(next) => {
                self.state = next;
                Ok(&self.state)
            }
            Err(e) => {
                warn!("Rejected {:?} while {}: {}", event, self.state.name(), e);
                Err(e)
            }
        }
    }
}
