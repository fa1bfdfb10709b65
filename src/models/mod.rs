use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PollError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PollOption {
    pub fn new(name: impl Into<String>, description: Option<String>, image_url: Option<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), name)
            .describe(description)
            .image(image_url)
    }

    /// Option with a caller-chosen id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            image_url: None,
            created_at: Utc::now(),
        }
    }

    pub fn describe(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn image(mut self, image_url: Option<String>) -> Self {
        self.image_url = image_url;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub options: Vec<PollOption>,
    /// Users with a participation record, filled in by the store.
    #[serde(default)]
    pub participant_count: i64,
}

impl Poll {
    pub fn new(
        title: String,
        description: Option<String>,
        created_by: Option<String>,
        options: Vec<PollOption>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title,
            description,
            created_by,
            is_active: true,
            created_at: Utc::now(),
            options,
            participant_count: 0,
        }
    }
}

/// Strength of preference for the winner of a comparison, 0 through 10.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Conviction(u8);

impl Conviction {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 10;
    /// Midpoint of the scale, preselected whenever a winner is picked.
    pub const DEFAULT: Conviction = Conviction(5);

    pub fn new(score: i64) -> Option<Self> {
        if (Self::MIN as i64..=Self::MAX as i64).contains(&score) {
            Some(Conviction(score as u8))
        } else {
            None
        }
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl Default for Conviction {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for Conviction {
    type Error = PollError;

    fn try_from(score: i64) -> Result<Self, Self::Error> {
        Conviction::new(score).ok_or(PollError::ConvictionOutOfRange(score))
    }
}

impl From<Conviction> for i64 {
    fn from(conviction: Conviction) -> Self {
        conviction.0 as i64
    }
}

impl std::fmt::Display for Conviction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vote {
    pub id: String,
    pub user_id: String,
    pub poll_id: Option<String>,
    pub winner_id: String,
    pub loser_id: String,
    pub conviction: Conviction,
    pub pair_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A vote with the names of both sides resolved.
#[derive(Debug, Clone, Serialize)]
pub struct VoteDetail {
    #[serde(flatten)]
    pub vote: Vote,
    pub winner_name: String,
    pub loser_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Participation {
    pub poll_id: String,
    pub user_id: String,
    pub is_anonymous: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

/// A user's standing in one poll, for "my polls" style listings.
#[derive(Debug, Clone, Serialize)]
pub struct UserPollParticipation {
    pub poll: Poll,
    pub is_anonymous: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub vote_count: usize,
    pub total_pairs: usize,
}

impl UserPollParticipation {
    /// Same convention as session progress: nothing to vote on counts as done.
    pub fn percent_complete(&self) -> f64 {
        if self.total_pairs == 0 {
            100.0
        } else {
            self.vote_count as f64 / self.total_pairs as f64 * 100.0
        }
    }
}

/// One row of the `leaderboard` view with store nulls already defaulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub poll_id: String,
    pub win_points: i64,
    pub loss_points: i64,
    pub net_score: i64,
    pub win_count: i64,
    pub loss_count: i64,
    pub rank: i64,
}

/// One row of the `pair_consensus` view with store nulls already defaulted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairConsensus {
    pub poll_id: String,
    pub pair_hash: String,
    pub option_a: String,
    pub option_b: String,
    pub winner_id: String,
    pub winner_name: String,
    pub vote_count: i64,
    pub avg_conviction: f64,
    pub total_conviction: i64,
    pub win_percentage: f64,
}
