//! Pairwise-comparison polling.
//!
//! Voters see poll options two at a time, pick a winner and say how strongly
//! they prefer it. [`session::TournamentSession`] walks one voter through the
//! pairs they have not voted on yet; [`db::Database`] stores the votes and
//! exposes the leaderboard and consensus views computed over them.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod session;
pub mod voting;

pub use config::Config;
pub use error::{PollError, PollResult};
pub use session::{Progress, SessionError, SessionState, TournamentSession};
