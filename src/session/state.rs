use crate::models::Conviction;
use crate::session::SessionError;
use crate::voting::Pair;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Showing the current pair, nothing picked yet.
    AwaitingSelection,
    /// Winner picked; conviction adjustable and the vote can be submitted.
    AwaitingConviction { winner_id: String, conviction: Conviction },
    /// No pairs left.
    Complete,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::AwaitingSelection => "awaiting selection",
            SessionState::AwaitingConviction { .. } => "awaiting conviction",
            SessionState::Complete => "complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event<'a> {
    SelectWinner(&'a str),
    SetConviction(i64),
    /// The vote sink stored the vote for the current pair.
    VoteAccepted,
}

impl Event<'_> {
    fn name(&self) -> &'static str {
        match self {
            Event::SelectWinner(_) => "select a winner",
            Event::SetConviction(_) => "set conviction",
            Event::VoteAccepted => "accept a vote",
        }
    }
}

/// Where the session stands in its pending list when an event arrives.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    pub current: Option<&'a Pair>,
    /// Pending pairs after the current one.
    pub remaining_after: usize,
}

/// Pure state transition. On `Err` the caller keeps its old state.
pub fn transition(state: &SessionState, cursor: Cursor<'_>, event: Event<'_>) -> Result<SessionState, SessionError> {
    let invalid = || SessionError::InvalidTransition {
        state: state.name(),
        event: event.name(),
    };

    match (state, event) {
        (SessionState::AwaitingSelection, Event::SelectWinner(option_id)) => {
            let pair = cursor.current.ok_or_else(invalid)?;
            if !pair.contains(option_id) {
                return Err(SessionError::NotInPair(option_id.to_string()));
            }
            Ok(SessionState::AwaitingConviction {
                winner_id: option_id.to_string(),
                conviction: Conviction::DEFAULT,
            })
        }
        // Switching sides keeps the conviction already dialled in
        (SessionState::AwaitingConviction { conviction, .. }, Event::SelectWinner(option_id)) => {
            let pair = cursor.current.ok_or_else(invalid)?;
            if !pair.contains(option_id) {
                return Err(SessionError::NotInPair(option_id.to_string()));
            }
            Ok(SessionState::AwaitingConviction {
                winner_id: option_id.to_string(),
                conviction: *conviction,
            })
        }
        (SessionState::AwaitingConviction { winner_id, .. }, Event::SetConviction(score)) => {
            let conviction = Conviction::new(score).ok_or(SessionError::ConvictionOutOfRange(score))?;
            Ok(SessionState::AwaitingConviction {
                winner_id: winner_id.clone(),
                conviction,
            })
        }
        (SessionState::AwaitingConviction { .. }, Event::VoteAccepted) => {
            if cursor.remaining_after > 0 {
                Ok(SessionState::AwaitingSelection)
            } else {
                Ok(SessionState::Complete)
            }
        }
        _ => Err(invalid()),
    }
}
