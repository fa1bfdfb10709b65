use crate::models::{LeaderboardEntry, PollOption, Vote};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default, Clone, Copy)]
struct Tally {
    win_points: i64,
    loss_points: i64,
    win_count: i64,
    loss_count: i64,
}

/// Leaderboard built from a single user's votes in one poll.
///
/// Each vote adds its conviction to the winner's win points and the loser's
/// loss points. Entries are ordered by net score and ranked from 1. Options
/// the user never saw in a vote are left out.
pub fn personal_leaderboard(poll_id: &str, options: &[PollOption], votes: &[Vote]) -> Vec<LeaderboardEntry> {
    if votes.is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for vote in votes {
        seen.insert(vote.winner_id.as_str());
        seen.insert(vote.loser_id.as_str());
    }

    let mut tallies: HashMap<&str, Tally> = HashMap::new();
    for vote in votes {
        let conviction = i64::from(vote.conviction);

        let winner = tallies.entry(vote.winner_id.as_str()).or_default();
        winner.win_points += conviction;
        winner.win_count += 1;

        let loser = tallies.entry(vote.loser_id.as_str()).or_default();
        loser.loss_points += conviction;
        loser.loss_count += 1;
    }

    let mut leaderboard: Vec<LeaderboardEntry> = options
        .iter()
        .filter(|option| seen.contains(option.id.as_str()))
        .map(|option| {
            let tally = tallies.get(option.id.as_str()).copied().unwrap_or_default();
            LeaderboardEntry {
                id: option.id.clone(),
                name: option.name.clone(),
                description: option.description.clone(),
                image_url: option.image_url.clone(),
                poll_id: poll_id.to_string(),
                win_points: tally.win_points,
                loss_points: tally.loss_points,
                net_score: tally.win_points - tally.loss_points,
                win_count: tally.win_count,
                loss_count: tally.loss_count,
                rank: 0,
            }
        })
        .collect();

    // Stable, so ties keep the order options were given in
    leaderboard.sort_by(|a, b| b.net_score.cmp(&a.net_score));
    for (i, entry) in leaderboard.iter_mut().enumerate() {
        entry.rank = i as i64 + 1;
    }

    leaderboard
}
