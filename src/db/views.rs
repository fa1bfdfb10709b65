//! Aggregate read models. The store computes them; this module only decodes
//! the rows and applies the null defaults once.
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use super::{scope, Database};
use crate::error::PollResult;
use crate::models::{LeaderboardEntry, PairConsensus};

pub(super) async fn init_views(pool: &SqlitePool) -> PollResult<()> {
    // Per-scope standings: global options under '' plus each poll's own options
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS leaderboard AS
        WITH tallies AS (
            SELECT poll_id, winner_id AS option_id,
                   conviction_score AS win_points, 0 AS loss_points,
                   1 AS win_count, 0 AS loss_count
            FROM votes
            UNION ALL
            SELECT poll_id, loser_id, 0, conviction_score, 0, 1
            FROM votes
        ),
        scoped_options AS (
            SELECT po.poll_id, o.id, o.name, o.description, o.image_url
            FROM poll_options po
            JOIN options o ON o.id = po.option_id
            UNION ALL
            SELECT '' AS poll_id, o.id, o.name, o.description, o.image_url
            FROM options o
        ),
        scored AS (
            SELECT s.poll_id, s.id, s.name, s.description, s.image_url,
                   SUM(t.win_points) AS win_points,
                   SUM(t.loss_points) AS loss_points,
                   SUM(t.win_points) - SUM(t.loss_points) AS net_score,
                   SUM(t.win_count) AS win_count,
                   SUM(t.loss_count) AS loss_count
            FROM scoped_options s
            LEFT JOIN tallies t ON t.poll_id = s.poll_id AND t.option_id = s.id
            GROUP BY s.poll_id, s.id
        )
        SELECT poll_id, id, name, description, image_url,
               win_points, loss_points, net_score, win_count, loss_count,
               RANK() OVER (PARTITION BY poll_id ORDER BY COALESCE(net_score, 0) DESC) AS rank
        FROM scored;
        "#,
    )
    .execute(pool)
    .await?;

    // One row per voted pair: the side most voters picked, ties broken by
    // total conviction
    sqlx::query(
        r#"
        CREATE VIEW IF NOT EXISTS pair_consensus AS
        WITH per_pair AS (
            SELECT poll_id, pair_hash,
                   MIN(MIN(winner_id, loser_id)) AS option_a,
                   MAX(MAX(winner_id, loser_id)) AS option_b,
                   COUNT(*) AS vote_count,
                   AVG(conviction_score) AS avg_conviction,
                   SUM(conviction_score) AS total_conviction
            FROM votes
            GROUP BY poll_id, pair_hash
        ),
        per_winner AS (
            SELECT poll_id, pair_hash, winner_id,
                   COUNT(*) AS wins,
                   ROW_NUMBER() OVER (
                       PARTITION BY poll_id, pair_hash
                       ORDER BY COUNT(*) DESC, SUM(conviction_score) DESC, winner_id
                   ) AS place
            FROM votes
            GROUP BY poll_id, pair_hash, winner_id
        )
        SELECT p.poll_id, p.pair_hash, p.option_a, p.option_b,
               w.winner_id, o.name AS winner_name,
               p.vote_count, p.avg_conviction, p.total_conviction,
               ROUND(100.0 * w.wins / p.vote_count, 1) AS win_percentage
        FROM per_pair p
        JOIN per_winner w
          ON w.poll_id = p.poll_id AND w.pair_hash = p.pair_hash AND w.place = 1
        LEFT JOIN options o ON o.id = w.winner_id;
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[derive(Debug, FromRow)]
struct LeaderboardRow {
    id: Option<String>,
    name: Option<String>,
    description: Option<String>,
    image_url: Option<String>,
    poll_id: Option<String>,
    win_points: Option<i64>,
    loss_points: Option<i64>,
    net_score: Option<i64>,
    win_count: Option<i64>,
    loss_count: Option<i64>,
    rank: Option<i64>,
}

impl LeaderboardRow {
    /// `None` for rows without an option identity.
    fn into_entry(self) -> Option<LeaderboardEntry> {
        Some(LeaderboardEntry {
            id: self.id?,
            name: self.name?,
            description: self.description,
            image_url: self.image_url,
            poll_id: self.poll_id.unwrap_or_default(),
            win_points: self.win_points.unwrap_or(0),
            loss_points: self.loss_points.unwrap_or(0),
            net_score: self.net_score.unwrap_or(0),
            win_count: self.win_count.unwrap_or(0),
            loss_count: self.loss_count.unwrap_or(0),
            rank: self.rank.unwrap_or(0),
        })
    }
}

#[derive(Debug, FromRow)]
struct ConsensusRow {
    poll_id: Option<String>,
    pair_hash: Option<String>,
    option_a: Option<String>,
    option_b: Option<String>,
    winner_id: Option<String>,
    winner_name: Option<String>,
    vote_count: Option<i64>,
    avg_conviction: Option<f64>,
    total_conviction: Option<i64>,
    win_percentage: Option<f64>,
}

impl ConsensusRow {
    /// `None` for rows without a pair hash.
    fn into_consensus(self) -> Option<PairConsensus> {
        Some(PairConsensus {
            pair_hash: self.pair_hash?,
            poll_id: self.poll_id.unwrap_or_default(),
            option_a: self.option_a.unwrap_or_default(),
            option_b: self.option_b.unwrap_or_default(),
            winner_id: self.winner_id.unwrap_or_default(),
            winner_name: self.winner_name.unwrap_or_default(),
            vote_count: self.vote_count.unwrap_or(0),
            avg_conviction: self.avg_conviction.unwrap_or(0.0),
            total_conviction: self.total_conviction.unwrap_or(0),
            win_percentage: self.win_percentage.unwrap_or(0.0),
        })
    }
}

impl Database {
    /// Standings for a poll, or for the global option set when `None`.
    pub async fn get_leaderboard(&self, poll_id: Option<&str>) -> PollResult<Vec<LeaderboardEntry>> {
        let rows: Vec<LeaderboardRow> = sqlx::query_as(
            r#"
            SELECT id, name, description, image_url, poll_id,
                   win_points, loss_points, net_score, win_count, loss_count, rank
            FROM leaderboard
            WHERE poll_id = ?
            ORDER BY rank, name
            "#,
        )
        .bind(scope(poll_id))
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().filter_map(LeaderboardRow::into_entry).collect())
    }

    /// Pairwise consensus, strongest majorities first.
    pub async fn get_pair_consensus(&self, poll_id: Option<&str>) -> PollResult<Vec<PairConsensus>> {
        let rows: Vec<ConsensusRow> = sqlx::query_as(
            r#"
            SELECT poll_id, pair_hash, option_a, option_b, winner_id, winner_name,
                   vote_count, avg_conviction, total_conviction, win_percentage
            FROM pair_consensus
            WHERE poll_id = ?
            ORDER BY win_percentage DESC, pair_hash
            "#,
        )
        .bind(scope(poll_id))
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().filter_map(ConsensusRow::into_consensus).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaderboard_nulls_default_to_zero() {
        let row = LeaderboardRow {
            id: Some("a".to_string()),
            name: Some("Alpha".to_string()),
            description: None,
            image_url: None,
            poll_id: None,
            win_points: None,
            loss_points: Some(4),
            net_score: None,
            win_count: None,
            loss_count: Some(1),
            rank: None,
        };

        let entry = row.into_entry().unwrap();
        assert_eq!(entry.poll_id, "");
        assert_eq!((entry.win_points, entry.loss_points, entry.net_score), (0, 4, 0));
        assert_eq!((entry.win_count, entry.loss_count, entry.rank), (0, 1, 0));
    }

    #[test]
    fn leaderboard_rows_without_identity_are_dropped() {
        let row = LeaderboardRow {
            id: None,
            name: Some("ghost".to_string()),
            description: None,
            image_url: None,
            poll_id: Some("p".to_string()),
            win_points: Some(1),
            loss_points: Some(0),
            net_score: Some(1),
            win_count: Some(1),
            loss_count: Some(0),
            rank: Some(1),
        };
        assert!(row.into_entry().is_none());
    }

    #[test]
    fn consensus_defaults_and_drops() {
        let row = ConsensusRow {
            poll_id: Some("p".to_string()),
            pair_hash: Some("a:b".to_string()),
            option_a: Some("a".to_string()),
            option_b: Some("b".to_string()),
            winner_id: None,
            winner_name: None,
            vote_count: Some(3),
            avg_conviction: None,
            total_conviction: None,
            win_percentage: None,
        };
        let consensus = row.into_consensus().unwrap();
        assert_eq!(consensus.winner_id, "");
        assert_eq!(consensus.winner_name, "");
        assert_eq!(consensus.vote_count, 3);
        assert_eq!(consensus.avg_conviction, 0.0);

        let headless = ConsensusRow {
            poll_id: None,
            pair_hash: None,
            option_a: None,
            option_b: None,
            winner_id: None,
            winner_name: None,
            vote_count: None,
            avg_conviction: None,
            total_conviction: None,
            win_percentage: None,
        };
        assert!(headless.into_consensus().is_none());
    }
}
