mod views;
mod voter;

pub use voter::Voter;

use chrono::{DateTime, Utc};
use log::info;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{migrate::MigrateDatabase, Row, Sqlite};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PollError, PollResult};
use crate::models::{Conviction, Participation, Poll, PollOption, UserPollParticipation, Vote, VoteDetail};
use crate::session::VoteSubmission;
use crate::voting::{calculate_pair_count, shuffle_array, PAIR_SEPARATOR};

/// `votes.poll_id` value for votes cast on the global option set.
const GLOBAL_SCOPE: &str = "";

fn scope(poll_id: Option<&str>) -> &str {
    poll_id.unwrap_or(GLOBAL_SCOPE)
}

fn unscope(poll_id: String) -> Option<String> {
    if poll_id == GLOBAL_SCOPE { None } else { Some(poll_id) }
}

fn parse_timestamp(raw: &str) -> PollResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn connect(config: &Config) -> PollResult<Self> {
        // Create database if it doesn't exist
        if !Sqlite::database_exists(&config.database_url).await.unwrap_or(false) {
            Sqlite::create_database(&config.database_url).await?;
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        Self::init_schema(&pool).await?;
        info!("Connected to {}", config.database_url);

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn init_schema(pool: &SqlitePool) -> PollResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS options (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT,
                image_url TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                description TEXT,
                created_by TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_options (
                poll_id TEXT NOT NULL,
                option_id TEXT NOT NULL,
                PRIMARY KEY (poll_id, option_id),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE,
                FOREIGN KEY (option_id) REFERENCES options(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_participants (
                poll_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                is_anonymous BOOLEAN NOT NULL DEFAULT FALSE,
                completed_at TEXT,
                PRIMARY KEY (poll_id, user_id),
                FOREIGN KEY (poll_id) REFERENCES polls(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        // poll_id is '' for global votes so the primary key also covers them
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS votes (
                id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL,
                poll_id TEXT NOT NULL DEFAULT '',
                winner_id TEXT NOT NULL,
                loser_id TEXT NOT NULL,
                conviction_score INTEGER NOT NULL CHECK (conviction_score BETWEEN 0 AND 10),
                pair_hash TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, poll_id, pair_hash),
                FOREIGN KEY (winner_id) REFERENCES options(id) ON DELETE CASCADE,
                FOREIGN KEY (loser_id) REFERENCES options(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(pool)
        .await?;

        views::init_views(pool).await?;

        Ok(())
    }

    // --- Options ---

    /// Insert an option, leaving an existing row with the same id untouched.
    pub async fn create_option(&self, option: &PollOption) -> PollResult<()> {
        if option.id.contains(PAIR_SEPARATOR) {
            return Err(PollError::InvalidOptionId(option.id.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO options (id, name, description, image_url, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&option.id)
        .bind(&option.name)
        .bind(&option.description)
        .bind(&option.image_url)
        .bind(option.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Every option, by name.
    pub async fn get_options(&self) -> PollResult<Vec<PollOption>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, description, image_url, created_at
            FROM options
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(option_from_row).collect()
    }

    pub async fn get_poll_options(&self, poll_id: &str) -> PollResult<Vec<PollOption>> {
        let rows = sqlx::query(
            r#"
            SELECT o.id, o.name, o.description, o.image_url, o.created_at
            FROM options o
            JOIN poll_options po ON po.option_id = o.id
            WHERE po.poll_id = ?
            ORDER BY o.name
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(option_from_row).collect()
    }

    // --- Polls ---

    /// Store a poll and link its options, creating any that are missing.
    pub async fn create_poll(&self, poll: &Poll) -> PollResult<()> {
        if poll.options.len() < 2 {
            return Err(PollError::TooFewOptions(poll.options.len()));
        }
        if let Some(bad) = poll.options.iter().find(|o| o.id.contains(PAIR_SEPARATOR)) {
            return Err(PollError::InvalidOptionId(bad.id.clone()));
        }

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO polls (id, title, description, created_by, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&poll.id)
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(&poll.created_by)
        .bind(poll.is_active)
        .bind(poll.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for option in &poll.options {
            sqlx::query(
                r#"
                INSERT INTO options (id, name, description, image_url, created_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO NOTHING
                "#,
            )
            .bind(&option.id)
            .bind(&option.name)
            .bind(&option.description)
            .bind(&option.image_url)
            .bind(option.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO poll_options (poll_id, option_id) VALUES (?, ?)")
                .bind(&poll.id)
                .bind(&option.id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        info!("Created poll {} with {} options", poll.id, poll.options.len());
        Ok(())
    }

    /// Create a poll over `num_choices` existing options picked at random.
    pub async fn create_poll_with_random_options(
        &self,
        title: &str,
        num_choices: usize,
        created_by: Option<&str>,
    ) -> PollResult<Poll> {
        let available = self.get_options().await?;
        if num_choices > available.len() {
            return Err(PollError::NotEnoughOptions {
                requested: num_choices,
                available: available.len(),
            });
        }
        if num_choices < 2 {
            return Err(PollError::TooFewOptions(num_choices));
        }

        let mut chosen = shuffle_array(&available);
        chosen.truncate(num_choices);

        let poll = Poll::new(title.to_string(), None, created_by.map(str::to_string), chosen);
        self.create_poll(&poll).await?;
        Ok(poll)
    }

    pub async fn get_poll(&self, poll_id: &str) -> PollResult<Poll> {
        let row = sqlx::query(
            r#"
            SELECT id, title, description, created_by, is_active, created_at
            FROM polls
            WHERE id = ?
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PollError::PollNotFound(poll_id.to_string()))?;

        let mut poll = poll_from_row(&row)?;
        poll.options = self.get_poll_options(poll_id).await?;
        poll.participant_count = self.participant_count(poll_id).await?;
        Ok(poll)
    }

    async fn participant_count(&self, poll_id: &str) -> PollResult<i64> {
        let count = sqlx::query("SELECT COUNT(*) AS n FROM poll_participants WHERE poll_id = ?")
            .bind(poll_id)
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;

        Ok(count)
    }

    /// Active polls, newest first.
    pub async fn get_active_polls(&self) -> PollResult<Vec<Poll>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, description, created_by, is_active, created_at
            FROM polls
            WHERE is_active = TRUE
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        self.polls_with_options(&rows).await
    }

    /// Active polls `user_id` has not completed yet.
    pub async fn get_available_polls(&self, user_id: &str) -> PollResult<Vec<Poll>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.title, p.description, p.created_by, p.is_active, p.created_at
            FROM polls p
            WHERE p.is_active = TRUE
              AND NOT EXISTS (
                  SELECT 1 FROM poll_participants pp
                  WHERE pp.poll_id = p.id AND pp.user_id = ? AND pp.completed_at IS NOT NULL
              )
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        self.polls_with_options(&rows).await
    }

    async fn polls_with_options(&self, rows: &[SqliteRow]) -> PollResult<Vec<Poll>> {
        let mut polls = Vec::with_capacity(rows.len());
        for row in rows {
            let mut poll = poll_from_row(row)?;
            poll.options = self.get_poll_options(&poll.id).await?;
            poll.participant_count = self.participant_count(&poll.id).await?;
            polls.push(poll);
        }
        Ok(polls)
    }

    /// Remove a poll together with its votes and participation records.
    pub async fn delete_poll(&self, poll_id: &str) -> PollResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM votes WHERE poll_id = ?")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM poll_participants WHERE poll_id = ?")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM poll_options WHERE poll_id = ?")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM polls WHERE id = ?")
            .bind(poll_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            tx.rollback().await?;
            return Err(PollError::PollNotFound(poll_id.to_string()));
        }

        tx.commit().await?;
        info!("Deleted poll {}", poll_id);
        Ok(())
    }

    /// Flip `is_active` and return the new value.
    pub async fn toggle_poll_active(&self, poll_id: &str) -> PollResult<bool> {
        let row = sqlx::query(
            r#"
            UPDATE polls
            SET is_active = NOT is_active
            WHERE id = ?
            RETURNING is_active
            "#,
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| PollError::PollNotFound(poll_id.to_string()))?;

        Ok(row.try_get::<bool, _>("is_active")?)
    }

    // --- Votes ---

    /// Record `user_id`'s decision on one pair, replacing any earlier vote on
    /// the same pair in the same scope.
    pub async fn save_vote(&self, user_id: &str, vote: &VoteSubmission) -> PollResult<()> {
        if let Some(poll_id) = vote.poll_id.as_deref() {
            let is_active: bool = sqlx::query("SELECT is_active FROM polls WHERE id = ?")
                .bind(poll_id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| PollError::PollNotFound(poll_id.to_string()))?
                .try_get("is_active")?;

            if !is_active {
                return Err(PollError::PollInactive(poll_id.to_string()));
            }
        }

        for option_id in [&vote.winner_id, &vote.loser_id] {
            let option_exists = sqlx::query("SELECT 1 FROM options WHERE id = ?")
                .bind(option_id)
                .fetch_optional(&self.pool)
                .await?
                .is_some();

            if !option_exists {
                return Err(PollError::OptionNotFound(option_id.clone()));
            }
        }

        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO votes (id, user_id, poll_id, winner_id, loser_id, conviction_score, pair_hash, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id, poll_id, pair_hash)
            DO UPDATE SET winner_id = excluded.winner_id,
                          loser_id = excluded.loser_id,
                          conviction_score = excluded.conviction_score,
                          updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(scope(vote.poll_id.as_deref()))
        .bind(&vote.winner_id)
        .bind(&vote.loser_id)
        .bind(i64::from(vote.conviction))
        .bind(&vote.pair_hash)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        // Voting in a poll makes the user a participant
        if let Some(poll_id) = vote.poll_id.as_deref() {
            sqlx::query(
                r#"
                INSERT INTO poll_participants (poll_id, user_id, is_anonymous)
                VALUES (?, ?, FALSE)
                ON CONFLICT(poll_id, user_id) DO NOTHING
                "#,
            )
            .bind(poll_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    pub async fn get_user_votes(&self, user_id: &str, poll_id: Option<&str>) -> PollResult<Vec<Vote>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, poll_id, winner_id, loser_id, conviction_score, pair_hash, created_at, updated_at
            FROM votes
            WHERE user_id = ? AND poll_id = ?
            ORDER BY created_at
            "#,
        )
        .bind(user_id)
        .bind(scope(poll_id))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(vote_from_row).collect()
    }

    /// A user's votes with option names, in the order they were cast.
    pub async fn get_user_votes_detailed(&self, user_id: &str, poll_id: Option<&str>) -> PollResult<Vec<VoteDetail>> {
        let rows = sqlx::query(
            r#"
            SELECT v.id, v.user_id, v.poll_id, v.winner_id, v.loser_id, v.conviction_score,
                   v.pair_hash, v.created_at, v.updated_at,
                   w.name AS winner_name, l.name AS loser_name
            FROM votes v
            LEFT JOIN options w ON w.id = v.winner_id
            LEFT JOIN options l ON l.id = v.loser_id
            WHERE v.user_id = ? AND v.poll_id = ?
            ORDER BY v.created_at
            "#,
        )
        .bind(user_id)
        .bind(scope(poll_id))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> PollResult<VoteDetail> {
                let winner_name: Option<String> = row.try_get("winner_name")?;
                let loser_name: Option<String> = row.try_get("loser_name")?;
                Ok(VoteDetail {
                    vote: vote_from_row(row)?,
                    winner_name: winner_name.unwrap_or_default(),
                    loser_name: loser_name.unwrap_or_default(),
                })
            })
            .collect()
    }

    pub async fn get_voted_pair_hashes(&self, user_id: &str, poll_id: Option<&str>) -> PollResult<Vec<String>> {
        let hashes = sqlx::query("SELECT pair_hash FROM votes WHERE user_id = ? AND poll_id = ?")
            .bind(user_id)
            .bind(scope(poll_id))
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.try_get::<String, _>("pair_hash"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(hashes)
    }

    // --- Participation ---

    /// Stamp `completed_at` for the user. Repeating just moves the stamp.
    pub async fn mark_poll_completed(&self, user_id: &str, poll_id: &str) -> PollResult<()> {
        sqlx::query(
            r#"
            INSERT INTO poll_participants (poll_id, user_id, completed_at)
            VALUES (?, ?, ?)
            ON CONFLICT(poll_id, user_id) DO UPDATE SET completed_at = excluded.completed_at
            "#,
        )
        .bind(poll_id)
        .bind(user_id)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn update_poll_anonymity(&self, user_id: &str, poll_id: &str, is_anonymous: bool) -> PollResult<()> {
        sqlx::query(
            r#"
            INSERT INTO poll_participants (poll_id, user_id, is_anonymous)
            VALUES (?, ?, ?)
            ON CONFLICT(poll_id, user_id) DO UPDATE SET is_anonymous = excluded.is_anonymous
            "#,
        )
        .bind(poll_id)
        .bind(user_id)
        .bind(is_anonymous)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_participation(&self, user_id: &str, poll_id: &str) -> PollResult<Option<Participation>> {
        let row = sqlx::query(
            r#"
            SELECT poll_id, user_id, is_anonymous, completed_at
            FROM poll_participants
            WHERE poll_id = ? AND user_id = ?
            "#,
        )
        .bind(poll_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(participation_from_row).transpose()
    }

    /// Participants of `poll_id` who have not chosen to stay anonymous.
    pub async fn get_poll_public_voters(&self, poll_id: &str) -> PollResult<Vec<Participation>> {
        let rows = sqlx::query(
            r#"
            SELECT poll_id, user_id, is_anonymous, completed_at
            FROM poll_participants
            WHERE poll_id = ? AND is_anonymous = FALSE
            ORDER BY user_id
            "#,
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(participation_from_row).collect()
    }

    /// Another voter's detailed votes, only if they take part in the poll
    /// publicly.
    pub async fn get_public_user_votes(&self, poll_id: &str, voter_id: &str) -> PollResult<Vec<VoteDetail>> {
        match self.get_participation(voter_id, poll_id).await? {
            Some(participation) if !participation.is_anonymous => {
                self.get_user_votes_detailed(voter_id, Some(poll_id)).await
            }
            _ => Err(PollError::VoterNotPublic(voter_id.to_string())),
        }
    }

    /// Every poll the user has a participation record for, most recently
    /// completed first, with vote counts against the poll's pair total.
    pub async fn get_user_participations(&self, user_id: &str) -> PollResult<Vec<UserPollParticipation>> {
        let rows = sqlx::query(
            r#"
            SELECT poll_id, user_id, is_anonymous, completed_at
            FROM poll_participants
            WHERE user_id = ?
            ORDER BY completed_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        let mut participations = Vec::with_capacity(rows.len());
        for row in &rows {
            let participation = participation_from_row(row)?;
            let poll = self.get_poll(&participation.poll_id).await?;

            let vote_count: i64 = sqlx::query("SELECT COUNT(*) AS n FROM votes WHERE user_id = ? AND poll_id = ?")
                .bind(user_id)
                .bind(&participation.poll_id)
                .fetch_one(&self.pool)
                .await?
                .try_get("n")?;

            participations.push(UserPollParticipation {
                total_pairs: calculate_pair_count(poll.options.len()),
                poll,
                is_anonymous: participation.is_anonymous,
                completed_at: participation.completed_at,
                vote_count: vote_count.max(0) as usize,
            });
        }

        Ok(participations)
    }
}

fn option_from_row(row: &SqliteRow) -> PollResult<PollOption> {
    Ok(PollOption {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        image_url: row.try_get("image_url")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
    })
}

/// Poll without its options or participant count.
fn poll_from_row(row: &SqliteRow) -> PollResult<Poll> {
    Ok(Poll {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        created_by: row.try_get("created_by")?,
        is_active: row.try_get("is_active")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        options: Vec::new(),
        participant_count: 0,
    })
}

fn vote_from_row(row: &SqliteRow) -> PollResult<Vote> {
    Ok(Vote {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        poll_id: unscope(row.try_get("poll_id")?),
        winner_id: row.try_get("winner_id")?,
        loser_id: row.try_get("loser_id")?,
        conviction: Conviction::try_from(row.try_get::<i64, _>("conviction_score")?)?,
        pair_hash: row.try_get("pair_hash")?,
        created_at: parse_timestamp(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_timestamp(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn participation_from_row(row: &SqliteRow) -> PollResult<Participation> {
    let completed_at: Option<String> = row.try_get("completed_at")?;
    Ok(Participation {
        poll_id: row.try_get("poll_id")?,
        user_id: row.try_get("user_id")?,
        is_anonymous: row.try_get("is_anonymous")?,
        completed_at: completed_at.as_deref().map(parse_timestamp).transpose()?,
    })
}
