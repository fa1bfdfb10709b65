use std::collections::HashSet;

use conviction_poll::config::Config;
use conviction_poll::db::Database;
use conviction_poll::error::PollError;
use conviction_poll::models::{Conviction, Poll, PollOption};
use conviction_poll::session::VoteSubmission;
use conviction_poll::voting::pair_hash;

async fn database() -> Database {
    Database::connect(&Config::in_memory()).await.unwrap()
}

fn abc() -> Vec<PollOption> {
    vec![
        PollOption::with_id("c", "Charlie"),
        PollOption::with_id("a", "Alpha").describe(Some("first".to_string())),
        PollOption::with_id("b", "Bravo"),
    ]
}

async fn poll(db: &Database, title: &str) -> Poll {
    let poll = Poll::new(title.to_string(), None, Some("admin".to_string()), abc());
    db.create_poll(&poll).await.unwrap();
    poll
}

fn ballot(winner: &str, loser: &str, conviction: i64, poll_id: Option<&str>) -> VoteSubmission {
    VoteSubmission {
        winner_id: winner.to_string(),
        loser_id: loser.to_string(),
        conviction: Conviction::new(conviction).unwrap(),
        pair_hash: pair_hash(winner, loser),
        poll_id: poll_id.map(str::to_string),
    }
}

#[tokio::test]
async fn test_poll_round_trip_orders_options_by_name() {
    let db = database().await;
    let created = poll(&db, "Snacks").await;

    let loaded = db.get_poll(&created.id).await.unwrap();
    assert_eq!(loaded.title, "Snacks");
    assert_eq!(loaded.created_by.as_deref(), Some("admin"));
    assert!(loaded.is_active);

    let names: Vec<&str> = loaded.options.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["Alpha", "Bravo", "Charlie"]);
    assert_eq!(loaded.options[0].description.as_deref(), Some("first"));
}

#[tokio::test]
async fn test_poll_needs_two_options() {
    let db = database().await;
    let lonely = Poll::new("Lonely".to_string(), None, None, vec![PollOption::with_id("x", "X")]);

    assert!(matches!(db.create_poll(&lonely).await, Err(PollError::TooFewOptions(1))));
    assert!(matches!(db.get_poll(&lonely.id).await, Err(PollError::PollNotFound(_))));
}

#[tokio::test]
async fn test_option_ids_may_not_contain_separator() {
    let db = database().await;
    let bad = PollOption::with_id("a:b", "Sneaky");

    assert!(matches!(db.create_option(&bad).await, Err(PollError::InvalidOptionId(_))));
}

#[tokio::test]
async fn test_vote_upsert_overwrites_same_pair() {
    let db = database().await;
    let poll = poll(&db, "Upsert").await;
    let poll_id = Some(poll.id.as_str());

    db.save_vote("u1", &ballot("a", "b", 3, poll_id)).await.unwrap();
    db.save_vote("u1", &ballot("b", "a", 9, poll_id)).await.unwrap();

    let votes = db.get_user_votes("u1", poll_id).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].winner_id, "b");
    assert_eq!(votes[0].loser_id, "a");
    assert_eq!(votes[0].conviction.value(), 9);
    assert_eq!(votes[0].pair_hash, "a:b");
    assert_eq!(votes[0].poll_id.as_deref(), poll_id);
}

#[tokio::test]
async fn test_global_and_poll_votes_are_separate_scopes() {
    let db = database().await;
    let poll = poll(&db, "Scopes").await;

    db.save_vote("u1", &ballot("a", "b", 5, None)).await.unwrap();
    db.save_vote("u1", &ballot("a", "c", 5, Some(&poll.id))).await.unwrap();

    assert_eq!(db.get_voted_pair_hashes("u1", None).await.unwrap(), vec!["a:b".to_string()]);
    assert_eq!(
        db.get_voted_pair_hashes("u1", Some(&poll.id)).await.unwrap(),
        vec!["a:c".to_string()]
    );
    assert!(db.get_voted_pair_hashes("u2", None).await.unwrap().is_empty());

    let global = db.get_user_votes("u1", None).await.unwrap();
    assert_eq!(global.len(), 1);
    assert!(global[0].poll_id.is_none());
}

#[tokio::test]
async fn test_vote_requires_known_poll_and_options() {
    let db = database().await;
    poll(&db, "Known").await;

    assert!(matches!(
        db.save_vote("u1", &ballot("a", "b", 5, Some("missing"))).await,
        Err(PollError::PollNotFound(_))
    ));
    assert!(matches!(
        db.save_vote("u1", &ballot("a", "zzz", 5, None)).await,
        Err(PollError::OptionNotFound(id)) if id == "zzz"
    ));
}

#[tokio::test]
async fn test_participation_lifecycle() {
    let db = database().await;
    let first = poll(&db, "First").await;
    let second = poll(&db, "Second").await;

    db.save_vote("u1", &ballot("a", "b", 5, Some(&first.id))).await.unwrap();
    let participation = db.get_participation("u1", &first.id).await.unwrap().unwrap();
    assert!(participation.completed_at.is_none());
    assert!(!participation.is_anonymous);

    assert_eq!(db.get_available_polls("u1").await.unwrap().len(), 2);

    db.mark_poll_completed("u1", &first.id).await.unwrap();
    db.mark_poll_completed("u1", &first.id).await.unwrap();

    let available = db.get_available_polls("u1").await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, second.id);
    assert_eq!(available[0].options.len(), 3);

    db.update_poll_anonymity("u1", &first.id, true).await.unwrap();
    let participation = db.get_participation("u1", &first.id).await.unwrap().unwrap();
    assert!(participation.is_anonymous);
    assert!(participation.completed_at.is_some());

    let history = db.get_user_participations("u1").await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].poll.id, first.id);
    assert_eq!(history[0].vote_count, 1);
    assert_eq!(history[0].total_pairs, 3);
}

#[tokio::test]
async fn test_leaderboard_view() {
    let db = database().await;
    let poll = poll(&db, "Board").await;
    let poll_id = Some(poll.id.as_str());

    db.save_vote("u1", &ballot("a", "b", 8, poll_id)).await.unwrap();
    db.save_vote("u1", &ballot("a", "c", 4, poll_id)).await.unwrap();
    db.save_vote("u2", &ballot("b", "a", 2, poll_id)).await.unwrap();

    let board = db.get_leaderboard(poll_id).await.unwrap();
    let order: Vec<&str> = board.iter().map(|e| e.id.as_str()).collect();
    assert_eq!(order, vec!["a", "c", "b"]);

    let a = &board[0];
    assert_eq!((a.win_points, a.loss_points, a.net_score), (12, 2, 10));
    assert_eq!((a.win_count, a.loss_count, a.rank), (2, 1, 1));
    assert_eq!(a.poll_id, poll.id);

    let c = &board[1];
    assert_eq!((c.win_points, c.loss_points, c.net_score, c.rank), (0, 4, -4, 2));

    let b = &board[2];
    assert_eq!((b.net_score, b.rank), (-6, 3));

    // nothing voted globally: every option present with zeroed tallies
    let global = db.get_leaderboard(None).await.unwrap();
    assert_eq!(global.len(), 3);
    assert!(global.iter().all(|e| e.net_score == 0 && e.win_count == 0 && e.rank == 1));
}

#[tokio::test]
async fn test_pair_consensus_view() {
    let db = database().await;
    let poll = poll(&db, "Consensus").await;
    let poll_id = Some(poll.id.as_str());

    db.save_vote("u1", &ballot("a", "b", 8, poll_id)).await.unwrap();
    db.save_vote("u2", &ballot("b", "a", 2, poll_id)).await.unwrap();
    db.save_vote("u1", &ballot("c", "a", 6, poll_id)).await.unwrap();

    let consensus = db.get_pair_consensus(poll_id).await.unwrap();
    assert_eq!(consensus.len(), 2);

    let unanimous = &consensus[0];
    assert_eq!(unanimous.pair_hash, "a:c");
    assert_eq!(unanimous.winner_id, "c");
    assert_eq!(unanimous.winner_name, "Charlie");
    assert_eq!(unanimous.win_percentage, 100.0);
    assert_eq!((unanimous.option_a.as_str(), unanimous.option_b.as_str()), ("a", "c"));

    // split vote goes to the side with more total conviction
    let split = &consensus[1];
    assert_eq!(split.pair_hash, "a:b");
    assert_eq!(split.winner_id, "a");
    assert_eq!(split.vote_count, 2);
    assert_eq!(split.total_conviction, 10);
    assert_eq!(split.avg_conviction, 5.0);
    assert_eq!(split.win_percentage, 50.0);
}

#[tokio::test]
async fn test_toggle_and_delete_poll() {
    let db = database().await;
    let poll = poll(&db, "Temporary").await;
    db.save_vote("u1", &ballot("a", "b", 5, Some(&poll.id))).await.unwrap();

    assert!(!db.toggle_poll_active(&poll.id).await.unwrap());
    assert!(db.get_active_polls().await.unwrap().is_empty());
    assert!(db.toggle_poll_active(&poll.id).await.unwrap());
    assert_eq!(db.get_active_polls().await.unwrap().len(), 1);

    db.delete_poll(&poll.id).await.unwrap();
    assert!(matches!(db.get_poll(&poll.id).await, Err(PollError::PollNotFound(_))));
    assert!(db.get_user_votes("u1", Some(&poll.id)).await.unwrap().is_empty());
    assert!(db.get_participation("u1", &poll.id).await.unwrap().is_none());
    assert!(matches!(db.delete_poll(&poll.id).await, Err(PollError::PollNotFound(_))));
    assert!(matches!(db.toggle_poll_active("missing").await, Err(PollError::PollNotFound(_))));

    // options outlive the poll
    assert_eq!(db.get_options().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_inactive_poll_refuses_votes() {
    let db = database().await;
    let poll = poll(&db, "Closed").await;
    assert!(!db.toggle_poll_active(&poll.id).await.unwrap());

    assert!(matches!(
        db.save_vote("u1", &ballot("a", "b", 5, Some(&poll.id))).await,
        Err(PollError::PollInactive(id)) if id == poll.id
    ));
    assert!(db.get_user_votes("u1", Some(&poll.id)).await.unwrap().is_empty());
    assert!(db.get_participation("u1", &poll.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_anonymous_voters_stay_private() {
    let db = database().await;
    let poll = poll(&db, "Public").await;
    let poll_id = Some(poll.id.as_str());

    db.save_vote("u1", &ballot("a", "b", 7, poll_id)).await.unwrap();
    db.save_vote("u2", &ballot("c", "a", 3, poll_id)).await.unwrap();
    db.update_poll_anonymity("u2", &poll.id, true).await.unwrap();

    let voters = db.get_poll_public_voters(&poll.id).await.unwrap();
    let ids: Vec<&str> = voters.iter().map(|p| p.user_id.as_str()).collect();
    assert_eq!(ids, vec!["u1"]);

    let votes = db.get_public_user_votes(&poll.id, "u1").await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].winner_name, "Alpha");
    assert_eq!(votes[0].loser_name, "Bravo");
    assert_eq!(votes[0].vote.conviction.value(), 7);

    assert!(matches!(
        db.get_public_user_votes(&poll.id, "u2").await,
        Err(PollError::VoterNotPublic(id)) if id == "u2"
    ));
    // never took part
    assert!(matches!(
        db.get_public_user_votes(&poll.id, "u3").await,
        Err(PollError::VoterNotPublic(_))
    ));

    db.update_poll_anonymity("u2", &poll.id, false).await.unwrap();
    let votes = db.get_public_user_votes(&poll.id, "u2").await.unwrap();
    assert_eq!(votes[0].winner_name, "Charlie");
}

#[tokio::test]
async fn test_random_poll_picks_existing_options() {
    let db = database().await;
    for (id, name) in [("a", "Alpha"), ("b", "Bravo"), ("c", "Charlie"), ("d", "Delta")] {
        db.create_option(&PollOption::with_id(id, name)).await.unwrap();
    }

    let created = db.create_poll_with_random_options("Lucky dip", 3, Some("admin")).await.unwrap();
    let loaded = db.get_poll(&created.id).await.unwrap();
    assert_eq!(loaded.options.len(), 3);
    assert_eq!(loaded.created_by.as_deref(), Some("admin"));

    let ids: HashSet<&str> = loaded.options.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids.len(), 3);
    assert!(ids.is_subset(&HashSet::from(["a", "b", "c", "d"])));

    // every option is fine, one more is not
    assert_eq!(db.create_poll_with_random_options("All", 4, None).await.unwrap().options.len(), 4);
    assert!(matches!(
        db.create_poll_with_random_options("Too many", 5, None).await,
        Err(PollError::NotEnoughOptions { requested: 5, available: 4 })
    ));
    assert!(matches!(
        db.create_poll_with_random_options("Too few", 1, None).await,
        Err(PollError::TooFewOptions(1))
    ));
}

#[tokio::test]
async fn test_random_poll_with_empty_catalogue() {
    let db = database().await;
    assert!(matches!(
        db.create_poll_with_random_options("Nothing", 2, None).await,
        Err(PollError::NotEnoughOptions { requested: 2, available: 0 })
    ));
}

#[tokio::test]
async fn test_participant_count() {
    let db = database().await;
    let poll = poll(&db, "Crowd").await;
    assert_eq!(db.get_poll(&poll.id).await.unwrap().participant_count, 0);

    db.save_vote("u1", &ballot("a", "b", 5, Some(&poll.id))).await.unwrap();
    db.save_vote("u1", &ballot("a", "c", 5, Some(&poll.id))).await.unwrap();
    db.save_vote("u2", &ballot("b", "c", 5, Some(&poll.id))).await.unwrap();
    // global votes make nobody a participant
    db.save_vote("u3", &ballot("b", "c", 5, None)).await.unwrap();

    assert_eq!(db.get_poll(&poll.id).await.unwrap().participant_count, 2);
    assert_eq!(db.get_active_polls().await.unwrap()[0].participant_count, 2);

    db.mark_poll_completed("u1", &poll.id).await.unwrap();
    let available = db.get_available_polls("u2").await.unwrap();
    assert_eq!(available[0].participant_count, 2);
}
