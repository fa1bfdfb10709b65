use conviction_poll::config::Config;
use conviction_poll::db::{Database, Voter};
use conviction_poll::models::{Poll, PollOption, Vote};
use conviction_poll::session::{BoxError, TournamentSession};
use conviction_poll::voting::personal_leaderboard;
use log::{error, info};
use serde_json::json;
use std::env;
use std::io::{self, Write};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

const USAGE: &str = "\
usage: conviction-poll <command>

  create <title> <option,option,...>   create a poll
  create-random <title> <count>        create a poll from existing options
  polls                                list polls you can still vote in
  vote [poll_id]                       compare options two at a time
  voters <poll_id>                     list voters who share their votes
  anonymous <poll_id> on|off           hide or share your votes in a poll
  results <poll_id> [--voter <id>] [--json]
                                       leaderboard, consensus and a personal ranking";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    env_logger::init();

    let config = Config::from_env();

    let database = match Database::connect(&config).await {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to initialize database: {}", e);
            return;
        }
    };
    let voter = Voter::new(Arc::clone(&database), config.user_id.clone());

    let args: Vec<String> = env::args().skip(1).collect();
    let result = match args.first().map(String::as_str) {
        Some("create") => create_poll(&voter, &args[1..]).await,
        Some("create-random") => create_random_poll(&voter, &args[1..]).await,
        Some("polls") => list_polls(&voter).await,
        Some("voters") => match args.get(1) {
            Some(poll_id) => list_voters(&voter, poll_id).await,
            None => {
                eprintln!("{USAGE}");
                return;
            }
        },
        Some("anonymous") => set_anonymity(&voter, &args[1..]).await,
        Some("vote") => run_vote(&voter, args.get(1).map(String::as_str), config.shuffle_seed).await,
        Some("results") => match args.get(1) {
            Some(poll_id) => {
                let voter_id = args
                    .iter()
                    .position(|a| a == "--voter")
                    .and_then(|i| args.get(i + 1))
                    .map(String::as_str);
                show_results(&voter, poll_id, voter_id, args.iter().any(|a| a == "--json")).await
            }
            None => {
                eprintln!("{USAGE}");
                return;
            }
        },
        _ => {
            eprintln!("{USAGE}");
            return;
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn create_poll(voter: &Voter, args: &[String]) -> Result<(), BoxError> {
    let (Some(title), Some(names)) = (args.first(), args.get(1)) else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    let options: Vec<PollOption> = names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| PollOption::new(name, None, None))
        .collect();

    let poll = Poll::new(title.clone(), None, Some(voter.user_id().to_string()), options);
    voter.database().create_poll(&poll).await?;

    println!("Created poll {} ({} options)", poll.id, poll.options.len());
    Ok(())
}

async fn create_random_poll(voter: &Voter, args: &[String]) -> Result<(), BoxError> {
    let (Some(title), Some(count)) = (args.first(), args.get(1)) else {
        eprintln!("{USAGE}");
        return Ok(());
    };
    let count: usize = count.parse()?;

    let poll = voter
        .database()
        .create_poll_with_random_options(title, count, Some(voter.user_id()))
        .await?;

    println!("Created poll {} with:", poll.id);
    for option in &poll.options {
        println!("  {}", option.name);
    }
    Ok(())
}

async fn list_voters(voter: &Voter, poll_id: &str) -> Result<(), BoxError> {
    let voters = voter.database().get_poll_public_voters(poll_id).await?;
    if voters.is_empty() {
        println!("No public voters yet.");
    }
    for participation in &voters {
        let status = if participation.completed_at.is_some() { "done" } else { "in progress" };
        println!("{} ({})", participation.user_id, status);
    }
    Ok(())
}

async fn set_anonymity(voter: &Voter, args: &[String]) -> Result<(), BoxError> {
    let is_anonymous = match args.get(1).map(String::as_str) {
        Some("on") => true,
        Some("off") => false,
        _ => {
            eprintln!("{USAGE}");
            return Ok(());
        }
    };
    let Some(poll_id) = args.first() else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    let db = voter.database();
    db.get_poll(poll_id).await?;
    db.update_poll_anonymity(voter.user_id(), poll_id, is_anonymous).await?;

    if is_anonymous {
        println!("Your votes in {poll_id} are now hidden.");
    } else {
        println!("Your votes in {poll_id} are now public.");
    }
    Ok(())
}

async fn list_polls(voter: &Voter) -> Result<(), BoxError> {
    let db = voter.database();

    let available = db.get_available_polls(voter.user_id()).await?;
    if available.is_empty() {
        println!("No open polls left for you.");
    }
    for poll in &available {
        println!(
            "{}  {} ({} options, {} participants)",
            poll.id,
            poll.title,
            poll.options.len(),
            poll.participant_count
        );
    }

    let history = db.get_user_participations(voter.user_id()).await?;
    if !history.is_empty() {
        println!("\nYour polls:");
    }
    for participation in &history {
        let status = if participation.completed_at.is_some() { "done" } else { "in progress" };
        println!(
            "{}  {}: {} of {} comparisons ({:.0}%, {})",
            participation.poll.id,
            participation.poll.title,
            participation.vote_count,
            participation.total_pairs,
            participation.percent_complete(),
            status
        );
    }

    Ok(())
}

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, text: &str) -> io::Result<Option<String>> {
    print!("{text}");
    io::stdout().flush()?;
    Ok(lines.next_line().await?.map(|line| line.trim().to_string()))
}

fn describe(option: &PollOption) -> String {
    match &option.description {
        Some(description) => format!("{} - {}", option.name, description),
        None => option.name.clone(),
    }
}

async fn run_vote(voter: &Voter, poll_id: Option<&str>, seed: Option<u64>) -> Result<(), BoxError> {
    let mut session = TournamentSession::open(voter, poll_id, seed).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(pair) = session.current_pair().cloned() {
        let progress = session.progress();
        println!(
            "\nComparison {} of {} ({:.0}% complete)",
            progress.completed + 1,
            progress.total,
            progress.percent()
        );
        println!("Which do you prefer?");
        println!("  1) {}", describe(&pair.option_a));
        println!("  2) {}", describe(&pair.option_b));

        let Some(choice) = prompt(&mut lines, "Pick 1 or 2 (q to stop): ").await? else {
            return Ok(());
        };
        let winner = match choice.as_str() {
            "1" => &pair.option_a.id,
            "2" => &pair.option_b.id,
            "q" => return Ok(()),
            _ => continue,
        };
        session.select_winner(winner)?;

        loop {
            let Some(raw) = prompt(&mut lines, "Conviction 0-10 [5]: ").await? else {
                return Ok(());
            };
            if raw.is_empty() {
                break;
            }
            match raw.parse::<i64>() {
                Ok(score) => match session.set_conviction(score) {
                    Ok(_) => break,
                    Err(e) => println!("{e}"),
                },
                Err(_) => println!("Enter a whole number from 0 to 10."),
            }
        }

        while let Err(e) = session.submit(voter).await {
            println!("Could not save your vote: {e}");
            let Some(answer) = prompt(&mut lines, "Retry? [Y/n]: ").await? else {
                return Ok(());
            };
            if answer.eq_ignore_ascii_case("n") {
                return Ok(());
            }
        }
    }

    let total = session.progress().total;
    info!("Voting pass finished for {}", poll_id.unwrap_or("global options"));
    println!("\nAll comparisons complete! You've voted on all {total} pairs.");
    if let Some(poll_id) = poll_id {
        println!("See the standings with: conviction-poll results {poll_id}");
    }
    Ok(())
}

async fn show_results(voter: &Voter, poll_id: &str, voter_id: Option<&str>, as_json: bool) -> Result<(), BoxError> {
    let db = voter.database();

    let poll = db.get_poll(poll_id).await?;
    let leaderboard = db.get_leaderboard(Some(poll_id)).await?;
    let consensus = db.get_pair_consensus(Some(poll_id)).await?;

    // Someone else's votes are only shown if they vote publicly
    let detailed = match voter_id {
        Some(other) if other != voter.user_id() => db.get_public_user_votes(poll_id, other).await?,
        _ => db.get_user_votes_detailed(voter.user_id(), Some(poll_id)).await?,
    };
    let votes: Vec<Vote> = detailed.iter().map(|d| d.vote.clone()).collect();
    let personal = personal_leaderboard(poll_id, &poll.options, &votes);
    let whose = voter_id.unwrap_or(voter.user_id());

    if as_json {
        let report = json!({
            "poll": poll,
            "leaderboard": leaderboard,
            "consensus": consensus,
            "voter": whose,
            "personal": personal,
            "votes": detailed,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}\n", poll.title);
    println!("Leaderboard:");
    for entry in &leaderboard {
        println!(
            "  {:>2}. {:<24} net {:>4}  ({} wins, {} losses)",
            entry.rank, entry.name, entry.net_score, entry.win_count, entry.loss_count
        );
    }

    println!("\nConsensus:");
    for pair in &consensus {
        println!(
            "  {:<24} won {:.1}% of {} votes, avg conviction {:.1}",
            pair.winner_name, pair.win_percentage, pair.vote_count, pair.avg_conviction
        );
    }

    if !personal.is_empty() {
        println!("\nRanking for {whose}:");
        for entry in &personal {
            println!("  {:>2}. {:<24} net {:>4}", entry.rank, entry.name, entry.net_score);
        }
        println!("\nVotes:");
        for detail in &detailed {
            println!(
                "  {} over {} (conviction {})",
                detail.winner_name, detail.loser_name, detail.vote.conviction
            );
        }
    }

    Ok(())
}
