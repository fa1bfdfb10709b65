//! Pair generation for pairwise tournaments.
//!
//! Every unordered pair of options is identified by a canonical hash, so a
//! vote on (A, B) and a vote on (B, A) land on the same stored row.
use std::collections::HashSet;

use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;

use crate::models::PollOption;

/// Joins the two sorted option ids of a pair hash. Never part of a UUID.
pub const PAIR_SEPARATOR: char = ':';

/// Two distinct options to compare, in their original relative order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pair {
    pub option_a: PollOption,
    pub option_b: PollOption,
    pub pair_hash: String,
}

impl Pair {
    pub fn contains(&self, option_id: &str) -> bool {
        self.option_a.id == option_id || self.option_b.id == option_id
    }

    /// The other side of the pair, or `None` if `option_id` is not in it.
    pub fn opponent_of(&self, option_id: &str) -> Option<&PollOption> {
        if self.option_a.id == option_id {
            Some(&self.option_b)
        } else if self.option_b.id == option_id {
            Some(&self.option_a)
        } else {
            None
        }
    }
}

/// Order-independent identifier for the pair `(id_a, id_b)`.
pub fn pair_hash(id_a: &str, id_b: &str) -> String {
    let (first, second) = if id_a < id_b { (id_a, id_b) } else { (id_b, id_a) };
    format!("{first}{PAIR_SEPARATOR}{second}")
}

/// All `n*(n-1)/2` pairs of `options`, walking index pairs `i < j`.
pub fn generate_all_pairs(options: &[PollOption]) -> Vec<Pair> {
    let mut pairs = Vec::with_capacity(calculate_pair_count(options.len()));

    for (i, option_a) in options.iter().enumerate() {
        for option_b in &options[i + 1..] {
            pairs.push(Pair {
                option_a: option_a.clone(),
                option_b: option_b.clone(),
                pair_hash: pair_hash(&option_a.id, &option_b.id),
            });
        }
    }

    pairs
}

/// Shuffled copy of `items` using the thread-local RNG.
pub fn shuffle_array<T: Clone>(items: &[T]) -> Vec<T> {
    shuffle_with(items, &mut rand::rng())
}

/// Shuffled copy of `items` drawing from `rng`. The input is left as is.
pub fn shuffle_with<T: Clone, R: Rng + ?Sized>(items: &[T], rng: &mut R) -> Vec<T> {
    let mut shuffled = items.to_vec();
    shuffled.shuffle(rng);
    shuffled
}

/// Pairs whose hash is not in `voted_hashes`, keeping their order.
pub fn get_unvoted_pairs(all_pairs: &[Pair], voted_hashes: &HashSet<String>) -> Vec<Pair> {
    all_pairs
        .iter()
        .filter(|pair| !voted_hashes.contains(&pair.pair_hash))
        .cloned()
        .collect()
}

/// Number of unordered pairs among `option_count` options.
pub fn calculate_pair_count(option_count: usize) -> usize {
    option_count * option_count.saturating_sub(1) / 2
}
