pub mod pairs;
pub mod personal;

pub use pairs::{
    calculate_pair_count, generate_all_pairs, get_unvoted_pairs, pair_hash, shuffle_array, shuffle_with, Pair,
    PAIR_SEPARATOR,
};
pub use personal::personal_leaderboard;
