pub mod adapter;
pub mod benchmark;
pub mod cache;
pub mod client;
pub mod error;
pub mod http;
pub mod keys;
pub mod leaderboard;
pub mod model;
pub mod opt;
pub mod range;
pub mod stats;
pub mod warmer;

#[cfg(test)]
mod testing;
