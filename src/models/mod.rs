// src/models/mod.rs

pub mod answer;
pub mod attempt;
pub mod leaderboard;
pub mod penalty;
pub mod violation;
