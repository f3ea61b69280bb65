// src/handlers/mod.rs

pub mod attempts;
pub mod grading;
pub mod integrity;
pub mod leaderboard;
pub mod penalties;
