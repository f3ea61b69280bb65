// src/engine/mod.rs

//! Pure policy code: no I/O, no clock reads. Services feed it snapshots.

pub mod eligibility;
pub mod integrity;
pub mod ranking;
pub mod scoring;

use serde::{Deserialize, Serialize};

use self::{
    eligibility::EligibilityPolicy, integrity::IntegrityPolicy, ranking::RankingPolicy,
    scoring::ScoringPolicy,
};

/// All tunable policy constants of the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub scoring: ScoringPolicy,
    pub integrity: IntegrityPolicy,
    pub eligibility: EligibilityPolicy,
    pub ranking: RankingPolicy,
}
