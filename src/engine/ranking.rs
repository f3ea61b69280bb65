// src/engine/ranking.rs

//! Snapshot ranking shared by the learner and instructor leaderboards.
//!
//! This is a batch pass over the full population (sort + single sweep). It is
//! meant for school-sized populations, not as an incremental ranking index.

use std::{cmp::Ordering, collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::engine::scoring::round2;

/// How ranks advance after a group of tied entries.
///
/// Entries tie when both the metric and the evidence count are equal; the
/// subject id only fixes their order inside the group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingPolicy {
    /// 1, 2, 2, 3: no rank numbers are skipped.
    #[default]
    Dense,
    /// 1, 2, 2, 4: the next rank skips past the tied group.
    Competition,
}

impl fmt::Display for RankingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RankingPolicy::Dense => f.write_str("dense"),
            RankingPolicy::Competition => f.write_str("competition"),
        }
    }
}

impl FromStr for RankingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dense" => Ok(RankingPolicy::Dense),
            "competition" => Ok(RankingPolicy::Competition),
            other => Err(format!("unknown ranking policy '{}'", other)),
        }
    }
}

/// Aggregated figures for one learner or instructor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankInput {
    pub subject_id: i64,
    pub metric: f64,
    pub evidence_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ranked {
    pub rank: i64,
    pub subject_id: i64,
    pub metric: f64,
    pub evidence_count: i64,
}

/// Metric desc, evidence desc, subject id asc.
fn leaderboard_order(a: &RankInput, b: &RankInput) -> Ordering {
    b.metric
        .total_cmp(&a.metric)
        .then_with(|| b.evidence_count.cmp(&a.evidence_count))
        .then_with(|| a.subject_id.cmp(&b.subject_id))
}

fn same_standing(a: &RankInput, b: &RankInput) -> bool {
    a.metric.total_cmp(&b.metric) == Ordering::Equal && a.evidence_count == b.evidence_count
}

/// Sorts the population and assigns 1-based ranks.
pub fn rank(mut inputs: Vec<RankInput>, policy: RankingPolicy) -> Vec<Ranked> {
    inputs.sort_by(leaderboard_order);

    let mut ranked = Vec::with_capacity(inputs.len());
    let mut current_rank = 0;

    for (position, entry) in inputs.iter().enumerate() {
        let tied_with_previous = position > 0 && same_standing(&inputs[position - 1], entry);
        if !tied_with_previous {
            current_rank = match policy {
                RankingPolicy::Dense => current_rank + 1,
                RankingPolicy::Competition => position as i64 + 1,
            };
        }

        ranked.push(Ranked {
            rank: current_rank,
            subject_id: entry.subject_id,
            metric: entry.metric,
            evidence_count: entry.evidence_count,
        });
    }

    ranked
}

/// One finished attempt: `(learner_id, attempt_id, final_score)`.
pub type AttemptScore = (i64, i64, f64);

/// Total points and attempt count per learner.
///
/// Scores are summed in attempt-id order so the float total is reproducible.
pub fn aggregate_learners(rows: &[AttemptScore]) -> Vec<RankInput> {
    let mut by_learner: BTreeMap<i64, BTreeMap<i64, f64>> = BTreeMap::new();
    for &(learner_id, attempt_id, score) in rows {
        by_learner.entry(learner_id).or_default().insert(attempt_id, score);
    }

    by_learner
        .into_iter()
        .map(|(learner_id, attempts)| RankInput {
            subject_id: learner_id,
            metric: round2(attempts.values().sum()),
            evidence_count: attempts.len() as i64,
        })
        .collect()
}

/// One rating received: `(instructor_id, rating)`.
pub type RatingScore = (i64, i64);

/// Average rating and rating count per instructor.
pub fn aggregate_instructors(rows: &[RatingScore]) -> Vec<RankInput> {
    let mut by_instructor: BTreeMap<i64, (i64, i64)> = BTreeMap::new();
    for &(instructor_id, rating) in rows {
        let totals = by_instructor.entry(instructor_id).or_insert((0, 0));
        totals.0 += rating;
        totals.1 += 1;
    }

    by_instructor
        .into_iter()
        .map(|(instructor_id, (sum, count))| RankInput {
            subject_id: instructor_id,
            metric: round2(sum as f64 / count as f64),
            evidence_count: count,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(subject_id: i64, metric: f64, evidence_count: i64) -> RankInput {
        RankInput {
            subject_id,
            metric,
            evidence_count,
        }
    }

    fn ranks(ranked: &[Ranked]) -> Vec<(i64, i64)> {
        ranked.iter().map(|r| (r.subject_id, r.rank)).collect()
    }

    #[test]
    fn test_more_evidence_breaks_tie() {
        let ranked = rank(
            vec![input(1, 500.0, 9), input(2, 500.0, 12)],
            RankingPolicy::Dense,
        );
        assert_eq!(ranks(&ranked), vec![(2, 1), (1, 2)]);
    }

    #[test]
    fn test_full_ties_share_rank_dense() {
        let ranked = rank(
            vec![
                input(4, 50.0, 2),
                input(3, 80.0, 3),
                input(2, 80.0, 3),
                input(1, 90.0, 1),
            ],
            RankingPolicy::Dense,
        );
        assert_eq!(ranks(&ranked), vec![(1, 1), (2, 2), (3, 2), (4, 3)]);
    }

    #[test]
    fn test_full_ties_share_rank_competition() {
        let ranked = rank(
            vec![
                input(4, 50.0, 2),
                input(3, 80.0, 3),
                input(2, 80.0, 3),
                input(1, 90.0, 1),
            ],
            RankingPolicy::Competition,
        );
        assert_eq!(ranks(&ranked), vec![(1, 1), (2, 2), (3, 2), (4, 4)]);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let population: Vec<RankInput> = (1..=50)
            .map(|i| input(i, (i % 7) as f64 * 10.0, i % 3))
            .collect();
        let mut shuffled = population.clone();
        shuffled.reverse();

        let first = rank(population, RankingPolicy::Dense);
        let second = rank(shuffled, RankingPolicy::Dense);
        assert_eq!(first, second);

        // Dense ranks never skip.
        let mut previous = 0;
        for r in &first {
            assert!(r.rank == previous || r.rank == previous + 1);
            previous = r.rank;
        }
    }

    #[test]
    fn test_empty_population() {
        assert!(rank(Vec::new(), RankingPolicy::Dense).is_empty());
    }

    #[test]
    fn test_aggregate_learners() {
        let rows = vec![(1, 10, 40.5), (2, 11, 10.0), (1, 12, 59.5), (2, 13, 0.0)];
        let inputs = aggregate_learners(&rows);
        assert_eq!(inputs, vec![input(1, 100.0, 2), input(2, 10.0, 2)]);
    }

    #[test]
    fn test_aggregate_instructors() {
        let rows = vec![(5, 4), (5, 5), (6, 3)];
        let inputs = aggregate_instructors(&rows);
        assert_eq!(inputs, vec![input(5, 4.5, 2), input(6, 3.0, 1)]);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("Dense".parse::<RankingPolicy>(), Ok(RankingPolicy::Dense));
        assert_eq!("competition".parse::<RankingPolicy>(), Ok(RankingPolicy::Competition));
        assert!("olympic".parse::<RankingPolicy>().is_err());
    }
}
