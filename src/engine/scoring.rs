// src/engine/scoring.rs

//! Per-question grading and attempt-level score aggregation.
//!
//! Everything here is pure. Scores are always recomputed from the full answer
//! set; nothing keeps a running total.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::models::{
    answer::AnswerOutcome,
    test::{Question, QuestionType},
};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    /// When false, an incorrect answer never contributes less than 0.
    pub allow_negative_contributions: bool,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        ScoringPolicy {
            allow_negative_contributions: false,
        }
    }
}

/// Normalize text for comparison: trim, collapse whitespace, case-fold.
pub fn normalize_answer(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parses a multi-select answer into a normalized set of choices.
///
/// Accepts a JSON array of strings (`["A","C"]`) or a comma-separated list (`A, C`).
pub fn parse_selection(raw: &str) -> BTreeSet<String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        if let Ok(items) = serde_json::from_str::<Vec<String>>(trimmed) {
            return items
                .iter()
                .map(|s| normalize_answer(s))
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    trimmed
        .split(',')
        .map(normalize_answer)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Grades an answer at submission time.
///
/// Open-response answers are always `Pending`. Multi-select requires the exact
/// correct set; there is no partial credit.
pub fn grade(question: &Question, user_answer: &str) -> AnswerOutcome {
    match question.question_type {
        QuestionType::OpenResponse => AnswerOutcome::Pending,
        QuestionType::SingleChoice | QuestionType::TrueFalse => {
            let given = normalize_answer(user_answer);
            let correct = question
                .correct_answers
                .first()
                .map(|a| normalize_answer(a));
            AnswerOutcome::from_verdict(correct.is_some_and(|c| !given.is_empty() && c == given))
        }
        QuestionType::MultiSelect => {
            let given = parse_selection(user_answer);
            let correct: BTreeSet<String> = question
                .correct_answers
                .iter()
                .map(|a| normalize_answer(a))
                .filter(|a| !a.is_empty())
                .collect();
            AnswerOutcome::from_verdict(!correct.is_empty() && given == correct)
        }
    }
}

/// Points one answer adds to the raw score.
pub fn contribution(question: &Question, outcome: AnswerOutcome, policy: &ScoringPolicy) -> f64 {
    match outcome {
        AnswerOutcome::Pending => 0.0,
        AnswerOutcome::Correct => question.points,
        AnswerOutcome::Incorrect => {
            let penalty = -question.negative_marking.abs();
            if policy.allow_negative_contributions {
                penalty
            } else {
                penalty.max(0.0)
            }
        }
    }
}

/// Sums contributions keyed by question id.
///
/// Summation runs in question-id order, so the result does not depend on the
/// order answers were inserted or regraded.
pub fn raw_score<'a, I>(graded: I, policy: &ScoringPolicy) -> f64
where
    I: IntoIterator<Item = (&'a Question, AnswerOutcome)>,
{
    let by_question: BTreeMap<i64, f64> = graded
        .into_iter()
        .map(|(q, outcome)| (q.id, contribution(q, outcome, policy)))
        .collect();

    round2(by_question.values().sum())
}

/// Score as a percentage of the total possible, clamped to [0, 100].
pub fn percentage(score: f64, total_possible: f64) -> f64 {
    if total_possible <= 0.0 {
        return 0.0;
    }
    round2((score / total_possible * 100.0).clamp(0.0, 100.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(id: i64, question_type: QuestionType, correct: &[&str], points: f64) -> Question {
        Question {
            id,
            test_id: 1,
            question_type,
            content: format!("Question {}", id),
            options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
            correct_answers: correct.iter().map(|s| s.to_string()).collect(),
            points,
            negative_marking: 0.0,
            order_index: id,
        }
    }

    #[test]
    fn test_normalize_answer() {
        assert_eq!(normalize_answer("  Paris   France "), "paris france");
        assert_eq!(normalize_answer("TRUE"), "true");
        assert_eq!(normalize_answer(""), "");
    }

    #[test]
    fn test_single_choice_exact_match_after_normalization() {
        let q = question(1, QuestionType::SingleChoice, &["B"], 10.0);
        assert_eq!(grade(&q, " b "), AnswerOutcome::Correct);
        assert_eq!(grade(&q, "C"), AnswerOutcome::Incorrect);
        assert_eq!(grade(&q, "   "), AnswerOutcome::Incorrect);
    }

    #[test]
    fn test_true_false() {
        let q = question(1, QuestionType::TrueFalse, &["true"], 5.0);
        assert_eq!(grade(&q, "True"), AnswerOutcome::Correct);
        assert_eq!(grade(&q, "false"), AnswerOutcome::Incorrect);
    }

    #[test]
    fn test_multi_select_requires_exact_set() {
        let q = question(1, QuestionType::MultiSelect, &["A", "C"], 10.0);
        assert_eq!(grade(&q, r#"["c","A"]"#), AnswerOutcome::Correct);
        assert_eq!(grade(&q, "A, C"), AnswerOutcome::Correct);
        // Subset earns nothing.
        assert_eq!(grade(&q, "A"), AnswerOutcome::Incorrect);
        // Superset earns nothing.
        assert_eq!(grade(&q, "A,B,C"), AnswerOutcome::Incorrect);
    }

    #[test]
    fn test_open_response_is_pending() {
        let q = question(1, QuestionType::OpenResponse, &[], 10.0);
        assert_eq!(grade(&q, "An essay"), AnswerOutcome::Pending);
        assert_eq!(contribution(&q, AnswerOutcome::Pending, &ScoringPolicy::default()), 0.0);
    }

    #[test]
    fn test_negative_marking_is_floored_by_default() {
        let mut q = question(1, QuestionType::SingleChoice, &["A"], 10.0);
        q.negative_marking = 2.5;

        let floored = ScoringPolicy::default();
        assert_eq!(contribution(&q, AnswerOutcome::Incorrect, &floored), 0.0);

        let negative = ScoringPolicy {
            allow_negative_contributions: true,
        };
        assert_eq!(contribution(&q, AnswerOutcome::Incorrect, &negative), -2.5);
    }

    #[test]
    fn test_raw_score_eight_of_ten() {
        let questions: Vec<Question> = (1..=10)
            .map(|i| question(i, QuestionType::SingleChoice, &["A"], 10.0))
            .collect();
        let graded = questions.iter().map(|q| {
            let outcome = if q.id <= 8 {
                AnswerOutcome::Correct
            } else {
                AnswerOutcome::Incorrect
            };
            (q, outcome)
        });

        let raw = raw_score(graded, &ScoringPolicy::default());
        assert_eq!(raw, 80.0);
        assert_eq!(percentage(raw, 100.0), 80.0);
    }

    #[test]
    fn test_raw_score_is_order_independent() {
        let questions: Vec<Question> = [0.1, 0.2, 0.3, 7.77, 1.01]
            .iter()
            .enumerate()
            .map(|(i, p)| question(i as i64 + 1, QuestionType::SingleChoice, &["A"], *p))
            .collect();

        let forward = raw_score(
            questions.iter().map(|q| (q, AnswerOutcome::Correct)),
            &ScoringPolicy::default(),
        );
        let backward = raw_score(
            questions.iter().rev().map(|q| (q, AnswerOutcome::Correct)),
            &ScoringPolicy::default(),
        );

        assert_eq!(forward, backward);
        assert_eq!(forward, 9.38);
    }

    #[test]
    fn test_percentage_is_clamped() {
        assert_eq!(percentage(120.0, 100.0), 100.0);
        assert_eq!(percentage(-5.0, 100.0), 0.0);
        assert_eq!(percentage(10.0, 0.0), 0.0);
    }
}
