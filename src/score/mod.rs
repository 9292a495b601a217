//! Scorer: readings + answer key → [`ScoreResult`].
//!
//! Per question, with `w` the key weight:
//!
//! | reading                     | outcome                  | points                  |
//! |-----------------------------|--------------------------|-------------------------|
//! | empty                       | blank                    | 0                       |
//! | ambiguous                   | ambiguous                | `-ambiguous_penalty·w`  |
//! | filled, several, single key | ambiguous                | `-ambiguous_penalty·w`  |
//! | filled, exact match         | correct                  | `w`                     |
//! | filled, single-answer, miss | incorrect                | `-wrong_penalty·w`      |
//! | filled, multi-answer        | per [`PartialCredit`]    | see below               |
//!
//! Multi-answer questions with `h` correct picks, `x` wrong picks and `n`
//! correct options:
//! - `Exact`: all-or-nothing.
//! - `Proportional`: `w·h/n` when `x == 0`, otherwise incorrect.
//! - `ProportionalWithPenalty`: `w·max(0, h − x)/n`.
//!
//! A non-exact award above zero is `Partial`; zero is `Incorrect`.
//!
//! Rounding: every question's points go through [`round_half_up`] to
//! `decimals` places, and the total is the rounded sum of the rounded
//! question points.

mod result;

pub use result::{Outcome, OutcomeCounts, QuestionOutcome, ScoreResult};

use crate::error::{OmrError, Result};
use crate::extract::{MarkReading, MarkState};
use crate::key::{AnswerKey, KeyEntry};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialCredit {
    #[default]
    Exact,
    Proportional,
    ProportionalWithPenalty,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Fraction of the question weight subtracted for an ambiguous reading.
    pub ambiguous_penalty: f32,
    /// Fraction of the question weight subtracted for a wrong answer.
    pub wrong_penalty: f32,
    pub partial_credit: PartialCredit,
    /// Decimal places kept by [`round_half_up`].
    pub decimals: u32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            ambiguous_penalty: 0.0,
            wrong_penalty: 0.0,
            partial_credit: PartialCredit::Exact,
            decimals: 2,
        }
    }
}

/// Round to `decimals` places with ties going towards +∞ (`2.345 → 2.35`,
/// `2.675 → 2.68`, `-0.125 → -0.12` at two places).
///
/// Works on the shortest decimal form of the `f32`, so a weight written as
/// `2.675` is treated as the tie it was typed as, not as the nearest binary
/// value `2.67499995…`.
pub fn round_half_up(value: f32, decimals: u32) -> f32 {
    let decimal: f64 = value.to_string().parse().unwrap_or(value as f64);
    let factor = 10f64.powi(decimals as i32);
    let scaled = decimal * factor;
    // Relative slack for the f64 product, absolute slack near zero.
    let slack = scaled.abs() * 1e-12 + 1e-9;
    ((scaled + 0.5 + slack).floor() / factor) as f32
}

pub struct Scorer {
    policy: ScoringPolicy,
}

impl Scorer {
    pub fn new(policy: ScoringPolicy) -> Result<Self> {
        for (name, v) in [
            ("ambiguous_penalty", policy.ambiguous_penalty),
            ("wrong_penalty", policy.wrong_penalty),
        ] {
            if !v.is_finite() || v < 0.0 {
                return Err(OmrError::Config(format!("{name} must be >= 0, got {v}")));
            }
        }
        if policy.decimals > 6 {
            return Err(OmrError::Config(format!(
                "at most 6 decimals supported, got {}",
                policy.decimals
            )));
        }
        Ok(Self { policy })
    }

    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Score one sheet. Fails with [`OmrError::KeyMismatch`] when the number
    /// of readings differs from the key length; no partial result is built.
    pub fn score(&self, readings: &[MarkReading], key: &AnswerKey) -> Result<ScoreResult> {
        if readings.len() != key.len() {
            return Err(OmrError::KeyMismatch(format!(
                "sheet has {} question slots, answer key has {} entries",
                readings.len(),
                key.len()
            )));
        }
        let decimals = self.policy.decimals;
        let mut outcomes = Vec::with_capacity(readings.len());
        let mut total = 0.0f32;
        for (reading, entry) in readings.iter().zip(key.entries()) {
            let (outcome, raw) = self.judge(reading, entry);
            let points = round_half_up(raw, decimals);
            total += points;
            outcomes.push(QuestionOutcome {
                question: entry.question,
                outcome,
                selected: reading.marked().to_vec(),
                correct: entry.correct.clone(),
                points,
                max_points: entry.points,
            });
        }
        Ok(ScoreResult::new(
            outcomes,
            round_half_up(total, decimals),
            round_half_up(key.max_score(), decimals),
        ))
    }

    fn judge(&self, reading: &MarkReading, entry: &KeyEntry) -> (Outcome, f32) {
        let w = entry.points;
        let wrong = (Outcome::Incorrect, -self.policy.wrong_penalty * w);
        let ambiguous = (Outcome::Ambiguous, -self.policy.ambiguous_penalty * w);
        let selected = match &reading.state {
            MarkState::Empty => return (Outcome::Blank, 0.0),
            MarkState::Ambiguous { .. } => return ambiguous,
            MarkState::Filled { options } => options,
        };
        if !entry.is_multi() && selected.len() > 1 {
            return ambiguous;
        }
        if *selected == entry.correct {
            return (Outcome::Correct, w);
        }
        if !entry.is_multi() {
            return wrong;
        }
        let hits = selected.iter().filter(|o| entry.correct.contains(o)).count();
        let misses = selected.len() - hits;
        let n = entry.correct.len() as f32;
        let award = match self.policy.partial_credit {
            PartialCredit::Exact => 0.0,
            PartialCredit::Proportional if misses > 0 => 0.0,
            PartialCredit::Proportional => w * hits as f32 / n,
            PartialCredit::ProportionalWithPenalty => {
                w * hits.saturating_sub(misses) as f32 / n
            }
        };
        if award > 0.0 {
            (Outcome::Partial, award)
        } else {
            wrong
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::AmbiguityReason;

    fn key(answers: &[&[usize]]) -> AnswerKey {
        AnswerKey::from_answers(answers.iter().map(|a| a.to_vec())).unwrap()
    }

    #[test]
    fn blanks_are_not_incorrect() {
        let k = key(&[&[0], &[1], &[2]]);
        let readings = vec![MarkReading::empty(); 3];
        let result = Scorer::new(ScoringPolicy::default())
            .unwrap()
            .score(&readings, &k)
            .unwrap();
        assert_eq!(result.total(), 0.0);
        assert_eq!(result.counts().blank, 3);
        assert_eq!(result.counts().incorrect, 0);
        assert!(result.outcomes().iter().all(|o| o.outcome == Outcome::Blank));
    }

    #[test]
    fn ambiguous_defaults_to_zero_and_can_be_penalized() {
        let k = key(&[&[0], &[1]]);
        let readings = vec![
            MarkReading::ambiguous(AmbiguityReason::MultiMark, vec![0, 1]),
            MarkReading::filled(vec![1]),
        ];
        let lenient = Scorer::new(ScoringPolicy::default()).unwrap();
        let r = lenient.score(&readings, &k).unwrap();
        assert_eq!(r.total(), 1.0);
        assert_eq!(r.outcomes()[0].outcome, Outcome::Ambiguous);
        assert_eq!(r.outcomes()[0].points, 0.0);
        assert_eq!(r.outcomes()[0].selected, vec![0, 1]);

        let strict = Scorer::new(ScoringPolicy {
            ambiguous_penalty: 0.25,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(strict.score(&readings, &k).unwrap().total(), 0.75);
    }

    #[test]
    fn wrong_penalty_applies_to_incorrect_only() {
        let k = key(&[&[0], &[1], &[2]]);
        let readings = vec![
            MarkReading::filled(vec![0]),
            MarkReading::filled(vec![3]),
            MarkReading::empty(),
        ];
        let scorer = Scorer::new(ScoringPolicy {
            wrong_penalty: 1.0 / 3.0,
            ..Default::default()
        })
        .unwrap();
        let r = scorer.score(&readings, &k).unwrap();
        assert_eq!(r.outcomes()[1].points, -0.33);
        assert_eq!(r.total(), 0.67);
    }

    #[test]
    fn multi_answer_partial_credit_policies() {
        let k = key(&[&[0, 2, 3]]);
        let one_hit_one_miss = vec![MarkReading::filled(vec![0, 1])];
        let two_hits = vec![MarkReading::filled(vec![0, 2])];
        let score = |pc: PartialCredit, r: &[MarkReading]| {
            Scorer::new(ScoringPolicy {
                partial_credit: pc,
                ..Default::default()
            })
            .unwrap()
            .score(r, &k)
            .unwrap()
        };
        assert_eq!(score(PartialCredit::Exact, &two_hits).total(), 0.0);
        let p = score(PartialCredit::Proportional, &two_hits);
        assert_eq!(p.total(), 0.67);
        assert_eq!(p.outcomes()[0].outcome, Outcome::Partial);
        assert_eq!(
            score(PartialCredit::Proportional, &one_hit_one_miss).outcomes()[0].outcome,
            Outcome::Incorrect
        );
        assert_eq!(
            score(PartialCredit::ProportionalWithPenalty, &two_hits).total(),
            0.67
        );
        assert_eq!(
            score(PartialCredit::ProportionalWithPenalty, &one_hit_one_miss).total(),
            0.0
        );
    }

    #[test]
    fn weights_scale_points() {
        let k = AnswerKey::new(vec![KeyEntry {
            question: 1,
            correct: vec![2],
            points: 2.5,
        }])
        .unwrap();
        let r = Scorer::new(ScoringPolicy::default())
            .unwrap()
            .score(&[MarkReading::filled(vec![2])], &k)
            .unwrap();
        assert_eq!(r.total(), 2.5);
        assert_eq!(r.max_total(), 2.5);
        assert_eq!(r.percentage(), 100.0);
    }

    #[test]
    fn length_mismatch_is_key_mismatch() {
        let k = key(&[&[0], &[1]]);
        let err = Scorer::new(ScoringPolicy::default())
            .unwrap()
            .score(&[MarkReading::filled(vec![0])], &k)
            .unwrap_err();
        assert!(matches!(err, OmrError::KeyMismatch(_)));
    }

    #[test]
    fn round_half_up_goes_towards_positive_infinity() {
        assert_eq!(round_half_up(2.345, 2), 2.35);
        assert_eq!(round_half_up(0.125, 2), 0.13);
        assert_eq!(round_half_up(-0.125, 2), -0.12);
        assert_eq!(round_half_up(0.5, 0), 1.0);
        assert_eq!(round_half_up(2.0 / 3.0, 2), 0.67);
    }

    #[test]
    fn round_half_up_treats_typed_decimal_ties_as_ties() {
        assert_eq!(round_half_up(1.005, 2), 1.01);
        assert_eq!(round_half_up(2.675, 2), 2.68);
        assert_eq!(round_half_up(0.015, 2), 0.02);
        assert_eq!(round_half_up(0.285, 2), 0.29);
        assert_eq!(round_half_up(1.0049, 2), 1.0);
        assert_eq!(round_half_up(-2.675, 2), -2.67);
    }

    #[test]
    fn fractional_weights_round_half_up_per_question_and_in_total() {
        let k = AnswerKey::new(vec![
            KeyEntry {
                question: 1,
                correct: vec![0],
                points: 2.675,
            },
            KeyEntry {
                question: 2,
                correct: vec![0, 1],
                points: 0.03,
            },
        ])
        .unwrap();
        let readings = vec![MarkReading::filled(vec![0]), MarkReading::filled(vec![0])];
        let r = Scorer::new(ScoringPolicy {
            partial_credit: PartialCredit::Proportional,
            ..Default::default()
        })
        .unwrap()
        .score(&readings, &k)
        .unwrap();
        assert_eq!(r.outcomes()[0].outcome, Outcome::Correct);
        assert_eq!(r.outcomes()[0].points, 2.68);
        assert_eq!(r.outcomes()[1].outcome, Outcome::Partial);
        assert_eq!(r.outcomes()[1].points, 0.02);
        assert_eq!(r.total(), 2.7);
        assert_eq!(r.max_total(), 2.71);
    }

    #[test]
    fn several_picks_on_single_answer_key_are_ambiguous() {
        let k = key(&[&[0], &[1]]);
        let readings = vec![MarkReading::filled(vec![0, 2]), MarkReading::filled(vec![1])];
        let r = Scorer::new(ScoringPolicy {
            ambiguous_penalty: 0.5,
            wrong_penalty: 0.25,
            ..Default::default()
        })
        .unwrap()
        .score(&readings, &k)
        .unwrap();
        assert_eq!(r.outcomes()[0].outcome, Outcome::Ambiguous);
        assert_eq!(r.outcomes()[0].points, -0.5);
        assert_eq!(r.counts().ambiguous, 1);
        assert_eq!(r.total(), 0.5);
    }

    #[test]
    fn rejects_negative_penalties() {
        let policy = ScoringPolicy {
            wrong_penalty: -1.0,
            ..Default::default()
        };
        assert!(matches!(Scorer::new(policy), Err(OmrError::Config(_))));
    }
}
