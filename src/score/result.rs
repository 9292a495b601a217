use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    /// Some credit on a multi-answer question.
    Partial,
    Incorrect,
    /// Nothing marked; never counted as incorrect.
    Blank,
    Ambiguous,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Correct => "correct",
            Outcome::Partial => "partial",
            Outcome::Incorrect => "incorrect",
            Outcome::Blank => "blank",
            Outcome::Ambiguous => "ambiguous",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOutcome {
    /// 1-based question number.
    pub question: usize,
    pub outcome: Outcome,
    /// Options read as marked (also for ambiguous readings).
    pub selected: Vec<usize>,
    pub correct: Vec<usize>,
    pub points: f32,
    pub max_points: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeCounts {
    pub correct: usize,
    pub partial: usize,
    pub incorrect: usize,
    pub blank: usize,
    pub ambiguous: usize,
}

impl OutcomeCounts {
    pub(crate) fn add(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Correct => self.correct += 1,
            Outcome::Partial => self.partial += 1,
            Outcome::Incorrect => self.incorrect += 1,
            Outcome::Blank => self.blank += 1,
            Outcome::Ambiguous => self.ambiguous += 1,
        }
    }
}

/// Score of one sheet. Built once by the scorer, read-only afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreResult {
    outcomes: Vec<QuestionOutcome>,
    total: f32,
    max_total: f32,
    counts: OutcomeCounts,
}

impl ScoreResult {
    pub(crate) fn new(outcomes: Vec<QuestionOutcome>, total: f32, max_total: f32) -> Self {
        let mut counts = OutcomeCounts::default();
        for o in &outcomes {
            counts.add(o.outcome);
        }
        Self {
            outcomes,
            total,
            max_total,
            counts,
        }
    }

    pub fn outcomes(&self) -> &[QuestionOutcome] {
        &self.outcomes
    }

    pub fn total(&self) -> f32 {
        self.total
    }

    pub fn max_total(&self) -> f32 {
        self.max_total
    }

    pub fn counts(&self) -> OutcomeCounts {
        self.counts
    }

    /// Total as a share of the attainable maximum, in percent.
    pub fn percentage(&self) -> f32 {
        if self.max_total > 0.0 {
            100.0 * self.total / self.max_total
        } else {
            0.0
        }
    }
}
