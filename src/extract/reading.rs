use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityReason {
    /// Several bubbles marked on a single-answer question.
    MultiMark,
    /// At least one bubble is neither clearly filled nor clearly empty.
    UncertainFill,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MarkState {
    /// Selected option indices, ascending.
    Filled { options: Vec<usize> },
    Empty,
    /// `marked` lists the options that read as filled.
    Ambiguous {
        reason: AmbiguityReason,
        marked: Vec<usize>,
    },
}

/// Extractor output for one question slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarkReading {
    #[serde(flatten)]
    pub state: MarkState,
    /// 0..1, how far the least clear bubble sits from the decision band.
    pub confidence: f32,
    /// Measured ink share per option (NaN-free, 0 when unmeasurable).
    pub fill_ratios: Vec<f32>,
}

impl MarkReading {
    pub fn filled(options: Vec<usize>) -> Self {
        Self {
            state: MarkState::Filled { options },
            confidence: 1.0,
            fill_ratios: Vec::new(),
        }
    }

    pub fn empty() -> Self {
        Self {
            state: MarkState::Empty,
            confidence: 1.0,
            fill_ratios: Vec::new(),
        }
    }

    pub fn ambiguous(reason: AmbiguityReason, marked: Vec<usize>) -> Self {
        Self {
            state: MarkState::Ambiguous { reason, marked },
            confidence: 0.0,
            fill_ratios: Vec::new(),
        }
    }

    pub fn is_filled(&self) -> bool {
        matches!(self.state, MarkState::Filled { .. })
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.state, MarkState::Empty)
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self.state, MarkState::Ambiguous { .. })
    }

    /// Options that read as marked, whatever the slot state.
    pub fn marked(&self) -> &[usize] {
        match &self.state {
            MarkState::Filled { options } => options,
            MarkState::Ambiguous { marked, .. } => marked,
            MarkState::Empty => &[],
        }
    }
}
