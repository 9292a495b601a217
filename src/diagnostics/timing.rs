use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Wall-clock time spent in one stage of a sheet evaluation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageTiming {
    pub label: String,
    pub elapsed_ms: f64,
}

/// Per-sheet stage timings, in execution order.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimingBreakdown {
    pub total_ms: f64,
    pub stages: Vec<StageTiming>,
}

impl TimingBreakdown {
    /// Record a stage that started at `start` and ends now.
    pub fn push_since(&mut self, label: impl Into<String>, start: Instant) {
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        self.stages.push(StageTiming {
            label: label.into(),
            elapsed_ms,
        });
    }

    pub fn stage_ms(&self, label: &str) -> Option<f64> {
        self.stages
            .iter()
            .find(|s| s.label == label)
            .map(|s| s.elapsed_ms)
    }
}
