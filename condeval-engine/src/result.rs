use std::collections::HashMap;

use condeval_cache::Weigh;

/// The outcome of a single condition evaluation.
///
/// Failures are values, never errors: every failure mode folds into
/// `success = false` with a human-readable message. Only successful,
/// untraced evaluations are cached.
#[derive(Clone, Debug)]
pub struct Evaluation {
    pub success: bool,
    /// JSON-encoded evaluated value; absent on failure.
    pub value_json: Option<String>,
    pub error: Option<String>,
    pub trace: Vec<TraceStep>,
    pub evaluation_time_ms: u64,
}

impl Evaluation {
    pub fn failure(error: impl Into<String>, trace: Vec<TraceStep>, elapsed_ms: u64) -> Self {
        Evaluation {
            success: false,
            value_json: None,
            error: Some(error.into()),
            trace,
            evaluation_time_ms: elapsed_ms,
        }
    }
}

impl Weigh for Evaluation {
    fn weight(&self) -> usize {
        std::mem::size_of::<Evaluation>()
            + self.value_json.as_ref().map_or(0, String::len)
            + self.error.as_ref().map_or(0, String::len)
            + self
                .trace
                .iter()
                .map(|s| s.description.len() + s.input_json.len() + s.output_json.len())
                .sum::<usize>()
    }
}

/// One step of an execution trace, 1-based.
#[derive(Clone, Debug)]
pub struct TraceStep {
    pub step: u32,
    pub description: String,
    pub input_json: String,
    pub output_json: String,
    pub passed: bool,
}

/// The outcome of a batch evaluation: per-id results plus the order the
/// engine actually used.
#[derive(Clone, Debug, Default)]
pub struct BatchEvaluation {
    pub results: HashMap<String, Evaluation>,
    pub order: Vec<String>,
}
