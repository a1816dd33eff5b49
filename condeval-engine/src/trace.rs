use serde_json::Value;

use crate::result::TraceStep;

/// Collects [`TraceStep`]s during one evaluation. A disabled recorder
/// drops everything, so the untraced hot path stays allocation-light.
pub(crate) struct TraceRecorder {
    enabled: bool,
    steps: Vec<TraceStep>,
}

impl TraceRecorder {
    pub fn new(enabled: bool) -> Self {
        TraceRecorder {
            enabled,
            steps: Vec::new(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn record(&mut self, description: &str, input: Value, output: Value, passed: bool) {
        if !self.enabled {
            return;
        }
        self.steps.push(TraceStep {
            step: self.steps.len() as u32 + 1,
            description: description.to_string(),
            input_json: input.to_string(),
            output_json: output.to_string(),
            passed,
        });
    }

    pub fn into_steps(self) -> Vec<TraceStep> {
        self.steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn steps_are_one_based_and_ordered() {
        let mut recorder = TraceRecorder::new(true);
        recorder.record("first", json!({"a": 1}), json!(true), true);
        recorder.record("second", json!(null), json!(false), false);
        let steps = recorder.into_steps();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step, 1);
        assert_eq!(steps[1].step, 2);
        assert_eq!(steps[0].input_json, "{\"a\":1}");
        assert!(!steps[1].passed);
    }

    #[test]
    fn disabled_recorder_drops_everything() {
        let mut recorder = TraceRecorder::new(false);
        recorder.record("ignored", json!(1), json!(2), true);
        assert!(recorder.into_steps().is_empty());
    }
}
