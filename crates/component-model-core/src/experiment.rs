use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Default experiment a model advertises to its host.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultExperiment {
    pub start_time: f64,
    /// Communication step size (s).
    pub step_size: f64,
    pub stop_time: f64,
    /// Relative tolerance hint for hosts with variable-step solvers.
    pub tolerance: f64,
}

impl Default for DefaultExperiment {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            step_size: 0.1,
            stop_time: 10.0,
            tolerance: 0.001,
        }
    }
}

impl DefaultExperiment {
    pub fn validate(&self) -> Result<(), ModelError> {
        let all_finite = [
            self.start_time,
            self.step_size,
            self.stop_time,
            self.tolerance,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !all_finite {
            return Err(ModelError::InvalidExperiment(
                "all fields must be finite".to_string(),
            ));
        }
        if self.step_size <= 0.0 {
            return Err(ModelError::InvalidExperiment(format!(
                "step_size must be > 0, got {}",
                self.step_size
            )));
        }
        if self.stop_time <= self.start_time {
            return Err(ModelError::InvalidExperiment(format!(
                "stop_time {} must be after start_time {}",
                self.stop_time, self.start_time
            )));
        }
        if self.tolerance <= 0.0 {
            return Err(ModelError::InvalidExperiment(format!(
                "tolerance must be > 0, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }

    /// Number of steps needed to reach `stop_time`. A final partial step is
    /// counted when the span is not a whole multiple of `step_size`.
    pub fn step_count(&self) -> usize {
        let span = (self.stop_time - self.start_time) / self.step_size;
        // Absorb rounding noise such as 10.0 / 0.1 = 100.00000000000001.
        let rounded = span.round();
        if (span - rounded).abs() < 1e-9 * span.max(1.0) {
            rounded as usize
        } else {
            span.ceil() as usize
        }
    }

    /// Communication point `k`, computed from the start time to avoid drift.
    pub fn time_at(&self, k: usize) -> f64 {
        (self.start_time + k as f64 * self.step_size).min(self.stop_time)
    }
}
