use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;
use crate::experiment::DefaultExperiment;
use crate::variable::{Value, VariableSpec};

/// Core trait every component model implements.
///
/// The host owns instantiation, variable exchange and the step loop; the
/// model only handles its own state. Calls are never concurrent for one
/// instance.
pub trait ComponentModel: Send {
    /// Descriptive metadata and the advertised default experiment.
    fn metadata(&self) -> ModelMetadata;

    /// Current lifecycle phase.
    fn phase(&self) -> ModelPhase;

    /// Record the start time of the coming run. Only valid before initialization.
    fn setup_experiment(&mut self, start_time: f64);

    /// Populate the state from the current start values. Returns `false`
    /// when the start values are unusable.
    fn enter_initialization_mode(&mut self) -> bool;

    /// Leave initialization; fixed parameters are frozen afterwards.
    fn exit_initialization_mode(&mut self) -> bool;

    /// Advance from `current_time` by `step_size`. Returns `false` on a
    /// precondition violation, which tells the host to abort the run.
    fn do_step(&mut self, current_time: f64, step_size: f64) -> bool;

    /// Read a variable by name.
    fn get(&self, name: &str) -> Result<Value, ModelError>;

    /// Write a variable by name.
    fn set(&mut self, name: &str, value: Value) -> Result<(), ModelError>;

    /// Snapshot the full internal state so the host can roll back a step.
    fn serialize_state(&self) -> Result<Vec<u8>, ModelError>;

    /// Restore a snapshot produced by `serialize_state`.
    fn apply_state(&mut self, state: &[u8]) -> Result<(), ModelError>;
}

/// Model metadata reported to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub name: String,
    pub description: String,
    pub author: String,
    pub version: String,
    pub guid: Uuid,
    pub license: String,
    pub copyright: String,
    pub default_experiment: DefaultExperiment,
}

/// Lifecycle of a model instance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelPhase {
    /// Constructed; parameters may be set.
    #[default]
    Instantiated,
    /// State populated from start values; parameters may still be set.
    Initialization,
    /// Stepping; fixed parameters are frozen.
    Stepping,
}

impl ModelPhase {
    pub fn is_initialized(self) -> bool {
        !matches!(self, ModelPhase::Instantiated)
    }
}

/// Check that `value` may be written to `spec` in `phase`.
pub fn check_write(
    spec: &VariableSpec,
    phase: ModelPhase,
    value: &Value,
) -> Result<(), ModelError> {
    if !spec.start.same_shape(value) {
        return Err(ModelError::TypeMismatch {
            name: spec.name.clone(),
            expected: spec.start.shape(),
            found: value.shape(),
        });
    }
    if !value.is_finite() {
        return Err(ModelError::NotSettable {
            name: spec.name.clone(),
            reason: "value must be finite".to_string(),
        });
    }
    let allowed = match phase {
        ModelPhase::Instantiated | ModelPhase::Initialization => spec.settable_before_stepping(),
        ModelPhase::Stepping => spec.settable_while_stepping(),
    };
    if !allowed {
        return Err(ModelError::NotSettable {
            name: spec.name.clone(),
            reason: format!(
                "{:?} {:?} variable cannot be written in phase {phase:?}",
                spec.variability, spec.causality
            ),
        });
    }
    Ok(())
}

/// Encode a model state snapshot as MessagePack.
pub fn encode_state<T: Serialize>(state: &T) -> Result<Vec<u8>, ModelError> {
    rmp_serde::to_vec(state).map_err(|e| ModelError::State(e.to_string()))
}

/// Decode a MessagePack model state snapshot.
pub fn decode_state<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ModelError> {
    rmp_serde::from_slice(bytes).map_err(|e| ModelError::State(e.to_string()))
}
