use thiserror::Error;

/// Errors raised at the boundary between a model and its co-simulation host.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("variable `{0}` is already registered")]
    DuplicateVariable(String),

    #[error("invalid variable `{name}`: {reason}")]
    InvalidVariable { name: String, reason: String },

    #[error("variable `{name}` expects {expected}, got {found}")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("variable `{name}` cannot be set: {reason}")]
    NotSettable { name: String, reason: String },

    #[error("invalid experiment: {0}")]
    InvalidExperiment(String),

    #[error("model has not entered initialization mode")]
    NotInitialized,

    #[error("step starting at t={time} was rejected by the model")]
    StepFailed { time: f64 },

    #[error("state snapshot: {0}")]
    State(String),
}
