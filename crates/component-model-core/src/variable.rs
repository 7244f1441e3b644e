use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Index assigned to a variable at registration, stable for the life of the model.
pub type ValueReference = u32;

/// How a variable participates in the exchange with the co-simulation host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Causality {
    /// Set by the host before the run, read by the model.
    Parameter,
    /// Derived from parameters during initialization.
    CalculatedParameter,
    Input,
    /// Computed by the model, visible to the host.
    Output,
    Local,
    /// The independent variable (time). At most one per model.
    Independent,
}

/// When a variable's value may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Variability {
    Constant,
    /// Fixed after initialization.
    Fixed,
    /// Changeable between steps by the host.
    Tunable,
    Discrete,
    Continuous,
}

/// How the start value is to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Initial {
    /// Used as given.
    Exact,
    /// Computed by the model during initialization.
    Calculated,
}

/// A typed variable value.
///
/// Vector values are fixed-length; the length is set by the start value at
/// registration and every later write must match it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Real(f64),
    Vector(Vec<f64>),
}

impl Value {
    /// Type and dimension, e.g. `Real` or `Vector[2]`.
    pub fn shape(&self) -> String {
        match self {
            Value::Real(_) => "Real".to_string(),
            Value::Vector(v) => format!("Vector[{}]", v.len()),
        }
    }

    /// Number of scalar components.
    pub fn dimension(&self) -> usize {
        match self {
            Value::Real(_) => 1,
            Value::Vector(v) => v.len(),
        }
    }

    pub fn is_finite(&self) -> bool {
        match self {
            Value::Real(r) => r.is_finite(),
            Value::Vector(v) => v.iter().all(|c| c.is_finite()),
        }
    }

    /// Whether `other` has the same type and dimension.
    pub fn same_shape(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Real(_), Value::Real(_)) => true,
            (Value::Vector(a), Value::Vector(b)) => a.len() == b.len(),
            _ => false,
        }
    }

    /// Extract a scalar, reporting a type mismatch against `name`.
    pub fn as_real(&self, name: &str) -> Result<f64, ModelError> {
        match self {
            Value::Real(r) => Ok(*r),
            other => Err(ModelError::TypeMismatch {
                name: name.to_string(),
                expected: "Real".to_string(),
                found: other.shape(),
            }),
        }
    }

    /// Extract a two-component vector, reporting a type mismatch against `name`.
    pub fn as_vec2(&self, name: &str) -> Result<[f64; 2], ModelError> {
        match self {
            Value::Vector(v) if v.len() == 2 => Ok([v[0], v[1]]),
            other => Err(ModelError::TypeMismatch {
                name: name.to_string(),
                expected: "Vector[2]".to_string(),
                found: other.shape(),
            }),
        }
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<[f64; 2]> for Value {
    fn from(v: [f64; 2]) -> Self {
        Value::Vector(v.to_vec())
    }
}

/// Declaration of one exposed variable, handed to a [`crate::registry::Registrar`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub description: String,
    pub causality: Causality,
    pub variability: Variability,
    pub initial: Option<Initial>,
    pub start: Value,
}

impl VariableSpec {
    pub fn new(
        name: impl Into<String>,
        causality: Causality,
        variability: Variability,
        start: impl Into<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            causality,
            variability,
            initial: None,
            start: start.into(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn initial(mut self, initial: Initial) -> Self {
        self.initial = Some(initial);
        self
    }

    /// Check the declaration for a usable name, a finite start value and an
    /// allowed causality/variability pairing.
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name must not be empty"));
        }
        if !self.start.is_finite() {
            return Err(self.invalid("start value must be finite"));
        }
        if self.start.dimension() == 0 {
            return Err(self.invalid("vector start value must have at least one component"));
        }
        if !combination_allowed(self.causality, self.variability) {
            return Err(self.invalid(&format!(
                "causality {:?} cannot have variability {:?}",
                self.causality, self.variability
            )));
        }
        if self.initial == Some(Initial::Calculated) && self.causality == Causality::Parameter {
            return Err(self.invalid("a parameter start value cannot be calculated"));
        }
        Ok(())
    }

    /// Whether the host may write this variable once stepping has begun.
    pub fn settable_while_stepping(&self) -> bool {
        match self.variability {
            Variability::Constant | Variability::Fixed => false,
            Variability::Tunable => true,
            Variability::Discrete | Variability::Continuous => matches!(
                self.causality,
                Causality::Input | Causality::Output | Causality::Local
            ),
        }
    }

    /// Whether the host may write this variable before stepping.
    pub fn settable_before_stepping(&self) -> bool {
        self.variability != Variability::Constant && self.causality != Causality::Independent
    }

    fn invalid(&self, reason: &str) -> ModelError {
        ModelError::InvalidVariable {
            name: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Causality/variability pairs accepted at registration.
fn combination_allowed(causality: Causality, variability: Variability) -> bool {
    use Causality as C;
    use Variability as V;
    match causality {
        C::Parameter | C::CalculatedParameter => matches!(variability, V::Fixed | V::Tunable),
        C::Input => matches!(variability, V::Discrete | V::Continuous),
        C::Output => matches!(variability, V::Constant | V::Discrete | V::Continuous),
        C::Local => true,
        C::Independent => variability == V::Continuous,
    }
}
