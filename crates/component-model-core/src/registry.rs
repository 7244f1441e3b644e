use std::collections::HashMap;

use crate::error::ModelError;
use crate::variable::{Causality, ValueReference, VariableSpec};

/// Capability handed to a model at construction so it can declare the
/// variables it exposes to the host.
pub trait Registrar {
    /// Register one variable, returning its value reference.
    fn register(&mut self, spec: VariableSpec) -> Result<ValueReference, ModelError>;
}

/// In-memory variable catalog. Value references are assigned in
/// registration order starting at 0.
#[derive(Debug, Clone, Default)]
pub struct VariableTable {
    specs: Vec<VariableSpec>,
    by_name: HashMap<String, ValueReference>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Look up a variable by name.
    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.by_name
            .get(name)
            .map(|&vr| &self.specs[vr as usize])
    }

    /// Look up a variable by name, failing with `UnknownVariable`.
    pub fn require(&self, name: &str) -> Result<&VariableSpec, ModelError> {
        self.get(name)
            .ok_or_else(|| ModelError::UnknownVariable(name.to_string()))
    }

    pub fn value_reference(&self, name: &str) -> Option<ValueReference> {
        self.by_name.get(name).copied()
    }

    pub fn by_reference(&self, vr: ValueReference) -> Option<&VariableSpec> {
        self.specs.get(vr as usize)
    }

    /// All variables in value-reference order.
    pub fn iter(&self) -> impl Iterator<Item = (ValueReference, &VariableSpec)> {
        self.specs
            .iter()
            .enumerate()
            .map(|(i, spec)| (i as ValueReference, spec))
    }

    /// Names of variables with the given causality, in value-reference order.
    pub fn names_with(&self, causality: Causality) -> Vec<&str> {
        self.specs
            .iter()
            .filter(|s| s.causality == causality)
            .map(|s| s.name.as_str())
            .collect()
    }
}

impl Registrar for VariableTable {
    fn register(&mut self, spec: VariableSpec) -> Result<ValueReference, ModelError> {
        spec.validate()?;
        if self.by_name.contains_key(&spec.name) {
            return Err(ModelError::DuplicateVariable(spec.name));
        }
        if spec.causality == Causality::Independent
            && self
                .specs
                .iter()
                .any(|s| s.causality == Causality::Independent)
        {
            return Err(ModelError::InvalidVariable {
                name: spec.name,
                reason: "only one independent variable is allowed".to_string(),
            });
        }

        let vr = self.specs.len() as ValueReference;
        tracing::trace!(name = %spec.name, vr, "registered variable");
        self.by_name.insert(spec.name.clone(), vr);
        self.specs.push(spec);
        Ok(vr)
    }
}
