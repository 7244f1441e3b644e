pub mod config;
pub mod physics;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use component_model_core::error::ModelError;
use component_model_core::experiment::DefaultExperiment;
use component_model_core::model::{
    ComponentModel, ModelMetadata, ModelPhase, check_write, decode_state, encode_state,
};
use component_model_core::registry::{Registrar, VariableTable};
use component_model_core::variable::{Causality, Initial, Value, Variability, VariableSpec};

use config::BallConfig;
use physics::{BallParams, BallState, Vec2, advance};

/// Everything needed to resume a run, captured by `serialize_state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Snapshot {
    params: BallParams,
    state: BallState,
    phase: ModelPhase,
    start_time: f64,
}

/// A ball bouncing on flat ground in the x/z plane, implementing `ComponentModel`.
pub struct BouncingBallXZ {
    params: BallParams,
    state: BallState,
    variables: VariableTable,
    phase: ModelPhase,
    start_time: f64,
    default_experiment: DefaultExperiment,
}

impl BouncingBallXZ {
    pub const GUID: Uuid = Uuid::from_u128(0x06128d68_8f4d_404d_8f6d_49d6e493946b);

    /// Build the model with default start values, declaring its variables to `registrar`.
    pub fn new(registrar: &mut dyn Registrar) -> Result<Self, ModelError> {
        Self::with_config(BallConfig::default(), registrar)
    }

    /// Build the model with start values from `config`.
    pub fn with_config(
        config: BallConfig,
        registrar: &mut dyn Registrar,
    ) -> Result<Self, ModelError> {
        config.validate()?;

        let mut variables = VariableTable::new();
        for spec in variable_specs(&config) {
            registrar.register(spec.clone())?;
            variables.register(spec)?;
        }

        let params = config.parameters;
        let start_time = config.experiment.start_time;
        Ok(Self {
            state: BallState::launch(config.start_position, &params, start_time),
            params,
            variables,
            phase: ModelPhase::Instantiated,
            start_time,
            default_experiment: config.experiment,
        })
    }

    pub fn state(&self) -> &BallState {
        &self.state
    }

    pub fn params(&self) -> &BallParams {
        &self.params
    }

    /// The variables this model declared, in value-reference order.
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }
}

impl ComponentModel for BouncingBallXZ {
    fn metadata(&self) -> ModelMetadata {
        ModelMetadata {
            name: "BouncingBallXZ".to_string(),
            description: "Simple bouncing ball test FMU".to_string(),
            author: "DNV, SEACo project".to_string(),
            version: "0.1".to_string(),
            guid: Self::GUID,
            license: "Open Source".to_string(),
            copyright: "See copyright notice of used tools".to_string(),
            default_experiment: self.default_experiment,
        }
    }

    fn phase(&self) -> ModelPhase {
        self.phase
    }

    fn setup_experiment(&mut self, start_time: f64) {
        if self.phase == ModelPhase::Instantiated && start_time.is_finite() {
            self.start_time = start_time;
        }
    }

    fn enter_initialization_mode(&mut self) -> bool {
        if self.phase != ModelPhase::Instantiated {
            return false;
        }
        if let Err(e) = self.params.validate() {
            tracing::warn!(%e, "cannot initialize");
            return false;
        }
        self.state = BallState::launch(self.state.x, &self.params, self.start_time);
        self.phase = ModelPhase::Initialization;
        tracing::info!(
            start_time = self.start_time,
            x = ?self.state.x,
            v = ?self.state.v,
            "initialized"
        );
        true
    }

    fn exit_initialization_mode(&mut self) -> bool {
        if self.phase != ModelPhase::Initialization {
            return false;
        }
        self.phase = ModelPhase::Stepping;
        true
    }

    fn do_step(&mut self, current_time: f64, step_size: f64) -> bool {
        if !self.phase.is_initialized() {
            tracing::warn!(current_time, "do_step called before initialization");
            return false;
        }
        match advance(&self.state, &self.params, current_time, step_size) {
            Ok(outcome) => {
                self.state = outcome.state;
                self.phase = ModelPhase::Stepping;
                true
            },
            Err(e) => {
                tracing::warn!(%e, current_time, step_size, "step rejected");
                false
            },
        }
    }

    fn get(&self, name: &str) -> Result<Value, ModelError> {
        Ok(match name {
            "x" => self.state.x.to_array().into(),
            "v" => self.state.v.to_array().into(),
            "v0" => self.params.v0.to_array().into(),
            "bounceFactor" => self.params.bounce_factor.into(),
            "drag" => self.params.drag.into(),
            "energy" => self.state.energy.into(),
            "period" => self.state.period.into(),
            _ => return Err(ModelError::UnknownVariable(name.to_string())),
        })
    }

    fn set(&mut self, name: &str, value: Value) -> Result<(), ModelError> {
        let spec = self.variables.require(name)?;
        check_write(spec, self.phase, &value)?;

        let out_of_range = |reason: &str| ModelError::NotSettable {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        match name {
            "x" => {
                let x = Vec2::from(value.as_vec2(name)?);
                if x.z < 0.0 {
                    return Err(out_of_range("height must be >= 0"));
                }
                self.state.x = x;
                self.state.energy = self.state.total_energy(self.params.gravity);
            },
            "v" => {
                self.state.v = Vec2::from(value.as_vec2(name)?);
                self.state.energy = self.state.total_energy(self.params.gravity);
            },
            "v0" => {
                self.params.v0 = Vec2::from(value.as_vec2(name)?);
                // Already launched: keep the state consistent with its start value.
                if self.phase == ModelPhase::Initialization {
                    self.state = BallState::launch(self.state.x, &self.params, self.start_time);
                }
            },
            "bounceFactor" => {
                let f = value.as_real(name)?;
                if !(f > 0.0 && f <= 1.0) {
                    return Err(out_of_range("must be in (0, 1]"));
                }
                self.params.bounce_factor = f;
            },
            "drag" => {
                let d = value.as_real(name)?;
                if d < 0.0 {
                    return Err(out_of_range("must be >= 0"));
                }
                self.params.drag = d;
            },
            "energy" => {
                let e = value.as_real(name)?;
                if e < 0.0 {
                    return Err(out_of_range("must be >= 0"));
                }
                self.state.energy = e;
            },
            "period" => {
                let p = value.as_real(name)?;
                if p < 0.0 {
                    return Err(out_of_range("must be >= 0"));
                }
                self.state.period = p;
            },
            _ => return Err(ModelError::UnknownVariable(name.to_string())),
        }
        Ok(())
    }

    fn serialize_state(&self) -> Result<Vec<u8>, ModelError> {
        encode_state(&Snapshot {
            params: self.params,
            state: self.state,
            phase: self.phase,
            start_time: self.start_time,
        })
    }

    fn apply_state(&mut self, state: &[u8]) -> Result<(), ModelError> {
        let snapshot: Snapshot = decode_state(state)?;
        snapshot
            .params
            .validate()
            .and_then(|()| snapshot.state.validate())
            .map_err(|e| ModelError::State(e.to_string()))?;
        self.params = snapshot.params;
        self.state = snapshot.state;
        self.phase = snapshot.phase;
        self.start_time = snapshot.start_time;
        Ok(())
    }
}

/// Variables exposed to the host, with start values taken from `config`.
fn variable_specs(config: &BallConfig) -> Vec<VariableSpec> {
    let p = &config.parameters;
    vec![
        VariableSpec::new(
            "x",
            Causality::Output,
            Variability::Continuous,
            config.start_position.to_array(),
        )
        .description("Position of ball (x,z) at time.")
        .initial(Initial::Exact),
        VariableSpec::new("v", Causality::Output, Variability::Continuous, p.v0.to_array())
            .description("speed at time as (x,z) vector")
            .initial(Initial::Exact),
        VariableSpec::new("v0", Causality::Parameter, Variability::Fixed, p.v0.to_array())
            .description("speed at time=0 as (x,z) vector")
            .initial(Initial::Exact),
        VariableSpec::new(
            "bounceFactor",
            Causality::Parameter,
            Variability::Fixed,
            p.bounce_factor,
        )
        .description("factor on speed when bouncing"),
        VariableSpec::new("drag", Causality::Parameter, Variability::Fixed, p.drag).description(
            "drag deceleration factor defined as a = drag * v^2 with dimension 1/m",
        ),
        VariableSpec::new("energy", Causality::Output, Variability::Continuous, 0.0)
            .description("Total energy of ball in J"),
        VariableSpec::new("period", Causality::Output, Variability::Continuous, 0.0)
            .description("Bouncing period of ball"),
    ]
}
