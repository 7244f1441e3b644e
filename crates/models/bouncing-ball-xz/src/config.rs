use serde::{Deserialize, Serialize};

use component_model_core::error::ModelError;
use component_model_core::experiment::DefaultExperiment;

use crate::physics::{BallParams, Vec2};

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV: &str = "BOUNCING_BALL_CONFIG";
/// Config file read when `CONFIG_ENV` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/bouncing_ball.toml";

/// Start values and default experiment, loadable from TOML.
///
/// ```toml
/// start_position = { x = 0.0, z = 0.0 }
///
/// [parameters]
/// v0 = { x = 1.0, z = 5.0 }
/// bounce_factor = 0.95
///
/// [experiment]
/// step_size = 0.01
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallConfig {
    /// Start value of `x`.
    pub start_position: Vec2,
    pub parameters: BallParams,
    pub experiment: DefaultExperiment,
}

impl Default for BallConfig {
    fn default() -> Self {
        Self {
            start_position: Vec2::ZERO,
            parameters: BallParams::default(),
            experiment: DefaultExperiment::default(),
        }
    }
}

impl BallConfig {
    /// Load config from the file named by `BOUNCING_BALL_CONFIG`, else
    /// `config/bouncing_ball.toml`. Falls back to defaults if the file is
    /// missing or unparseable.
    pub fn load() -> Self {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        match std::fs::read_to_string(&path) {
            Ok(content) => match Self::from_toml_str(&content) {
                Ok(cfg) => cfg,
                Err(e) => {
                    tracing::warn!("Failed to parse {path}: {e}, using defaults");
                    Self::default()
                },
            },
            Err(_) => Self::default(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !self.start_position.is_finite() || self.start_position.z < 0.0 {
            return Err(ModelError::InvalidVariable {
                name: "x".to_string(),
                reason: "start position must be finite and above ground".to_string(),
            });
        }
        self.parameters
            .validate()
            .map_err(|e| ModelError::InvalidVariable {
                name: "parameters".to_string(),
                reason: e.to_string(),
            })?;
        self.experiment.validate()
    }
}
