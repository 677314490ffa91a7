//! Model configuration
//!
//! Layered with figment, later layers override earlier ones:
//! 1. built-in defaults
//! 2. a TOML file (optional)
//! 3. `STOCKFLOW__`-prefixed environment variables, nested with `__`
//!    (`STOCKFLOW__SOLVER__VIRTUAL_FLOWS_EPSILON=0.5`)
//!
//! ```toml
//! scenario_type_default = "Constrained"
//!
//! [solver]
//! use_virtual_flows = true
//! virtual_flows_epsilon = 0.1
//! prioritized_locations = ["Landfill"]
//! ```

use crate::models::ScenarioType;
use crate::solver::SolverConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

pub const ENV_PREFIX: &str = "STOCKFLOW__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        ConfigError::Load(Box::new(error))
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub solver: SolverConfig,

    /// Policy of scenarios that do not set one
    pub scenario_type_default: ScenarioType,
}

impl ModelConfig {
    /// Defaults, then the TOML file at `path` if it exists, then environment
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(ModelConfig::default()))
                .merge(Toml::file(path.as_ref()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    /// Defaults overridden by environment only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(
            Figment::from(Serialized::defaults(ModelConfig::default()))
                .merge(Env::prefixed(ENV_PREFIX).split("__")),
        )
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: ModelConfig = figment.extract()?;
        config.solver.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}
