//! Indicator definitions
//!
//! An indicator is a secondary quantity derived from a flow's evaluated
//! value through a conversion factor (for example carbon content of a
//! timber flow).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Indicator {
    name: String,
    #[serde(default)]
    unit: String,
    /// Factor used by flows that do not define their own
    #[serde(default = "default_conversion_factor")]
    default_conversion_factor: f64,
}

fn default_conversion_factor() -> f64 {
    1.0
}

impl Indicator {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            default_conversion_factor: default_conversion_factor(),
        }
    }

    pub fn with_default_conversion_factor(mut self, factor: f64) -> Self {
        self.default_conversion_factor = factor;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn default_conversion_factor(&self) -> f64 {
        self.default_conversion_factor
    }
}
