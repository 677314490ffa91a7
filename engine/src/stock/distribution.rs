//! Lifetime distributions for stock cohorts.
//!
//! A cohort is the inflow that entered a stock in one year. Its lifetime
//! distribution maps the cohort's age (years since it entered) to the share
//! of it that is still in stock.
//!
//! # Critical Invariants
//!
//! - **Validated once**: `StockParameters::new` rejects missing or malformed
//!   parameters; solver code never re-checks them.
//! - **Monotonic survival**: `survival(age)` is non-increasing in `age` and
//!   stays in `[0, 1]`.
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::stock::{DistributionParams, DistributionType, StockParameters};
//!
//! let params = StockParameters::new(
//!     10,
//!     DistributionType::Normal,
//!     DistributionParams::Scalar(2.0),
//! ).unwrap();
//!
//! let distribution = params.lifetime_distribution().unwrap();
//! assert!(distribution.survival(0) > 0.99);
//! assert!(distribution.survival(30) < 0.01);
//! ```

use super::StockError;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, LogNormal, Normal, Weibull};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Distribution Types
// ============================================================================

/// Residence-time distribution of a stock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DistributionType {
    Fixed,
    Normal,
    LogNormal,
    FoldedNormal,
    Weibull,
    LandfillDecayWood,
    LandfillDecayPaper,
}

impl DistributionType {
    pub const ALL: [DistributionType; 7] = [
        DistributionType::Fixed,
        DistributionType::Normal,
        DistributionType::LogNormal,
        DistributionType::FoldedNormal,
        DistributionType::Weibull,
        DistributionType::LandfillDecayWood,
        DistributionType::LandfillDecayPaper,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionType::Fixed => "Fixed",
            DistributionType::Normal => "Normal",
            DistributionType::LogNormal => "LogNormal",
            DistributionType::FoldedNormal => "FoldedNormal",
            DistributionType::Weibull => "Weibull",
            DistributionType::LandfillDecayWood => "LandfillDecayWood",
            DistributionType::LandfillDecayPaper => "LandfillDecayPaper",
        }
    }

    /// Names of the parameters this distribution cannot do without
    pub fn required_params(&self) -> &'static [&'static str] {
        match self {
            DistributionType::Fixed => &[],
            DistributionType::Normal
            | DistributionType::LogNormal
            | DistributionType::FoldedNormal => &["stddev"],
            DistributionType::Weibull => &["shape", "scale"],
            DistributionType::LandfillDecayWood | DistributionType::LandfillDecayPaper => {
                &["condition"]
            }
        }
    }

    fn is_landfill_decay(&self) -> bool {
        matches!(
            self,
            DistributionType::LandfillDecayWood | DistributionType::LandfillDecayPaper
        )
    }
}

impl fmt::Display for DistributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistributionType {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DistributionType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim())
            .ok_or_else(|| StockError::UnknownDistributionType(s.to_string()))
    }
}

/// Moisture condition of a landfill, selects the first-order decay rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandfillCondition {
    Dry,
    Wet,
}

impl FromStr for LandfillCondition {
    type Err = StockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dry" => Ok(LandfillCondition::Dry),
            "wet" => Ok(LandfillCondition::Wet),
            _ => Err(StockError::UnknownCondition(s.to_string())),
        }
    }
}

// ============================================================================
// Distribution Parameters
// ============================================================================

/// Distribution parameters, either a bare standard deviation or named values
///
/// Deserializes from either a number or a map, matching how lifetime
/// parameters are written in model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DistributionParams {
    Scalar(f64),
    Keyed {
        #[serde(default)]
        stddev: Option<f64>,
        #[serde(default)]
        shape: Option<f64>,
        #[serde(default)]
        scale: Option<f64>,
        #[serde(default)]
        condition: Option<String>,
    },
}

impl Default for DistributionParams {
    fn default() -> Self {
        DistributionParams::Keyed {
            stddev: None,
            shape: None,
            scale: None,
            condition: None,
        }
    }
}

impl DistributionParams {
    pub fn stddev(&self) -> Option<f64> {
        match self {
            DistributionParams::Scalar(stddev) => Some(*stddev),
            DistributionParams::Keyed { stddev, .. } => *stddev,
        }
    }

    pub fn shape(&self) -> Option<f64> {
        match self {
            DistributionParams::Scalar(_) => None,
            DistributionParams::Keyed { shape, .. } => *shape,
        }
    }

    pub fn scale(&self) -> Option<f64> {
        match self {
            DistributionParams::Scalar(_) => None,
            DistributionParams::Keyed { scale, .. } => *scale,
        }
    }

    pub fn condition(&self) -> Option<&str> {
        match self {
            DistributionParams::Scalar(_) => None,
            DistributionParams::Keyed { condition, .. } => condition.as_deref(),
        }
    }

    fn is_scalar(&self) -> bool {
        matches!(self, DistributionParams::Scalar(_))
    }
}

// ============================================================================
// Stock Parameters
// ============================================================================

/// Lifetime definition attached to a process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockParameters {
    lifetime: u32,
    distribution_type: DistributionType,
    #[serde(default)]
    params: DistributionParams,
}

impl StockParameters {
    /// Create validated stock parameters
    ///
    /// # Errors
    ///
    /// Returns an error when a parameter required by `distribution_type` is
    /// missing, non-finite or not positive.
    pub fn new(
        lifetime: u32,
        distribution_type: DistributionType,
        params: DistributionParams,
    ) -> Result<Self, StockError> {
        let parameters = Self {
            lifetime,
            distribution_type,
            params,
        };
        parameters.validate()?;
        Ok(parameters)
    }

    /// Fixed lifetime, needs no distribution parameters
    pub fn fixed(lifetime: u32) -> Self {
        Self {
            lifetime,
            distribution_type: DistributionType::Fixed,
            params: DistributionParams::default(),
        }
    }

    pub fn lifetime(&self) -> u32 {
        self.lifetime
    }

    pub fn distribution_type(&self) -> DistributionType {
        self.distribution_type
    }

    pub fn params(&self) -> &DistributionParams {
        &self.params
    }

    pub fn validate(&self) -> Result<(), StockError> {
        let kind = self.distribution_type;

        if self.params.is_scalar()
            && (kind.required_params().len() > 1 || kind.is_landfill_decay())
        {
            return Err(StockError::ScalarNotAllowed(kind));
        }

        for &name in kind.required_params() {
            match name {
                "condition" => {
                    let condition = self.params.condition().ok_or(
                        StockError::MissingParameter {
                            distribution: kind,
                            parameter: name,
                        },
                    )?;
                    condition.parse::<LandfillCondition>()?;
                }
                _ => {
                    let value = match name {
                        "stddev" => self.params.stddev(),
                        "shape" => self.params.shape(),
                        _ => self.params.scale(),
                    }
                    .ok_or(StockError::MissingParameter {
                        distribution: kind,
                        parameter: name,
                    })?;
                    if !value.is_finite() || value <= 0.0 {
                        return Err(StockError::InvalidParameter {
                            parameter: name,
                            value,
                        });
                    }
                }
            }
        }

        Ok(())
    }

    /// Build the survival function for these parameters
    pub fn lifetime_distribution(&self) -> Result<LifetimeDistribution, StockError> {
        self.validate()?;
        let mean = self.lifetime as f64;
        let missing = |parameter| StockError::MissingParameter {
            distribution: self.distribution_type,
            parameter,
        };

        let distribution = match self.distribution_type {
            DistributionType::Fixed => LifetimeDistribution::Fixed { lifetime: mean },
            DistributionType::Normal => {
                let stddev = self.params.stddev().ok_or_else(|| missing("stddev"))?;
                LifetimeDistribution::Normal(
                    Normal::new(mean, stddev)
                        .map_err(|e| StockError::InvalidDistribution(e.to_string()))?,
                )
            }
            DistributionType::FoldedNormal => {
                let stddev = self.params.stddev().ok_or_else(|| missing("stddev"))?;
                LifetimeDistribution::FoldedNormal(
                    Normal::new(mean, stddev)
                        .map_err(|e| StockError::InvalidDistribution(e.to_string()))?,
                )
            }
            DistributionType::LogNormal => {
                let stddev = self.params.stddev().ok_or_else(|| missing("stddev"))?;
                if mean <= 0.0 {
                    return Err(StockError::InvalidParameter {
                        parameter: "lifetime",
                        value: mean,
                    });
                }
                // Moment matching: the log-space parameters reproduce the
                // requested mean and standard deviation.
                let variance_ratio = 1.0 + (stddev * stddev) / (mean * mean);
                let sigma = variance_ratio.ln().sqrt();
                let location = mean.ln() - 0.5 * sigma * sigma;
                LifetimeDistribution::LogNormal(
                    LogNormal::new(location, sigma)
                        .map_err(|e| StockError::InvalidDistribution(e.to_string()))?,
                )
            }
            DistributionType::Weibull => {
                let shape = self.params.shape().ok_or_else(|| missing("shape"))?;
                let scale = self.params.scale().ok_or_else(|| missing("scale"))?;
                LifetimeDistribution::Weibull(
                    Weibull::new(shape, scale)
                        .map_err(|e| StockError::InvalidDistribution(e.to_string()))?,
                )
            }
            DistributionType::LandfillDecayWood | DistributionType::LandfillDecayPaper => {
                let condition: LandfillCondition = self
                    .params
                    .condition()
                    .ok_or_else(|| missing("condition"))?
                    .parse()?;
                LifetimeDistribution::FirstOrderDecay {
                    rate: decay_rate(self.distribution_type, condition),
                }
            }
        };

        Ok(distribution)
    }
}

/// First-order decay rate constants (1/year) for landfilled material
fn decay_rate(distribution_type: DistributionType, condition: LandfillCondition) -> f64 {
    match (distribution_type, condition) {
        (DistributionType::LandfillDecayWood, LandfillCondition::Dry) => 0.02,
        (DistributionType::LandfillDecayWood, LandfillCondition::Wet) => 0.03,
        (_, LandfillCondition::Dry) => 0.04,
        (_, LandfillCondition::Wet) => 0.06,
    }
}

// ============================================================================
// Survival Functions
// ============================================================================

/// Survival function of a cohort
#[derive(Debug, Clone)]
pub enum LifetimeDistribution {
    Fixed { lifetime: f64 },
    Normal(Normal),
    FoldedNormal(Normal),
    LogNormal(LogNormal),
    Weibull(Weibull),
    FirstOrderDecay { rate: f64 },
}

impl LifetimeDistribution {
    /// Share of a cohort still in stock `age` years after it entered
    pub fn survival(&self, age: usize) -> f64 {
        let x = age as f64;
        let share = match self {
            LifetimeDistribution::Fixed { lifetime } => {
                if x < *lifetime {
                    1.0
                } else {
                    0.0
                }
            }
            LifetimeDistribution::Normal(normal) => 1.0 - normal.cdf(x),
            LifetimeDistribution::FoldedNormal(normal) => {
                // |X| <= x  <=>  -x <= X <= x
                1.0 - (normal.cdf(x) - normal.cdf(-x))
            }
            LifetimeDistribution::LogNormal(log_normal) => {
                if x <= 0.0 {
                    1.0
                } else {
                    1.0 - log_normal.cdf(x)
                }
            }
            LifetimeDistribution::Weibull(weibull) => 1.0 - weibull.cdf(x),
            LifetimeDistribution::FirstOrderDecay { rate } => (-rate * x).exp(),
        };
        share.clamp(0.0, 1.0)
    }

    /// Survival shares for ages `0..len`
    pub fn survival_curve(&self, len: usize) -> Vec<f64> {
        (0..len).map(|age| self.survival(age)).collect()
    }
}
