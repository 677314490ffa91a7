//! Trajectories of modified flows
//!
//! Converts a flow modifier into the new raw value of its target flow for
//! every year of the modifier's range.
//!
//! # Ramps
//!
//! Every function type is a ramp `r(t)` over the normalised position
//! `t = i / (n - 1)` in the year range (`t = 0` for a one-year range):
//!
//! - Constant: `r = 1` (the full change applies from the first year)
//! - Linear: `r = t`
//! - Exponential: `r = (10^t - 1) / 9`
//! - Sigmoid: logistic curve over `[-6, 6]`, rescaled to `[0, 1]`
//!
//! All ramps start at 0 (except Constant) and end at 1, so every function
//! type reaches the modifier's target in the last year.

use crate::models::{ChangeType, FlowModifier, FunctionType};

/// Half-width of the logistic curve used by the sigmoid ramp
const SIGMOID_HALF_WIDTH: f64 = 6.0;

/// State of the target flow in the modifier's first year
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlowBaseline {
    pub evaluated_value: f64,
    pub evaluated_share: f64,
    pub is_absolute: bool,
}

/// New raw values of a target flow, one per year of the modifier range
///
/// Offsets are not part of the trajectory: they are taken against the
/// flow's solved value in each year when the change is planned.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    pub years: Vec<i32>,
    /// Absolute quantity for absolute flows, percent for relative flows
    pub values: Vec<f64>,
}

/// Ramp factors in `[0, 1]` for `n` years
pub fn ramp(function_type: FunctionType, n: usize) -> Vec<f64> {
    let position = |i: usize| {
        if n > 1 {
            i as f64 / (n - 1) as f64
        } else {
            0.0
        }
    };

    (0..n)
        .map(|i| {
            let t = position(i);
            match function_type {
                FunctionType::Constant => 1.0,
                FunctionType::Linear => t,
                FunctionType::Exponential => (10f64.powf(t) - 1.0) / 9.0,
                FunctionType::Sigmoid => {
                    let logistic = |x: f64| 1.0 / (1.0 + (-x).exp());
                    let low = logistic(-SIGMOID_HALF_WIDTH);
                    let high = logistic(SIGMOID_HALF_WIDTH);
                    let x = -SIGMOID_HALF_WIDTH + 2.0 * SIGMOID_HALF_WIDTH * t;
                    (logistic(x) - low) / (high - low)
                }
            }
        })
        .collect()
}

/// Compute the trajectory of `modifier` from its target's first-year state
///
/// - Absolute flow, change in value: `new = base + change` (Value) or
///   `new = base * (1 + change / 100)` (Proportional).
/// - Absolute flow, target value: ramp from base to target.
/// - Relative flow, change in value: proportional change of the share,
///   `new% = base% * (1 + change / 100)`.
/// - Relative flow, target value: ramp from base% to target%.
pub fn calculate_new_flow_values(modifier: &FlowModifier, baseline: &FlowBaseline) -> Trajectory {
    let years: Vec<i32> = modifier.years().collect();
    let factors = ramp(modifier.function_type(), years.len());

    let base_percent = baseline.evaluated_share * 100.0;
    let start = if baseline.is_absolute {
        baseline.evaluated_value
    } else {
        base_percent
    };

    let values = factors
        .into_iter()
        .map(|factor| match (modifier.change_in_value(), modifier.target_value()) {
            (Some(change), _) => {
                let delta = change * factor;
                match (baseline.is_absolute, modifier.change_type()) {
                    (true, ChangeType::Value) => baseline.evaluated_value + delta,
                    (true, ChangeType::Proportional) => {
                        baseline.evaluated_value * (1.0 + delta / 100.0)
                    }
                    (false, _) => base_percent * (1.0 + delta / 100.0),
                }
            }
            (None, Some(target)) => start + (target - start) * factor,
            (None, None) => start,
        })
        .collect();

    Trajectory { years, values }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absolute_baseline(value: f64) -> FlowBaseline {
        FlowBaseline {
            evaluated_value: value,
            evaluated_share: 1.0,
            is_absolute: true,
        }
    }

    fn relative_baseline(percent: f64, pool: f64) -> FlowBaseline {
        FlowBaseline {
            evaluated_value: percent / 100.0 * pool,
            evaluated_share: percent / 100.0,
            is_absolute: false,
        }
    }

    #[test]
    fn test_linear_ramp_endpoints() {
        assert_eq!(ramp(FunctionType::Linear, 5), vec![0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(ramp(FunctionType::Linear, 1), vec![0.0]);
        assert_eq!(ramp(FunctionType::Constant, 3), vec![1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_curved_ramps_reach_one() {
        for function_type in [FunctionType::Exponential, FunctionType::Sigmoid] {
            let factors = ramp(function_type, 11);
            assert!(factors[0].abs() < 1e-12);
            assert!((factors[10] - 1.0).abs() < 1e-12);
            for pair in factors.windows(2) {
                assert!(pair[1] > pair[0]);
            }
        }
    }

    #[test]
    fn test_absolute_linear_change_in_value() {
        let modifier = FlowModifier::with_change_in_value("P", "A", 2020, 2022, 20.0);
        let trajectory = calculate_new_flow_values(&modifier, &absolute_baseline(50.0));

        assert_eq!(trajectory.years, vec![2020, 2021, 2022]);
        assert_eq!(trajectory.values, vec![50.0, 60.0, 70.0]);
    }

    #[test]
    fn test_absolute_proportional_change() {
        let modifier = FlowModifier::with_change_in_value("P", "A", 2020, 2021, 50.0)
            .with_change_type(ChangeType::Proportional)
            .with_function_type(FunctionType::Constant);
        let trajectory = calculate_new_flow_values(&modifier, &absolute_baseline(40.0));

        assert_eq!(trajectory.values, vec![60.0, 60.0]);
    }

    #[test]
    fn test_absolute_target_value() {
        let modifier = FlowModifier::with_target_value("P", "A", 2020, 2024, 0.0);
        let trajectory = calculate_new_flow_values(&modifier, &absolute_baseline(8.0));

        assert_eq!(trajectory.values, vec![8.0, 6.0, 4.0, 2.0, 0.0]);
    }

    #[test]
    fn test_relative_target_value() {
        let modifier = FlowModifier::with_target_value("P", "A", 2020, 2021, 60.0);
        let trajectory = calculate_new_flow_values(&modifier, &relative_baseline(40.0, 200.0));

        assert_eq!(trajectory.values, vec![40.0, 60.0]);
    }

    #[test]
    fn test_relative_change_is_proportional() {
        let modifier = FlowModifier::with_change_in_value("P", "A", 2020, 2020, 10.0)
            .with_function_type(FunctionType::Constant);
        let trajectory = calculate_new_flow_values(&modifier, &relative_baseline(40.0, 100.0));

        assert!((trajectory.values[0] - 44.0).abs() < 1e-9);
    }
}
