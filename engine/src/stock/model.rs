//! Inflow-driven dynamic stock model
//!
//! Tracks every yearly inflow as its own cohort and lets it leave the stock
//! according to the lifetime distribution of the owning process.
//!
//! # Critical Invariants
//!
//! - **Mass balance**: `inflow[t] - outflow_total[t] == stock_change[t]` for
//!   every year index `t`.
//! - **Pure recompute**: every `compute_*` step is a function of the inflow
//!   series and the survival curve only. Running the sequence twice with the
//!   same inflow yields identical arrays.
//!
//! # Example
//!
//! ```rust
//! use stockflow_engine::stock::{DynamicStockModel, StockParameters};
//!
//! let years: Vec<i32> = (2020..2030).collect();
//! let mut model = DynamicStockModel::new(years, &StockParameters::fixed(5)).unwrap();
//!
//! for index in 0..10 {
//!     model.accumulate_inflow(index, 10.0).unwrap();
//! }
//!
//! assert_eq!(model.stock_total()[4], 50.0);
//! assert_eq!(model.outflow_total()[5], 10.0);
//! ```

use super::distribution::{LifetimeDistribution, StockParameters};
use super::StockError;

/// Cohort-based stock accumulator over a fixed year horizon
#[derive(Debug, Clone)]
pub struct DynamicStockModel {
    years: Vec<i32>,
    distribution: LifetimeDistribution,
    /// Survival share by cohort age
    survival: Vec<f64>,
    inflow: Vec<f64>,
    /// `[t][c]`: amount of cohort `c` in stock at year index `t`
    stock_by_cohort: Vec<Vec<f64>>,
    /// `[t][c]`: amount of cohort `c` leaving the stock at year index `t`
    outflow_by_cohort: Vec<Vec<f64>>,
    stock_total: Vec<f64>,
    stock_change: Vec<f64>,
    outflow_total: Vec<f64>,
}

impl DynamicStockModel {
    /// Create a model with zero inflow and zero stock for every year
    pub fn new(years: Vec<i32>, parameters: &StockParameters) -> Result<Self, StockError> {
        let distribution = parameters.lifetime_distribution()?;
        let n = years.len();
        let survival = distribution.survival_curve(n);

        Ok(Self {
            years,
            distribution,
            survival,
            inflow: vec![0.0; n],
            stock_by_cohort: vec![vec![0.0; n]; n],
            outflow_by_cohort: vec![vec![0.0; n]; n],
            stock_total: vec![0.0; n],
            stock_change: vec![0.0; n],
            outflow_total: vec![0.0; n],
        })
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn distribution(&self) -> &LifetimeDistribution {
        &self.distribution
    }

    pub fn year_index(&self, year: i32) -> Option<usize> {
        self.years.iter().position(|&y| y == year)
    }

    pub fn inflow(&self) -> &[f64] {
        &self.inflow
    }

    pub fn outflow_total(&self) -> &[f64] {
        &self.outflow_total
    }

    pub fn stock_total(&self) -> &[f64] {
        &self.stock_total
    }

    pub fn stock_change(&self) -> &[f64] {
        &self.stock_change
    }

    pub fn stock_by_cohort(&self) -> &[Vec<f64>] {
        &self.stock_by_cohort
    }

    pub fn outflow_by_cohort(&self) -> &[Vec<f64>] {
        &self.outflow_by_cohort
    }

    /// Overwrite the inflow of one year without recomputing
    pub fn set_inflow(&mut self, index: usize, value: f64) -> Result<(), StockError> {
        let len = self.inflow.len();
        let slot = self
            .inflow
            .get_mut(index)
            .ok_or(StockError::YearIndexOutOfRange { index, len })?;
        *slot = value;
        Ok(())
    }

    /// Set one year's inflow and bring every derived series up to date
    pub fn accumulate_inflow(&mut self, index: usize, value: f64) -> Result<(), StockError> {
        self.set_inflow(index, value)?;
        self.recompute();
        Ok(())
    }

    /// Run the full recompute sequence in dependency order
    pub fn recompute(&mut self) {
        self.compute_stock_by_cohort();
        self.compute_outflow_by_cohort();
        self.compute_stock_total();
        self.compute_stock_change();
        self.compute_outflow_total();
    }

    pub fn compute_stock_by_cohort(&mut self) {
        let n = self.inflow.len();
        for t in 0..n {
            for c in 0..n {
                self.stock_by_cohort[t][c] = if c <= t {
                    self.inflow[c] * self.survival[t - c]
                } else {
                    0.0
                };
            }
        }
    }

    pub fn compute_outflow_by_cohort(&mut self) {
        let n = self.inflow.len();
        for t in 0..n {
            for c in 0..n {
                self.outflow_by_cohort[t][c] = if c == t {
                    self.inflow[c] - self.stock_by_cohort[t][c]
                } else if c < t {
                    self.stock_by_cohort[t - 1][c] - self.stock_by_cohort[t][c]
                } else {
                    0.0
                };
            }
        }
    }

    pub fn compute_stock_total(&mut self) {
        for (total, row) in self.stock_total.iter_mut().zip(&self.stock_by_cohort) {
            *total = row.iter().sum();
        }
    }

    pub fn compute_stock_change(&mut self) {
        let mut previous = 0.0;
        for (change, &total) in self.stock_change.iter_mut().zip(&self.stock_total) {
            *change = total - previous;
            previous = total;
        }
    }

    pub fn compute_outflow_total(&mut self) {
        for (total, row) in self.outflow_total.iter_mut().zip(&self.outflow_by_cohort) {
            *total = row.iter().sum();
        }
    }

    /// `inflow - outflow - stock_change` per year, zero up to rounding
    pub fn mass_balance_residuals(&self) -> Vec<f64> {
        self.inflow
            .iter()
            .zip(&self.outflow_total)
            .zip(&self.stock_change)
            .map(|((i, o), ds)| i - o - ds)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stock::{DistributionParams, DistributionType};

    fn years(n: i32) -> Vec<i32> {
        (2000..2000 + n).collect()
    }

    #[test]
    fn test_new_model_is_empty() {
        let model = DynamicStockModel::new(years(4), &StockParameters::fixed(2)).unwrap();
        assert_eq!(model.inflow(), &[0.0; 4]);
        assert_eq!(model.stock_total(), &[0.0; 4]);
        assert_eq!(model.outflow_total(), &[0.0; 4]);
    }

    #[test]
    fn test_set_inflow_out_of_range() {
        let mut model = DynamicStockModel::new(years(3), &StockParameters::fixed(2)).unwrap();
        assert_eq!(
            model.set_inflow(3, 1.0),
            Err(StockError::YearIndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn test_single_cohort_leaves_after_lifetime() {
        let mut model = DynamicStockModel::new(years(6), &StockParameters::fixed(3)).unwrap();
        model.accumulate_inflow(1, 12.0).unwrap();

        assert_eq!(model.stock_total(), &[0.0, 12.0, 12.0, 12.0, 0.0, 0.0]);
        assert_eq!(model.outflow_total(), &[0.0, 0.0, 0.0, 0.0, 12.0, 0.0]);
        assert_eq!(model.stock_change(), &[0.0, 12.0, 0.0, 0.0, -12.0, 0.0]);
    }

    #[test]
    fn test_mass_balance_holds_for_normal_lifetime() {
        let params =
            StockParameters::new(4, DistributionType::Normal, DistributionParams::Scalar(1.5))
                .unwrap();
        let mut model = DynamicStockModel::new(years(12), &params).unwrap();
        for index in 0..12 {
            model.accumulate_inflow(index, 5.0 + index as f64).unwrap();
        }

        for residual in model.mass_balance_residuals() {
            assert!(residual.abs() < 1e-9, "residual {} too large", residual);
        }
    }

    #[test]
    fn test_year_index_lookup() {
        let model = DynamicStockModel::new(years(3), &StockParameters::fixed(1)).unwrap();
        assert_eq!(model.year_index(2001), Some(1));
        assert_eq!(model.year_index(1999), None);
    }
}
