//! Invertible per-column standardization
//!
//! `SafeScaler` wraps a fitted [`Standardization`] strategy and sanitizes its output:
//! any non-finite transformed value becomes 0.0. Inversion is exact and unclamped.

use crate::{HockeyError, Result};
use serde::{Deserialize, Serialize};

/// A per-column linear transform fit on column-major data
pub trait Standardization: Sized {
    fn fit(columns: &[Vec<f64>]) -> Self;

    fn width(&self) -> usize;

    fn forward(&self, column: usize, value: f64) -> f64;

    fn inverse(&self, column: usize, value: f64) -> f64;
}

/// Zero mean, unit variance using the population variance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZScore {
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
}

impl Standardization for ZScore {
    fn fit(columns: &[Vec<f64>]) -> Self {
        let (mean, variance) = columns
            .iter()
            .map(|values| {
                if values.is_empty() {
                    return (0.0, 0.0);
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                (mean, if is_constant(values, mean, variance) { 0.0 } else { variance })
            })
            .unzip();
        ZScore { mean, variance }
    }

    fn width(&self) -> usize {
        self.mean.len()
    }

    fn forward(&self, column: usize, value: f64) -> f64 {
        (value - self.mean[column]) / self.variance[column].sqrt()
    }

    fn inverse(&self, column: usize, value: f64) -> f64 {
        value * self.variance[column].sqrt() + self.mean[column]
    }
}

/// Equal values, or a spread no larger than summation rounding around the mean
fn is_constant(values: &[f64], mean: f64, variance: f64) -> bool {
    let rounding = values.len() as f64 * f64::EPSILON * mean.abs();
    values.iter().all(|&v| v == values[0]) || variance <= rounding * rounding
}

/// Missing cells become 0.0 before fitting or transforming
pub fn fill_missing(values: &[Option<f64>]) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(0.0)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SafeScaler<S = ZScore> {
    state: S,
}

impl<S: Standardization> SafeScaler<S> {
    pub fn fit(columns: &[Vec<f64>]) -> Self {
        SafeScaler {
            state: S::fit(columns),
        }
    }

    /// Fit on `columns` and return the scaler with the standardized columns
    pub fn fit_transform(columns: &[Vec<f64>]) -> (Self, Vec<Vec<f64>>) {
        let scaler = Self::fit(columns);
        let scaled = scaler.apply(columns);
        (scaler, scaled)
    }

    /// Standardize column-major data with the fitted state
    pub fn transform(&self, columns: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
        self.check_width(columns.len())?;
        Ok(self.apply(columns))
    }

    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(col, &v)| sanitize(self.state.forward(col, v)))
            .collect())
    }

    pub fn inverse_transform(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;
        Ok(row
            .iter()
            .enumerate()
            .map(|(col, &v)| self.state.inverse(col, v))
            .collect())
    }

    pub fn width(&self) -> usize {
        self.state.width()
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    fn apply(&self, columns: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let mut sanitized = 0usize;
        let scaled = columns
            .iter()
            .enumerate()
            .map(|(col, values)| {
                values
                    .iter()
                    .map(|&v| {
                        let out = self.state.forward(col, v);
                        if !out.is_finite() {
                            sanitized += 1;
                        }
                        sanitize(out)
                    })
                    .collect()
            })
            .collect();
        if sanitized > 0 {
            log::debug!("Sanitized {} non-finite scaled values to 0", sanitized);
        }
        scaled
    }

    fn check_width(&self, found: usize) -> Result<()> {
        if found != self.state.width() {
            return Err(HockeyError::ScalerWidth {
                expected: self.state.width(),
                found,
            });
        }
        Ok(())
    }
}

fn sanitize(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
