//! Utility functions for KRLS fitting

use crate::core::{KrlsError, Result};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Feature and response standardization
pub mod scaling {
    use super::*;
    use serde::{Deserialize, Serialize};

    /// Column means and standard deviations of the training data
    ///
    /// Standard deviations use the N−1 denominator. A constant column has no
    /// scale and is rejected at fit time.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Standardizer {
        means: Array1<f64>,
        scales: Array1<f64>,
    }

    impl Standardizer {
        /// Compute column statistics of `x`
        pub fn fit(x: ArrayView2<'_, f64>) -> Result<Self> {
            let n = x.nrows();
            if n < 2 {
                return Err(KrlsError::InvalidParameter(format!(
                    "Standardization needs at least 2 observations, got: {n}"
                )));
            }
            let means = x.mean_axis(Axis(0)).ok_or(KrlsError::EmptyDataset)?;
            let scales = x.std_axis(Axis(0), 1.0);
            if let Some(column) = scales.iter().position(|&s| !(s > 0.0 && s.is_finite())) {
                return Err(KrlsError::InvalidParameter(format!(
                    "Column {column} is constant and cannot be standardized"
                )));
            }
            Ok(Self { means, scales })
        }

        /// Statistics that leave data unchanged
        pub fn identity(n_columns: usize) -> Self {
            Self {
                means: Array1::zeros(n_columns),
                scales: Array1::ones(n_columns),
            }
        }

        pub fn means(&self) -> ArrayView1<'_, f64> {
            self.means.view()
        }

        pub fn scales(&self) -> ArrayView1<'_, f64> {
            self.scales.view()
        }

        pub fn n_columns(&self) -> usize {
            self.means.len()
        }

        pub fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
            if x.ncols() != self.n_columns() {
                return Err(KrlsError::DimensionMismatch {
                    expected: self.n_columns(),
                    actual: x.ncols(),
                });
            }
            Ok((&x - &self.means) / &self.scales)
        }

        pub fn inverse_transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
            if x.ncols() != self.n_columns() {
                return Err(KrlsError::DimensionMismatch {
                    expected: self.n_columns(),
                    actual: x.ncols(),
                });
            }
            Ok(&x * &self.scales + &self.means)
        }
    }

    /// Mean and standard deviation of the response
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct ResponseScaling {
        pub mean: f64,
        pub scale: f64,
    }

    impl ResponseScaling {
        pub fn fit(y: ArrayView1<'_, f64>) -> Result<Self> {
            if y.len() < 2 {
                return Err(KrlsError::InvalidParameter(format!(
                    "Standardization needs at least 2 observations, got: {}",
                    y.len()
                )));
            }
            let mean = y.mean().ok_or(KrlsError::EmptyDataset)?;
            let scale = y.std(1.0);
            if !(scale > 0.0 && scale.is_finite()) {
                return Err(KrlsError::InvalidParameter(
                    "Response is constant and cannot be standardized".to_string(),
                ));
            }
            Ok(Self { mean, scale })
        }

        pub fn identity() -> Self {
            Self {
                mean: 0.0,
                scale: 1.0,
            }
        }

        pub fn transform(&self, y: ArrayView1<'_, f64>) -> Array1<f64> {
            y.mapv(|v| (v - self.mean) / self.scale)
        }

        pub fn inverse_transform(&self, y: ArrayView1<'_, f64>) -> Array1<f64> {
            y.mapv(|v| v * self.scale + self.mean)
        }
    }
}

/// Input validation
pub mod validation {
    use super::*;

    /// Check that X and y are non-empty, conformable and finite
    pub fn validate_training_data(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(KrlsError::EmptyDataset);
        }
        if y.len() != x.nrows() {
            return Err(KrlsError::DimensionMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        check_finite_matrix(x, "feature matrix")?;
        check_finite_vector(y, "response")
    }

    pub fn check_finite_matrix(x: ArrayView2<'_, f64>, what: &str) -> Result<()> {
        if let Some(((row, col), value)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(KrlsError::NonFiniteInput(format!(
                "{what} has {value} at row {row}, column {col}"
            )));
        }
        Ok(())
    }

    pub fn check_finite_vector(y: ArrayView1<'_, f64>, what: &str) -> Result<()> {
        if let Some((index, value)) = y.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(KrlsError::NonFiniteInput(format!(
                "{what} has {value} at position {index}"
            )));
        }
        Ok(())
    }

    /// Whether every value of a column is 0 or 1, up to round-off from
    /// undoing a standardization
    pub fn is_binary_column(column: ArrayView1<'_, f64>) -> bool {
        const TOLERANCE: f64 = 1e-9;
        column
            .iter()
            .all(|&v| v.abs() <= TOLERANCE || (v - 1.0).abs() <= TOLERANCE)
    }
}

/// Goodness-of-fit statistics
pub mod stats {
    use super::*;

    pub fn mean_squared_error(
        predicted: ArrayView1<'_, f64>,
        actual: ArrayView1<'_, f64>,
    ) -> Result<f64> {
        if predicted.len() != actual.len() {
            return Err(KrlsError::DimensionMismatch {
                expected: actual.len(),
                actual: predicted.len(),
            });
        }
        if actual.is_empty() {
            return Err(KrlsError::EmptyDataset);
        }
        let diff = &predicted - &actual;
        Ok(diff.dot(&diff) / actual.len() as f64)
    }

    /// 1 − SS_res / SS_tot
    pub fn r_squared(fitted: ArrayView1<'_, f64>, actual: ArrayView1<'_, f64>) -> Result<f64> {
        let mse = mean_squared_error(fitted, actual)?;
        let mean = actual.mean().ok_or(KrlsError::EmptyDataset)?;
        let total = actual.iter().map(|&v| (v - mean).powi(2)).sum::<f64>();
        if total == 0.0 {
            return Ok(if mse == 0.0 { 1.0 } else { 0.0 });
        }
        Ok(1.0 - mse * actual.len() as f64 / total)
    }
}

/// Memory estimates
pub mod memory {
    /// Bytes of an N×N kernel matrix of f64
    pub fn estimate_kernel_memory(n_samples: usize) -> usize {
        n_samples
            .saturating_mul(n_samples)
            .saturating_mul(std::mem::size_of::<f64>())
    }

    /// Largest N whose kernel matrix fits in `available_memory_mb`
    pub fn max_materialized_samples(available_memory_mb: usize) -> usize {
        let bytes = available_memory_mb.saturating_mul(1024 * 1024);
        ((bytes / std::mem::size_of::<f64>()) as f64).sqrt().floor() as usize
    }
}
