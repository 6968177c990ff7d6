//! Closed-form leave-one-out error
//!
//! With G(λ) = K_approx + λI and c = G⁻¹ y, the residual of observation i
//! under a refit without it is c_i / (G⁻¹)_ii, so
//!
//! LOOE(λ) = || (G⁻¹ y) ⊘ diag(G⁻¹) ||₂
//!
//! costs one O(Nk) solve and one O(Nk) diagonal per candidate λ.

use crate::core::{InverseForm, KrlsError, Result};
use crate::decomposition::{symmetric_eigen, Eigendecomposition};
use crate::solver::RegularizedInverse;
use ndarray::{Array1, Array2, ArrayView1};

/// Leave-one-out error as a function of λ for fixed data and decomposition
#[derive(Debug, Clone)]
pub struct LooEstimator<'a> {
    decomposition: &'a Eigendecomposition,
    y: ArrayView1<'a, f64>,
    form: InverseForm,
}

impl<'a> LooEstimator<'a> {
    pub fn new(
        decomposition: &'a Eigendecomposition,
        y: ArrayView1<'a, f64>,
        form: InverseForm,
    ) -> Result<Self> {
        if y.len() != decomposition.n_samples() {
            return Err(KrlsError::DimensionMismatch {
                expected: decomposition.n_samples(),
                actual: y.len(),
            });
        }
        Ok(Self {
            decomposition,
            y,
            form,
        })
    }

    /// Per-observation leave-one-out residuals at `lambda`
    ///
    /// Fails with `NumericOverflow` when a diagonal entry of G⁻¹ is
    /// numerically zero or any residual is not finite.
    pub fn residuals(&self, lambda: f64) -> Result<Array1<f64>> {
        let inverse = RegularizedInverse::new(self.decomposition, lambda, self.form)?;
        let coefficients = inverse.apply(self.y)?;
        let diagonal = inverse.diagonal();

        let largest = diagonal.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        let floor = f64::EPSILON * largest;
        if !largest.is_finite() || diagonal.iter().any(|d| d.abs() <= floor) {
            return Err(KrlsError::NumericOverflow { lambda });
        }

        let residuals = coefficients / diagonal;
        if residuals.iter().any(|r| !r.is_finite()) {
            return Err(KrlsError::NumericOverflow { lambda });
        }
        Ok(residuals)
    }

    /// LOOE(λ), the Euclidean norm of the leave-one-out residuals
    pub fn evaluate(&self, lambda: f64) -> Result<f64> {
        let residuals = self.residuals(lambda)?;
        let looe = residuals.dot(&residuals).sqrt();
        if !looe.is_finite() {
            return Err(KrlsError::NumericOverflow { lambda });
        }
        Ok(looe)
    }

    pub fn n_samples(&self) -> usize {
        self.y.len()
    }
}

/// Leave-one-out residuals by brute force: refit N times on N−1 observations
///
/// O(N⁴); a reference for validating the closed form on small problems.
pub fn explicit_loo_residuals(
    kernel: &Array2<f64>,
    y: ArrayView1<'_, f64>,
    lambda: f64,
) -> Result<Array1<f64>> {
    let n = y.len();
    if kernel.dim() != (n, n) {
        return Err(KrlsError::DimensionMismatch {
            expected: n,
            actual: kernel.nrows(),
        });
    }
    if !(lambda.is_finite() && lambda > 0.0) {
        return Err(KrlsError::InvalidParameter(format!(
            "Brute-force leave-one-out needs lambda > 0, got: {lambda}"
        )));
    }

    let mut residuals = Array1::zeros(n);
    for held_out in 0..n {
        let keep: Vec<usize> = (0..n).filter(|&i| i != held_out).collect();
        let sub_kernel = Array2::from_shape_fn((n - 1, n - 1), |(a, b)| {
            kernel[[keep[a], keep[b]]]
        });
        let sub_y = Array1::from_iter(keep.iter().map(|&i| y[i]));

        let (values, vectors) = symmetric_eigen(sub_kernel.view())?;
        let weights = values.mapv(|v| 1.0 / (v + lambda));
        let alpha = vectors.dot(&(vectors.t().dot(&sub_y) * &weights));

        let cross = Array1::from_iter(keep.iter().map(|&i| kernel[[held_out, i]]));
        residuals[held_out] = y[held_out] - cross.dot(&alpha);
    }
    Ok(residuals)
}

/// Explicit LOOE from a dense kernel, for comparison with `LooEstimator`
pub fn explicit_looe(kernel: &Array2<f64>, y: ArrayView1<'_, f64>, lambda: f64) -> Result<f64> {
    let residuals = explicit_loo_residuals(kernel, y, lambda)?;
    Ok(residuals.dot(&residuals).sqrt())
}
