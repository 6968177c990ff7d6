//! Gaussian (RBF) kernel implementation
//!
//! The kernel is defined as: K(x, y) = exp(-||x - y||² / σ)
//! where σ (sigma) is the bandwidth. Larger σ means slower similarity decay.

use crate::core::{KrlsError, Result};
use crate::kernel::Kernel;
use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use rayon::prelude::*;

/// Gaussian kernel: K(x, y) = exp(-||x - y||² / σ)
///
/// On standardized covariates the conventional bandwidth is σ = D, the number
/// of covariates, which keeps the expected squared distance between two
/// observations (2D) on the same scale as σ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernel {
    sigma: f64,
}

impl GaussianKernel {
    /// Create a new Gaussian kernel with bandwidth `sigma`
    ///
    /// Fails with `InvalidParameter` if sigma is not strictly positive and finite.
    pub fn new(sigma: f64) -> Result<Self> {
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(KrlsError::InvalidParameter(format!(
                "Bandwidth must be positive, got: {sigma}"
            )));
        }
        Ok(Self { sigma })
    }

    /// Create a Gaussian kernel with σ = n_features
    pub fn with_auto_bandwidth(n_features: usize) -> Result<Self> {
        if n_features == 0 {
            return Err(KrlsError::InvalidParameter(
                "Number of features must be positive".to_string(),
            ));
        }
        Self::new(n_features as f64)
    }

    /// Get the bandwidth
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Kernel value from a squared distance
    #[inline]
    pub fn from_squared_distance(&self, squared_distance: f64) -> f64 {
        (-squared_distance / self.sigma).exp()
    }

    /// Pointwise partial derivatives of f(x) = Σ_j c_j K(x, centers_j)
    ///
    /// Returns an (n_points × D) matrix whose (i, d) entry is
    /// ∂f/∂x_d evaluated at `points[i]`:
    ///
    /// -(2/σ) Σ_j c_j K(x_i, x_j) (x_id − x_jd)
    ///
    /// The kernel values are recomputed row by row, so no n_points × N
    /// matrix is ever stored.
    pub fn pointwise_derivatives(
        &self,
        points: ArrayView2<'_, f64>,
        centers: ArrayView2<'_, f64>,
        coefficients: ArrayView1<'_, f64>,
    ) -> Result<Array2<f64>> {
        if points.ncols() != centers.ncols() {
            return Err(KrlsError::DimensionMismatch {
                expected: centers.ncols(),
                actual: points.ncols(),
            });
        }
        if coefficients.len() != centers.nrows() {
            return Err(KrlsError::DimensionMismatch {
                expected: centers.nrows(),
                actual: coefficients.len(),
            });
        }

        let scale = -2.0 / self.sigma;
        let mut derivatives = Array2::zeros((points.nrows(), points.ncols()));
        derivatives
            .axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(points.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut out, xi)| {
                for (xj, &cj) in centers.outer_iter().zip(coefficients.iter()) {
                    let weight = cj * self.compute(xi, xj);
                    for ((o, &a), &b) in out.iter_mut().zip(xi.iter()).zip(xj.iter()) {
                        *o += weight * (a - b);
                    }
                }
                out.mapv_inplace(|v| v * scale);
            });
        Ok(derivatives)
    }
}

impl Kernel for GaussianKernel {
    fn compute(&self, x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
        self.from_squared_distance(squared_euclidean_distance(x, y))
    }
}

/// Squared Euclidean distance between two dense vectors
///
/// Summing (xᵢ - yᵢ)² directly keeps the result exactly symmetric in its
/// arguments, which the kernel matrix relies on.
pub fn squared_euclidean_distance(x: ArrayView1<'_, f64>, y: ArrayView1<'_, f64>) -> f64 {
    x.iter()
        .zip(y.iter())
        .map(|(&a, &b)| {
            let diff = a - b;
            diff * diff
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1};

    #[test]
    fn test_gaussian_kernel_creation() {
        let kernel = GaussianKernel::new(0.5).unwrap();
        assert_eq!(kernel.sigma(), 0.5);

        let kernel_auto = GaussianKernel::with_auto_bandwidth(10).unwrap();
        assert_eq!(kernel_auto.sigma(), 10.0);
    }

    #[test]
    fn test_gaussian_kernel_invalid_bandwidth() {
        assert!(matches!(
            GaussianKernel::new(-0.5),
            Err(KrlsError::InvalidParameter(_))
        ));
        assert!(GaussianKernel::new(0.0).is_err());
        assert!(GaussianKernel::new(f64::INFINITY).is_err());
        assert!(GaussianKernel::with_auto_bandwidth(0).is_err());
    }

    #[test]
    fn test_gaussian_kernel_identical_vectors() {
        let kernel = GaussianKernel::new(1.0).unwrap();
        let x = array![1.0, 2.0, 3.0];
        assert_eq!(kernel.compute(x.view(), x.view()), 1.0);
    }

    #[test]
    fn test_gaussian_kernel_known_value() {
        let kernel = GaussianKernel::new(2.0).unwrap();
        let x = array![0.0, 0.0];
        let y = array![1.0, 1.0];
        // ||x - y||² = 2, K = exp(-2 / 2)
        assert_relative_eq!(
            kernel.compute(x.view(), y.view()),
            (-1.0_f64).exp(),
            epsilon = 1e-15
        );
    }

    #[test]
    fn test_gaussian_kernel_bandwidth_ordering() {
        let x = array![1.0];
        let y = array![3.0];
        let narrow = GaussianKernel::new(0.1).unwrap();
        let wide = GaussianKernel::new(10.0).unwrap();
        // Wider bandwidth keeps distant points more similar
        assert!(wide.compute(x.view(), y.view()) > narrow.compute(x.view(), y.view()));
    }

    #[test]
    fn test_gaussian_kernel_symmetric_in_arguments() {
        let kernel = GaussianKernel::new(2.0).unwrap();
        let x = array![3.0, 4.0];
        let y = array![1.0, 2.0];
        let forward = kernel.compute(x.view(), y.view());
        assert_eq!(forward, kernel.compute(y.view(), x.view()));
        // ||x - y||² = 8
        assert_relative_eq!(forward, (-4.0f64).exp(), epsilon = 1e-12);
    }

    #[test]
    fn test_squared_distance_symmetric() {
        let x = array![0.1, -2.3, 7.7];
        let y = array![1.9, 0.4, -3.3];
        assert_eq!(
            squared_euclidean_distance(x.view(), y.view()),
            squared_euclidean_distance(y.view(), x.view())
        );
    }

    #[test]
    fn test_pointwise_derivatives_match_finite_differences() {
        let kernel = GaussianKernel::new(1.5).unwrap();
        let centers = array![[0.0, 0.0], [1.0, 0.5], [-0.5, 1.0], [0.3, -0.7]];
        let coefficients = array![0.7, -1.2, 0.4, 2.0];
        let points = array![[0.2, 0.1], [-0.4, 0.6]];

        let derivatives = kernel
            .pointwise_derivatives(points.view(), centers.view(), coefficients.view())
            .unwrap();

        let f = |p: &Array1<f64>| -> f64 {
            centers
                .outer_iter()
                .zip(coefficients.iter())
                .map(|(c, &w)| w * kernel.compute(p.view(), c))
                .sum()
        };

        let h = 1e-6;
        for (i, point) in points.outer_iter().enumerate() {
            for d in 0..2 {
                let mut plus = point.to_owned();
                let mut minus = point.to_owned();
                plus[d] += h;
                minus[d] -= h;
                let numeric = (f(&plus) - f(&minus)) / (2.0 * h);
                assert_relative_eq!(derivatives[[i, d]], numeric, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_pointwise_derivatives_shape_checks() {
        let kernel = GaussianKernel::new(1.0).unwrap();
        let centers = array![[0.0, 0.0], [1.0, 1.0]];
        let bad_points = array![[0.0, 0.0, 0.0]];
        let coefficients = array![1.0, 1.0];
        assert!(matches!(
            kernel.pointwise_derivatives(bad_points.view(), centers.view(), coefficients.view()),
            Err(KrlsError::DimensionMismatch { .. })
        ));

        let short = array![1.0];
        assert!(kernel
            .pointwise_derivatives(centers.view(), centers.view(), short.view())
            .is_err());
    }
}
