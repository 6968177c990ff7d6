//! Implicit regularized inverse of the low-rank kernel matrix
//!
//! For K_approx = U diag(Λ) Uᵗ with orthonormal U (N×k) and λ > 0,
//!
//! (K_approx + λI)⁻¹ = U diag(1/(Λ+λ)) Uᵗ + (1/λ)(I − UUᵗ)
//!
//! Products and the diagonal are evaluated from U and Λ alone in O(Nk); the
//! N×N inverse is never formed. The second term vanishes when k = N. The
//! `Projected` form drops it, which turns the operator into the regularized
//! pseudo-inverse on span(U).

use crate::core::{InverseForm, KrlsError, Result};
use crate::decomposition::Eigendecomposition;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// Eigenvalues at or below this fraction of λ_max are treated as zero
const ZERO_EIGENVALUE: f64 = 1e-14;

/// (U diag(Λ) Uᵗ + λI)⁻¹ as an implicit operator
#[derive(Debug, Clone)]
pub struct RegularizedInverse<'a> {
    decomposition: &'a Eigendecomposition,
    lambda: f64,
    weights: Array1<f64>,
    complement: Option<f64>,
}

impl<'a> RegularizedInverse<'a> {
    /// Prepare the operator for a given λ
    ///
    /// Fails with `InvalidParameter` for negative or non-finite λ and with
    /// `SingularMatrix` when λ = 0 meets a zero eigenvalue (or a nonempty
    /// complement in the `Complemented` form).
    pub fn new(
        decomposition: &'a Eigendecomposition,
        lambda: f64,
        form: InverseForm,
    ) -> Result<Self> {
        if !(lambda.is_finite() && lambda >= 0.0) {
            return Err(KrlsError::InvalidParameter(format!(
                "Regularization must be non-negative and finite, got: {lambda}"
            )));
        }

        let values = decomposition.values();
        let truncated = decomposition.rank() < decomposition.n_samples();

        if lambda == 0.0 {
            let floor = ZERO_EIGENVALUE * values[0];
            if let Some(index) = values.iter().position(|&v| v <= floor) {
                return Err(KrlsError::SingularMatrix(format!(
                    "lambda = 0 with eigenvalue {index} equal to {:e}",
                    values[index]
                )));
            }
            if truncated && form == InverseForm::Complemented {
                return Err(KrlsError::SingularMatrix(format!(
                    "lambda = 0 with a rank-{} approximation of {} observations",
                    decomposition.rank(),
                    decomposition.n_samples()
                )));
            }
        }

        let weights = values.mapv(|v| 1.0 / (v + lambda));
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(KrlsError::SingularMatrix(format!(
                "1/(eigenvalue + {lambda:e}) is not finite"
            )));
        }

        let complement = (truncated && form == InverseForm::Complemented).then(|| 1.0 / lambda);

        Ok(Self {
            decomposition,
            lambda,
            weights,
            complement,
        })
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Compute (K_approx + λI)⁻¹ v
    pub fn apply(&self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        let u = self.decomposition.vectors();
        if v.len() != u.nrows() {
            return Err(KrlsError::DimensionMismatch {
                expected: u.nrows(),
                actual: v.len(),
            });
        }
        let coords = u.t().dot(&v);
        let mut out = u.dot(&(&coords * &self.weights));
        if let Some(inv_lambda) = self.complement {
            // (1/λ)(v − U Uᵗ v)
            let in_span = u.dot(&coords);
            out.scaled_add(inv_lambda, &v);
            out.scaled_add(-inv_lambda, &in_span);
        }
        Ok(out)
    }

    /// Compute (K_approx + λI)⁻¹ V for a block of column vectors
    pub fn apply_matrix(&self, block: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        let u = self.decomposition.vectors();
        if block.nrows() != u.nrows() {
            return Err(KrlsError::DimensionMismatch {
                expected: u.nrows(),
                actual: block.nrows(),
            });
        }
        let coords = u.t().dot(&block);
        let weighted = &coords * &self.weights.view().insert_axis(Axis(1));
        let mut out = u.dot(&weighted);
        if let Some(inv_lambda) = self.complement {
            let in_span = u.dot(&coords);
            out.scaled_add(inv_lambda, &block);
            out.scaled_add(-inv_lambda, &in_span);
        }
        Ok(out)
    }

    /// Diagonal of (K_approx + λI)⁻¹ without forming off-diagonal entries
    ///
    /// diag_i = Σ_j U[i,j]² / (Λ_j + λ)  (+ (1/λ)(1 − Σ_j U[i,j]²) when complemented)
    pub fn diagonal(&self) -> Array1<f64> {
        let u = self.decomposition.vectors();
        u.map_axis(Axis(1), |row| {
            let mut weighted = 0.0;
            let mut leverage = 0.0;
            for (&uij, &wj) in row.iter().zip(self.weights.iter()) {
                let sq = uij * uij;
                weighted += sq * wj;
                leverage += sq;
            }
            match self.complement {
                Some(inv_lambda) => weighted + inv_lambda * (1.0 - leverage).max(0.0),
                None => weighted,
            }
        })
    }

    /// Materialize the inverse (O(N²), small problems and tests only)
    pub fn to_dense(&self) -> Result<Array2<f64>> {
        let n = self.decomposition.n_samples();
        self.apply_matrix(Array2::<f64>::eye(n).view())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decomposition::{symmetric_eigen, DecompositionMethod};
    use approx::assert_abs_diff_eq;
    use ndarray::{array, s};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    /// Random rank-k decomposition with orthonormal U
    fn random_decomposition(n: usize, k: usize, seed: u64) -> Eigendecomposition {
        let mut rng = StdRng::seed_from_u64(seed);
        let a = Array2::from_shape_fn((n, n), |_| rng.sample::<f64, _>(StandardNormal));
        let sym = &a + &a.t();
        let (_, vectors) = symmetric_eigen(sym.view()).unwrap();
        let values = Array1::from_iter((0..k).map(|i| 10.0 / (i as f64 + 1.0)));
        Eigendecomposition::from_parts(
            vectors.slice(s![.., ..k]).to_owned(),
            values,
            DecompositionMethod::Exact,
        )
        .unwrap()
    }

    /// Explicit (U diag(Λ) Uᵗ + λI)⁻¹ via a dense eigensolve
    fn explicit_inverse(decomposition: &Eigendecomposition, lambda: f64) -> Array2<f64> {
        let n = decomposition.n_samples();
        let g = decomposition.reconstruct() + Array2::<f64>::eye(n) * lambda;
        let (values, vectors) = symmetric_eigen(g.view()).unwrap();
        let inv_values = values.mapv(|v| 1.0 / v);
        (&vectors * &inv_values).dot(&vectors.t())
    }

    #[test]
    fn test_diagonal_matches_explicit_inverse() {
        for (k, lambda) in [(12, 0.3), (5, 0.3), (5, 2.0), (1, 0.01)] {
            let decomposition = random_decomposition(12, k, 17);
            let inverse =
                RegularizedInverse::new(&decomposition, lambda, InverseForm::Complemented)
                    .unwrap();
            let explicit = explicit_inverse(&decomposition, lambda);
            let diagonal = inverse.diagonal();
            for i in 0..12 {
                assert_abs_diff_eq!(diagonal[i], explicit[[i, i]], epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_apply_matches_explicit_inverse() {
        let decomposition = random_decomposition(10, 4, 23);
        let lambda = 0.7;
        let inverse =
            RegularizedInverse::new(&decomposition, lambda, InverseForm::Complemented).unwrap();
        let explicit = explicit_inverse(&decomposition, lambda);

        let v = Array1::from_iter((0..10).map(|i| (i as f64 * 0.37).cos()));
        let implicit = inverse.apply(v.view()).unwrap();
        let expected = explicit.dot(&v);
        for (a, b) in implicit.iter().zip(expected.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }

        let dense = inverse.to_dense().unwrap();
        for (a, b) in dense.iter().zip(explicit.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_forms_agree_at_full_rank() {
        let decomposition = random_decomposition(8, 8, 31);
        let complemented =
            RegularizedInverse::new(&decomposition, 0.5, InverseForm::Complemented).unwrap();
        let projected =
            RegularizedInverse::new(&decomposition, 0.5, InverseForm::Projected).unwrap();
        let a = complemented.diagonal();
        let b = projected.diagonal();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_abs_diff_eq!(x, y, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_projected_form_stays_in_span() {
        let decomposition = random_decomposition(9, 3, 37);
        let inverse =
            RegularizedInverse::new(&decomposition, 0.2, InverseForm::Projected).unwrap();
        let v = Array1::from_iter((0..9).map(|i| i as f64 - 4.0));
        let out = inverse.apply(v.view()).unwrap();
        // Component outside span(U) is zero
        let u = decomposition.vectors();
        let residual = &out - &u.dot(&u.t().dot(&out));
        assert!(residual.iter().all(|r| r.abs() < 1e-12));
    }

    #[test]
    fn test_zero_lambda_singular_cases() {
        let vectors = Array2::<f64>::eye(3);
        let with_zero = Eigendecomposition::from_parts(
            vectors.clone(),
            array![2.0, 1.0, 0.0],
            DecompositionMethod::Exact,
        )
        .unwrap();
        assert!(matches!(
            RegularizedInverse::new(&with_zero, 0.0, InverseForm::Complemented),
            Err(KrlsError::SingularMatrix(_))
        ));

        let positive = Eigendecomposition::from_parts(
            vectors,
            array![2.0, 1.0, 0.5],
            DecompositionMethod::Exact,
        )
        .unwrap();
        let inverse = RegularizedInverse::new(&positive, 0.0, InverseForm::Complemented).unwrap();
        assert_eq!(inverse.diagonal(), array![0.5, 1.0, 2.0]);

        let truncated = positive.truncate(2).unwrap();
        assert!(matches!(
            RegularizedInverse::new(&truncated, 0.0, InverseForm::Complemented),
            Err(KrlsError::SingularMatrix(_))
        ));
        assert!(RegularizedInverse::new(&truncated, 0.0, InverseForm::Projected).is_ok());
    }

    #[test]
    fn test_negative_lambda_rejected() {
        let decomposition = random_decomposition(4, 2, 41);
        assert!(matches!(
            RegularizedInverse::new(&decomposition, -1.0, InverseForm::Complemented),
            Err(KrlsError::InvalidParameter(_))
        ));
        assert!(RegularizedInverse::new(&decomposition, f64::NAN, InverseForm::Projected).is_err());
    }

    #[test]
    fn test_apply_dimension_mismatch() {
        let decomposition = random_decomposition(4, 2, 43);
        let inverse =
            RegularizedInverse::new(&decomposition, 1.0, InverseForm::Complemented).unwrap();
        assert!(matches!(
            inverse.apply(Array1::<f64>::zeros(3).view()),
            Err(KrlsError::DimensionMismatch {
                expected: 4,
                actual: 3
            })
        ));
    }
}
