//! Rank-k eigendecomposition engine
//!
//! Produces the leading eigenpairs (U, Λ) of a kernel matrix, either exactly
//! through a dense symmetric eigensolver or approximately through randomized
//! subspace iteration. Every decomposition leaving this module has passed two
//! checks at the boundary:
//!
//! - the spectrum is non-negative up to a small relative tolerance
//!   (anything more negative is `UnstableDecomposition`, never clamped), and
//! - optionally, the Rayleigh quotients uᵢᵗ K uᵢ agree with the returned λᵢ,
//!   which rejects a spectrum that has been squared or otherwise rescaled.

pub mod dense;
pub mod randomized;

use crate::core::{
    DecompositionConfig, DecompositionStrategy, KrlsError, Result, SymmetricOperator,
};
use crate::kernel::{kernel_matrix, kernel_matrix_bytes, Kernel, KernelOperator};
use log::{debug, info};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

pub use self::dense::symmetric_eigen;
pub use self::randomized::randomized_eigen;

/// Relative tolerance for the Rayleigh quotient check
const SCALE_TOLERANCE: f64 = 1e-6;

/// How a decomposition was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecompositionMethod {
    /// Dense eigensolver on the materialized kernel matrix
    Exact,
    /// Randomized subspace iteration on the materialized kernel matrix
    RandomizedDense,
    /// Randomized subspace iteration on the streaming kernel operator
    RandomizedStreaming,
}

impl DecompositionMethod {
    pub fn is_exact(&self) -> bool {
        matches!(self, DecompositionMethod::Exact)
    }
}

/// Leading eigenpairs (U, Λ) of a symmetric positive semi-definite matrix
///
/// `vectors` is N×k with orthonormal columns, `values` has length k, is sorted
/// descending and holds the eigenvalues themselves (not their squares).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Eigendecomposition {
    vectors: Array2<f64>,
    values: Array1<f64>,
    method: DecompositionMethod,
}

impl Eigendecomposition {
    /// Assemble a decomposition from known parts
    ///
    /// Values must be finite, non-negative and sorted descending, and there
    /// must be one value per column of `vectors`.
    pub fn from_parts(
        vectors: Array2<f64>,
        values: Array1<f64>,
        method: DecompositionMethod,
    ) -> Result<Self> {
        if vectors.ncols() != values.len() {
            return Err(KrlsError::DimensionMismatch {
                expected: vectors.ncols(),
                actual: values.len(),
            });
        }
        if values.is_empty() {
            return Err(KrlsError::InvalidParameter(
                "Decomposition must keep at least one eigenpair".to_string(),
            ));
        }
        for (index, &value) in values.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(KrlsError::UnstableDecomposition { index, value });
            }
        }
        if values.windows(2).into_iter().any(|w| w[1] > w[0]) {
            return Err(KrlsError::InvalidParameter(
                "Eigenvalues must be sorted in descending order".to_string(),
            ));
        }
        Ok(Self {
            vectors,
            values,
            method,
        })
    }

    /// Eigenvectors U (N×k)
    pub fn vectors(&self) -> ArrayView2<'_, f64> {
        self.vectors.view()
    }

    /// Eigenvalues Λ (length k, descending)
    pub fn values(&self) -> ArrayView1<'_, f64> {
        self.values.view()
    }

    pub fn method(&self) -> DecompositionMethod {
        self.method
    }

    /// Number of retained eigenpairs k
    pub fn rank(&self) -> usize {
        self.values.len()
    }

    /// Number of observations N
    pub fn n_samples(&self) -> usize {
        self.vectors.nrows()
    }

    /// Keep the leading `rank` eigenpairs
    pub fn truncate(&self, rank: usize) -> Result<Self> {
        if rank == 0 || rank > self.rank() {
            return Err(KrlsError::InvalidParameter(format!(
                "Cannot truncate a rank-{} decomposition to rank {rank}",
                self.rank()
            )));
        }
        Ok(Self {
            vectors: self.vectors.slice(s![.., ..rank]).to_owned(),
            values: self.values.slice(s![..rank]).to_owned(),
            method: self.method,
        })
    }

    /// Compute K_approx · v = U diag(Λ) Uᵗ v in O(Nk)
    pub fn apply(&self, v: ArrayView1<'_, f64>) -> Result<Array1<f64>> {
        if v.len() != self.n_samples() {
            return Err(KrlsError::DimensionMismatch {
                expected: self.n_samples(),
                actual: v.len(),
            });
        }
        let projected = self.vectors.t().dot(&v) * &self.values;
        Ok(self.vectors.dot(&projected))
    }

    /// Materialize U diag(Λ) Uᵗ (diagnostics and tests only, O(N²))
    pub fn reconstruct(&self) -> Array2<f64> {
        let scaled = &self.vectors * &self.values;
        scaled.dot(&self.vectors.t())
    }
}

/// Reject spectra that are too negative; zero out negative rounding noise
///
/// The tolerance is relative to max(1, λ_max).
pub fn check_spectrum(values: &mut Array1<f64>, negative_tolerance: f64) -> Result<()> {
    let scale = values
        .iter()
        .filter(|v| v.is_finite())
        .fold(1.0_f64, |acc, v| acc.max(v.abs()));
    for (index, value) in values.iter_mut().enumerate() {
        if !value.is_finite() || *value < -negative_tolerance * scale {
            return Err(KrlsError::UnstableDecomposition {
                index,
                value: *value,
            });
        }
        if *value < 0.0 {
            *value = 0.0;
        }
    }
    Ok(())
}

/// Check that λᵢ matches the Rayleigh quotient uᵢᵗ A uᵢ for every pair
///
/// Fails with `UnstableDecomposition` naming the first offending pair.
pub fn verify_eigenvalue_scale<O: SymmetricOperator + ?Sized>(
    operator: &O,
    decomposition: &Eigendecomposition,
) -> Result<()> {
    let vectors = decomposition.vectors();
    let product = operator.apply(vectors);
    let scale = decomposition.values()[0].max(1.0);
    for (index, (u, au)) in vectors
        .axis_iter(Axis(1))
        .zip(product.axis_iter(Axis(1)))
        .enumerate()
    {
        let quotient = u.dot(&au);
        let value = decomposition.values()[index];
        if (quotient - value).abs() > SCALE_TOLERANCE * scale {
            debug!(
                "Eigenvalue {index} is {value:e} but its Rayleigh quotient is {quotient:e}"
            );
            return Err(KrlsError::UnstableDecomposition { index, value });
        }
    }
    Ok(())
}

fn use_exact_solver(n: usize, rank: usize, config: &DecompositionConfig) -> bool {
    match config.strategy {
        DecompositionStrategy::Exact => true,
        DecompositionStrategy::Randomized => false,
        DecompositionStrategy::Auto => {
            n <= config.exact_threshold || rank + config.oversampling >= n
        }
    }
}

fn finish(
    operator: &(impl SymmetricOperator + ?Sized),
    mut values: Array1<f64>,
    vectors: Array2<f64>,
    method: DecompositionMethod,
    config: &DecompositionConfig,
) -> Result<Eigendecomposition> {
    check_spectrum(&mut values, config.negative_tolerance)?;
    let decomposition = Eigendecomposition::from_parts(vectors, values, method)?;
    if config.verify_scale {
        verify_eigenvalue_scale(operator, &decomposition)?;
    }
    Ok(decomposition)
}

/// Rank-k decomposition of an explicit symmetric matrix
pub fn decompose_matrix(
    matrix: &Array2<f64>,
    rank: usize,
    config: &DecompositionConfig,
) -> Result<Eigendecomposition> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(KrlsError::DimensionMismatch {
            expected: n,
            actual: matrix.ncols(),
        });
    }
    validate_rank(n, rank)?;

    if use_exact_solver(n, rank, config) {
        let (values, vectors) = symmetric_eigen(matrix.view())?;
        let values = values.slice(s![..rank]).to_owned();
        let vectors = vectors.slice(s![.., ..rank]).to_owned();
        finish(matrix, values, vectors, DecompositionMethod::Exact, config)
    } else {
        let (values, vectors) = randomized_eigen(matrix, rank, config)?;
        finish(
            matrix,
            values,
            vectors,
            DecompositionMethod::RandomizedDense,
            config,
        )
    }
}

/// Rank-k decomposition of an implicit operator (always randomized)
pub fn decompose_operator<O: SymmetricOperator + ?Sized>(
    operator: &O,
    rank: usize,
    config: &DecompositionConfig,
) -> Result<Eigendecomposition> {
    validate_rank(operator.dim(), rank)?;
    let (values, vectors) = randomized_eigen(operator, rank, config)?;
    finish(
        operator,
        values,
        vectors,
        DecompositionMethod::RandomizedStreaming,
        config,
    )
}

/// Rank-k decomposition of the kernel matrix of `x`
///
/// The kernel matrix is materialized only when it fits in
/// `config.gram_budget_bytes`; it is dropped before this function returns, so
/// only the N×k decomposition outlives the call. Above the budget the
/// streaming operator is used and K never exists in memory.
pub fn decompose_kernel<'a, K: Kernel>(
    kernel: &'a K,
    x: ArrayView2<'a, f64>,
    rank: usize,
    config: &DecompositionConfig,
) -> Result<Eigendecomposition> {
    let n = x.nrows();
    validate_rank(n, rank)?;

    let fits_budget =
        matches!(kernel_matrix_bytes(n), Some(bytes) if bytes <= config.gram_budget_bytes);
    let exact = use_exact_solver(n, rank, config);

    if exact && !fits_budget && config.strategy == DecompositionStrategy::Exact {
        return Err(KrlsError::InvalidParameter(format!(
            "Exact decomposition of {n} observations exceeds the kernel matrix budget of {} bytes",
            config.gram_budget_bytes
        )));
    }

    if fits_budget {
        info!(
            "Materializing {n}x{n} kernel matrix ({} decomposition, rank {rank})",
            if exact { "exact" } else { "randomized" }
        );
        let matrix = kernel_matrix(kernel, x);
        decompose_matrix(&matrix, rank, config)
    } else {
        info!("Kernel matrix for {n} observations exceeds budget, streaming at rank {rank}");
        let operator = KernelOperator::new(kernel, x);
        decompose_operator(&operator, rank, config)
    }
}

fn validate_rank(n: usize, rank: usize) -> Result<()> {
    if n == 0 {
        return Err(KrlsError::EmptyDataset);
    }
    if rank == 0 || rank > n {
        return Err(KrlsError::InvalidParameter(format!(
            "Rank must be in [1, {n}], got: {rank}"
        )));
    }
    Ok(())
}
