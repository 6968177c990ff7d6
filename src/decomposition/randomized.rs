//! Randomized rank-k eigendecomposition
//!
//! Range finder with a Gaussian test matrix, followed by power iterations and a
//! Rayleigh–Ritz step on the projected matrix Qᵗ A Q:
//!
//! 1. Y = A Ω with Ω an N×(k+p) standard normal matrix
//! 2. Q = orth(Y), then q times Q = orth(A Q)
//! 3. B = Qᵗ (A Q), B = W S Wᵗ
//! 4. U = Q W, truncated to the leading k columns
//!
//! The Ritz values S are eigenvalues of A restricted to span(Q), on the same
//! scale as the spectrum of A. Only products with A are needed, so A can be a
//! streaming kernel operator.

use crate::core::{DecompositionConfig, Result, SymmetricOperator};
use crate::decomposition::dense::symmetric_eigen;
use log::debug;
use ndarray::{s, Array1, Array2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Relative norm below which an orthogonalized column counts as collapsed
const COLLAPSE_TOLERANCE: f64 = 1e-10;

/// Attempts at drawing a replacement direction for a collapsed column
const MAX_REDRAWS: usize = 8;

/// Top-`rank` eigenpairs of `operator` by randomized subspace iteration
///
/// Returns `(values, vectors)` sorted by eigenvalue descending.
pub fn randomized_eigen<O: SymmetricOperator + ?Sized>(
    operator: &O,
    rank: usize,
    config: &DecompositionConfig,
) -> Result<(Array1<f64>, Array2<f64>)> {
    let n = operator.dim();
    let width = (rank + config.oversampling).min(n).max(rank);
    let mut rng = StdRng::seed_from_u64(config.seed);

    debug!(
        "Randomized eigendecomposition: n={n}, rank={rank}, sketch width={width}, power iterations={}",
        config.power_iterations
    );

    let omega = Array2::from_shape_fn((n, width), |_| rng.sample::<f64, _>(StandardNormal));
    let mut basis = orthonormalize(operator.apply(omega.view()), &mut rng);
    drop(omega);

    for _ in 0..config.power_iterations {
        basis = orthonormalize(operator.apply(basis.view()), &mut rng);
    }

    let projected_product = operator.apply(basis.view());
    let mut projected = basis.t().dot(&projected_product);
    drop(projected_product);
    symmetrize(&mut projected);

    let (ritz_values, ritz_vectors) = symmetric_eigen(projected.view())?;
    let values = ritz_values.slice(s![..rank]).to_owned();
    let vectors = basis.dot(&ritz_vectors.slice(s![.., ..rank]));
    Ok((values, vectors))
}

fn symmetrize(matrix: &mut Array2<f64>) {
    let n = matrix.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let avg = 0.5 * (matrix[[i, j]] + matrix[[j, i]]);
            matrix[[i, j]] = avg;
            matrix[[j, i]] = avg;
        }
    }
}

/// Remove from column `j` its components along columns `0..j` (two passes)
fn project_out_previous(columns: &mut Array2<f64>, j: usize) {
    for _pass in 0..2 {
        for i in 0..j {
            let qi = columns.column(i).to_owned();
            let proj = qi.dot(&columns.column(j));
            columns.column_mut(j).scaled_add(-proj, &qi);
        }
    }
}

fn column_norm(columns: &Array2<f64>, j: usize) -> f64 {
    let col = columns.column(j);
    col.dot(&col).sqrt()
}

/// Orthonormalize the columns of `y` with modified Gram–Schmidt, twice
///
/// A column that collapses (the operator has numerically lower rank than the
/// sketch width) is replaced by a fresh random direction orthogonal to the
/// columns before it. The output always has as many orthonormal columns as
/// the input; nothing is zero-filled.
pub(crate) fn orthonormalize(mut y: Array2<f64>, rng: &mut StdRng) -> Array2<f64> {
    let m = y.ncols();
    for j in 0..m {
        let original = column_norm(&y, j);
        project_out_previous(&mut y, j);
        let mut norm = column_norm(&y, j);

        let mut redraws = 0;
        while !(norm > COLLAPSE_TOLERANCE * original && norm > f64::MIN_POSITIVE)
            && redraws < MAX_REDRAWS
        {
            for v in y.column_mut(j).iter_mut() {
                *v = rng.sample::<f64, _>(StandardNormal);
            }
            let drawn = column_norm(&y, j);
            project_out_previous(&mut y, j);
            norm = column_norm(&y, j);
            if norm > COLLAPSE_TOLERANCE * drawn {
                break;
            }
            redraws += 1;
        }

        if norm > 0.0 {
            y.column_mut(j).mapv_inplace(|v| v / norm);
        }
    }
    y
}
