//! Dense symmetric eigensolver
//!
//! Thin bridge from ndarray to faer's self-adjoint eigendecomposition. This is
//! the only place faer types appear in the crate.

use crate::core::{KrlsError, Result};
use faer::diag::DiagRef;
use faer::{Mat, MatRef, Side};
use ndarray::{Array1, Array2, ArrayView2};

fn mat_from_array(array: ArrayView2<'_, f64>) -> Mat<f64> {
    Mat::from_fn(array.nrows(), array.ncols(), |i, j| array[[i, j]])
}

fn diag_to_vec(diag: DiagRef<'_, f64>) -> Vec<f64> {
    let mat = diag.column_vector().as_mat();
    (0..mat.nrows()).map(|i| mat[(i, 0)]).collect()
}

fn column_from_mat(mat: MatRef<'_, f64>, col: usize) -> impl Iterator<Item = f64> + '_ {
    (0..mat.nrows()).map(move |i| mat[(i, col)])
}

/// Full eigendecomposition of a symmetric matrix, sorted by eigenvalue descending
///
/// Returns `(values, vectors)` with eigenvectors in the columns of `vectors`.
/// Only the lower triangle of `matrix` is read.
pub fn symmetric_eigen(matrix: ArrayView2<'_, f64>) -> Result<(Array1<f64>, Array2<f64>)> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(KrlsError::DimensionMismatch {
            expected: rows,
            actual: cols,
        });
    }
    if rows == 0 {
        return Ok((Array1::zeros(0), Array2::zeros((0, 0))));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(KrlsError::NonFiniteInput(
            "matrix passed to the eigensolver contains NaN or infinity".to_string(),
        ));
    }

    let faer_mat = mat_from_array(matrix);
    let eigen = faer_mat
        .as_ref()
        .self_adjoint_eigen(Side::Lower)
        .map_err(|err| KrlsError::EigenSolver(format!("{err:?}")))?;

    let raw_values = diag_to_vec(eigen.S());
    let raw_vectors = eigen.U();

    let mut order: Vec<usize> = (0..raw_values.len()).collect();
    order.sort_by(|&a, &b| raw_values[b].total_cmp(&raw_values[a]));

    let values = Array1::from_iter(order.iter().map(|&idx| raw_values[idx]));
    let mut vectors = Array2::zeros((rows, order.len()));
    for (dst, &src) in order.iter().enumerate() {
        for (out, v) in vectors
            .column_mut(dst)
            .iter_mut()
            .zip(column_from_mat(raw_vectors, src))
        {
            *out = v;
        }
    }
    Ok((values, vectors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_symmetric_eigen_diagonal() {
        let m = array![[1.0, 0.0, 0.0], [0.0, 5.0, 0.0], [0.0, 0.0, 3.0]];
        let (values, vectors) = symmetric_eigen(m.view()).unwrap();
        assert_abs_diff_eq!(values[0], 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[1], 3.0, epsilon = 1e-12);
        assert_abs_diff_eq!(values[2], 1.0, epsilon = 1e-12);
        // Leading eigenvector is ±e_2
        assert_abs_diff_eq!(vectors[[1, 0]].abs(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_symmetric_eigen_reconstructs() {
        let m = array![[4.0, 1.0, 0.5], [1.0, 3.0, 0.2], [0.5, 0.2, 2.0]];
        let (values, vectors) = symmetric_eigen(m.view()).unwrap();
        let reconstructed = vectors.dot(&Array2::from_diag(&values)).dot(&vectors.t());
        for (a, b) in reconstructed.iter().zip(m.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-10);
        }
        assert!(values[0] >= values[1] && values[1] >= values[2]);
    }

    #[test]
    fn test_symmetric_eigen_rejects_non_square() {
        let m = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        assert!(matches!(
            symmetric_eigen(m.view()),
            Err(KrlsError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_symmetric_eigen_rejects_nan() {
        let m = array![[1.0, f64::NAN], [f64::NAN, 1.0]];
        assert!(matches!(
            symmetric_eigen(m.view()),
            Err(KrlsError::NonFiniteInput(_))
        ));
    }
}
