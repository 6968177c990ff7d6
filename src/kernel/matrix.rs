//! Kernel (Gram) matrix construction
//!
//! Provides the materialized N×N kernel matrix, the rectangular cross-kernel
//! used for prediction, and a streaming operator that multiplies by the kernel
//! matrix without ever storing it.

use crate::core::{KrlsError, Result, SymmetricOperator};
use crate::kernel::Kernel;
use ndarray::{Array2, ArrayView2, Axis};
use rayon::prelude::*;

/// Build the full kernel matrix K[i, j] = k(x_i, x_j)
///
/// Rows are computed in parallel. The result is exactly symmetric as long as
/// the kernel is symmetric in its arguments.
pub fn kernel_matrix<K: Kernel>(kernel: &K, x: ArrayView2<'_, f64>) -> Array2<f64> {
    let n = x.nrows();
    let mut matrix = Array2::zeros((n, n));
    matrix
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .enumerate()
        .for_each(|(i, mut row)| {
            let xi = x.row(i);
            for (j, xj) in x.outer_iter().enumerate() {
                row[j] = kernel.compute(xi, xj);
            }
        });
    matrix
}

/// Build the rectangular kernel matrix between new points and training points
///
/// Returns an (n_new × n_train) matrix.
pub fn cross_kernel<K: Kernel>(
    kernel: &K,
    x_new: ArrayView2<'_, f64>,
    x_train: ArrayView2<'_, f64>,
) -> Result<Array2<f64>> {
    if x_new.ncols() != x_train.ncols() {
        return Err(KrlsError::DimensionMismatch {
            expected: x_train.ncols(),
            actual: x_new.ncols(),
        });
    }

    let mut matrix = Array2::zeros((x_new.nrows(), x_train.nrows()));
    matrix
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(x_new.axis_iter(Axis(0)).into_par_iter())
        .for_each(|(mut row, xi)| {
            for (out, xj) in row.iter_mut().zip(x_train.outer_iter()) {
                *out = kernel.compute(xi, xj);
            }
        });
    Ok(matrix)
}

/// Size in bytes of a dense N×N f64 kernel matrix, or None on overflow
pub fn kernel_matrix_bytes(n: usize) -> Option<usize> {
    n.checked_mul(n)?.checked_mul(std::mem::size_of::<f64>())
}

/// Kernel matrix as an implicit operator
///
/// Each product `K · V` recomputes the kernel row by row, so memory stays at
/// O(N·m) for an N×m block instead of O(N²). The price is O(N²D) kernel
/// evaluations per product.
pub struct KernelOperator<'a, K: Kernel> {
    kernel: &'a K,
    x: ArrayView2<'a, f64>,
}

impl<'a, K: Kernel> KernelOperator<'a, K> {
    pub fn new(kernel: &'a K, x: ArrayView2<'a, f64>) -> Self {
        Self { kernel, x }
    }

    /// Materialize the operator (for small problems and tests)
    pub fn to_dense(&self) -> Array2<f64> {
        kernel_matrix(self.kernel, self.x)
    }
}

impl<K: Kernel> SymmetricOperator for KernelOperator<'_, K> {
    fn dim(&self) -> usize {
        self.x.nrows()
    }

    fn apply(&self, block: ArrayView2<'_, f64>) -> Array2<f64> {
        assert_eq!(
            self.x.nrows(),
            block.nrows(),
            "Operator has {} columns but block has {} rows",
            self.x.nrows(),
            block.nrows()
        );

        let mut out = Array2::zeros((self.x.nrows(), block.ncols()));
        out.axis_iter_mut(Axis(0))
            .into_par_iter()
            .zip(self.x.axis_iter(Axis(0)).into_par_iter())
            .for_each(|(mut out_row, xi)| {
                for (xj, block_row) in self.x.outer_iter().zip(block.outer_iter()) {
                    let kij = self.kernel.compute(xi, xj);
                    out_row.scaled_add(kij, &block_row);
                }
            });
        out
    }
}
