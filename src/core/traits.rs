//! Core traits for KRLS implementation

use crate::core::Result;
use ndarray::{Array1, Array2, ArrayView2};

/// Symmetric linear operator acting on blocks of column vectors
///
/// The eigendecomposition engine only needs products `A · V`, so a kernel
/// matrix can be supplied either materialized or as a streaming operator
/// that recomputes its entries on the fly.
pub trait SymmetricOperator: Send + Sync {
    /// Number of rows (and columns) of the operator
    fn dim(&self) -> usize;

    /// Compute `A · block`
    ///
    /// # Panics
    /// Panics if `block.nrows() != self.dim()`
    fn apply(&self, block: ArrayView2<'_, f64>) -> Array2<f64>;
}

impl SymmetricOperator for Array2<f64> {
    fn dim(&self) -> usize {
        self.nrows()
    }

    fn apply(&self, block: ArrayView2<'_, f64>) -> Array2<f64> {
        assert_eq!(
            self.ncols(),
            block.nrows(),
            "Operator has {} columns but block has {} rows",
            self.ncols(),
            block.nrows()
        );
        self.dot(&block)
    }
}

/// Fitted regression model
pub trait RegressionModel: Send + Sync {
    /// Predict the response for each row of `x`
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>>;

    /// Number of covariates the model was fitted on
    fn n_features(&self) -> usize;

    /// Number of training observations
    fn n_samples(&self) -> usize;
}
