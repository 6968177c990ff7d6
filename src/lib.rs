//! Kernel Regularized Least Squares with low-rank kernel approximation
//!
//! Fits KRLS models with a Gaussian kernel whose N×N Gram matrix is replaced
//! by its leading k eigenpairs, and selects the regularization λ by
//! minimizing the closed-form leave-one-out error.

pub mod api;
pub mod cache;
pub mod core;
pub mod data;
pub mod decomposition;
pub mod kernel;
pub mod optimizer;
pub mod persistence;
pub mod solver;
pub mod sweep;
pub mod utils;

// Re-export main types for convenience
pub use crate::api::{FitState, FittedKrls, Krls, KrlsEstimator, ModelInfo};
pub use crate::cache::{CacheStats, DecompositionCache};
pub use crate::core::traits::*;
pub use crate::core::types::*;
pub use crate::core::{KrlsError, Result};
pub use crate::data::{CsvTable, RegressionData};
pub use crate::decomposition::{DecompositionMethod, Eigendecomposition};
pub use crate::kernel::{GaussianKernel, Kernel};
pub use crate::optimizer::{search_lambda, RegularizationSearch};
pub use crate::persistence::SerializableModel;
pub use crate::solver::{LooEstimator, RegularizedInverse};
pub use crate::sweep::{loo_grid, monotonicity_violations, SweepPoint};

// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
