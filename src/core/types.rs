//! Core type definitions for KRLS

use crate::core::{KrlsError, Result};
use serde::{Deserialize, Serialize};

/// Gaussian kernel bandwidth selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Bandwidth {
    /// σ = number of covariates (on standardized data)
    #[default]
    Auto,
    /// Caller-supplied σ > 0
    Fixed(f64),
}

impl Bandwidth {
    /// Resolve the bandwidth for a feature matrix with `n_features` columns
    pub fn resolve(&self, n_features: usize) -> Result<f64> {
        let sigma = match *self {
            Bandwidth::Auto => n_features as f64,
            Bandwidth::Fixed(sigma) => sigma,
        };
        if !(sigma.is_finite() && sigma > 0.0) {
            return Err(KrlsError::InvalidParameter(format!(
                "Bandwidth must be positive and finite, got: {sigma}"
            )));
        }
        Ok(sigma)
    }
}

/// Regularization scalar selection
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Regularization {
    /// Minimize the leave-one-out error over λ
    #[default]
    Search,
    /// Caller-supplied λ ≥ 0
    Fixed(f64),
}

/// How the rank-k eigenpairs are computed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum DecompositionStrategy {
    /// Exact for small problems, randomized otherwise
    #[default]
    Auto,
    /// Dense symmetric eigensolver, truncated to k
    Exact,
    /// Randomized range finder with power iterations
    Randomized,
}

/// Which operator the implicit inverse represents
///
/// With k < N the two forms differ only on the orthogonal complement of the
/// retained eigenvectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum InverseForm {
    /// (U diag(Λ) Uᵗ + λI)⁻¹ = U diag(1/(Λ+λ)) Uᵗ + (1/λ)(I − UUᵗ)
    #[default]
    Complemented,
    /// U diag(1/(Λ+λ)) Uᵗ, restricted to the span of U
    Projected,
}

/// Configuration for the regularization search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Lower bound for λ
    pub lower: f64,
    /// Upper bound for λ
    pub upper: f64,
    /// Convergence tolerance on log10(λ)
    pub tolerance: f64,
    /// Maximum number of minimizer iterations before the grid fallback
    pub max_iterations: usize,
    /// Number of log-spaced points in the fallback grid
    pub grid_points: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            lower: 1e-8,
            upper: 1e4,
            tolerance: 1e-4,
            max_iterations: 100,
            grid_points: 25,
        }
    }
}

impl SearchConfig {
    /// Check bounds and budgets
    pub fn validate(&self) -> Result<()> {
        if !(self.lower.is_finite() && self.lower > 0.0) {
            return Err(KrlsError::InvalidParameter(format!(
                "Search lower bound must be positive, got: {}",
                self.lower
            )));
        }
        if !(self.upper.is_finite() && self.upper > self.lower) {
            return Err(KrlsError::InvalidParameter(format!(
                "Search upper bound must exceed lower bound {}, got: {}",
                self.lower, self.upper
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(KrlsError::InvalidParameter(format!(
                "Search tolerance must be positive, got: {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(KrlsError::InvalidParameter(
                "Search needs at least one iteration".to_string(),
            ));
        }
        if self.grid_points < 2 {
            return Err(KrlsError::InvalidParameter(format!(
                "Fallback grid needs at least 2 points, got: {}",
                self.grid_points
            )));
        }
        Ok(())
    }
}

/// Configuration for the eigendecomposition engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionConfig {
    /// Exact vs randomized
    pub strategy: DecompositionStrategy,
    /// Extra sketch columns beyond the target rank
    pub oversampling: usize,
    /// Number of power iterations applied to the sketch
    pub power_iterations: usize,
    /// Seed for the Gaussian test matrix
    pub seed: u64,
    /// `Auto` uses the exact solver up to this many observations
    pub exact_threshold: usize,
    /// Largest kernel matrix (in bytes) that may be materialized
    pub gram_budget_bytes: usize,
    /// Relative tolerance for negative eigenvalues
    pub negative_tolerance: f64,
    /// Check Rayleigh quotients against the returned eigenvalues
    pub verify_scale: bool,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            strategy: DecompositionStrategy::Auto,
            oversampling: 10,
            power_iterations: 2,
            seed: 42,
            exact_threshold: 1_000,
            gram_budget_bytes: 512 * 1024 * 1024, // 512MB
            negative_tolerance: 1e-8,
            verify_scale: true,
        }
    }
}

impl DecompositionConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.negative_tolerance.is_finite() && self.negative_tolerance >= 0.0) {
            return Err(KrlsError::InvalidParameter(format!(
                "Negative eigenvalue tolerance must be non-negative, got: {}",
                self.negative_tolerance
            )));
        }
        Ok(())
    }
}

/// Full configuration of a KRLS fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KrlsConfig {
    /// Number of retained eigenpairs (None = full rank)
    pub rank: Option<usize>,
    pub bandwidth: Bandwidth,
    pub regularization: Regularization,
    /// Center and scale X columns and y before fitting
    pub standardize: bool,
    pub search: SearchConfig,
    pub decomposition: DecompositionConfig,
    pub inverse_form: InverseForm,
}

impl Default for KrlsConfig {
    fn default() -> Self {
        Self {
            rank: None,
            bandwidth: Bandwidth::Auto,
            regularization: Regularization::Search,
            standardize: true,
            search: SearchConfig::default(),
            decomposition: DecompositionConfig::default(),
            inverse_form: InverseForm::Complemented,
        }
    }
}

impl KrlsConfig {
    /// Resolve the requested rank against the number of observations
    pub fn resolve_rank(&self, n_samples: usize) -> Result<usize> {
        let rank = self.rank.unwrap_or(n_samples);
        if rank == 0 || rank > n_samples {
            return Err(KrlsError::InvalidParameter(format!(
                "Rank must be in [1, {n_samples}], got: {rank}"
            )));
        }
        Ok(rank)
    }

    /// Validate everything that does not depend on the data
    pub fn validate(&self) -> Result<()> {
        if let Regularization::Fixed(lambda) = self.regularization {
            if !(lambda.is_finite() && lambda >= 0.0) {
                return Err(KrlsError::InvalidParameter(format!(
                    "Regularization must be non-negative and finite, got: {lambda}"
                )));
            }
        }
        if let Bandwidth::Fixed(sigma) = self.bandwidth {
            if !(sigma.is_finite() && sigma > 0.0) {
                return Err(KrlsError::InvalidParameter(format!(
                    "Bandwidth must be positive and finite, got: {sigma}"
                )));
            }
        }
        if self.regularization == Regularization::Search {
            self.search.validate()?;
        }
        self.decomposition.validate()
    }
}

/// One evaluation of the leave-one-out error during the λ search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchPoint {
    pub lambda: f64,
    /// None when the evaluation failed or was not finite
    pub looe: Option<f64>,
}

impl SearchPoint {
    /// Score used by the minimizer; failed points are worse than any finite value
    pub fn score(&self) -> f64 {
        self.looe.unwrap_or(f64::INFINITY)
    }
}

/// Raw (λ, LOOE) evaluations in the order they were made
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchTrace {
    points: Vec<SearchPoint>,
}

impl SearchTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, point: SearchPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[SearchPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Best finite evaluation, if any
    pub fn best(&self) -> Option<SearchPoint> {
        self.points
            .iter()
            .filter(|p| p.looe.is_some())
            .min_by(|a, b| a.score().total_cmp(&b.score()))
            .copied()
    }

    /// Number of evaluations that failed or were not finite
    pub fn n_failed(&self) -> usize {
        self.points.iter().filter(|p| p.looe.is_none()).count()
    }
}

/// Result of the regularization search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Selected λ
    pub lambda: f64,
    /// LOOE at the selected λ
    pub looe: f64,
    /// Whether the bounded minimizer converged
    pub converged: bool,
    /// Whether the coarse grid had to be used
    pub used_grid_fallback: bool,
    /// Whether the selected λ sits on a search bound
    pub at_boundary: bool,
    /// Minimizer iterations performed
    pub iterations: usize,
    pub trace: SearchTrace,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bandwidth_resolve() {
        assert_eq!(Bandwidth::Auto.resolve(10).unwrap(), 10.0);
        assert_eq!(Bandwidth::Fixed(2.5).resolve(10).unwrap(), 2.5);
        assert!(Bandwidth::Fixed(0.0).resolve(10).is_err());
        assert!(Bandwidth::Fixed(-1.0).resolve(10).is_err());
        assert!(Bandwidth::Auto.resolve(0).is_err());
    }

    #[test]
    fn test_resolve_rank() {
        let config = KrlsConfig::default();
        assert_eq!(config.resolve_rank(50).unwrap(), 50);

        let config = KrlsConfig {
            rank: Some(5),
            ..KrlsConfig::default()
        };
        assert_eq!(config.resolve_rank(50).unwrap(), 5);
        assert!(config.resolve_rank(4).is_err());

        let config = KrlsConfig {
            rank: Some(0),
            ..KrlsConfig::default()
        };
        assert!(config.resolve_rank(50).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(KrlsConfig::default().validate().is_ok());

        let config = KrlsConfig {
            regularization: Regularization::Fixed(-1.0),
            ..KrlsConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(KrlsError::InvalidParameter(_))
        ));

        let config = KrlsConfig {
            bandwidth: Bandwidth::Fixed(f64::NAN),
            ..KrlsConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_search_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());

        let bad_bounds = SearchConfig {
            lower: 1.0,
            upper: 0.5,
            ..SearchConfig::default()
        };
        assert!(bad_bounds.validate().is_err());

        let zero_lower = SearchConfig {
            lower: 0.0,
            ..SearchConfig::default()
        };
        assert!(zero_lower.validate().is_err());

        let tiny_grid = SearchConfig {
            grid_points: 1,
            ..SearchConfig::default()
        };
        assert!(tiny_grid.validate().is_err());
    }

    #[test]
    fn test_search_trace_best_skips_failures() {
        let mut trace = SearchTrace::new();
        trace.push(SearchPoint {
            lambda: 1.0,
            looe: Some(3.0),
        });
        trace.push(SearchPoint {
            lambda: 0.1,
            looe: None,
        });
        trace.push(SearchPoint {
            lambda: 10.0,
            looe: Some(2.0),
        });

        let best = trace.best().unwrap();
        assert_eq!(best.lambda, 10.0);
        assert_eq!(trace.n_failed(), 1);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.points()[1].score(), f64::INFINITY);
    }

    #[test]
    fn test_defaults() {
        let search = SearchConfig::default();
        assert_eq!(search.lower, 1e-8);
        assert_eq!(search.upper, 1e4);

        let config = KrlsConfig::default();
        assert!(config.standardize);
        assert_eq!(config.bandwidth, Bandwidth::Auto);
        assert_eq!(config.regularization, Regularization::Search);
        assert_eq!(config.inverse_form, InverseForm::Complemented);
    }
}
