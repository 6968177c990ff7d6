//! High-level API for KRLS regression
//!
//! This module provides a builder for configuring a fit, the fitted model
//! with its coefficients, fitted values and marginal effects, and an
//! estimator that tracks the fit lifecycle.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rkrls::api::Krls;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Rank-50 approximation, λ chosen by leave-one-out error
//! let model = Krls::new().with_rank(50).fit_from_csv("train.csv")?;
//!
//! println!("lambda = {:e}, LOOE = {:?}", model.lambda(), model.looe());
//! println!("average marginal effects: {}", model.average_derivatives());
//! # Ok(())
//! # }
//! ```

use crate::cache::DecompositionCache;
use crate::core::{
    Bandwidth, DecompositionStrategy, InverseForm, KrlsConfig, KrlsError, Regularization,
    RegressionModel, Result, SearchOutcome, SymmetricOperator,
};
use crate::data::RegressionData;
use crate::decomposition::{decompose_kernel, DecompositionMethod, Eigendecomposition};
use crate::kernel::{cross_kernel, GaussianKernel, KernelOperator};
use crate::optimizer::search_lambda;
use crate::solver::{LooEstimator, RegularizedInverse};
use crate::utils::scaling::{ResponseScaling, Standardizer};
use crate::utils::stats::r_squared;
use crate::utils::validation::{check_finite_matrix, is_binary_column, validate_training_data};
use log::{debug, info, warn};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// KRLS fit configuration with builder pattern
#[derive(Debug, Clone, Default)]
pub struct Krls {
    config: KrlsConfig,
}

impl Krls {
    /// Full rank, automatic bandwidth, λ by search, standardized data
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: KrlsConfig) -> Self {
        Self { config }
    }

    /// Keep the leading `rank` eigenpairs of the kernel matrix
    pub fn with_rank(mut self, rank: usize) -> Self {
        self.config.rank = Some(rank);
        self
    }

    pub fn with_full_rank(mut self) -> Self {
        self.config.rank = None;
        self
    }

    /// Set the Gaussian bandwidth σ
    pub fn with_bandwidth(mut self, sigma: f64) -> Self {
        self.config.bandwidth = Bandwidth::Fixed(sigma);
        self
    }

    pub fn with_auto_bandwidth(mut self) -> Self {
        self.config.bandwidth = Bandwidth::Auto;
        self
    }

    /// Use a fixed λ instead of searching
    pub fn with_lambda(mut self, lambda: f64) -> Self {
        self.config.regularization = Regularization::Fixed(lambda);
        self
    }

    pub fn with_lambda_search(mut self) -> Self {
        self.config.regularization = Regularization::Search;
        self
    }

    /// Set the λ search interval
    pub fn with_search_bounds(mut self, lower: f64, upper: f64) -> Self {
        self.config.search.lower = lower;
        self.config.search.upper = upper;
        self
    }

    pub fn with_search_tolerance(mut self, tolerance: f64) -> Self {
        self.config.search.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.search.max_iterations = max_iterations;
        self
    }

    pub fn with_strategy(mut self, strategy: DecompositionStrategy) -> Self {
        self.config.decomposition.strategy = strategy;
        self
    }

    /// Seed for the randomized decomposition
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.decomposition.seed = seed;
        self
    }

    pub fn with_oversampling(mut self, oversampling: usize) -> Self {
        self.config.decomposition.oversampling = oversampling;
        self
    }

    pub fn with_power_iterations(mut self, power_iterations: usize) -> Self {
        self.config.decomposition.power_iterations = power_iterations;
        self
    }

    /// Largest kernel matrix in bytes that may be materialized
    pub fn with_gram_budget(mut self, bytes: usize) -> Self {
        self.config.decomposition.gram_budget_bytes = bytes;
        self
    }

    pub fn with_inverse_form(mut self, form: InverseForm) -> Self {
        self.config.inverse_form = form;
        self
    }

    /// Fit on the raw scale of X and y
    pub fn without_standardization(mut self) -> Self {
        self.config.standardize = false;
        self
    }

    pub fn config(&self) -> &KrlsConfig {
        &self.config
    }

    pub fn fit(&self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<FittedKrls> {
        fit_krls(x, y, &self.config, None)
    }

    /// Fit, reusing decompositions from `cache`
    ///
    /// The cache is keyed by rank only; it must only ever see the same X,
    /// bandwidth and decomposition settings.
    pub fn fit_with_cache(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        cache: &mut DecompositionCache,
    ) -> Result<FittedKrls> {
        fit_krls(x, y, &self.config, Some(cache))
    }

    pub fn fit_data(&self, data: &RegressionData) -> Result<FittedKrls> {
        self.fit(data.x(), data.y())
    }

    /// Fit from a CSV file whose last column is the response
    pub fn fit_from_csv<P: AsRef<Path>>(&self, path: P) -> Result<FittedKrls> {
        let data = RegressionData::from_file(path)?;
        self.fit_data(&data)
    }

    pub fn estimator(&self) -> KrlsEstimator {
        KrlsEstimator::new(self.config.clone())
    }
}

/// Lifecycle of a `KrlsEstimator`
#[derive(Debug, Clone)]
pub enum FitState {
    Unfitted,
    Fitting,
    Fitted(Box<FittedKrls>),
    /// Error message of the failed fit
    Failed(String),
}

impl FitState {
    pub fn name(&self) -> &'static str {
        match self {
            FitState::Unfitted => "unfitted",
            FitState::Fitting => "fitting",
            FitState::Fitted(_) => "fitted",
            FitState::Failed(_) => "failed",
        }
    }
}

/// KRLS estimator with an explicit fit state
///
/// `predict` and `derivatives` fail with `NotFitted` unless the last call to
/// `fit` succeeded.
#[derive(Debug, Clone)]
pub struct KrlsEstimator {
    config: KrlsConfig,
    state: FitState,
}

impl KrlsEstimator {
    pub fn new(config: KrlsConfig) -> Self {
        Self {
            config,
            state: FitState::Unfitted,
        }
    }

    pub fn config(&self) -> &KrlsConfig {
        &self.config
    }

    pub fn state(&self) -> &FitState {
        &self.state
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self.state, FitState::Fitted(_))
    }

    /// Fit on (X, y), replacing any previous fit
    pub fn fit(&mut self, x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>) -> Result<&FittedKrls> {
        self.state = FitState::Fitting;
        match fit_krls(x, y, &self.config, None) {
            Ok(model) => {
                self.state = FitState::Fitted(Box::new(model));
                self.fitted()
            }
            Err(err) => {
                warn!("KRLS fit failed: {err}");
                self.state = FitState::Failed(err.to_string());
                Err(err)
            }
        }
    }

    pub fn fitted(&self) -> Result<&FittedKrls> {
        match &self.state {
            FitState::Fitted(model) => Ok(model),
            _ => Err(KrlsError::NotFitted),
        }
    }

    pub fn into_fitted(self) -> Result<FittedKrls> {
        match self.state {
            FitState::Fitted(model) => Ok(*model),
            _ => Err(KrlsError::NotFitted),
        }
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        self.fitted()?.predict(x)
    }

    /// Pointwise partial derivatives of the fitted surface (N×D)
    pub fn derivatives(&self) -> Result<ArrayView2<'_, f64>> {
        Ok(self.fitted()?.derivatives())
    }
}

/// Fitted KRLS model
///
/// Holds the standardized training covariates, the eigenbasis and the
/// coefficients c, which is enough to predict without the caller's X.
/// Coefficients lie in the span of the retained eigenvectors:
/// c = U diag(1/(Λ+λ)) Uᵗ y on the standardized response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedKrls {
    config: KrlsConfig,
    x_train: Array2<f64>,
    y_train: Array1<f64>,
    standardizer: Standardizer,
    response: ResponseScaling,
    sigma: f64,
    lambda: f64,
    decomposition: Eigendecomposition,
    coefficients: Array1<f64>,
    fitted_values: Array1<f64>,
    derivatives: Array2<f64>,
    looe: Option<f64>,
    r_squared: f64,
    search: Option<SearchOutcome>,
}

fn fit_krls(
    x: ArrayView2<'_, f64>,
    y: ArrayView1<'_, f64>,
    config: &KrlsConfig,
    cache: Option<&mut DecompositionCache>,
) -> Result<FittedKrls> {
    config.validate()?;
    validate_training_data(x, y)?;
    let (n, d) = x.dim();
    let rank = config.resolve_rank(n)?;
    let sigma = config.bandwidth.resolve(d)?;

    let (standardizer, response) = if config.standardize {
        (Standardizer::fit(x)?, ResponseScaling::fit(y)?)
    } else {
        (Standardizer::identity(d), ResponseScaling::identity())
    };
    let x_train = standardizer.transform(x)?;
    let y_std = response.transform(y);
    let kernel = GaussianKernel::new(sigma)?;

    info!("Fitting KRLS on {n} observations x {d} covariates (rank {rank}, sigma = {sigma})");

    let decompose =
        |rank: usize| decompose_kernel(&kernel, x_train.view(), rank, &config.decomposition);
    let decomposition: Arc<Eigendecomposition> = match cache {
        Some(cache) => cache.get_or_compute(rank, decompose)?,
        None => Arc::new(decompose(rank)?),
    };
    debug!(
        "Decomposition ({:?}): leading eigenvalue {:e}, smallest retained {:e}",
        decomposition.method(),
        decomposition.values()[0],
        decomposition.values()[rank - 1]
    );

    let estimator = LooEstimator::new(&decomposition, y_std.view(), config.inverse_form)?;
    let (lambda, search) = match config.regularization {
        Regularization::Fixed(lambda) => (lambda, None),
        Regularization::Search => {
            let outcome = search_lambda(&estimator, &config.search)?;
            (outcome.lambda, Some(outcome))
        }
    };
    let looe = match &search {
        Some(outcome) => Some(outcome.looe),
        None => match estimator.evaluate(lambda) {
            Ok(looe) => Some(looe),
            Err(err) => {
                warn!("Leave-one-out error unavailable at lambda = {lambda:e}: {err}");
                None
            }
        },
    };

    // Both inverse forms give the same K_approx c
    let inverse = RegularizedInverse::new(&decomposition, lambda, InverseForm::Projected)?;
    let coefficients = inverse.apply(y_std.view())?;

    // Fitted values lie on the exact-kernel surface that predict and the
    // derivatives describe; K is streamed, never stored
    let surface = KernelOperator::new(&kernel, x_train.view())
        .apply(coefficients.view().insert_axis(Axis(1)));
    let fitted_values = response.inverse_transform(surface.column(0));
    let approximate = decomposition.apply(coefficients.view())?;
    let gap = (&surface.column(0) - &approximate)
        .iter()
        .fold(0.0_f64, |acc, v| acc.max(v.abs()));
    debug!("Largest gap between K c and K_approx c: {gap:e}");
    let derivatives = kernel.pointwise_derivatives(
        x_train.view(),
        x_train.view(),
        coefficients.view(),
    )?;
    let derivatives = to_original_scale(derivatives, &standardizer, &response);
    let r_squared = r_squared(fitted_values.view(), y)?;

    info!(
        "KRLS fit complete: lambda = {lambda:e}, R^2 = {r_squared:.4}{}",
        looe.map(|v| format!(", LOOE = {v:.6}")).unwrap_or_default()
    );

    let decomposition = Arc::try_unwrap(decomposition).unwrap_or_else(|shared| (*shared).clone());
    Ok(FittedKrls {
        config: config.clone(),
        x_train,
        y_train: y.to_owned(),
        standardizer,
        response,
        sigma,
        lambda,
        decomposition,
        coefficients,
        fitted_values,
        derivatives,
        looe,
        r_squared,
        search,
    })
}

/// ∂y/∂x_d = (sd_y / sd_x_d) · ∂y*/∂x*_d for standardized y*, x*
fn to_original_scale(
    mut derivatives: Array2<f64>,
    standardizer: &Standardizer,
    response: &ResponseScaling,
) -> Array2<f64> {
    for (mut column, &scale) in derivatives
        .axis_iter_mut(Axis(1))
        .zip(standardizer.scales().iter())
    {
        let factor = response.scale / scale;
        column.mapv_inplace(|v| v * factor);
    }
    derivatives
}

impl FittedKrls {
    fn kernel(&self) -> Result<GaussianKernel> {
        GaussianKernel::new(self.sigma)
    }

    /// Predict the response at new covariate rows (original scale)
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        if x.ncols() != self.n_features() {
            return Err(KrlsError::DimensionMismatch {
                expected: self.n_features(),
                actual: x.ncols(),
            });
        }
        check_finite_matrix(x, "prediction input")?;
        let x_std = self.standardizer.transform(x)?;
        let cross = cross_kernel(&self.kernel()?, x_std.view(), self.x_train.view())?;
        let predicted = cross.dot(&self.coefficients);
        Ok(self.response.inverse_transform(predicted.view()))
    }

    /// Partial derivatives of the fitted surface at new covariate rows
    pub fn derivatives_at(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>> {
        check_finite_matrix(x, "derivative input")?;
        let x_std = self.standardizer.transform(x)?;
        let derivatives = self.kernel()?.pointwise_derivatives(
            x_std.view(),
            self.x_train.view(),
            self.coefficients.view(),
        )?;
        Ok(to_original_scale(derivatives, &self.standardizer, &self.response))
    }

    /// Average change in prediction when a binary covariate moves from 0 to 1
    ///
    /// Every training observation is predicted twice, once with the covariate
    /// set to 1 and once with it set to 0.
    pub fn average_first_difference(&self, column: usize) -> Result<f64> {
        if column >= self.n_features() {
            return Err(KrlsError::InvalidParameter(format!(
                "Column {column} out of range for {} covariates",
                self.n_features()
            )));
        }
        let x = self.training_covariates()?;
        if !is_binary_column(x.column(column)) {
            return Err(KrlsError::InvalidParameter(format!(
                "Column {column} is not a 0/1 covariate"
            )));
        }
        let mut with_one = x.clone();
        with_one.column_mut(column).fill(1.0);
        let mut with_zero = x;
        with_zero.column_mut(column).fill(0.0);

        let difference = self.predict(with_one.view())? - self.predict(with_zero.view())?;
        difference.mean().ok_or(KrlsError::EmptyDataset)
    }

    /// Training covariates on their original scale
    pub fn training_covariates(&self) -> Result<Array2<f64>> {
        self.standardizer.inverse_transform(self.x_train.view())
    }

    /// Coefficients c on the standardized scale
    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    /// Fitted values K c on the original scale, equal to `predict` at the
    /// training covariates
    pub fn fitted_values(&self) -> ArrayView1<'_, f64> {
        self.fitted_values.view()
    }

    pub fn residuals(&self) -> Array1<f64> {
        &self.y_train - &self.fitted_values
    }

    /// Pointwise partial derivatives (N×D) on the original scale
    pub fn derivatives(&self) -> ArrayView2<'_, f64> {
        self.derivatives.view()
    }

    /// Column means of the pointwise derivatives
    pub fn average_derivatives(&self) -> Array1<f64> {
        self.derivatives
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(self.n_features()))
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn rank(&self) -> usize {
        self.decomposition.rank()
    }

    /// Leave-one-out error at the selected λ, if it was finite
    pub fn looe(&self) -> Option<f64> {
        self.looe
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// λ search diagnostics, when λ was searched
    pub fn search_outcome(&self) -> Option<&SearchOutcome> {
        self.search.as_ref()
    }

    pub fn decomposition(&self) -> &Eigendecomposition {
        &self.decomposition
    }

    pub fn config(&self) -> &KrlsConfig {
        &self.config
    }

    pub fn info(&self) -> ModelInfo {
        ModelInfo {
            n_samples: self.n_samples(),
            n_features: self.n_features(),
            rank: self.rank(),
            method: self.decomposition.method(),
            sigma: self.sigma,
            lambda: self.lambda,
            looe: self.looe,
            r_squared: self.r_squared,
            standardized: self.config.standardize,
            search_converged: self.search.as_ref().map(|s| s.converged),
            at_boundary: self.search.as_ref().map(|s| s.at_boundary),
        }
    }
}

impl RegressionModel for FittedKrls {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>> {
        FittedKrls::predict(self, x)
    }

    fn n_features(&self) -> usize {
        self.x_train.ncols()
    }

    fn n_samples(&self) -> usize {
        self.x_train.nrows()
    }
}

/// Summary of a fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub n_samples: usize,
    pub n_features: usize,
    pub rank: usize,
    pub method: DecompositionMethod,
    pub sigma: f64,
    pub lambda: f64,
    pub looe: Option<f64>,
    pub r_squared: f64,
    pub standardized: bool,
    pub search_converged: Option<bool>,
    pub at_boundary: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn synthetic(n: usize, d: usize, seed: u64) -> (Array2<f64>, Array1<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let x = Array2::from_shape_fn((n, d), |_| rng.sample::<f64, _>(StandardNormal));
        let y = x.map_axis(Axis(1), |row| row[0] + 0.5 * row[1].powi(2))
            + Array1::from_shape_fn(n, |_| 0.05 * rng.sample::<f64, _>(StandardNormal));
        (x, y)
    }

    #[test]
    fn test_builder_sets_config() {
        let krls = Krls::new()
            .with_rank(10)
            .with_bandwidth(2.0)
            .with_lambda(0.5)
            .with_search_bounds(1e-4, 10.0)
            .with_strategy(DecompositionStrategy::Randomized)
            .with_seed(7)
            .with_inverse_form(InverseForm::Projected)
            .without_standardization();
        let config = krls.config();
        assert_eq!(config.rank, Some(10));
        assert_eq!(config.bandwidth, Bandwidth::Fixed(2.0));
        assert_eq!(config.regularization, Regularization::Fixed(0.5));
        assert_eq!(config.search.lower, 1e-4);
        assert_eq!(config.decomposition.seed, 7);
        assert_eq!(config.inverse_form, InverseForm::Projected);
        assert!(!config.standardize);
    }

    #[test]
    fn test_fit_outputs_have_expected_shapes() {
        let (x, y) = synthetic(50, 3, 1);
        let model = Krls::new().fit(x.view(), y.view()).unwrap();
        assert_eq!(model.fitted_values().len(), 50);
        assert_eq!(model.coefficients().len(), 50);
        assert_eq!(model.derivatives().dim(), (50, 3));
        assert_eq!(model.rank(), 50);
        assert_eq!(model.sigma(), 3.0);
        assert!(model.lambda() > 0.0);
        assert!(model.looe().is_some());
        assert!(model.r_squared() > 0.9);
        assert!(model.search_outcome().is_some());
    }

    #[test]
    fn test_predict_at_training_points_matches_fitted_values_at_full_rank() {
        let (x, y) = synthetic(40, 2, 2);
        let model = Krls::new().with_lambda(0.1).fit(x.view(), y.view()).unwrap();
        let predicted = model.predict(x.view()).unwrap();
        for (a, b) in predicted.iter().zip(model.fitted_values().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_predict_matches_fitted_values_at_low_rank_exact() {
        let (x, y) = synthetic(40, 2, 3);
        let model = Krls::new()
            .with_rank(8)
            .with_lambda(0.1)
            .fit(x.view(), y.view())
            .unwrap();
        assert!(model.decomposition().method().is_exact());
        let predicted = model.predict(x.view()).unwrap();
        for (a, b) in predicted.iter().zip(model.fitted_values().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_predict_matches_fitted_values_on_randomized_path() {
        let (x, y) = synthetic(120, 3, 11);
        let model = Krls::new()
            .with_rank(10)
            .with_strategy(DecompositionStrategy::Randomized)
            .with_power_iterations(0)
            .with_oversampling(2)
            .with_lambda(0.1)
            .fit(x.view(), y.view())
            .unwrap();
        assert_eq!(model.decomposition().method(), DecompositionMethod::RandomizedDense);
        let predicted = model.predict(x.view()).unwrap();
        for (a, b) in predicted.iter().zip(model.fitted_values().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-8);
        }
        let residuals = model.residuals();
        for ((r, &actual), &fitted) in residuals.iter().zip(y.iter()).zip(predicted.iter()) {
            assert_abs_diff_eq!(*r, actual - fitted, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_derivatives_match_finite_differences_of_predict() {
        let (x, y) = synthetic(30, 2, 4);
        let model = Krls::new().with_lambda(0.05).fit(x.view(), y.view()).unwrap();
        let h = 1e-5;
        for i in [0, 7, 19] {
            for d in 0..2 {
                let mut plus = x.row(i).to_owned().insert_axis(Axis(0));
                let mut minus = plus.clone();
                plus[[0, d]] += h;
                minus[[0, d]] -= h;
                let numeric = (model.predict(plus.view()).unwrap()[0]
                    - model.predict(minus.view()).unwrap()[0])
                    / (2.0 * h);
                assert_abs_diff_eq!(model.derivatives()[[i, d]], numeric, epsilon = 1e-5);
            }
        }
        let at = model.derivatives_at(x.view()).unwrap();
        for (a, b) in at.iter().zip(model.derivatives().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_average_first_difference() {
        let mut rng = StdRng::seed_from_u64(5);
        let n = 80;
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            if j == 0 {
                (i % 2) as f64
            } else {
                rng.sample::<f64, _>(StandardNormal)
            }
        });
        // Binary effect of 2 plus a smooth term
        let y = x.map_axis(Axis(1), |row| 2.0 * row[0] + row[1].sin());
        let model = Krls::new().fit(x.view(), y.view()).unwrap();
        let effect = model.average_first_difference(0).unwrap();
        assert!((effect - 2.0).abs() < 0.3, "first difference {effect}");
        assert!(matches!(
            model.average_first_difference(1),
            Err(KrlsError::InvalidParameter(_))
        ));
        assert!(model.average_first_difference(2).is_err());
    }

    #[test]
    fn test_estimator_state_machine() {
        let (x, y) = synthetic(20, 2, 6);
        let mut estimator = Krls::new().with_lambda(0.1).estimator();
        assert_eq!(estimator.state().name(), "unfitted");
        assert!(matches!(
            estimator.predict(x.view()),
            Err(KrlsError::NotFitted)
        ));
        assert!(matches!(estimator.derivatives(), Err(KrlsError::NotFitted)));

        estimator.fit(x.view(), y.view()).unwrap();
        assert!(estimator.is_fitted());
        assert_eq!(estimator.predict(x.view()).unwrap().len(), 20);
        assert_eq!(estimator.derivatives().unwrap().dim(), (20, 2));

        // A failed refit leaves the estimator failed, not holding the old fit
        let bad = Array1::from_elem(20, f64::NAN);
        assert!(estimator.fit(x.view(), bad.view()).is_err());
        assert!(matches!(estimator.state(), FitState::Failed(_)));
        assert!(matches!(
            estimator.predict(x.view()),
            Err(KrlsError::NotFitted)
        ));
    }

    #[test]
    fn test_invalid_parameters_rejected_before_fitting() {
        let (x, y) = synthetic(10, 2, 7);
        assert!(matches!(
            Krls::new().with_rank(11).fit(x.view(), y.view()),
            Err(KrlsError::InvalidParameter(_))
        ));
        assert!(matches!(
            Krls::new().with_bandwidth(0.0).fit(x.view(), y.view()),
            Err(KrlsError::InvalidParameter(_))
        ));
        assert!(matches!(
            Krls::new().with_lambda(-1.0).fit(x.view(), y.view()),
            Err(KrlsError::InvalidParameter(_))
        ));
        assert!(matches!(
            Krls::new().fit(x.view(), y.slice(ndarray::s![..5])),
            Err(KrlsError::DimensionMismatch { .. })
        ));
        let constant = array![[1.0, 2.0], [1.0, 3.0], [1.0, 4.0]];
        assert!(matches!(
            Krls::new().fit(constant.view(), array![1.0, 2.0, 3.0].view()),
            Err(KrlsError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_predict_dimension_checked() {
        let (x, y) = synthetic(15, 2, 8);
        let model = Krls::new().with_lambda(0.1).fit(x.view(), y.view()).unwrap();
        assert!(matches!(
            model.predict(Array2::zeros((3, 4)).view()),
            Err(KrlsError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_fit_with_cache_reuses_decomposition() {
        let (x, y) = synthetic(30, 2, 9);
        let mut cache = DecompositionCache::new(4);
        let full = Krls::new()
            .with_lambda(0.1)
            .fit_with_cache(x.view(), y.view(), &mut cache)
            .unwrap();
        let low = Krls::new()
            .with_rank(5)
            .with_lambda(0.1)
            .fit_with_cache(x.view(), y.view(), &mut cache)
            .unwrap();
        assert_eq!(cache.stats().misses, 1);
        assert_eq!(cache.stats().hits, 1);

        let direct = Krls::new()
            .with_rank(5)
            .with_lambda(0.1)
            .fit(x.view(), y.view())
            .unwrap();
        for (a, b) in low.fitted_values().iter().zip(direct.fitted_values().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-8);
        }
        assert_eq!(full.rank(), 30);
    }

    #[test]
    fn test_unstandardized_fit() {
        let (x, y) = synthetic(25, 2, 10);
        let model = Krls::new()
            .without_standardization()
            .with_lambda(0.1)
            .fit(x.view(), y.view())
            .unwrap();
        assert_eq!(model.training_covariates().unwrap(), x);
        assert!(model.info().lambda == 0.1 && !model.info().standardized);
    }
}
