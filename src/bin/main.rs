//! RKRLS Command Line Interface
//!
//! A command-line interface for fitting, inspecting and using kernel
//! regularized least squares models on CSV data.

use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use log::{error, info, warn};
use ndarray::{s, Array1};
use rkrls::api::Krls;
use rkrls::core::{DecompositionStrategy, InverseForm, KrlsConfig, KrlsError, Result};
use rkrls::data::{write_columns, CsvTable, RegressionData};
use rkrls::persistence::SerializableModel;
use rkrls::sweep::{loo_grid, monotonicity_violations};
use rkrls::utils::memory::{estimate_kernel_memory, max_materialized_samples};
use rkrls::utils::stats::mean_squared_error;
use rkrls::RegressionModel;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "rkrls")]
#[command(about = "Kernel Regularized Least Squares with low-rank kernel approximation")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(author = "RKRLS Contributors")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Fit a new KRLS model
    Fit(FitArgs),
    /// Make predictions using a fitted model
    Predict(PredictArgs),
    /// Display model information
    Info(InfoArgs),
    /// Leave-one-out error over a grid of ranks and lambdas
    Sweep(SweepArgs),
}

#[derive(Args)]
struct KernelArgs {
    /// Gaussian bandwidth sigma (default: number of covariates)
    #[arg(short, long)]
    bandwidth: Option<f64>,

    /// Eigendecomposition strategy
    #[arg(long, default_value = "auto")]
    strategy: CliStrategy,

    /// Seed for the randomized decomposition
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Extra sketch columns for the randomized decomposition
    #[arg(long, default_value = "10")]
    oversampling: usize,

    /// Power iterations for the randomized decomposition
    #[arg(long, default_value = "2")]
    power_iterations: usize,

    /// Largest kernel matrix that may be materialized, in MB
    #[arg(long, default_value = "512")]
    gram_budget_mb: usize,

    /// Inverse used for the leave-one-out error
    #[arg(long, default_value = "complemented")]
    inverse_form: CliInverseForm,

    /// Fit on the raw scale instead of standardizing X and y
    #[arg(long)]
    no_standardize: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliStrategy {
    /// Exact up to the size threshold, randomized above it
    #[value(name = "auto")]
    Auto,
    /// Dense symmetric eigensolver
    #[value(name = "exact")]
    Exact,
    /// Randomized subspace iteration
    #[value(name = "randomized")]
    Randomized,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum CliInverseForm {
    /// Exact inverse of the rank-k kernel plus lambda I
    #[value(name = "complemented")]
    Complemented,
    /// Inverse restricted to the span of the eigenvectors
    #[value(name = "projected")]
    Projected,
}

impl From<CliStrategy> for DecompositionStrategy {
    fn from(cli_strategy: CliStrategy) -> Self {
        match cli_strategy {
            CliStrategy::Auto => DecompositionStrategy::Auto,
            CliStrategy::Exact => DecompositionStrategy::Exact,
            CliStrategy::Randomized => DecompositionStrategy::Randomized,
        }
    }
}

impl From<CliInverseForm> for InverseForm {
    fn from(cli_form: CliInverseForm) -> Self {
        match cli_form {
            CliInverseForm::Complemented => InverseForm::Complemented,
            CliInverseForm::Projected => InverseForm::Projected,
        }
    }
}

impl KernelArgs {
    fn builder(&self) -> Krls {
        let mut krls = Krls::new()
            .with_strategy(self.strategy.into())
            .with_seed(self.seed)
            .with_oversampling(self.oversampling)
            .with_power_iterations(self.power_iterations)
            .with_gram_budget(self.gram_budget_mb.saturating_mul(1024 * 1024))
            .with_inverse_form(self.inverse_form.into());
        if let Some(sigma) = self.bandwidth {
            krls = krls.with_bandwidth(sigma);
        }
        if self.no_standardize {
            krls = krls.without_standardization();
        }
        krls
    }
}

#[derive(Args)]
struct FitArgs {
    /// Training data file (CSV, last column is the response)
    #[arg(long)]
    data: PathBuf,

    /// Output model file
    #[arg(short, long)]
    output: PathBuf,

    /// Number of retained eigenpairs (default: full rank)
    #[arg(short, long)]
    rank: Option<usize>,

    /// Fixed regularization lambda (default: minimize leave-one-out error)
    #[arg(short, long)]
    lambda: Option<f64>,

    /// Lower bound of the lambda search
    #[arg(long, default_value = "1e-8")]
    lambda_min: f64,

    /// Upper bound of the lambda search
    #[arg(long, default_value = "1e4")]
    lambda_max: f64,

    /// Write the (lambda, LOOE) search trace to this CSV file
    #[arg(long)]
    trace: Option<PathBuf>,

    /// Write the pointwise derivatives to this CSV file
    #[arg(long)]
    derivatives: Option<PathBuf>,

    #[command(flatten)]
    kernel: KernelArgs,
}

#[derive(Args)]
struct PredictArgs {
    /// Fitted model file
    #[arg(short, long)]
    model: PathBuf,

    /// Input data file (covariates, optionally followed by the response)
    #[arg(long)]
    data: PathBuf,

    /// Output predictions file (optional, prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct InfoArgs {
    /// Model file
    model: PathBuf,
}

#[derive(Args)]
struct SweepArgs {
    /// Data file (CSV, last column is the response)
    #[arg(long)]
    data: PathBuf,

    /// Ranks to evaluate
    #[arg(long, value_delimiter = ',', required = true)]
    ranks: Vec<usize>,

    /// Lambdas to evaluate (default: log-spaced grid)
    #[arg(long, value_delimiter = ',')]
    lambdas: Vec<f64>,

    /// Number of log-spaced lambdas when none are given
    #[arg(long, default_value = "13")]
    lambda_points: usize,

    /// Lower end of the default lambda grid
    #[arg(long, default_value = "1e-8")]
    lambda_min: f64,

    /// Upper end of the default lambda grid
    #[arg(long, default_value = "1e4")]
    lambda_max: f64,

    /// Output CSV file (optional, prints to stdout if not specified)
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    kernel: KernelArgs,
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };

    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    let result = match cli.command {
        Commands::Fit(args) => fit_command(args),
        Commands::Predict(args) => predict_command(args),
        Commands::Info(args) => info_command(args),
        Commands::Sweep(args) => sweep_command(args),
    };

    if let Err(e) = result {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn fit_command(args: FitArgs) -> Result<()> {
    info!("Fitting KRLS model...");
    info!("Data file: {:?}", args.data);

    let data = RegressionData::from_file(&args.data)?;
    info!(
        "Loaded {} observations with {} covariates",
        data.n_samples(),
        data.n_features()
    );
    if data.n_samples() < 2 {
        return Err(KrlsError::InvalidParameter(
            "Dataset must contain at least 2 observations".to_string(),
        ));
    }
    info!(
        "Full kernel matrix would take {:.1} MB",
        estimate_kernel_memory(data.n_samples()) as f64 / (1024.0 * 1024.0)
    );
    if data.n_samples() > max_materialized_samples(args.kernel.gram_budget_mb) {
        info!(
            "More than {} observations, kernel products will be streamed",
            max_materialized_samples(args.kernel.gram_budget_mb)
        );
    }

    let mut krls = args
        .kernel
        .builder()
        .with_search_bounds(args.lambda_min, args.lambda_max);
    if let Some(rank) = args.rank {
        krls = krls.with_rank(rank);
    }
    if let Some(lambda) = args.lambda {
        krls = krls.with_lambda(lambda);
    }

    let model = krls.fit_data(&data)?;

    info!("Fitting completed successfully");
    let summary = model.info();
    info!(
        "Rank {} ({:?}), sigma = {}, lambda = {:e}, R^2 = {:.4}",
        summary.rank, summary.method, summary.sigma, summary.lambda, summary.r_squared
    );

    if let Some(outcome) = model.search_outcome() {
        if outcome.at_boundary {
            warn!(
                "Lambda search collapsed to the boundary at {:e}; inspect the trace",
                outcome.lambda
            );
        }
        if let Some(path) = &args.trace {
            let lambdas = Array1::from_iter(outcome.trace.points().iter().map(|p| p.lambda));
            let looe = Array1::from_iter(
                outcome
                    .trace
                    .points()
                    .iter()
                    .map(|p| p.looe.unwrap_or(f64::NAN)),
            );
            let mut writer = BufWriter::new(File::create(path)?);
            write_columns(&mut writer, &[("lambda", lambdas.view()), ("looe", looe.view())])?;
            writer.flush()?;
            info!("Search trace saved to: {path:?}");
        }
    } else if args.trace.is_some() {
        warn!("Lambda was fixed, no search trace to write");
    }

    if let Some(path) = &args.derivatives {
        let derivatives = model.derivatives();
        let columns: Vec<(&str, ndarray::ArrayView1<'_, f64>)> = data
            .feature_names()
            .iter()
            .zip(derivatives.columns())
            .map(|(name, column)| (name.as_str(), column))
            .collect();
        let mut writer = BufWriter::new(File::create(path)?);
        write_columns(&mut writer, &columns)?;
        writer.flush()?;
        info!("Derivatives saved to: {path:?}");
    }

    let serializable = SerializableModel::with_names(
        &model,
        data.feature_names().to_vec(),
        data.response_name().to_string(),
    );
    serializable.save_to_file(&args.output)?;
    info!("Model saved to: {:?}", args.output);

    Ok(())
}

fn predict_command(args: PredictArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let model = SerializableModel::load_from_file(&args.model)?.into_fitted();
    let n_features = model.n_features();

    info!("Loading prediction data from: {:?}", args.data);
    let table = CsvTable::from_file(&args.data)?;
    let values = table.values();

    let (x, actual) = if table.n_cols() == n_features {
        (values, None)
    } else if table.n_cols() == n_features + 1 {
        (
            values.slice(s![.., ..n_features]),
            Some(values.column(n_features)),
        )
    } else {
        return Err(KrlsError::DimensionMismatch {
            expected: n_features,
            actual: table.n_cols(),
        });
    };

    let predictions = model.predict(x)?;
    info!("Predicted {} observations", predictions.len());

    if let Some(actual) = actual {
        let mse = mean_squared_error(predictions.view(), actual)?;
        info!("Mean squared error: {mse:.6}");
    }

    if let Some(output_path) = args.output {
        let mut writer = BufWriter::new(File::create(&output_path)?);
        write_columns(&mut writer, &[("prediction", predictions.view())])?;
        writer.flush()?;
        info!("Predictions saved to: {output_path:?}");
    } else {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        write_columns(&mut handle, &[("prediction", predictions.view())])?;
    }

    Ok(())
}

fn info_command(args: InfoArgs) -> Result<()> {
    info!("Loading model from: {:?}", args.model);
    let serializable_model = SerializableModel::load_from_file(&args.model)?;
    serializable_model.print_summary();

    if let Some(outcome) = serializable_model.model.search_outcome() {
        println!("\nLambda Search:");
        println!("  Evaluations: {}", outcome.trace.len());
        println!("  Failed evaluations: {}", outcome.trace.n_failed());
        println!("  Minimizer iterations: {}", outcome.iterations);
        println!("  Grid fallback: {}", outcome.used_grid_fallback);
    }

    let values = serializable_model.model.decomposition().values();
    let n_show = values.len().min(10);
    println!("\nLeading eigenvalues:");
    for (i, value) in values.iter().enumerate().take(n_show) {
        println!("  λ{i}: {value:.6e}");
    }
    if values.len() > n_show {
        println!("  ... ({} more)", values.len() - n_show);
    }

    Ok(())
}

fn sweep_command(args: SweepArgs) -> Result<()> {
    let data = RegressionData::from_file(&args.data)?;
    info!(
        "Loaded {} observations with {} covariates",
        data.n_samples(),
        data.n_features()
    );

    let lambdas = if args.lambdas.is_empty() {
        log_grid(args.lambda_min, args.lambda_max, args.lambda_points)?
    } else {
        args.lambdas.clone()
    };
    let config: KrlsConfig = args.kernel.builder().config().clone();

    let points = loo_grid(data.x(), data.y(), &args.ranks, &lambdas, &config)?;

    let ranks = Array1::from_iter(points.iter().map(|p| p.rank as f64));
    let lambda_column = Array1::from_iter(points.iter().map(|p| p.lambda));
    let looe = Array1::from_iter(points.iter().map(|p| p.looe.unwrap_or(f64::NAN)));
    let columns = [
        ("rank", ranks.view()),
        ("lambda", lambda_column.view()),
        ("looe", looe.view()),
    ];

    if let Some(output_path) = &args.output {
        let mut writer = BufWriter::new(File::create(output_path)?);
        write_columns(&mut writer, &columns)?;
        writer.flush()?;
        info!("Sweep saved to: {output_path:?}");
    } else {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        write_columns(&mut handle, &columns)?;
    }

    for violation in monotonicity_violations(&points) {
        warn!(
            "LOOE rises from {:.6} at rank {} to {:.6} at rank {} (lambda = {:e})",
            violation.lower_looe,
            violation.lower_rank,
            violation.higher_looe,
            violation.higher_rank,
            violation.lambda
        );
    }

    Ok(())
}

/// `points` log-spaced values from `lower` to `upper`
fn log_grid(lower: f64, upper: f64, points: usize) -> Result<Vec<f64>> {
    if !(lower > 0.0 && upper > lower && points >= 2) {
        return Err(KrlsError::InvalidParameter(format!(
            "Lambda grid needs 0 < min < max and at least 2 points, got [{lower}, {upper}] with {points}"
        )));
    }
    let (lo, hi) = (lower.log10(), upper.log10());
    let steps = (points - 1) as f64;
    Ok((0..points)
        .map(|i| 10f64.powf(lo + (hi - lo) * i as f64 / steps))
        .collect())
}
