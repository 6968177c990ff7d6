//! Model serialization and persistence
//!
//! This module saves and loads fitted KRLS models as JSON for use with the
//! CLI application. A saved model carries the standardized training
//! covariates, eigenbasis and coefficients, so a loaded model predicts
//! exactly like the one that was saved.

use crate::api::FittedKrls;
use crate::core::{KrlsError, RegressionModel, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Serializable wrapper around a fitted model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializableModel {
    pub model: FittedKrls,
    pub metadata: ModelMetadata,
}

/// Model metadata for tracking and validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Library version used to create the model
    pub library_version: String,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub response_name: String,
}

impl SerializableModel {
    /// Wrap a fitted model with default covariate names
    pub fn from_fitted(model: &FittedKrls) -> Self {
        let names = (1..=model.n_features()).map(|i| format!("x{i}")).collect();
        Self::with_names(model, names, "y".to_string())
    }

    pub fn with_names(
        model: &FittedKrls,
        feature_names: Vec<String>,
        response_name: String,
    ) -> Self {
        Self {
            model: model.clone(),
            metadata: ModelMetadata {
                library_version: env!("CARGO_PKG_VERSION").to_string(),
                created_at: Utc::now(),
                feature_names,
                response_name,
            },
        }
    }

    /// Save model to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| KrlsError::SerializationError(e.to_string()))?;
        Ok(())
    }

    /// Load model from file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let model: Self = serde_json::from_reader(reader)
            .map_err(|e| KrlsError::SerializationError(e.to_string()))?;
        if model.metadata.feature_names.len() != model.model.n_features() {
            return Err(KrlsError::SerializationError(format!(
                "Model lists {} covariate names for {} covariates",
                model.metadata.feature_names.len(),
                model.model.n_features()
            )));
        }
        Ok(model)
    }

    pub fn to_fitted(&self) -> FittedKrls {
        self.model.clone()
    }

    pub fn into_fitted(self) -> FittedKrls {
        self.model
    }

    /// Print model summary
    pub fn print_summary(&self) {
        let info = self.model.info();
        println!("=== KRLS Model Summary ===");
        println!("Observations: {}", info.n_samples);
        println!("Covariates: {} ({})", info.n_features, self.metadata.feature_names.join(", "));
        println!("Response: {}", self.metadata.response_name);
        println!("Rank: {} ({:?})", info.rank, info.method);
        println!("Bandwidth (sigma): {}", info.sigma);
        println!("Regularization (lambda): {:e}", info.lambda);
        match info.looe {
            Some(looe) => println!("Leave-one-out error: {looe:.6}"),
            None => println!("Leave-one-out error: unavailable"),
        }
        println!("R^2: {:.4}", info.r_squared);
        println!("Standardized: {}", info.standardized);
        if let (Some(converged), Some(at_boundary)) = (info.search_converged, info.at_boundary) {
            println!("Search converged: {converged}, at boundary: {at_boundary}");
        }
        let averages = self.model.average_derivatives();
        println!("Average marginal effects:");
        for (name, value) in self.metadata.feature_names.iter().zip(averages.iter()) {
            println!("  {name}: {value:.6}");
        }
        println!("Library Version: {}", self.metadata.library_version);
        println!("Created: {}", self.metadata.created_at.to_rfc3339());
    }
}
