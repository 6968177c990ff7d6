//! CSV regression data
//!
//! Supports loading numeric tables from CSV files where:
//! - Every row has the same number of comma-separated numeric fields
//! - First row can be headers (automatically detected)
//! - Blank lines and lines starting with `#` are skipped
//!
//! `RegressionData` treats the last column as the response and all other
//! columns as covariates.

use crate::core::{KrlsError, Result};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Dense numeric table read from CSV
#[derive(Debug, Clone, PartialEq)]
pub struct CsvTable {
    header: Option<Vec<String>>,
    values: Array2<f64>,
}

impl CsvTable {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::from_reader_with_options(reader, true)
    }

    /// Load a table with explicit header handling
    pub fn from_reader_with_options<R: BufRead>(
        reader: R,
        auto_detect_header: bool,
    ) -> Result<Self> {
        let mut header = None;
        let mut width = None;
        let mut data = Vec::new();
        let mut n_rows = 0;

        for (line_number, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if width.is_none() && header.is_none() && auto_detect_header && is_header_line(line) {
                let names: Vec<String> = line.split(',').map(|f| f.trim().to_string()).collect();
                width = Some(names.len());
                header = Some(names);
                continue;
            }

            let row = parse_data_line(line, line_number + 1)?;
            match width {
                Some(expected) if expected != row.len() => {
                    return Err(KrlsError::ParseError(format!(
                        "Line {} has {} fields, expected {expected}",
                        line_number + 1,
                        row.len()
                    )));
                }
                Some(_) => {}
                None => width = Some(row.len()),
            }
            data.extend(row);
            n_rows += 1;
        }

        let n_cols = width.unwrap_or(0);
        if n_rows == 0 || n_cols == 0 {
            return Err(KrlsError::EmptyDataset);
        }
        let values = Array2::from_shape_vec((n_rows, n_cols), data)
            .map_err(|e| KrlsError::ParseError(e.to_string()))?;
        Ok(Self { header, values })
    }

    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }
}

/// Check if a line appears to be a header (most fields are non-numeric)
fn is_header_line(line: &str) -> bool {
    let fields: Vec<&str> = line.split(',').collect();
    let non_numeric = fields
        .iter()
        .filter(|field| field.trim().parse::<f64>().is_err())
        .count();
    non_numeric * 2 > fields.len()
}

fn parse_data_line(line: &str, line_number: usize) -> Result<Vec<f64>> {
    line.split(',')
        .enumerate()
        .map(|(column, field)| {
            let field = field.trim();
            field.parse::<f64>().map_err(|_| {
                KrlsError::ParseError(format!(
                    "Invalid value at line {line_number}, column {}: {field:?}",
                    column + 1
                ))
            })
        })
        .collect()
}

/// Covariates X and response y for a regression problem
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionData {
    x: Array2<f64>,
    y: Array1<f64>,
    feature_names: Vec<String>,
    response_name: String,
}

impl RegressionData {
    pub fn new(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        if x.nrows() != y.len() {
            return Err(KrlsError::DimensionMismatch {
                expected: x.nrows(),
                actual: y.len(),
            });
        }
        let feature_names = (1..=x.ncols()).map(|i| format!("x{i}")).collect();
        Ok(Self {
            x,
            y,
            feature_names,
            response_name: "y".to_string(),
        })
    }

    /// Load from CSV, last column is the response
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_table(CsvTable::from_file(path)?)
    }

    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        Self::from_table(CsvTable::from_reader(reader)?)
    }

    pub fn from_table(table: CsvTable) -> Result<Self> {
        let n_cols = table.n_cols();
        if n_cols < 2 {
            return Err(KrlsError::ParseError(format!(
                "Regression data needs at least one covariate and a response, got {n_cols} column(s)"
            )));
        }
        let names = table.header().map(|h| h.to_vec());
        let values = table.into_values();
        let x = values.slice(s![.., ..n_cols - 1]).to_owned();
        let y = values.column(n_cols - 1).to_owned();
        let mut data = Self::new(x, y)?;
        if let Some(mut names) = names {
            if let Some(response) = names.pop() {
                data.response_name = response;
            }
            data.feature_names = names;
        }
        Ok(data)
    }

    pub fn x(&self) -> ArrayView2<'_, f64> {
        self.x.view()
    }

    pub fn y(&self) -> ArrayView1<'_, f64> {
        self.y.view()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn response_name(&self) -> &str {
        &self.response_name
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }
}

/// Write named columns of equal length as CSV with a header row
pub fn write_columns<W: Write>(
    writer: &mut W,
    columns: &[(&str, ArrayView1<'_, f64>)],
) -> Result<()> {
    let n_rows = columns.first().map(|(_, c)| c.len()).unwrap_or(0);
    if let Some((name, column)) = columns.iter().find(|(_, c)| c.len() != n_rows) {
        return Err(KrlsError::InvalidParameter(format!(
            "Column {name} has {} rows, expected {n_rows}",
            column.len()
        )));
    }
    let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
    writeln!(writer, "{}", names.join(","))?;
    for row in 0..n_rows {
        let fields: Vec<String> = columns.iter().map(|(_, c)| c[row].to_string()).collect();
        writeln!(writer, "{}", fields.join(","))?;
    }
    Ok(())
}
