//! Data loading
//!
//! Dense regression tables read from CSV files.

pub mod csv;

pub use self::csv::*;
