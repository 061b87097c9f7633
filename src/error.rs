//! Error types for dataset loading and analytics.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while recognizing, reading or combining the yearly files.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("No se reconoce el año en el archivo: {}", .0.display())]
    UnrecognizedYear(PathBuf),

    #[error("Missing required column '{column}' in {}", .path.display())]
    MissingColumn { path: PathBuf, column: String },

    #[error("Failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed delimited data in {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Dataset incomplete, missing files for: {}", format_years(.missing))]
    Incomplete { missing: Vec<i32> },
}

fn format_years(years: &[i32]) -> String {
    years
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors raised by aggregations that need at least one row.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("No hay datos para el año {year}")]
    NoData { year: i32 },
}
