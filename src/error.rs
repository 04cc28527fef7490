//! Error types for the statement analyzer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for analyzer operations
pub type Result<T> = std::result::Result<T, AnalyzerError>;

/// Errors that can abort an analysis run.
///
/// Per-document and per-file problems are not represented here: those are
/// logged, tallied and skipped so one bad unit never fails the batch.
#[derive(Error, Debug)]
pub enum AnalyzerError {
    /// Failed to read an input file or write an output file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writing error (debug exports)
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error (report payload)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The statement file declares no main account (`РасчСчет`)
    #[error("no main account declared in {path}")]
    MissingFileAccount { path: PathBuf },

    /// The data directory does not exist
    #[error("data directory not found: {path}")]
    DataDirMissing { path: PathBuf },

    /// No statement file in the data directory could be parsed
    #[error("no usable statement files in {path}")]
    NoInputFiles { path: PathBuf },

    /// Organization detection produced an empty map
    #[error("could not detect any of our organizations")]
    NoOrganizations,

    /// The parsed corpus contains no document sections
    #[error("statement files contain no document sections")]
    NoDocuments,
}
