//! Error types for ribo_te

use thiserror::Error;

/// Main error type for reconciliation, assembly and TE computation
#[derive(Error, Debug)]
pub enum TeError {
    #[error("Ambiguous identifier '{candidate}': matches metadata rows {rows:?}")]
    ReconciliationAmbiguous { candidate: String, rows: Vec<usize> },

    #[error("Sample '{sample_id}' is mapped by more than one identifier: {candidates:?}")]
    DuplicateSampleMapping {
        sample_id: String,
        candidates: Vec<String>,
    },

    #[error("Schema mismatch in {table}: missing column(s) {missing:?}")]
    SchemaMismatch { table: String, missing: Vec<String> },

    #[error("Sample columns differ between '{left}' and '{right}': {detail}")]
    ColumnSetMismatch {
        left: String,
        right: String,
        detail: String,
    },

    #[error("Sample '{sample_id}' in {matrix} has a zero scaling factor (no counts on features with a length)")]
    DegenerateSample { sample_id: String, matrix: String },

    #[error("No features left: {reason}")]
    FeatureSetEmpty { reason: String },

    #[error("Duplicate feature '{feature_id}' after concatenation")]
    DuplicateFeature { feature_id: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: String, got: String },

    #[error("Invalid count matrix: {reason}")]
    InvalidCountMatrix { reason: String },

    #[error("Invalid metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Empty data: {reason}")]
    EmptyData { reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Result type alias for ribo_te operations
pub type Result<T> = std::result::Result<T, TeError>;
