//! ribo_te: translational efficiency from paired RNA-seq and Ribo-seq counts
//!
//! The crate reconciles quantifier column headers with a free-text sample
//! table, assembles sample-keyed count matrices, normalizes them to TPM
//! (RNA-seq) and PPM (Ribo-seq), calls translated features, and computes
//! translational efficiency (Ribo-seq occupancy over transcript abundance).
//! Differential testing is left to an external engine; the `diff` module
//! prepares its inputs and reads its results.
//!
//! # Example
//!
//! ```ignore
//! use ribo_te::prelude::*;
//!
//! let metadata = read_metadata("samples.tsv", &MetadataTableSpec::default())?;
//! let (ribo, lengths) = assemble_library(&ribo_inputs, &metadata, LibraryType::Ribo,
//!     &ReconcileParams::default(), ColumnOrder::Reorder)?;
//! let (rna, _) = assemble_library(&rna_inputs, &metadata, LibraryType::Rna,
//!     &ReconcileParams::default(), ColumnOrder::Reorder)?;
//!
//! let params = TeParams::default();
//! let (occupancy, transcript) = prepare_te_inputs(&ribo, &rna, &lengths, &params)?;
//! let te = translational_efficiency(&occupancy, &transcript, &params)?;
//! ```

pub mod assemble;
pub mod cli;
pub mod config;
pub mod data;
pub mod detection;
pub mod diff;
pub mod error;
pub mod io;
pub mod normalization;
pub mod pipeline;
pub mod reconcile;
pub mod stats;
pub mod te;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::assemble::{
        apply_mapping, assemble_library, concat_features, select_feature_subset, ColumnOrder,
        FeaturePart, FeatureSubset, QuantInput, CANONICAL_SUFFIX,
    };
    pub use crate::config::{FeatureGranularity, PipelineConfig};
    pub use crate::data::{
        collapse_lanes, CountMatrix, FeatureAnnotation, FeatureLengths, LibraryType, SampleMetadata,
    };
    pub use crate::detection::{detect_translated, DetectionParams, DetectionResult};
    pub use crate::diff::{prepare_diff_input, read_diff_results, DiffDesign, DiffResults};
    pub use crate::error::{Result, TeError};
    pub use crate::io::{
        read_count_matrix, read_feature_annotation, read_interval_lengths, read_metadata,
        read_quant_table, write_count_matrix, write_matrix, AnnotationTableSpec, MetadataTableSpec,
        QuantTableSpec,
    };
    pub use crate::normalization::{ppm, tpm, AbundanceMatrix, AbundanceUnit};
    pub use crate::pipeline::{run_pipeline, PipelineSummary};
    pub use crate::reconcile::{reconcile, ReconcileParams, SampleMapping};
    pub use crate::te::{
        intersect_inputs, prepare_te_inputs, translational_efficiency, Centering, TeMatrices,
        TeParams,
    };
}

pub use pipeline::run_pipeline;
