//! Input/Output operations

mod csv;
mod quant;
mod results;

pub use self::csv::{
    read_count_matrix, read_feature_annotation, read_metadata, write_count_matrix, write_matrix,
    AnnotationTableSpec, MetadataTableSpec,
};
pub(crate) use self::csv::{open_table, parse_value};
pub use quant::{
    read_interval_lengths, read_quant_table, write_interval_lengths, QuantTable, QuantTableSpec,
};
pub use results::{read_diff_results, read_normalized_counts, write_ranks, DiffResults, ResultsSummary};
