//! Adapter to an external differential-testing engine
//!
//! The engine itself is not part of this crate. This module prepares its
//! inputs (integer counts, sample design, formula) and reads back its
//! standard results table and normalized counts.

mod design;
mod fdr;

pub use design::{prepare_diff_input, write_diff_input, Contrast, DiffDesign, DiffInput};
pub use fdr::benjamini_hochberg;
pub use crate::io::{read_diff_results, read_normalized_counts, write_ranks, DiffResults, ResultsSummary};
