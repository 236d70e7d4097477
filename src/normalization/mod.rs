//! Length and library-size normalization of count data

mod abundance;

pub use abundance::{normalize_abundance, per_kilobase, ppm, tpm, AbundanceMatrix, AbundanceUnit};
