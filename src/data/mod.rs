//! Data structures for counts, lengths and metadata

mod collapse;
mod count_matrix;
mod lengths;
mod metadata;

pub use collapse::collapse_lanes;
pub use count_matrix::CountMatrix;
pub use lengths::FeatureLengths;
pub use metadata::{FeatureAnnotation, FeatureRecord, LibraryType, SampleMetadata, UNANNOTATED};
