//! Length- and depth-normalized abundance (TPM / PPM)
//!
//! Both units follow the same two steps:
//!
//! 1. rate = count / (length / 1000), reads (or P-sites) per kilobase;
//! 2. abundance = rate / (sum of the sample's rates / 1e6).
//!
//! Scaling factors are computed over the features actually present, so
//! abundances computed on different feature subsets (all ORFs, canonical only,
//! non-canonical only) are not comparable with each other.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::data::{CountMatrix, FeatureLengths};
use crate::error::{Result, TeError};

/// Unit of a normalized abundance matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbundanceUnit {
    /// Transcripts per million (RNA-seq)
    Tpm,
    /// P-sites per million (Ribo-seq)
    Ppm,
}

impl std::fmt::Display for AbundanceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbundanceUnit::Tpm => write!(f, "TPM"),
            AbundanceUnit::Ppm => write!(f, "PPM"),
        }
    }
}

impl std::str::FromStr for AbundanceUnit {
    type Err = TeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tpm" => Ok(AbundanceUnit::Tpm),
            "ppm" => Ok(AbundanceUnit::Ppm),
            _ => Err(TeError::InvalidInput {
                reason: format!("Unknown unit '{}'. Use 'tpm' or 'ppm'.", s),
            }),
        }
    }
}

/// Per-million-scaled, length-normalized abundances (features x samples)
#[derive(Debug, Clone)]
pub struct AbundanceMatrix {
    values: Array2<f64>,
    feature_ids: Vec<String>,
    sample_ids: Vec<String>,
    unit: AbundanceUnit,
    /// Per-sample scaling factors, when computed from counts
    scaling_factors: Option<Vec<f64>>,
}

impl AbundanceMatrix {
    /// Wrap externally computed abundances
    pub fn new(
        values: Array2<f64>,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
        unit: AbundanceUnit,
    ) -> Result<Self> {
        if values.dim() != (feature_ids.len(), sample_ids.len()) {
            return Err(TeError::DimensionMismatch {
                expected: format!("{} x {}", feature_ids.len(), sample_ids.len()),
                got: format!("{} x {}", values.nrows(), values.ncols()),
            });
        }
        if values.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(TeError::InvalidInput {
                reason: format!("{} values must be non-negative finite numbers", unit),
            });
        }
        Ok(Self {
            values,
            feature_ids,
            sample_ids,
            unit,
            scaling_factors: None,
        })
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn unit(&self) -> AbundanceUnit {
        self.unit
    }

    pub fn scaling_factors(&self) -> Option<&[f64]> {
        self.scaling_factors.as_deref()
    }

    pub fn n_features(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.values.ncols()
    }

    /// Subset rows and columns; scaling factors follow the selected columns
    pub fn select(&self, feature_indices: &[usize], sample_indices: &[usize]) -> Self {
        let values = self
            .values
            .select(Axis(0), feature_indices)
            .select(Axis(1), sample_indices);
        Self {
            values,
            feature_ids: feature_indices.iter().map(|&i| self.feature_ids[i].clone()).collect(),
            sample_ids: sample_indices.iter().map(|&j| self.sample_ids[j].clone()).collect(),
            unit: self.unit,
            scaling_factors: self
                .scaling_factors
                .as_ref()
                .map(|sf| sample_indices.iter().map(|&j| sf[j]).collect()),
        }
    }
}

/// Per-kilobase rates: `count / (length / 1000)`, row-wise
pub fn per_kilobase(counts: ArrayView2<f64>, lengths: &[f64]) -> Result<Array2<f64>> {
    if lengths.len() != counts.nrows() {
        return Err(TeError::DimensionMismatch {
            expected: format!("{} feature lengths", counts.nrows()),
            got: format!("{} feature lengths", lengths.len()),
        });
    }
    let mut rates = counts.to_owned();
    for (mut row, &len) in rates.axis_iter_mut(Axis(0)).zip(lengths.iter()) {
        let kb = len / 1000.0;
        row.mapv_inplace(|c| c / kb);
    }
    Ok(rates)
}

/// Normalize raw counts to TPM or PPM.
///
/// Features without a positive length are excluded first. Fails with
/// `DegenerateSample` if any sample's rates sum to zero.
pub fn normalize_abundance(
    counts: &CountMatrix,
    lengths: &FeatureLengths,
    unit: AbundanceUnit,
) -> Result<AbundanceMatrix> {
    let mut keep = Vec::with_capacity(counts.n_features());
    let mut kept_lengths = Vec::with_capacity(counts.n_features());
    let mut missing = Vec::new();
    for (i, id) in counts.feature_ids().iter().enumerate() {
        match lengths.get(id) {
            Some(len) => {
                keep.push(i);
                kept_lengths.push(len);
            }
            None => missing.push(id.as_str()),
        }
    }

    if !missing.is_empty() {
        log::warn!(
            "{} of {} features have no length and are excluded from {} (e.g. {:?})",
            missing.len(),
            counts.n_features(),
            unit,
            &missing[..missing.len().min(5)]
        );
    }

    if keep.is_empty() {
        return Err(TeError::FeatureSetEmpty {
            reason: format!("no feature has a length for {} normalization", unit),
        });
    }

    let raw = counts.counts().select(Axis(0), &keep);
    let rates = per_kilobase(raw.view(), &kept_lengths)?;

    let scaling: Vec<f64> = rates
        .axis_iter(Axis(1))
        .map(|col| col.sum() / 1e6)
        .collect();

    if let Some(j) = scaling.iter().position(|&s| !(s > 0.0)) {
        return Err(TeError::DegenerateSample {
            sample_id: counts.sample_ids()[j].clone(),
            matrix: format!("{} input", unit),
        });
    }

    let mut values = rates;
    for (mut col, &sf) in values.axis_iter_mut(Axis(1)).zip(scaling.iter()) {
        col.mapv_inplace(|r| r / sf);
    }

    let feature_ids = keep.iter().map(|&i| counts.feature_ids()[i].clone()).collect();

    Ok(AbundanceMatrix {
        values,
        feature_ids,
        sample_ids: counts.sample_ids().to_vec(),
        unit,
        scaling_factors: Some(scaling),
    })
}

/// Transcripts per million from RNA-seq counts
pub fn tpm(counts: &CountMatrix, lengths: &FeatureLengths) -> Result<AbundanceMatrix> {
    normalize_abundance(counts, lengths, AbundanceUnit::Tpm)
}

/// P-sites per million from Ribo-seq P-site counts
pub fn ppm(counts: &CountMatrix, lengths: &FeatureLengths) -> Result<AbundanceMatrix> {
    normalize_abundance(counts, lengths, AbundanceUnit::Ppm)
}
