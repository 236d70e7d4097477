//! Count matrix assembly
//!
//! Raw quantifier tables carry one column per alignment file. Assembly turns
//! them into sample-keyed matrices: headers become candidate identifiers,
//! candidates are reconciled against the sample table, unmatched columns are
//! dropped, lanes of one sample are summed, and the per-part feature sets
//! (e.g. non-canonical ORFs plus canonical CDS) are stacked into one matrix.

use std::collections::HashSet;
use std::path::PathBuf;

use ndarray::{concatenate, Axis};
use serde::{Deserialize, Serialize};

use crate::data::{collapse_lanes, CountMatrix, FeatureAnnotation, FeatureLengths, LibraryType, SampleMetadata};
use crate::error::{Result, TeError};
use crate::io::{read_quant_table, QuantTableSpec};
use crate::reconcile::{candidate_from_header, reconcile, ReconcileParams, SampleMapping};

/// Default suffix distinguishing canonical CDS features from ORFs of the same ID
pub const CANONICAL_SUFFIX: &str = "_CDS";

/// How sample columns of concatenated parts are aligned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOrder {
    /// Reorder each part to the first part's column order
    #[default]
    Reorder,
    /// Require identical column order
    Strict,
}

/// Which features to keep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSubset {
    #[default]
    All,
    Canonical,
    NonCanonical,
}

/// One quantifier table feeding a library's count matrix
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantInput {
    pub path: PathBuf,
    #[serde(default)]
    pub spec: QuantTableSpec,
    /// Appended to every feature ID of this table
    #[serde(default)]
    pub feature_suffix: Option<String>,
}

/// A count matrix plus the suffix to give its features on concatenation
#[derive(Debug, Clone)]
pub struct FeaturePart {
    pub counts: CountMatrix,
    pub suffix: Option<String>,
}

impl FeaturePart {
    pub fn new(counts: CountMatrix) -> Self {
        Self { counts, suffix: None }
    }

    pub fn with_suffix(counts: CountMatrix, suffix: &str) -> Self {
        Self {
            counts,
            suffix: Some(suffix.to_string()),
        }
    }
}

/// Rename raw file-path headers to candidate identifiers
pub fn to_candidates(raw: &CountMatrix, params: &ReconcileParams) -> Result<CountMatrix> {
    let ids = raw
        .sample_ids()
        .iter()
        .map(|h| candidate_from_header(h, &params.header_suffixes))
        .collect();
    raw.rename_samples(ids)
}

/// Re-key candidate columns to sample IDs.
///
/// Unmatched columns are dropped; columns sharing a sample ID are summed.
pub fn apply_mapping(raw: &CountMatrix, mapping: &SampleMapping) -> Result<CountMatrix> {
    let mut keep = Vec::new();
    let mut targets = Vec::new();
    for (j, candidate) in raw.sample_ids().iter().enumerate() {
        match mapping.sample_for(candidate) {
            Some(sample_id) => {
                keep.push(j);
                targets.push(sample_id.to_string());
            }
            None => log::warn!("Column '{}' has no sample mapping; dropped", candidate),
        }
    }

    if keep.is_empty() {
        return Err(TeError::EmptyData {
            reason: "no count column maps to a sample".to_string(),
        });
    }

    let kept = raw.subset_samples(&keep)?;
    collapse_lanes(&kept, &targets)
}

/// Stack feature parts that share one sample set.
///
/// Sample-set differences always fail with `ColumnSetMismatch`; order
/// differences fail only under `ColumnOrder::Strict`.
pub fn concat_features(parts: &[FeaturePart], order: ColumnOrder) -> Result<CountMatrix> {
    let first = parts.first().ok_or_else(|| TeError::EmptyData {
        reason: "no count matrices to concatenate".to_string(),
    })?;
    let reference = first.counts.sample_ids().to_vec();
    let reference_set: HashSet<&String> = reference.iter().collect();

    let mut aligned: Vec<CountMatrix> = Vec::with_capacity(parts.len());
    for (k, part) in parts.iter().enumerate() {
        let ids = part.counts.sample_ids();
        if ids == reference.as_slice() {
            aligned.push(part.counts.clone());
            continue;
        }

        let set: HashSet<&String> = ids.iter().collect();
        if set != reference_set {
            let missing: Vec<&str> = reference
                .iter()
                .filter(|s| !set.contains(s))
                .map(|s| s.as_str())
                .collect();
            let extra: Vec<&str> = ids
                .iter()
                .filter(|s| !reference_set.contains(s))
                .map(|s| s.as_str())
                .collect();
            return Err(TeError::ColumnSetMismatch {
                left: "part 0".to_string(),
                right: format!("part {}", k),
                detail: format!("missing {:?}, extra {:?}", missing, extra),
            });
        }

        match order {
            ColumnOrder::Reorder => {
                log::debug!("Reordering sample columns of part {} before concatenation", k);
                aligned.push(part.counts.select_samples(&reference)?);
            }
            ColumnOrder::Strict => {
                return Err(TeError::ColumnSetMismatch {
                    left: "part 0".to_string(),
                    right: format!("part {}", k),
                    detail: "same samples in a different order".to_string(),
                });
            }
        }
    }

    let mut feature_ids = Vec::new();
    let mut seen = HashSet::new();
    for (matrix, part) in aligned.iter().zip(parts) {
        let suffix = part.suffix.as_deref().unwrap_or("");
        for id in matrix.feature_ids() {
            let id = format!("{}{}", id, suffix);
            if !seen.insert(id.clone()) {
                return Err(TeError::DuplicateFeature { feature_id: id });
            }
            feature_ids.push(id);
        }
    }

    let views: Vec<_> = aligned.iter().map(|m| m.counts()).collect();
    let counts = concatenate(Axis(0), &views).map_err(|e| TeError::DimensionMismatch {
        expected: format!("{} sample columns in every part", reference.len()),
        got: e.to_string(),
    })?;

    log::info!(
        "Concatenated {} parts: {} features x {} samples",
        parts.len(),
        feature_ids.len(),
        reference.len()
    );
    CountMatrix::new(counts, feature_ids, reference)
}

/// Whether a feature is canonical: annotation first, canonical suffix otherwise
fn is_canonical(feature_id: &str, annotation: Option<&FeatureAnnotation>, canonical_suffix: &str) -> bool {
    annotation
        .and_then(|a| a.is_canonical(feature_id))
        .unwrap_or_else(|| feature_id.ends_with(canonical_suffix))
}

/// Restrict a matrix to a canonical / non-canonical feature subset
pub fn select_feature_subset(
    counts: &CountMatrix,
    subset: FeatureSubset,
    annotation: Option<&FeatureAnnotation>,
    canonical_suffix: &str,
) -> Result<CountMatrix> {
    if subset == FeatureSubset::All {
        return Ok(counts.clone());
    }
    let want_canonical = subset == FeatureSubset::Canonical;
    let keep: Vec<usize> = counts
        .feature_ids()
        .iter()
        .enumerate()
        .filter(|(_, id)| is_canonical(id, annotation, canonical_suffix) == want_canonical)
        .map(|(i, _)| i)
        .collect();
    log::info!(
        "Feature subset {:?}: {} of {} features",
        subset,
        keep.len(),
        counts.n_features()
    );
    counts.subset_features(&keep)
}

/// Read, reconcile and stack every quantifier table of one library.
///
/// Returns the sample-keyed counts and the lengths found in the tables'
/// length columns (suffixed like their features).
pub fn assemble_library(
    inputs: &[QuantInput],
    metadata: &SampleMetadata,
    library: LibraryType,
    params: &ReconcileParams,
    order: ColumnOrder,
) -> Result<(CountMatrix, FeatureLengths)> {
    let mut parts = Vec::with_capacity(inputs.len());
    let mut lengths = FeatureLengths::new();

    for input in inputs {
        log::info!("Reading {} table {}", library, input.path.display());
        let table = read_quant_table(&input.path, &input.spec)?;
        let raw = to_candidates(&table.counts, params)?;
        let mapping = reconcile(raw.sample_ids(), metadata, library, params)?;
        let counts = apply_mapping(&raw, &mapping)?;

        if let Some(table_lengths) = table.lengths {
            match &input.feature_suffix {
                Some(suffix) => lengths.extend(table_lengths.with_suffix(suffix)),
                None => lengths.extend(table_lengths),
            }
        }
        parts.push(FeaturePart {
            counts,
            suffix: input.feature_suffix.clone(),
        });
    }

    let counts = concat_features(&parts, order)?;
    Ok((counts, lengths))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureRecord;
    use crate::reconcile::reconcile_fields;
    use ndarray::array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_reorders_same_sample_set() {
        let a = CountMatrix::new(array![[1.0, 2.0, 3.0]], s(&["orf1"]), s(&["S1", "S2", "S3"])).unwrap();
        let b = CountMatrix::new(array![[10.0, 30.0, 20.0]], s(&["gene1"]), s(&["S1", "S3", "S2"])).unwrap();
        let merged = concat_features(
            &[FeaturePart::new(a), FeaturePart::with_suffix(b, CANONICAL_SUFFIX)],
            ColumnOrder::Reorder,
        )
        .unwrap();
        assert_eq!(merged.sample_ids(), &["S1", "S2", "S3"]);
        assert_eq!(merged.feature_ids(), &["orf1", "gene1_CDS"]);
        assert_eq!(merged.feature_counts(1).to_vec(), vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_strict_order_rejects_permutation() {
        let a = CountMatrix::new(array![[1.0, 2.0]], s(&["x"]), s(&["S1", "S2"])).unwrap();
        let b = CountMatrix::new(array![[1.0, 2.0]], s(&["y"]), s(&["S2", "S1"])).unwrap();
        let err = concat_features(&[FeaturePart::new(a), FeaturePart::new(b)], ColumnOrder::Strict).unwrap_err();
        assert!(matches!(err, TeError::ColumnSetMismatch { .. }));
    }

    #[test]
    fn test_sample_set_difference_fails() {
        let a = CountMatrix::new(array![[1.0, 2.0]], s(&["x"]), s(&["S1", "S2"])).unwrap();
        let b = CountMatrix::new(array![[1.0, 2.0]], s(&["y"]), s(&["S1", "S9"])).unwrap();
        let err = concat_features(&[FeaturePart::new(a), FeaturePart::new(b)], ColumnOrder::Reorder).unwrap_err();
        match err {
            TeError::ColumnSetMismatch { detail, .. } => {
                assert!(detail.contains("S2"));
                assert!(detail.contains("S9"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_feature_after_merge() {
        let a = CountMatrix::new(array![[1.0]], s(&["g1"]), s(&["S1"])).unwrap();
        let b = CountMatrix::new(array![[2.0]], s(&["g1"]), s(&["S1"])).unwrap();
        let err = concat_features(&[FeaturePart::new(a.clone()), FeaturePart::new(b.clone())], ColumnOrder::Reorder)
            .unwrap_err();
        assert!(matches!(err, TeError::DuplicateFeature { ref feature_id } if feature_id == "g1"));

        // the canonical suffix disambiguates
        let ok = concat_features(
            &[FeaturePart::new(a), FeaturePart::with_suffix(b, CANONICAL_SUFFIX)],
            ColumnOrder::Reorder,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_apply_mapping_drops_and_collapses() {
        let raw = CountMatrix::new(
            array![[1.0, 2.0, 4.0, 8.0]],
            s(&["f"]),
            s(&["libA_L1", "libA_L2", "libB", "stray"]),
        )
        .unwrap();
        let params = ReconcileParams {
            scan: crate::reconcile::CandidateScan::AllPerRow,
            allow_shared_samples: true,
            ..ReconcileParams::default()
        };
        let mapping = reconcile_fields(
            raw.sample_ids(),
            &s(&["libA_L1.fq.gz;libA_L2.fq.gz", "libB.fq.gz"]),
            &s(&["A", "B"]),
            &params,
        )
        .unwrap();
        let out = apply_mapping(&raw, &mapping).unwrap();
        assert_eq!(out.sample_ids(), &["A", "B"]);
        assert_eq!(out.feature_counts(0).to_vec(), vec![3.0, 4.0]);
    }

    #[test]
    fn test_headers_become_candidates() {
        let raw = CountMatrix::new(
            array![[1.0, 2.0]],
            s(&["f"]),
            s(&["/data/bam/sA_R1_001Aligned.sortedByCoord.out.bam", "sB.bam"]),
        )
        .unwrap();
        let out = to_candidates(&raw, &ReconcileParams::default()).unwrap();
        assert_eq!(out.sample_ids(), &["sA_R1_001", "sB"]);
    }

    #[test]
    fn test_feature_subsets() {
        let counts = CountMatrix::new(
            array![[1.0], [2.0], [3.0]],
            s(&["orf1", "orf2", "gene1_CDS"]),
            s(&["S1"]),
        )
        .unwrap();

        let canonical = select_feature_subset(&counts, FeatureSubset::Canonical, None, CANONICAL_SUFFIX).unwrap();
        assert_eq!(canonical.feature_ids(), &["gene1_CDS"]);

        let ann = FeatureAnnotation::new(vec![FeatureRecord {
            feature_id: "orf2".into(),
            gene_id: "G2".into(),
            gene_name: "G2".into(),
            category: "ORF_annotated".into(),
            canonical: true,
        }]);
        let non = select_feature_subset(&counts, FeatureSubset::NonCanonical, Some(&ann), CANONICAL_SUFFIX).unwrap();
        assert_eq!(non.feature_ids(), &["orf1"]);

        let all = select_feature_subset(&counts, FeatureSubset::All, Some(&ann), CANONICAL_SUFFIX).unwrap();
        assert_eq!(all.n_features(), 3);
    }

    #[test]
    fn test_assemble_library_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# featureCounts output").unwrap();
        writeln!(file, "Geneid\tChr\tStart\tEnd\tStrand\tLength\t/bam/s1Aligned.sortedByCoord.out.bam\t/bam/s2Aligned.sortedByCoord.out.bam\t/bam/zzAligned.sortedByCoord.out.bam").unwrap();
        writeln!(file, "g1\tchr1\t1\t100\t+\t100\t5\t6\t7").unwrap();
        writeln!(file, "g2\tchr1\t200\t400\t+\t201\t0\t3\t1").unwrap();
        file.flush().unwrap();

        let metadata = SampleMetadata::new(
            s(&["P1", "P2"]),
            s(&["s2_R1.fastq.gz", "s1_R1.fastq.gz"]),
            s(&["", ""]),
        )
        .unwrap();
        let inputs = vec![QuantInput {
            path: file.path().to_path_buf(),
            spec: QuantTableSpec::default(),
            feature_suffix: Some(CANONICAL_SUFFIX.to_string()),
        }];
        let (counts, lengths) = assemble_library(
            &inputs,
            &metadata,
            LibraryType::Rna,
            &ReconcileParams::default(),
            ColumnOrder::Reorder,
        )
        .unwrap();
        assert_eq!(counts.sample_ids(), &["P2", "P1"]);
        assert_eq!(counts.feature_ids(), &["g1_CDS", "g2_CDS"]);
        assert_eq!(counts.feature_counts(0).to_vec(), vec![5.0, 6.0]);
        assert_eq!(lengths.get("g2_CDS"), Some(201.0));
    }
}
