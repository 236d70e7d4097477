//! Translation detection: abundance threshold plus sample support
//!
//! A cell passes when its abundance is strictly above the threshold; a feature
//! is detected when at least `min_samples` of its cells pass. The logic is the
//! same for PPM (translated ORFs) and TPM (expressed genes). The threshold is
//! calibrated by hand from the bimodal log2 abundance density and supplied as
//! configuration.

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{FeatureAnnotation, UNANNOTATED};
use crate::error::Result;
use crate::normalization::AbundanceMatrix;

/// Parameters for translation detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    /// Per-sample abundance threshold (strict `>`)
    pub threshold: f64,
    /// Minimum number of samples above threshold
    pub min_samples: usize,
}

impl Default for DetectionParams {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            min_samples: 5,
        }
    }
}

/// Per-feature detection call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFeature {
    pub feature_id: String,
    /// Number of samples above threshold
    pub support: usize,
    pub category: String,
    pub detected: bool,
}

/// Detection calls for every feature of the input matrix, in input order
#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub features: Vec<DetectedFeature>,
    /// Cell-level calls (features x samples)
    pub above_threshold: Array2<bool>,
    pub sample_ids: Vec<String>,
    pub params: DetectionParams,
}

/// Per-category totals of a detection run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub total: usize,
    pub detected: usize,
}

/// Classify features of an abundance matrix
pub fn detect_translated(
    abundance: &AbundanceMatrix,
    annotation: Option<&FeatureAnnotation>,
    params: &DetectionParams,
) -> DetectionResult {
    let above_threshold = abundance.values().mapv(|v| v > params.threshold);

    let support: Vec<usize> = (0..above_threshold.nrows())
        .into_par_iter()
        .map(|i| above_threshold.row(i).iter().filter(|&&b| b).count())
        .collect();

    let features: Vec<DetectedFeature> = abundance
        .feature_ids()
        .iter()
        .zip(support)
        .map(|(id, support)| DetectedFeature {
            feature_id: id.clone(),
            support,
            category: annotation
                .map(|a| a.category(id))
                .unwrap_or(UNANNOTATED)
                .to_string(),
            detected: support >= params.min_samples,
        })
        .collect();

    let n_detected = features.iter().filter(|f| f.detected).count();
    log::info!(
        "{} of {} features detected ({} > {} in >= {} samples)",
        n_detected,
        features.len(),
        abundance.unit(),
        params.threshold,
        params.min_samples
    );

    DetectionResult {
        features,
        above_threshold,
        sample_ids: abundance.sample_ids().to_vec(),
        params: params.clone(),
    }
}

impl DetectionResult {
    /// IDs of detected features, in input order
    pub fn detected_ids(&self) -> Vec<&str> {
        self.features
            .iter()
            .filter(|f| f.detected)
            .map(|f| f.feature_id.as_str())
            .collect()
    }

    /// Detected and total counts per category, sorted by category
    pub fn summarize_by_category(&self) -> Vec<CategorySummary> {
        let mut by_cat: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
        for f in &self.features {
            let entry = by_cat.entry(f.category.as_str()).or_insert((0, 0));
            entry.0 += 1;
            if f.detected {
                entry.1 += 1;
            }
        }
        by_cat
            .into_iter()
            .map(|(category, (total, detected))| CategorySummary {
                category: category.to_string(),
                total,
                detected,
            })
            .collect()
    }

    /// Write one row per feature: feature_id, support, category, detected
    pub fn write_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for f in &self.features {
            writer.serialize(f)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the per-category summary
    pub fn write_category_summary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in self.summarize_by_category() {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FeatureRecord;
    use crate::normalization::AbundanceUnit;
    use ndarray::array;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    fn matrix() -> AbundanceMatrix {
        AbundanceMatrix::new(
            array![
                [2.0, 3.0, 0.5, 8.0],
                [1.0, 1.0, 1.0, 1.0],
                [0.0, 5.0, 5.0, 0.0],
                [9.0, 9.0, 9.0, 9.0],
            ],
            s(&["orfA", "orfB", "orfC", "orfD"]),
            s(&["S1", "S2", "S3", "S4"]),
            AbundanceUnit::Ppm,
        )
        .unwrap()
    }

    #[test]
    fn test_threshold_is_strict() {
        let params = DetectionParams {
            threshold: 1.0,
            min_samples: 1,
        };
        let res = detect_translated(&matrix(), None, &params);
        assert_eq!(res.features[1].support, 0);
        assert!(!res.features[1].detected);
        assert_eq!(res.features[0].support, 3);
        assert_eq!(res.features[0].category, UNANNOTATED);
        assert!(res.above_threshold[[0, 0]]);
        assert!(!res.above_threshold[[0, 2]]);
    }

    #[test]
    fn test_min_samples_monotonic() {
        let m = matrix();
        let mut previous: Option<Vec<String>> = None;
        for min_samples in 0..=5 {
            let params = DetectionParams {
                threshold: 1.0,
                min_samples,
            };
            let detected: Vec<String> = detect_translated(&m, None, &params)
                .detected_ids()
                .iter()
                .map(|s| s.to_string())
                .collect();
            if let Some(prev) = &previous {
                assert!(detected.iter().all(|id| prev.contains(id)));
            }
            previous = Some(detected);
        }
        assert!(previous.unwrap().is_empty());
    }

    #[test]
    fn test_default_requires_five_samples() {
        let res = detect_translated(&matrix(), None, &DetectionParams::default());
        assert!(res.detected_ids().is_empty());
    }

    #[test]
    fn test_category_summary() {
        let rec = |id: &str, cat: &str| FeatureRecord {
            feature_id: id.to_string(),
            gene_id: "G".to_string(),
            gene_name: "G".to_string(),
            category: cat.to_string(),
            canonical: cat == "CDS",
        };
        let ann = FeatureAnnotation::new(vec![
            rec("orfA", "uORF"),
            rec("orfB", "uORF"),
            rec("orfD", "CDS"),
        ]);
        let params = DetectionParams {
            threshold: 1.0,
            min_samples: 2,
        };
        let res = detect_translated(&matrix(), Some(&ann), &params);
        let summary = res.summarize_by_category();
        assert_eq!(
            summary,
            vec![
                CategorySummary { category: "CDS".into(), total: 1, detected: 1 },
                CategorySummary { category: "uORF".into(), total: 2, detected: 1 },
                CategorySummary { category: UNANNOTATED.into(), total: 1, detected: 1 },
            ]
        );
    }

    #[test]
    fn test_write_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("detection.csv");
        let res = detect_translated(&matrix(), None, &DetectionParams::default());
        res.write_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("feature_id,support,category,detected"));
        assert_eq!(lines.next(), Some("orfA,3,unannotated,false"));
    }
}
