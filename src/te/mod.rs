//! Translational efficiency: ribosome occupancy over transcript abundance
//!
//! TE is computed per feature and sample as `occupancy / transcript` on the
//! PPM and TPM matrices. Cells whose ratio is not finite (x/0 and 0/0) are
//! set to 0. The log view is `log2(te + pseudocount)`; the centered view
//! subtracts a per-feature location (and optionally divides by scale) so
//! samples can be compared within a feature.

use std::collections::{HashMap, HashSet};

use ndarray::{Array2, ArrayView2, Axis, Zip};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::{CountMatrix, FeatureLengths};
use crate::error::{Result, TeError};
use crate::normalization::{ppm, tpm, AbundanceMatrix};
use crate::stats::{mean_sd, median};

/// Per-feature centering of the log2 TE matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Centering {
    /// Subtract the row median
    #[default]
    Median,
    /// Subtract the row mean and divide by the row sample SD
    MeanSd,
    /// No centered view
    None,
}

/// Parameters for TE computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TeParams {
    /// Added before the log transform
    pub pseudocount: f64,
    pub centering: Centering,
    /// Raw-count filter applied before normalization (mean across samples, strict `>`)
    pub min_mean_count: f64,
}

impl Default for TeParams {
    fn default() -> Self {
        Self {
            pseudocount: 0.01,
            centering: Centering::Median,
            min_mean_count: 4.0,
        }
    }
}

/// Raw, log2 and centered TE sharing one set of keys
#[derive(Debug, Clone)]
pub struct TeMatrices {
    pub feature_ids: Vec<String>,
    pub sample_ids: Vec<String>,
    pub raw: Array2<f64>,
    pub log2: Array2<f64>,
    /// Absent when `Centering::None`
    pub centered: Option<Array2<f64>>,
    pub params: TeParams,
}

impl TeMatrices {
    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }
}

/// Restrict both matrices to their shared features and samples.
///
/// Shared keys keep the occupancy matrix's order.
pub fn intersect_inputs(
    occupancy: &AbundanceMatrix,
    transcript: &AbundanceMatrix,
) -> Result<(AbundanceMatrix, AbundanceMatrix)> {
    let (occ_f, tx_f) = shared_positions(occupancy.feature_ids(), transcript.feature_ids());
    if occ_f.is_empty() {
        return Err(TeError::FeatureSetEmpty {
            reason: format!(
                "no shared features between {} ({} features) and {} ({} features)",
                occupancy.unit(),
                occupancy.n_features(),
                transcript.unit(),
                transcript.n_features()
            ),
        });
    }

    let (occ_s, tx_s) = shared_positions(occupancy.sample_ids(), transcript.sample_ids());
    if occ_s.is_empty() {
        return Err(TeError::EmptyData {
            reason: format!(
                "no shared samples between {} and {}",
                occupancy.unit(),
                transcript.unit()
            ),
        });
    }

    let dropped_features = occupancy.n_features() + transcript.n_features() - 2 * occ_f.len();
    let dropped_samples = occupancy.n_samples() + transcript.n_samples() - 2 * occ_s.len();
    if dropped_samples > 0 {
        log::warn!(
            "{} sample columns not shared between {} and {} are dropped",
            dropped_samples,
            occupancy.unit(),
            transcript.unit()
        );
    }
    log::info!(
        "TE input: {} shared features ({} unshared dropped), {} shared samples",
        occ_f.len(),
        dropped_features,
        occ_s.len()
    );

    Ok((
        occupancy.select(&occ_f, &occ_s),
        transcript.select(&tx_f, &tx_s),
    ))
}

/// Positions in `left` and `right` of the keys they share, in `left` order
fn shared_positions(left: &[String], right: &[String]) -> (Vec<usize>, Vec<usize>) {
    let right_pos: HashMap<&str, usize> = right
        .iter()
        .enumerate()
        .map(|(j, id)| (id.as_str(), j))
        .collect();
    left.iter()
        .enumerate()
        .filter_map(|(i, id)| right_pos.get(id.as_str()).map(|&j| (i, j)))
        .unzip()
}

fn check_same_keys(what: &str, left: &[String], right: &[String]) -> Result<()> {
    if left == right {
        return Ok(());
    }
    if left.len() != right.len() {
        return Err(TeError::DimensionMismatch {
            expected: format!("{} occupancy {}", left.len(), what),
            got: format!("{} transcript {}", right.len(), what),
        });
    }
    let l: HashSet<&String> = left.iter().collect();
    let r: HashSet<&String> = right.iter().collect();
    let detail = if l == r {
        format!("same {} in a different order", what)
    } else {
        let only_left: Vec<&str> = left
            .iter()
            .filter(|x| !r.contains(x))
            .take(5)
            .map(|s| s.as_str())
            .collect();
        format!("{} only in occupancy (first 5): {:?}", what, only_left)
    };
    Err(TeError::ColumnSetMismatch {
        left: "occupancy".to_string(),
        right: "transcript".to_string(),
        detail,
    })
}

/// TE ratio with non-finite cells set to 0
pub fn te_ratio(occupancy: ArrayView2<f64>, transcript: ArrayView2<f64>) -> Array2<f64> {
    let mut raw: Array2<f64> = Array2::zeros(occupancy.raw_dim());
    Zip::from(&mut raw)
        .and(&occupancy)
        .and(&transcript)
        .for_each(|te, &o, &t| {
            let ratio = o / t;
            *te = if ratio.is_finite() { ratio } else { 0.0 };
        });
    raw
}

/// Center each row of `values`. Returns `None` for `Centering::None`.
pub fn center_rows(values: ArrayView2<f64>, centering: Centering) -> Option<Array2<f64>> {
    if centering == Centering::None {
        return None;
    }

    let rows: Vec<Vec<f64>> = (0..values.nrows())
        .into_par_iter()
        .map(|i| {
            let row: Vec<f64> = values.row(i).to_vec();
            match centering {
                Centering::Median => {
                    let m = median(&row);
                    row.iter().map(|&x| x - m).collect()
                }
                Centering::MeanSd => {
                    let (mean, sd) = mean_sd(&row);
                    if sd > 0.0 && sd.is_finite() {
                        row.iter().map(|&x| (x - mean) / sd).collect()
                    } else {
                        vec![0.0; row.len()]
                    }
                }
                Centering::None => row,
            }
        })
        .collect();

    let mut centered: Array2<f64> = Array2::zeros(values.raw_dim());
    for (mut out, row) in centered.axis_iter_mut(Axis(0)).zip(rows) {
        for (o, v) in out.iter_mut().zip(row) {
            *o = v;
        }
    }
    Some(centered)
}

/// Compute raw, log2 and centered TE.
///
/// Both matrices must carry identical feature and sample keys in the same
/// order; use [`intersect_inputs`] first otherwise.
pub fn translational_efficiency(
    occupancy: &AbundanceMatrix,
    transcript: &AbundanceMatrix,
    params: &TeParams,
) -> Result<TeMatrices> {
    check_same_keys("features", occupancy.feature_ids(), transcript.feature_ids())?;
    check_same_keys("samples", occupancy.sample_ids(), transcript.sample_ids())?;

    if !(params.pseudocount > 0.0) {
        return Err(TeError::InvalidInput {
            reason: format!("pseudocount must be positive, got {}", params.pseudocount),
        });
    }

    let raw = te_ratio(occupancy.values(), transcript.values());
    let zeroed = transcript.values().iter().filter(|&&t| t == 0.0).count();
    if zeroed > 0 {
        log::debug!("{} TE cells with zero transcript abundance set to 0", zeroed);
    }

    let eps = params.pseudocount;
    let log2 = raw.mapv(|te| (te + eps).log2());
    let centered = center_rows(log2.view(), params.centering);

    log::info!(
        "TE computed for {} features x {} samples (pseudocount {}, centering {:?})",
        raw.nrows(),
        raw.ncols(),
        eps,
        params.centering
    );

    Ok(TeMatrices {
        feature_ids: occupancy.feature_ids().to_vec(),
        sample_ids: occupancy.sample_ids().to_vec(),
        raw,
        log2,
        centered,
        params: params.clone(),
    })
}

/// Filter raw counts, normalize to PPM and TPM, and intersect.
///
/// The same `lengths` serve both libraries; they share one feature space.
pub fn prepare_te_inputs(
    ribo_counts: &CountMatrix,
    rna_counts: &CountMatrix,
    lengths: &FeatureLengths,
    params: &TeParams,
) -> Result<(AbundanceMatrix, AbundanceMatrix)> {
    let ribo = ribo_counts.filter_min_mean(params.min_mean_count)?;
    if ribo.n_features() == 0 {
        return Err(TeError::FeatureSetEmpty {
            reason: format!("no Ribo-seq feature has mean count > {}", params.min_mean_count),
        });
    }
    let rna = rna_counts.filter_min_mean(params.min_mean_count)?;
    if rna.n_features() == 0 {
        return Err(TeError::FeatureSetEmpty {
            reason: format!("no RNA-seq feature has mean count > {}", params.min_mean_count),
        });
    }
    log::info!(
        "Min-mean filter (> {}): {} Ribo-seq and {} RNA-seq features kept",
        params.min_mean_count,
        ribo.n_features(),
        rna.n_features()
    );

    let occupancy = ppm(&ribo, lengths)?;
    let transcript = tpm(&rna, lengths)?;
    intersect_inputs(&occupancy, &transcript)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalization::AbundanceUnit;
    use ndarray::array;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    fn abundance(values: Array2<f64>, f: &[&str], smp: &[&str], unit: AbundanceUnit) -> AbundanceMatrix {
        AbundanceMatrix::new(values, s(f), s(smp), unit).unwrap()
    }

    #[test]
    fn test_worked_example() {
        let occ = abundance(array![[8.0, 8.0]], &["f"], &["S1", "S2"], AbundanceUnit::Ppm);
        let tx = abundance(array![[2.0, 8.0]], &["f"], &["S1", "S2"], AbundanceUnit::Tpm);
        let te = translational_efficiency(&occ, &tx, &TeParams::default()).unwrap();

        assert_eq!(te.raw, array![[4.0, 1.0]]);
        assert!((te.log2[[0, 0]] - 4.01f64.log2()).abs() < 1e-12);
        assert!((te.log2[[0, 0]] - 2.0036).abs() < 1e-3);
        assert!((te.log2[[0, 1]] - 0.0144).abs() < 1e-3);

        let centered = te.centered.unwrap();
        assert!((centered[[0, 0]] - 0.995).abs() < 1e-3);
        assert!((centered[[0, 1]] + 0.995).abs() < 1e-3);
    }

    #[test]
    fn test_zero_transcript_gives_zero_te() {
        let occ = abundance(array![[5.0, 0.0, 3.0]], &["f"], &["S1", "S2", "S3"], AbundanceUnit::Ppm);
        let tx = abundance(array![[0.0, 0.0, 1.5]], &["f"], &["S1", "S2", "S3"], AbundanceUnit::Tpm);
        let te = translational_efficiency(&occ, &tx, &TeParams::default()).unwrap();
        assert_eq!(te.raw, array![[0.0, 0.0, 2.0]]);
        assert!(te.log2.iter().all(|v| v.is_finite()));
        assert!((te.log2[[0, 0]] - 0.01f64.log2()).abs() < 1e-12);
    }

    #[test]
    fn test_mean_sd_centering() {
        let values = array![[1.0, 2.0, 3.0], [5.0, 5.0, 5.0]];
        let c = center_rows(values.view(), Centering::MeanSd).unwrap();
        assert!((c[[0, 0]] + 1.0).abs() < 1e-12);
        assert!(c[[0, 1]].abs() < 1e-12);
        assert!((c[[0, 2]] - 1.0).abs() < 1e-12);
        assert_eq!(c.row(1).to_vec(), vec![0.0, 0.0, 0.0]);
        assert!(center_rows(values.view(), Centering::None).is_none());
    }

    #[test]
    fn test_key_mismatch_is_rejected() {
        let occ = abundance(array![[1.0, 2.0]], &["f"], &["S1", "S2"], AbundanceUnit::Ppm);
        let swapped = abundance(array![[1.0, 2.0]], &["f"], &["S2", "S1"], AbundanceUnit::Tpm);
        let err = translational_efficiency(&occ, &swapped, &TeParams::default()).unwrap_err();
        assert!(matches!(err, TeError::ColumnSetMismatch { .. }));

        let narrower = abundance(array![[1.0]], &["f"], &["S1"], AbundanceUnit::Tpm);
        let err = translational_efficiency(&occ, &narrower, &TeParams::default()).unwrap_err();
        assert!(matches!(err, TeError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_intersection_keeps_occupancy_order() {
        let occ = abundance(
            array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]],
            &["c", "a", "b"],
            &["S3", "S1", "S2"],
            AbundanceUnit::Ppm,
        );
        let tx = abundance(
            array![[1.0, 1.0], [2.0, 2.0], [3.0, 3.0]],
            &["a", "b", "z"],
            &["S1", "S3"],
            AbundanceUnit::Tpm,
        );
        let (o, t) = intersect_inputs(&occ, &tx).unwrap();
        assert_eq!(o.feature_ids(), &["a", "b"]);
        assert_eq!(o.sample_ids(), &["S3", "S1"]);
        assert_eq!(t.feature_ids(), o.feature_ids());
        assert_eq!(t.sample_ids(), o.sample_ids());
        assert_eq!(o.values()[[0, 0]], 4.0);
        assert_eq!(t.values()[[1, 0]], 2.0);
    }

    #[test]
    fn test_disjoint_features_error() {
        let occ = abundance(array![[1.0]], &["a"], &["S1"], AbundanceUnit::Ppm);
        let tx = abundance(array![[1.0]], &["b"], &["S1"], AbundanceUnit::Tpm);
        assert!(matches!(
            intersect_inputs(&occ, &tx).unwrap_err(),
            TeError::FeatureSetEmpty { .. }
        ));

        let tx2 = abundance(array![[1.0]], &["a"], &["S9"], AbundanceUnit::Tpm);
        assert!(matches!(
            intersect_inputs(&occ, &tx2).unwrap_err(),
            TeError::EmptyData { .. }
        ));
    }

    #[test]
    fn test_prepare_inputs_filters_on_raw_mean() {
        let lengths = FeatureLengths::from_pairs(
            [("a", 1000.0), ("b", 1000.0), ("c", 500.0)]
                .iter()
                .map(|(k, v)| (k.to_string(), *v)),
        );
        let ribo = CountMatrix::new(
            array![[200.0, 300.0], [2.0, 4.0], [150.0, 150.0]],
            s(&["a", "b", "c"]),
            s(&["S1", "S2"]),
        )
        .unwrap();
        let rna = CountMatrix::new(
            array![[50.0, 60.0], [80.0, 90.0], [3.0, 4.0]],
            s(&["a", "b", "c"]),
            s(&["S1", "S2"]),
        )
        .unwrap();
        let params = TeParams::default();
        let (occ, tx) = prepare_te_inputs(&ribo, &rna, &lengths, &params).unwrap();
        // b fails on Ribo-seq, c fails on RNA-seq
        assert_eq!(occ.feature_ids(), &["a"]);
        assert_eq!(tx.feature_ids(), &["a"]);

        let strict = TeParams {
            min_mean_count: 1000.0,
            ..TeParams::default()
        };
        assert!(matches!(
            prepare_te_inputs(&ribo, &rna, &lengths, &strict).unwrap_err(),
            TeError::FeatureSetEmpty { .. }
        ));
    }
}
