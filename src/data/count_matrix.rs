//! Count matrix representation for RNA-seq and Ribo-seq quantifications

use std::collections::{HashMap, HashSet};

use ndarray::{Array2, ArrayView1, ArrayView2, Axis};

use crate::error::{Result, TeError};

/// Deduplicate names by appending _1, _2, etc. to duplicates.
/// A generated name never collides with an original or an earlier generated one.
fn deduplicate_names(names: Vec<String>) -> Vec<String> {
    let originals: HashSet<String> = names.iter().cloned().collect();
    if originals.len() == names.len() {
        return names;
    }
    let mut taken: HashSet<String> = HashSet::with_capacity(names.len());
    let mut next_k: HashMap<String, usize> = HashMap::new();
    let mut result = Vec::with_capacity(names.len());
    for name in names {
        if taken.insert(name.clone()) {
            result.push(name);
            continue;
        }
        let k = next_k.entry(name.clone()).or_insert(1);
        let mut new_name = format!("{}_{}", name, k);
        while originals.contains(&new_name) || taken.contains(&new_name) {
            *k += 1;
            new_name = format!("{}_{}", name, k);
        }
        *k += 1;
        log::warn!("Duplicate feature ID '{}' renamed to '{}'", name, new_name);
        taken.insert(new_name.clone());
        result.push(new_name);
    }
    result
}

/// Raw read (or P-site) counts.
/// Rows are features (genes or ORFs), columns are samples.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Raw count data (features x samples)
    counts: Array2<f64>,
    /// Feature identifiers
    feature_ids: Vec<String>,
    /// Sample identifiers
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new count matrix from raw data
    pub fn new(
        counts: Array2<f64>,
        feature_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        let (n_features, n_samples) = counts.dim();

        if feature_ids.len() != n_features {
            return Err(TeError::DimensionMismatch {
                expected: format!("{} feature IDs", n_features),
                got: format!("{} feature IDs", feature_ids.len()),
            });
        }

        if sample_ids.len() != n_samples {
            return Err(TeError::DimensionMismatch {
                expected: format!("{} sample IDs", n_samples),
                got: format!("{} sample IDs", sample_ids.len()),
            });
        }

        if counts.iter().any(|&x| x < 0.0 || !x.is_finite()) {
            return Err(TeError::InvalidCountMatrix {
                reason: "Counts must be non-negative finite values".to_string(),
            });
        }

        let mut seen = HashSet::new();
        if let Some(dup) = sample_ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(TeError::InvalidCountMatrix {
                reason: format!("Duplicate sample column '{}'", dup),
            });
        }

        let feature_ids = deduplicate_names(feature_ids);

        Ok(Self {
            counts,
            feature_ids,
            sample_ids,
        })
    }

    /// Get the number of features
    pub fn n_features(&self) -> usize {
        self.counts.nrows()
    }

    /// Get the number of samples
    pub fn n_samples(&self) -> usize {
        self.counts.ncols()
    }

    /// Get the raw counts as a view
    pub fn counts(&self) -> ArrayView2<'_, f64> {
        self.counts.view()
    }

    /// Consume the matrix, returning its parts
    pub fn into_parts(self) -> (Array2<f64>, Vec<String>, Vec<String>) {
        (self.counts, self.feature_ids, self.sample_ids)
    }

    pub fn feature_ids(&self) -> &[String] {
        &self.feature_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Get counts for a specific feature
    pub fn feature_counts(&self, feature_idx: usize) -> ArrayView1<'_, f64> {
        self.counts.row(feature_idx)
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Calculate mean counts per feature across samples
    pub fn feature_means(&self) -> Vec<f64> {
        let n = self.n_samples() as f64;
        self.counts
            .axis_iter(Axis(0))
            .map(|row| if n > 0.0 { row.sum() / n } else { 0.0 })
            .collect()
    }

    /// Keep features whose mean raw count across samples is strictly above `min_mean`
    pub fn filter_min_mean(&self, min_mean: f64) -> Result<Self> {
        let keep: Vec<usize> = self
            .feature_means()
            .iter()
            .enumerate()
            .filter(|(_, &m)| m > min_mean)
            .map(|(i, _)| i)
            .collect();

        log::debug!(
            "Min-mean filter (> {}): kept {} of {} features",
            min_mean,
            keep.len(),
            self.n_features()
        );

        self.subset_features(&keep)
    }

    /// Subset to specific samples
    pub fn subset_samples(&self, sample_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(1), sample_indices);
        let new_sample_ids: Vec<String> = sample_indices
            .iter()
            .map(|&i| self.sample_ids[i].clone())
            .collect();

        Self::new(new_counts, self.feature_ids.clone(), new_sample_ids)
    }

    /// Subset to specific features
    pub fn subset_features(&self, feature_indices: &[usize]) -> Result<Self> {
        let new_counts = self.counts.select(Axis(0), feature_indices);
        let new_feature_ids: Vec<String> = feature_indices
            .iter()
            .map(|&i| self.feature_ids[i].clone())
            .collect();

        Self::new(new_counts, new_feature_ids, self.sample_ids.clone())
    }

    /// Select samples by ID, in the given order. Unknown IDs are an error.
    pub fn select_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let indices = sample_ids
            .iter()
            .map(|id| {
                self.sample_index(id).ok_or_else(|| TeError::InvalidInput {
                    reason: format!("sample '{}' not present in count matrix", id),
                })
            })
            .collect::<Result<Vec<usize>>>()?;
        self.subset_samples(&indices)
    }

    /// Replace sample IDs positionally
    pub fn rename_samples(&self, new_ids: Vec<String>) -> Result<Self> {
        Self::new(self.counts.clone(), self.feature_ids.clone(), new_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_count_matrix_creation() {
        let counts = array![[10.0, 20.0, 30.0], [5.0, 15.0, 25.0]];
        let matrix =
            CountMatrix::new(counts, ids(&["g1", "g2"]), ids(&["s1", "s2", "s3"])).unwrap();
        assert_eq!(matrix.n_features(), 2);
        assert_eq!(matrix.n_samples(), 3);
    }

    #[test]
    fn test_negative_counts_rejected() {
        let counts = array![[10.0, -5.0], [5.0, 15.0]];
        let result = CountMatrix::new(counts, ids(&["g1", "g2"]), ids(&["s1", "s2"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_features_are_suffixed() {
        let counts = array![[1.0], [2.0], [3.0]];
        let matrix = CountMatrix::new(counts, ids(&["orf", "orf", "orf"]), ids(&["s1"])).unwrap();
        assert_eq!(matrix.feature_ids(), &["orf", "orf_1", "orf_2"]);
    }

    #[test]
    fn test_renamed_duplicates_do_not_collide() {
        let counts = array![[1.0], [2.0], [3.0]];
        let matrix = CountMatrix::new(counts, ids(&["g", "g", "g_1"]), ids(&["s1"])).unwrap();
        assert_eq!(matrix.feature_ids(), &["g", "g_2", "g_1"]);

        let counts = array![[1.0], [2.0], [3.0], [4.0]];
        let matrix =
            CountMatrix::new(counts, ids(&["g_1", "g", "g", "g"]), ids(&["s1"])).unwrap();
        assert_eq!(matrix.feature_ids(), &["g_1", "g", "g_2", "g_3"]);
        assert_eq!(matrix.counts()[[2, 0]], 3.0);
    }

    #[test]
    fn test_duplicate_samples_rejected() {
        let counts = array![[1.0, 2.0]];
        assert!(CountMatrix::new(counts, ids(&["g1"]), ids(&["s1", "s1"])).is_err());
    }

    #[test]
    fn test_filter_min_mean_is_strict() {
        let counts = array![[4.0, 4.0], [5.0, 4.0], [0.0, 0.0]];
        let matrix =
            CountMatrix::new(counts, ids(&["g1", "g2", "g3"]), ids(&["s1", "s2"])).unwrap();
        let filtered = matrix.filter_min_mean(4.0).unwrap();
        assert_eq!(filtered.feature_ids(), &["g2"]);
    }

    #[test]
    fn test_select_samples() {
        let counts = array![[1.0, 2.0, 3.0]];
        let matrix = CountMatrix::new(counts, ids(&["g1"]), ids(&["a", "b", "c"])).unwrap();

        let picked = matrix.select_samples(&ids(&["c", "a"])).unwrap();
        assert_eq!(picked.sample_ids(), &["c", "a"]);
        assert_eq!(picked.counts()[[0, 0]], 3.0);

        assert!(matrix.select_samples(&ids(&["missing"])).is_err());
    }
}
