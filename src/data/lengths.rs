//! Per-feature lengths in nucleotides

use std::collections::HashMap;

/// Feature lengths keyed by feature ID.
///
/// Lengths come either from the quantifier's `Length` column or from an
/// interval file (see [`crate::io::read_interval_lengths`]).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureLengths {
    lengths: HashMap<String, f64>,
}

impl FeatureLengths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        Self {
            lengths: pairs.into_iter().collect(),
        }
    }

    /// Insert or replace a length
    pub fn insert(&mut self, feature_id: String, length: f64) {
        self.lengths.insert(feature_id, length);
    }

    /// Add to an existing length (or start a new one)
    pub fn add(&mut self, feature_id: &str, length: f64) {
        *self.lengths.entry(feature_id.to_string()).or_insert(0.0) += length;
    }

    /// Length of a feature, if it is known and positive
    pub fn get(&self, feature_id: &str) -> Option<f64> {
        self.lengths
            .get(feature_id)
            .copied()
            .filter(|&l| l.is_finite() && l > 0.0)
    }

    /// Copy of these lengths with `suffix` appended to every key
    pub fn with_suffix(&self, suffix: &str) -> Self {
        Self {
            lengths: self
                .lengths
                .iter()
                .map(|(k, &v)| (format!("{}{}", k, suffix), v))
                .collect(),
        }
    }

    /// Merge another table in; entries of `other` win on collision
    pub fn extend(&mut self, other: FeatureLengths) {
        self.lengths.extend(other.lengths);
    }

    /// Entries sorted by feature ID
    pub fn sorted_entries(&self) -> Vec<(&str, f64)> {
        let mut entries: Vec<(&str, f64)> = self.lengths.iter().map(|(k, &v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }
}
