//! Metadata structures for samples and features

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Result, TeError};

/// Category reported for features missing from the annotation table
pub const UNANNOTATED: &str = "unannotated";

/// Sequencing library a quantification comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryType {
    /// RNA-seq (transcript abundance, TPM)
    Rna,
    /// Ribo-seq (ribosome occupancy, PPM)
    Ribo,
}

impl std::fmt::Display for LibraryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LibraryType::Rna => write!(f, "RNA-seq"),
            LibraryType::Ribo => write!(f, "Ribo-seq"),
        }
    }
}

/// Sample table curated alongside the sequencing runs.
///
/// Each row holds the canonical sample ID, the free-text file references of its
/// RNA-seq and Ribo-seq libraries, and categorical attributes (sample type,
/// subgroup, MYC status, ...). Rows keep their table order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleMetadata {
    sample_ids: Vec<String>,
    rna_files: Vec<String>,
    ribo_files: Vec<String>,
    /// Categorical attributes (column name -> value for each sample)
    conditions: BTreeMap<String, Vec<String>>,
}

impl SampleMetadata {
    /// Create new sample metadata. Sample IDs must be unique.
    pub fn new(
        sample_ids: Vec<String>,
        rna_files: Vec<String>,
        ribo_files: Vec<String>,
    ) -> Result<Self> {
        let n = sample_ids.len();
        for (name, len) in [("RNA-seq file", rna_files.len()), ("Ribo-seq file", ribo_files.len())] {
            if len != n {
                return Err(TeError::DimensionMismatch {
                    expected: format!("{} {} values", n, name),
                    got: format!("{} values", len),
                });
            }
        }

        let mut seen = HashSet::new();
        for id in &sample_ids {
            if !seen.insert(id) {
                return Err(TeError::InvalidMetadata {
                    reason: format!("duplicate sample ID '{}'", id),
                });
            }
        }

        Ok(Self {
            sample_ids,
            rna_files,
            ribo_files,
            conditions: BTreeMap::new(),
        })
    }

    /// Add a categorical attribute column
    pub fn add_condition(&mut self, name: &str, values: Vec<String>) -> Result<()> {
        if values.len() != self.sample_ids.len() {
            return Err(TeError::DimensionMismatch {
                expected: format!("{} values", self.sample_ids.len()),
                got: format!("{} values", values.len()),
            });
        }
        self.conditions.insert(name.to_string(), values);
        Ok(())
    }

    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    /// Get the value of a condition for a specific sample
    pub fn get_value(&self, condition: &str, sample_idx: usize) -> Result<String> {
        self.conditions
            .get(condition)
            .and_then(|v| v.get(sample_idx))
            .cloned()
            .ok_or_else(|| TeError::InvalidInput {
                reason: format!(
                    "condition '{}' or sample index {} not found",
                    condition, sample_idx
                ),
            })
    }

    /// Get condition values for a specific column
    pub fn condition(&self, name: &str) -> Option<&Vec<String>> {
        self.conditions.get(name)
    }

    /// All condition names, sorted
    pub fn condition_names(&self) -> Vec<&str> {
        self.conditions.keys().map(|s| s.as_str()).collect()
    }

    /// Get unique levels for a condition (sorted)
    pub fn levels(&self, condition_name: &str) -> Option<Vec<String>> {
        self.conditions.get(condition_name).map(|values| {
            let mut unique: Vec<String> = values.to_vec();
            unique.sort();
            unique.dedup();
            unique
        })
    }

    /// Get sample indices for a specific condition level
    pub fn samples_with_level(&self, condition_name: &str, level: &str) -> Vec<usize> {
        self.conditions
            .get(condition_name)
            .map(|values| {
                values
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| v.as_str() == level)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn sample_index(&self, sample_id: &str) -> Option<usize> {
        self.sample_ids.iter().position(|id| id == sample_id)
    }

    /// Free-text file references for one library type, one entry per row
    pub fn file_fields(&self, library: LibraryType) -> &[String] {
        match library {
            LibraryType::Rna => &self.rna_files,
            LibraryType::Ribo => &self.ribo_files,
        }
    }

    /// Indices of samples that have both an RNA-seq and a Ribo-seq library
    pub fn paired_samples(&self) -> Vec<usize> {
        (0..self.n_samples())
            .filter(|&i| !self.rna_files[i].trim().is_empty() && !self.ribo_files[i].trim().is_empty())
            .collect()
    }

    /// Subset metadata to specific samples
    pub fn subset(&self, sample_indices: &[usize]) -> Result<Self> {
        let pick = |v: &[String]| -> Vec<String> {
            sample_indices.iter().map(|&i| v[i].clone()).collect()
        };

        let mut new_meta = SampleMetadata::new(
            pick(&self.sample_ids),
            pick(&self.rna_files),
            pick(&self.ribo_files),
        )?;

        for (name, values) in &self.conditions {
            new_meta.add_condition(name, pick(values))?;
        }

        Ok(new_meta)
    }

    /// Drop excluded samples and, if requested, samples lacking paired libraries
    pub fn filter_samples(&self, excluded: &[String], require_paired: bool) -> Result<Self> {
        let paired: HashSet<usize> = self.paired_samples().into_iter().collect();
        let keep: Vec<usize> = (0..self.n_samples())
            .filter(|&i| {
                let id = &self.sample_ids[i];
                if excluded.contains(id) {
                    log::info!("Excluding sample '{}' (exclusion list)", id);
                    return false;
                }
                if require_paired && !paired.contains(&i) {
                    log::info!("Excluding sample '{}' (no paired RNA-seq + Ribo-seq data)", id);
                    return false;
                }
                true
            })
            .collect();
        self.subset(&keep)
    }
}

/// One row of the ORF / gene reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub feature_id: String,
    pub gene_id: String,
    pub gene_name: String,
    /// Biotype or ORF category (CDS, uORF, dORF, lncRNA-ORF, ...)
    pub category: String,
    pub canonical: bool,
}

/// Feature reference annotation keyed by feature ID
#[derive(Debug, Clone, Default)]
pub struct FeatureAnnotation {
    records: Vec<FeatureRecord>,
    index: HashMap<String, usize>,
}

impl FeatureAnnotation {
    /// Build the index. Repeated feature IDs keep their first record.
    pub fn new(records: Vec<FeatureRecord>) -> Self {
        let mut index = HashMap::with_capacity(records.len());
        for (i, rec) in records.iter().enumerate() {
            if index.contains_key(&rec.feature_id) {
                log::warn!(
                    "Feature '{}' annotated more than once; keeping the first record",
                    rec.feature_id
                );
                continue;
            }
            index.insert(rec.feature_id.clone(), i);
        }
        Self { records, index }
    }

    pub fn get(&self, feature_id: &str) -> Option<&FeatureRecord> {
        self.index.get(feature_id).map(|&i| &self.records[i])
    }

    /// Category label, or [`UNANNOTATED`]
    pub fn category(&self, feature_id: &str) -> &str {
        self.get(feature_id)
            .map(|r| r.category.as_str())
            .unwrap_or(UNANNOTATED)
    }

    pub fn is_canonical(&self, feature_id: &str) -> Option<bool> {
        self.get(feature_id).map(|r| r.canonical)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    fn table() -> SampleMetadata {
        let mut meta = SampleMetadata::new(
            s(&["MB1", "MB2", "MB3", "MB4"]),
            s(&["mb1_rna.fq.gz", "mb2_rna.fq.gz", "", "mb4_rna.fq.gz"]),
            s(&["mb1_ribo.fq.gz", "mb2_ribo.fq.gz", "mb3_ribo.fq.gz", ""]),
        )
        .unwrap();
        meta.add_condition("myc_group", s(&["MYC-high", "MYC-low", "MYC-high", "MYC-low"]))
            .unwrap();
        meta
    }

    #[test]
    fn test_sample_metadata() {
        let meta = table();
        assert_eq!(meta.levels("myc_group").unwrap(), vec!["MYC-high", "MYC-low"]);
        assert_eq!(meta.samples_with_level("myc_group", "MYC-high"), vec![0, 2]);
        assert_eq!(meta.file_fields(LibraryType::Ribo)[2], "mb3_ribo.fq.gz");
    }

    #[test]
    fn test_duplicate_sample_ids_rejected() {
        let result = SampleMetadata::new(s(&["A", "A"]), s(&["", ""]), s(&["", ""]));
        assert!(matches!(result, Err(TeError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_filter_samples_paired_and_excluded() {
        let meta = table();
        assert_eq!(meta.paired_samples(), vec![0, 1]);

        let kept = meta.filter_samples(&s(&["MB2"]), true).unwrap();
        assert_eq!(kept.sample_ids(), &["MB1"]);
        assert_eq!(kept.get_value("myc_group", 0).unwrap(), "MYC-high");

        let unpaired = meta.filter_samples(&[], false).unwrap();
        assert_eq!(unpaired.n_samples(), 4);
    }

    #[test]
    fn test_feature_annotation_lookup() {
        let ann = FeatureAnnotation::new(vec![
            FeatureRecord {
                feature_id: "ENST1_CDS".to_string(),
                gene_id: "ENSG1".to_string(),
                gene_name: "MYC".to_string(),
                category: "ORF_annotated".to_string(),
                canonical: true,
            },
            FeatureRecord {
                feature_id: "ENST1_uORF1".to_string(),
                gene_id: "ENSG1".to_string(),
                gene_name: "MYC".to_string(),
                category: "uORF".to_string(),
                canonical: false,
            },
        ]);
        assert_eq!(ann.len(), 2);
        assert_eq!(ann.category("ENST1_uORF1"), "uORF");
        assert_eq!(ann.category("nope"), UNANNOTATED);
        assert_eq!(ann.is_canonical("ENST1_CDS"), Some(true));
        assert_eq!(ann.is_canonical("nope"), None);
    }
}
