//! Pipeline configuration loaded from JSON

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::assemble::{ColumnOrder, FeatureSubset, QuantInput, CANONICAL_SUFFIX};
use crate::detection::DetectionParams;
use crate::diff::DiffDesign;
use crate::error::{Result, TeError};
use crate::io::{AnnotationTableSpec, MetadataTableSpec};
use crate::reconcile::ReconcileParams;
use crate::te::{Centering, TeParams};

/// Feature level the pipeline runs at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureGranularity {
    Gene,
    #[default]
    Orf,
}

impl FeatureGranularity {
    /// Raw-count mean a feature must exceed to enter TE
    pub fn default_min_mean_count(&self) -> f64 {
        match self {
            FeatureGranularity::Gene => 4.0,
            FeatureGranularity::Orf => 128.0,
        }
    }

    /// Pseudocount of the log2 TE transform
    pub fn default_pseudocount(&self) -> f64 {
        match self {
            FeatureGranularity::Gene => 0.01,
            FeatureGranularity::Orf => 0.1,
        }
    }
}

/// Full pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample table export (CSV/TSV)
    pub metadata: PathBuf,
    pub metadata_spec: MetadataTableSpec,
    /// Ribo-seq quantifier tables, stacked in order
    pub ribo_inputs: Vec<QuantInput>,
    /// RNA-seq quantifier tables, stacked in order
    pub rna_inputs: Vec<QuantInput>,
    /// Interval file for lengths; the quantifier length columns are used otherwise.
    /// Unsuffixed IDs also serve the inputs' `feature_suffix` variants.
    pub lengths: Option<PathBuf>,
    pub annotation: Option<PathBuf>,
    pub annotation_spec: AnnotationTableSpec,
    pub output_dir: PathBuf,

    pub granularity: FeatureGranularity,
    pub reconcile: ReconcileParams,
    pub column_order: ColumnOrder,
    pub feature_subset: FeatureSubset,
    pub canonical_suffix: String,
    pub exclude_samples: Vec<String>,
    pub require_paired: bool,

    /// Overrides the granularity default
    pub min_mean_count: Option<f64>,
    /// Overrides the granularity default
    pub pseudocount: Option<f64>,
    pub centering: Centering,
    pub detection: DetectionParams,

    /// Engine inputs are written under `output_dir/diff_{ribo,rna}` when set
    pub diff_design: Option<DiffDesign>,
    /// Rewrite outputs that already exist
    pub overwrite: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            metadata: PathBuf::new(),
            metadata_spec: MetadataTableSpec::default(),
            ribo_inputs: Vec::new(),
            rna_inputs: Vec::new(),
            lengths: None,
            annotation: None,
            annotation_spec: AnnotationTableSpec::default(),
            output_dir: PathBuf::from("results"),
            granularity: FeatureGranularity::default(),
            reconcile: ReconcileParams::default(),
            column_order: ColumnOrder::default(),
            feature_subset: FeatureSubset::default(),
            canonical_suffix: CANONICAL_SUFFIX.to_string(),
            exclude_samples: Vec::new(),
            require_paired: true,
            min_mean_count: None,
            pseudocount: None,
            centering: Centering::default(),
            detection: DetectionParams::default(),
            diff_design: None,
            overwrite: false,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON configuration file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let config: PipelineConfig = serde_json::from_reader(BufReader::new(file))?;
        config.validate()?;
        log::debug!("Loaded configuration from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.metadata.as_os_str().is_empty() {
            return Err(TeError::InvalidInput {
                reason: "configuration lacks a metadata path".to_string(),
            });
        }
        if self.ribo_inputs.is_empty() || self.rna_inputs.is_empty() {
            return Err(TeError::InvalidInput {
                reason: "configuration needs at least one Ribo-seq and one RNA-seq input".to_string(),
            });
        }
        if let Some(eps) = self.pseudocount {
            if !(eps > 0.0) {
                return Err(TeError::InvalidInput {
                    reason: format!("pseudocount must be positive, got {}", eps),
                });
            }
        }
        Ok(())
    }

    /// TE parameters with granularity defaults filled in
    pub fn te_params(&self) -> TeParams {
        TeParams {
            pseudocount: self
                .pseudocount
                .unwrap_or_else(|| self.granularity.default_pseudocount()),
            centering: self.centering,
            min_mean_count: self
                .min_mean_count
                .unwrap_or_else(|| self.granularity.default_min_mean_count()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_granularity_defaults() {
        let mut config = PipelineConfig::default();
        assert_eq!(config.te_params().min_mean_count, 128.0);
        assert_eq!(config.te_params().pseudocount, 0.1);

        config.granularity = FeatureGranularity::Gene;
        assert_eq!(config.te_params().min_mean_count, 4.0);
        assert_eq!(config.te_params().pseudocount, 0.01);

        config.pseudocount = Some(0.5);
        assert_eq!(config.te_params().pseudocount, 0.5);
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "metadata": "samples.tsv",
                "ribo_inputs": [{"path": "ribo_orfs.tsv", "spec": {"n_metadata_columns": 0, "length_column": null}}],
                "rna_inputs": [{"path": "rna_genes.tsv", "feature_suffix": "_CDS"}],
                "granularity": "gene",
                "centering": "mean_sd",
                "detection": {"threshold": 2.5},
                "reconcile": {"ambiguity": "first_in_table"}
            }"#,
        )
        .unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.granularity, FeatureGranularity::Gene);
        assert_eq!(config.centering, Centering::MeanSd);
        assert_eq!(config.detection.threshold, 2.5);
        assert_eq!(config.detection.min_samples, 5);
        assert_eq!(config.ribo_inputs[0].spec.n_metadata_columns, 0);
        assert_eq!(config.rna_inputs[0].spec.n_metadata_columns, 5);
        assert_eq!(config.rna_inputs[0].feature_suffix.as_deref(), Some("_CDS"));
        assert!(config.require_paired);
        assert_eq!(config.output_dir, PathBuf::from("results"));
    }

    #[test]
    fn test_missing_inputs_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"metadata": "samples.tsv"}"#).unwrap();
        assert!(matches!(
            PipelineConfig::from_json_file(&path).unwrap_err(),
            TeError::InvalidInput { .. }
        ));
    }
}
