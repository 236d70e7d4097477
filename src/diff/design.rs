//! Hand-off of count matrices to an external differential-testing engine

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::{CountMatrix, SampleMetadata};
use crate::error::{Result, TeError};
use crate::io::write_count_matrix;

/// Comparison of two levels of one design variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contrast {
    pub variable: String,
    pub numerator: String,
    /// Reference level
    pub denominator: String,
}

/// Additive design over sample-table attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffDesign {
    pub variables: Vec<String>,
    #[serde(default)]
    pub contrast: Option<Contrast>,
}

impl DiffDesign {
    pub fn new(variables: &[&str]) -> Self {
        Self {
            variables: variables.iter().map(|v| v.to_string()).collect(),
            contrast: None,
        }
    }

    pub fn with_contrast(mut self, variable: &str, numerator: &str, denominator: &str) -> Self {
        self.contrast = Some(Contrast {
            variable: variable.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        });
        self
    }

    /// Model formula, e.g. `~ batch + condition`
    pub fn formula(&self) -> String {
        format!("~ {}", self.variables.join(" + "))
    }

    /// Check the design against a sample table
    pub fn validate(&self, samples: &SampleMetadata) -> Result<()> {
        if self.variables.is_empty() {
            return Err(TeError::InvalidInput {
                reason: "design has no variables".to_string(),
            });
        }
        let missing: Vec<String> = self
            .variables
            .iter()
            .filter(|v| !samples.has_condition(v))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(TeError::SchemaMismatch {
                table: "sample table".to_string(),
                missing,
            });
        }

        if let Some(c) = &self.contrast {
            if !self.variables.contains(&c.variable) {
                return Err(TeError::InvalidInput {
                    reason: format!("contrast variable '{}' is not in the design", c.variable),
                });
            }
            let levels = samples.levels(&c.variable).unwrap_or_default();
            for level in [&c.numerator, &c.denominator] {
                if !levels.contains(level) {
                    return Err(TeError::InvalidInput {
                        reason: format!(
                            "level '{}' not found for '{}' (available: {:?})",
                            level, c.variable, levels
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Everything the engine needs: integer counts, per-sample design columns,
/// and the formula
#[derive(Debug, Clone)]
pub struct DiffInput {
    pub counts: CountMatrix,
    /// One row per count column: the values of `design.variables`
    pub coldata: Vec<Vec<String>>,
    pub design: DiffDesign,
}

#[derive(Serialize)]
struct DesignManifest<'a> {
    formula: String,
    variables: &'a [String],
    contrast: Option<&'a Contrast>,
    n_features: usize,
    n_samples: usize,
    counts: &'a str,
    coldata: &'a str,
}

/// Build the engine input from a count matrix and the sample table.
///
/// Samples absent from the table or lacking a value for a design variable
/// are dropped. Counts are rounded to integers.
pub fn prepare_diff_input(
    counts: &CountMatrix,
    samples: &SampleMetadata,
    design: &DiffDesign,
) -> Result<DiffInput> {
    design.validate(samples)?;

    let mut keep = Vec::new();
    let mut coldata = Vec::new();
    for (j, sample_id) in counts.sample_ids().iter().enumerate() {
        let Some(row) = samples.sample_index(sample_id) else {
            log::warn!("Sample '{}' has no sample-table row; left out of the design", sample_id);
            continue;
        };
        let values = design
            .variables
            .iter()
            .map(|v| samples.get_value(v, row))
            .collect::<Result<Vec<String>>>()?;
        if values.iter().any(|v| v.is_empty()) {
            log::warn!("Sample '{}' lacks a design value; left out of the design", sample_id);
            continue;
        }
        keep.push(j);
        coldata.push(values);
    }

    if keep.is_empty() {
        return Err(TeError::EmptyData {
            reason: "no annotated samples for the differential design".to_string(),
        });
    }

    let subset = counts.subset_samples(&keep)?;
    let fractional = subset.counts().iter().filter(|c| c.fract() != 0.0).count();
    if fractional > 0 {
        log::warn!("{} fractional counts rounded to integers", fractional);
    }
    let (values, feature_ids, sample_ids) = subset.into_parts();
    let rounded = CountMatrix::new(values.mapv(f64::round), feature_ids, sample_ids)?;

    log::info!(
        "Differential input: {} features x {} samples, design {}",
        rounded.n_features(),
        rounded.n_samples(),
        design.formula()
    );

    Ok(DiffInput {
        counts: rounded,
        coldata,
        design: design.clone(),
    })
}

impl DiffInput {
    /// Write `counts.csv`, `coldata.csv` and `design.json` into `dir`
    pub fn write<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        write_count_matrix(dir.join("counts.csv"), &self.counts)?;

        let mut writer = csv::Writer::from_path(dir.join("coldata.csv"))?;
        let mut header = vec!["sample_id"];
        header.extend(self.design.variables.iter().map(|v| v.as_str()));
        writer.write_record(&header)?;
        for (sample_id, values) in self.counts.sample_ids().iter().zip(&self.coldata) {
            let mut record = vec![sample_id.as_str()];
            record.extend(values.iter().map(|v| v.as_str()));
            writer.write_record(&record)?;
        }
        writer.flush()?;

        let manifest = DesignManifest {
            formula: self.design.formula(),
            variables: &self.design.variables,
            contrast: self.design.contrast.as_ref(),
            n_features: self.counts.n_features(),
            n_samples: self.counts.n_samples(),
            counts: "counts.csv",
            coldata: "coldata.csv",
        };
        let file = fs::File::create(dir.join("design.json"))?;
        serde_json::to_writer_pretty(file, &manifest)?;

        log::info!("Differential input written to {}", dir.display());
        Ok(())
    }
}

/// Write the engine input for `counts` into `dir`
pub fn write_diff_input<P: AsRef<Path>>(
    dir: P,
    counts: &CountMatrix,
    samples: &SampleMetadata,
    design: &DiffDesign,
) -> Result<DiffInput> {
    let input = prepare_diff_input(counts, samples, design)?;
    input.write(dir)?;
    Ok(input)
}
