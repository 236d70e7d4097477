//! End-to-end driver: sample table and quantifier tables in, TE and
//! detection tables out

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::assemble::{assemble_library, select_feature_subset};
use crate::config::PipelineConfig;
use crate::data::{CountMatrix, FeatureLengths, LibraryType};
use crate::detection::detect_translated;
use crate::diff::write_diff_input;
use crate::error::{Result, TeError};
use crate::io::{
    read_feature_annotation, read_interval_lengths, read_metadata, write_count_matrix, write_matrix,
};
use crate::normalization::{ppm, tpm};
use crate::te::{prepare_te_inputs, translational_efficiency};

/// What a pipeline run produced
#[derive(Debug, Clone, Default)]
pub struct PipelineSummary {
    pub n_samples: usize,
    pub n_ribo_features: usize,
    pub n_rna_features: usize,
    pub n_detected: usize,
    pub n_te_features: usize,
    pub written: Vec<PathBuf>,
    /// Outputs left untouched because they already existed
    pub skipped: Vec<PathBuf>,
}

/// Writes outputs under one directory, skipping non-empty existing files
/// unless `overwrite` is set
struct Outputs<'a> {
    dir: &'a Path,
    overwrite: bool,
    written: Vec<PathBuf>,
    skipped: Vec<PathBuf>,
}

impl<'a> Outputs<'a> {
    fn new(dir: &'a Path, overwrite: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir,
            overwrite,
            written: Vec::new(),
            skipped: Vec::new(),
        })
    }

    /// `marker` is the file whose presence means `name` is done
    fn emit<F>(&mut self, name: &str, marker: Option<&str>, write: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let path = self.dir.join(name);
        let check = marker.map_or_else(|| path.clone(), |m| path.join(m));
        if !self.overwrite && is_nonempty(&check) {
            log::warn!("{} already exists; skipping", path.display());
            self.skipped.push(path);
            return Ok(());
        }
        write(&path)?;
        log::info!("Wrote {}", path.display());
        self.written.push(path);
        Ok(())
    }
}

fn is_nonempty(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Keep the samples of `sample_ids` present in `counts`, in `sample_ids` order
fn retain_samples(counts: &CountMatrix, sample_ids: &[String], library: LibraryType) -> Result<CountMatrix> {
    let present: Vec<String> = sample_ids
        .iter()
        .filter(|id| counts.sample_index(id).is_some())
        .cloned()
        .collect();
    if present.is_empty() {
        return Err(TeError::EmptyData {
            reason: format!("no retained sample has {} counts", library),
        });
    }
    let missing = sample_ids.len() - present.len();
    if missing > 0 {
        log::warn!("{} retained samples have no {} counts", missing, library);
    }
    counts.select_samples(&present)
}

/// Interval-file lengths, plus a copy under every input's feature suffix.
/// Entries already present in the file are kept as given.
fn interval_lengths(path: &Path, config: &PipelineConfig) -> Result<FeatureLengths> {
    let base = read_interval_lengths(path)?;
    let suffixes: BTreeSet<&str> = config
        .ribo_inputs
        .iter()
        .chain(&config.rna_inputs)
        .filter_map(|input| input.feature_suffix.as_deref())
        .collect();

    let mut lengths = FeatureLengths::new();
    for suffix in suffixes {
        log::debug!("Applying feature suffix '{}' to interval lengths", suffix);
        lengths.extend(base.with_suffix(suffix));
    }
    lengths.extend(base);
    Ok(lengths)
}

/// Run every stage described by `config`.
///
/// Stages run in order and outputs are written as soon as they are
/// computed, so a failing stage leaves the earlier outputs in place.
pub fn run_pipeline(config: &PipelineConfig) -> Result<PipelineSummary> {
    config.validate()?;
    let mut outputs = Outputs::new(&config.output_dir, config.overwrite)?;

    log::info!("Loading sample table from {}", config.metadata.display());
    let metadata = read_metadata(&config.metadata, &config.metadata_spec)?;

    let (ribo_raw, ribo_lengths) = assemble_library(
        &config.ribo_inputs,
        &metadata,
        LibraryType::Ribo,
        &config.reconcile,
        config.column_order,
    )?;
    let (rna_raw, rna_lengths) = assemble_library(
        &config.rna_inputs,
        &metadata,
        LibraryType::Rna,
        &config.reconcile,
        config.column_order,
    )?;

    let retained = metadata.filter_samples(&config.exclude_samples, config.require_paired)?;
    log::info!(
        "{} of {} samples retained after exclusions",
        retained.n_samples(),
        metadata.n_samples()
    );

    let annotation = match &config.annotation {
        Some(path) => Some(read_feature_annotation(path, &config.annotation_spec)?),
        None => None,
    };

    let ribo_counts = select_feature_subset(
        &retain_samples(&ribo_raw, retained.sample_ids(), LibraryType::Ribo)?,
        config.feature_subset,
        annotation.as_ref(),
        &config.canonical_suffix,
    )?;
    let rna_counts = select_feature_subset(
        &retain_samples(&rna_raw, retained.sample_ids(), LibraryType::Rna)?,
        config.feature_subset,
        annotation.as_ref(),
        &config.canonical_suffix,
    )?;

    let lengths = match &config.lengths {
        Some(path) => interval_lengths(path, config)?,
        None => {
            let mut lengths = FeatureLengths::new();
            lengths.extend(ribo_lengths);
            lengths.extend(rna_lengths);
            lengths
        }
    };
    if lengths.is_empty() {
        return Err(TeError::FeatureSetEmpty {
            reason: "no feature lengths (configure a lengths file or a length column)".to_string(),
        });
    }

    outputs.emit("ribo_counts.csv", None, |p| write_count_matrix(p, &ribo_counts))?;
    outputs.emit("rna_counts.csv", None, |p| write_count_matrix(p, &rna_counts))?;

    // abundances over the whole feature set, used for detection
    let ribo_ppm = ppm(&ribo_counts, &lengths)?;
    let rna_tpm = tpm(&rna_counts, &lengths)?;
    outputs.emit("ppm.csv", None, |p| {
        write_matrix(p, ribo_ppm.feature_ids(), ribo_ppm.sample_ids(), ribo_ppm.values())
    })?;
    outputs.emit("tpm.csv", None, |p| {
        write_matrix(p, rna_tpm.feature_ids(), rna_tpm.sample_ids(), rna_tpm.values())
    })?;

    let detection = detect_translated(&ribo_ppm, annotation.as_ref(), &config.detection);
    outputs.emit("detection.csv", None, |p| detection.write_csv(p))?;
    outputs.emit("detection_by_category.csv", None, |p| detection.write_category_summary(p))?;

    let te_params = config.te_params();
    let (occupancy, transcript) = prepare_te_inputs(&ribo_counts, &rna_counts, &lengths, &te_params)?;
    let te = translational_efficiency(&occupancy, &transcript, &te_params)?;
    outputs.emit("te.csv", None, |p| write_matrix(p, &te.feature_ids, &te.sample_ids, te.raw.view()))?;
    outputs.emit("te_log2.csv", None, |p| {
        write_matrix(p, &te.feature_ids, &te.sample_ids, te.log2.view())
    })?;
    if let Some(centered) = &te.centered {
        outputs.emit("te_centered.csv", None, |p| {
            write_matrix(p, &te.feature_ids, &te.sample_ids, centered.view())
        })?;
    }

    if let Some(design) = &config.diff_design {
        outputs.emit("diff_ribo", Some("design.json"), |dir| {
            write_diff_input(dir, &ribo_counts, &retained, design).map(|_| ())
        })?;
        outputs.emit("diff_rna", Some("design.json"), |dir| {
            write_diff_input(dir, &rna_counts, &retained, design).map(|_| ())
        })?;
    }

    let summary = PipelineSummary {
        n_samples: te.n_samples(),
        n_ribo_features: ribo_counts.n_features(),
        n_rna_features: rna_counts.n_features(),
        n_detected: detection.detected_ids().len(),
        n_te_features: te.n_features(),
        written: outputs.written,
        skipped: outputs.skipped,
    };
    log::info!(
        "Pipeline done: {} samples, {} TE features, {} detected; {} outputs written, {} skipped",
        summary.n_samples,
        summary.n_te_features,
        summary.n_detected,
        summary.written.len(),
        summary.skipped.len()
    );
    Ok(summary)
}
