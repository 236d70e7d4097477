//! Differential-testing results returned by the external engine

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::csv::{open_table, parse_value};
use super::read_count_matrix;
use crate::data::CountMatrix;
use crate::diff::benjamini_hochberg;
use crate::error::{Result, TeError};

const REQUIRED_COLUMNS: [&str; 3] = ["baseMean", "log2FoldChange", "pvalue"];

/// Standard results table of a differential-testing engine (DESeq2 layout)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffResults {
    /// Feature identifiers
    pub feature_ids: Vec<String>,
    /// Mean of normalized counts across all samples
    pub base_means: Vec<f64>,
    pub log2_fold_changes: Vec<f64>,
    /// Standard error of log2 fold change
    pub lfc_se: Vec<f64>,
    /// Test statistic (Wald z-statistic or LRT chi-square)
    pub stat: Vec<f64>,
    pub pvalues: Vec<f64>,
    /// Adjusted p-values (BH corrected)
    pub padj: Vec<f64>,
}

impl DiffResults {
    /// Create new empty results
    pub fn new(feature_ids: Vec<String>) -> Self {
        let n = feature_ids.len();
        Self {
            feature_ids,
            base_means: vec![f64::NAN; n],
            log2_fold_changes: vec![f64::NAN; n],
            lfc_se: vec![f64::NAN; n],
            stat: vec![f64::NAN; n],
            pvalues: vec![f64::NAN; n],
            padj: vec![f64::NAN; n],
        }
    }

    pub fn n_features(&self) -> usize {
        self.feature_ids.len()
    }

    /// Get significant features at given alpha level
    pub fn significant_features(&self, alpha: f64) -> Vec<&str> {
        self.feature_ids
            .iter()
            .zip(self.padj.iter())
            .filter(|(_, &p)| p.is_finite() && p < alpha)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Get up-regulated features (positive log2FC, significant)
    pub fn upregulated_features(&self, alpha: f64, min_lfc: f64) -> Vec<&str> {
        self.feature_ids
            .iter()
            .zip(self.padj.iter().zip(self.log2_fold_changes.iter()))
            .filter(|(_, (&p, &lfc))| p.is_finite() && p < alpha && lfc >= min_lfc)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Get down-regulated features (negative log2FC, significant)
    pub fn downregulated_features(&self, alpha: f64, min_lfc: f64) -> Vec<&str> {
        self.feature_ids
            .iter()
            .zip(self.padj.iter().zip(self.log2_fold_changes.iter()))
            .filter(|(_, (&p, &lfc))| p.is_finite() && p < alpha && lfc <= -min_lfc)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Features ranked by test statistic, descending; non-finite statistics dropped
    pub fn ranked_statistics(&self) -> Vec<(&str, f64)> {
        let mut ranks: Vec<(&str, f64)> = self
            .feature_ids
            .iter()
            .zip(self.stat.iter())
            .filter(|(_, s)| s.is_finite())
            .map(|(id, &s)| (id.as_str(), s))
            .collect();
        ranks.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranks
    }

    pub fn summary(&self, alpha: f64) -> ResultsSummary {
        ResultsSummary {
            total_features: self.n_features(),
            features_tested: self.pvalues.iter().filter(|p| p.is_finite()).count(),
            significant: self.significant_features(alpha).len(),
            upregulated: self.upregulated_features(alpha, 0.0).len(),
            downregulated: self.downregulated_features(alpha, 0.0).len(),
            alpha,
        }
    }
}

/// Summary of differential-testing results
#[derive(Debug, Clone)]
pub struct ResultsSummary {
    pub total_features: usize,
    pub features_tested: usize,
    pub significant: usize,
    pub upregulated: usize,
    pub downregulated: usize,
    pub alpha: f64,
}

impl std::fmt::Display for ResultsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Differential Results Summary")?;
        writeln!(f, "============================")?;
        writeln!(f, "Total features: {}", self.total_features)?;
        writeln!(f, "Features tested: {}", self.features_tested)?;
        writeln!(
            f,
            "Significant (padj < {}): {}",
            self.alpha, self.significant
        )?;
        writeln!(f, "  Up-regulated: {}", self.upregulated)?;
        writeln!(f, "  Down-regulated: {}", self.downregulated)?;
        Ok(())
    }
}

fn parse_optional(raw: &str, context: &str) -> Result<f64> {
    match raw.trim_matches('"') {
        "" | "NA" | "NaN" => Ok(f64::NAN),
        _ => parse_value(raw, context),
    }
}

/// Read a results table: feature column, then baseMean, log2FoldChange,
/// lfcSE, stat, pvalue, padj in any order.
///
/// `NA` cells become NaN; lfcSE and stat may be absent. A missing padj
/// column is computed with Benjamini-Hochberg. Headers written without a
/// row-name cell (R `write.table` style) are accepted.
pub fn read_diff_results<P: AsRef<Path>>(path: P) -> Result<DiffResults> {
    let table_name = path.as_ref().display().to_string();
    let mut reader = open_table(&path, true, Some(b'#'), 0)?;
    let header = reader.headers()?.clone();

    // header lacks the row-name cell
    let shift = usize::from(header.get(0).map_or(false, |h| h == "baseMean"));
    let position = |name: &str| header.iter().position(|h| h == name).map(|p| p + shift);

    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|&&c| position(c).is_none())
        .map(|&c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(TeError::SchemaMismatch {
            table: table_name,
            missing,
        });
    }
    let cols: Vec<Option<usize>> = ["baseMean", "log2FoldChange", "lfcSE", "stat", "pvalue", "padj"]
        .into_iter()
        .map(position)
        .collect();

    let mut feature_ids = Vec::new();
    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); cols.len()];
    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let feature = record[0].trim_matches('"').to_string();
        for (values, col) in columns.iter_mut().zip(&cols) {
            let value = match col.and_then(|c| record.get(c)) {
                Some(raw) => parse_optional(raw, &feature)?,
                None => f64::NAN,
            };
            values.push(value);
        }
        feature_ids.push(feature);
    }

    let mut columns = columns.into_iter();
    let mut next = || columns.next().unwrap_or_default();
    let mut results = DiffResults::new(feature_ids);
    results.base_means = next();
    results.log2_fold_changes = next();
    results.lfc_se = next();
    results.stat = next();
    results.pvalues = next();
    results.padj = next();

    if cols[5].is_none() {
        log::info!("{}: no padj column, applying Benjamini-Hochberg", table_name);
        results.padj = benjamini_hochberg(&results.pvalues);
    }

    log::info!("Read {} results from {}", results.n_features(), table_name);
    Ok(results)
}

/// Write a two-column, headerless `.rnk` ranking (feature, statistic)
pub fn write_ranks<P: AsRef<Path>>(path: P, ranks: &[(&str, f64)]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)?;
    for (feature, stat) in ranks {
        writer.write_record([feature.to_string(), stat.to_string()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Read an engine's normalized-count matrix (feature x sample)
pub fn read_normalized_counts<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let counts = read_count_matrix(&path)?;
    log::info!(
        "Read normalized counts: {} features x {} samples",
        counts.n_features(),
        counts.n_samples()
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_summary_counts() {
        let mut res = DiffResults::new(vec!["a".into(), "b".into(), "c".into()]);
        res.pvalues = vec![0.001, 0.5, f64::NAN];
        res.padj = vec![0.01, 0.6, f64::NAN];
        res.log2_fold_changes = vec![-2.0, 1.0, 0.0];

        let summary = res.summary(0.05);
        assert_eq!(summary.features_tested, 2);
        assert_eq!(summary.significant, 1);
        assert_eq!(summary.downregulated, 1);
        assert_eq!(summary.upregulated, 0);
        assert!(summary.to_string().contains("Total features: 3"));
    }

    #[test]
    fn test_read_results_computes_padj() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "\"\",\"baseMean\",\"log2FoldChange\",\"lfcSE\",\"stat\",\"pvalue\"").unwrap();
        writeln!(file, "\"orf1\",10.5,1.2,0.3,4.0,0.01").unwrap();
        writeln!(file, "\"orf2\",3.1,-0.4,0.5,-0.8,0.04").unwrap();
        writeln!(file, "\"orf3\",0,NA,NA,NA,NA").unwrap();
        file.flush().unwrap();

        let res = read_diff_results(file.path()).unwrap();
        assert_eq!(res.feature_ids, vec!["orf1", "orf2", "orf3"]);
        assert!(res.log2_fold_changes[2].is_nan());
        assert!((res.padj[0] - 0.02).abs() < 1e-12);
        assert!((res.padj[1] - 0.04).abs() < 1e-12);
        assert!(res.padj[2].is_nan());

        let ranks = res.ranked_statistics();
        assert_eq!(ranks, vec![("orf1", 4.0), ("orf2", -0.8)]);
    }

    #[test]
    fn test_read_results_without_rowname_header() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "baseMean\tlog2FoldChange\tlfcSE\tstat\tpvalue\tpadj").unwrap();
        writeln!(file, "g1\t5\t2\t0.5\t4\t0.001\t0.003").unwrap();
        file.flush().unwrap();

        let res = read_diff_results(file.path()).unwrap();
        assert_eq!(res.feature_ids, vec!["g1"]);
        assert_eq!(res.base_means[0], 5.0);
        assert_eq!(res.padj[0], 0.003);
    }

    #[test]
    fn test_missing_required_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "id,baseMean,stat").unwrap();
        writeln!(file, "g1,5,2").unwrap();
        file.flush().unwrap();

        match read_diff_results(file.path()).unwrap_err() {
            TeError::SchemaMismatch { missing, .. } => {
                assert_eq!(missing, vec!["log2FoldChange", "pvalue"])
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_write_ranks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("myc.rnk");
        write_ranks(&path, &[("g1", 3.5), ("g2", -1.0)]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "g1\t3.5\ng2\t-1\n");
    }
}
