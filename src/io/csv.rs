//! CSV/TSV reading and writing for matrices, sample tables and feature annotation

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::data::{CountMatrix, FeatureAnnotation, FeatureRecord, SampleMetadata};
use crate::error::{Result, TeError};

/// Pick the delimiter from the header line: tab if present, else comma.
/// The header is the first non-blank, non-comment line after `skip_lines` such lines.
pub(crate) fn sniff_delimiter<P: AsRef<Path>>(path: P, skip_lines: usize) -> Result<u8> {
    let reader = BufReader::new(File::open(path)?);
    let mut skipped = 0;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        if skipped < skip_lines {
            skipped += 1;
            continue;
        }
        return Ok(if line.contains('\t') { b'\t' } else { b',' });
    }
    Err(TeError::EmptyData {
        reason: "Empty table file".to_string(),
    })
}

pub(crate) fn open_table<P: AsRef<Path>>(
    path: P,
    has_headers: bool,
    comment: Option<u8>,
    header_line: usize,
) -> Result<csv::Reader<File>> {
    let delimiter = sniff_delimiter(&path, header_line)?;
    let reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .comment(comment)
        .trim(csv::Trim::All)
        .from_path(path)?;
    Ok(reader)
}

pub(crate) fn parse_value(raw: &str, context: &str) -> Result<f64> {
    raw.trim_matches('"')
        .parse::<f64>()
        .map_err(|_| TeError::InvalidCountMatrix {
            reason: format!("Invalid numeric value '{}' ({})", raw, context),
        })
}

/// Read a feature x sample matrix.
/// Expected format: first column is feature IDs, first row is sample IDs.
pub fn read_count_matrix<P: AsRef<Path>>(path: P) -> Result<CountMatrix> {
    let mut reader = open_table(&path, true, Some(b'#'), 0)?;
    let header = reader.headers()?.clone();
    if header.len() < 2 {
        return Err(TeError::InvalidCountMatrix {
            reason: "Not enough columns in header".to_string(),
        });
    }

    let sample_ids: Vec<String> = header.iter().skip(1).map(|s| s.to_string()).collect();
    let n_samples = sample_ids.len();

    let mut feature_ids: Vec<String> = Vec::new();
    let mut values: Vec<f64> = Vec::new();

    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() != n_samples + 1 {
            return Err(TeError::InvalidCountMatrix {
                reason: format!(
                    "Row has {} columns, expected {}",
                    record.len(),
                    n_samples + 1
                ),
            });
        }
        let feature = record[0].to_string();
        for field in record.iter().skip(1) {
            values.push(parse_value(field, &feature)?);
        }
        feature_ids.push(feature);
    }

    if feature_ids.is_empty() {
        return Err(TeError::EmptyData {
            reason: "No features found in count matrix".to_string(),
        });
    }

    let counts = Array2::from_shape_vec((feature_ids.len(), n_samples), values).map_err(|e| {
        TeError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;

    CountMatrix::new(counts, feature_ids, sample_ids)
}

/// Write a feature x sample matrix as CSV with a `feature_id` header cell
pub fn write_matrix<P: AsRef<Path>>(
    path: P,
    feature_ids: &[String],
    sample_ids: &[String],
    values: ArrayView2<f64>,
) -> Result<()> {
    if values.dim() != (feature_ids.len(), sample_ids.len()) {
        return Err(TeError::DimensionMismatch {
            expected: format!("{} x {}", feature_ids.len(), sample_ids.len()),
            got: format!("{} x {}", values.nrows(), values.ncols()),
        });
    }

    let mut writer = csv::Writer::from_path(path)?;

    let mut header = Vec::with_capacity(sample_ids.len() + 1);
    header.push("feature_id".to_string());
    header.extend(sample_ids.iter().cloned());
    writer.write_record(&header)?;

    for (i, feature_id) in feature_ids.iter().enumerate() {
        let mut row = Vec::with_capacity(sample_ids.len() + 1);
        row.push(feature_id.clone());
        row.extend(values.row(i).iter().map(|v| v.to_string()));
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write a count matrix as CSV
pub fn write_count_matrix<P: AsRef<Path>>(path: P, counts: &CountMatrix) -> Result<()> {
    write_matrix(path, counts.feature_ids(), counts.sample_ids(), counts.counts())
}

/// Layout of the sample table export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataTableSpec {
    /// Leading rows above the header (spreadsheet title block)
    pub skip_rows: usize,
    pub sample_id_column: String,
    pub rna_files_column: String,
    pub ribo_files_column: String,
    /// Categorical columns loaded as conditions; all must exist
    pub attribute_columns: Vec<String>,
}

impl Default for MetadataTableSpec {
    fn default() -> Self {
        Self {
            skip_rows: 0,
            sample_id_column: "sample_id".to_string(),
            rna_files_column: "rnaseq_files".to_string(),
            ribo_files_column: "riboseq_files".to_string(),
            attribute_columns: vec![
                "sample_type".to_string(),
                "subgroup".to_string(),
                "myc_status".to_string(),
                "myc_group".to_string(),
            ],
        }
    }
}

fn column_positions(
    header: &csv::StringRecord,
    names: &[&str],
    table: &str,
) -> Result<Vec<usize>> {
    let mut positions = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match header.iter().position(|h| h == *name) {
            Some(p) => positions.push(p),
            None => missing.push(name.to_string()),
        }
    }
    if !missing.is_empty() {
        return Err(TeError::SchemaMismatch {
            table: table.to_string(),
            missing,
        });
    }
    Ok(positions)
}

/// Read the sample table
pub fn read_metadata<P: AsRef<Path>>(path: P, spec: &MetadataTableSpec) -> Result<SampleMetadata> {
    let mut reader = open_table(&path, false, None, spec.skip_rows)?;
    let mut records = reader.records();

    for _ in 0..spec.skip_rows {
        if records.next().transpose()?.is_none() {
            break;
        }
    }

    let header = records
        .next()
        .transpose()?
        .ok_or_else(|| TeError::EmptyData {
            reason: "Empty metadata file".to_string(),
        })?;

    let mut required: Vec<&str> = vec![
        spec.sample_id_column.as_str(),
        spec.rna_files_column.as_str(),
        spec.ribo_files_column.as_str(),
    ];
    required.extend(spec.attribute_columns.iter().map(|s| s.as_str()));
    let positions = column_positions(&header, &required, "sample metadata")?;

    let field = |record: &csv::StringRecord, pos: usize| -> String {
        record.get(pos).unwrap_or("").to_string()
    };

    let mut sample_ids = Vec::new();
    let mut rna = Vec::new();
    let mut ribo = Vec::new();
    let mut attributes: Vec<Vec<String>> = vec![Vec::new(); spec.attribute_columns.len()];

    for record in records {
        let record = record?;
        let id = field(&record, positions[0]);
        if id.is_empty() {
            log::debug!("Skipping metadata row without a sample ID");
            continue;
        }
        sample_ids.push(id);
        rna.push(field(&record, positions[1]));
        ribo.push(field(&record, positions[2]));
        for (k, values) in attributes.iter_mut().enumerate() {
            values.push(field(&record, positions[3 + k]));
        }
    }

    if sample_ids.is_empty() {
        return Err(TeError::EmptyData {
            reason: "No samples found in metadata".to_string(),
        });
    }

    let mut metadata = SampleMetadata::new(sample_ids, rna, ribo)?;
    for (name, values) in spec.attribute_columns.iter().zip(attributes) {
        metadata.add_condition(name, values)?;
    }

    log::info!("  {} samples in metadata", metadata.n_samples());
    Ok(metadata)
}

/// Layout of the ORF / gene reference table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationTableSpec {
    pub feature_column: String,
    pub gene_id_column: String,
    pub gene_name_column: String,
    pub category_column: String,
    /// Boolean column marking canonical CDS features. When absent, features
    /// whose category is in `canonical_categories` are canonical.
    pub canonical_column: Option<String>,
    pub canonical_categories: Vec<String>,
}

impl Default for AnnotationTableSpec {
    fn default() -> Self {
        Self {
            feature_column: "orf_id".to_string(),
            gene_id_column: "gene_id".to_string(),
            gene_name_column: "gene_name".to_string(),
            category_column: "orf_category".to_string(),
            canonical_column: None,
            canonical_categories: vec!["ORF_annotated".to_string(), "CDS".to_string()],
        }
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.to_ascii_lowercase().as_str(),
        "true" | "t" | "1" | "yes" | "y" | "canonical"
    )
}

/// Read the feature reference table
pub fn read_feature_annotation<P: AsRef<Path>>(
    path: P,
    spec: &AnnotationTableSpec,
) -> Result<FeatureAnnotation> {
    let mut reader = open_table(&path, true, Some(b'#'), 0)?;
    let header = reader.headers()?.clone();

    let mut names: Vec<&str> = vec![
        spec.feature_column.as_str(),
        spec.gene_id_column.as_str(),
        spec.gene_name_column.as_str(),
        spec.category_column.as_str(),
    ];
    if let Some(col) = &spec.canonical_column {
        names.push(col.as_str());
    }
    let positions = column_positions(&header, &names, "feature annotation")?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        let get = |k: usize| record.get(positions[k]).unwrap_or("").to_string();
        let feature_id = get(0);
        if feature_id.is_empty() {
            continue;
        }
        let category = get(3);
        let canonical = match spec.canonical_column {
            Some(_) => parse_flag(&get(4)),
            None => spec.canonical_categories.contains(&category),
        };
        records.push(FeatureRecord {
            feature_id,
            gene_id: get(1),
            gene_name: get(2),
            category,
            canonical,
        });
    }

    log::info!("  {} annotated features", records.len());
    Ok(FeatureAnnotation::new(records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_count_matrix() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "feature_id\ts1\ts2\ts3").unwrap();
        writeln!(file, "gene1\t100\t200\t150").unwrap();
        writeln!(file, "gene2\t50\t75\t60").unwrap();

        let matrix = read_count_matrix(file.path()).unwrap();
        assert_eq!(matrix.n_features(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.counts()[[1, 2]], 60.0);
    }

    #[test]
    fn test_write_then_read_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.csv");
        let counts = CountMatrix::new(
            ndarray::array![[1.5, 0.0], [2.0, 3.25]],
            vec!["a".to_string(), "b".to_string()],
            vec!["S1".to_string(), "S2".to_string()],
        )
        .unwrap();
        write_count_matrix(&path, &counts).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("feature_id,S1,S2\n"));
        let back = read_count_matrix(&path).unwrap();
        assert_eq!(back.counts(), counts.counts());
    }

    #[test]
    fn test_read_metadata_with_header_offset() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Medulloblastoma cohort,,,").unwrap();
        writeln!(file, "curated 2023,,,").unwrap();
        writeln!(file, "id,rna,ribo,group").unwrap();
        writeln!(file, "MB1,mb1_R1.fq.gz;mb1_R2.fq.gz,mb1_ribo.fq.gz,G3").unwrap();
        writeln!(file, ",,,").unwrap();
        writeln!(file, "MB2,mb2_R1.fq.gz,,SHH").unwrap();

        let spec = MetadataTableSpec {
            skip_rows: 2,
            sample_id_column: "id".to_string(),
            rna_files_column: "rna".to_string(),
            ribo_files_column: "ribo".to_string(),
            attribute_columns: vec!["group".to_string()],
        };
        let meta = read_metadata(file.path(), &spec).unwrap();
        assert_eq!(meta.sample_ids(), &["MB1", "MB2"]);
        assert_eq!(meta.get_value("group", 1).unwrap(), "SHH");
        assert_eq!(meta.paired_samples(), vec![0]);
    }

    #[test]
    fn test_read_tsv_metadata_with_untabbed_title() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Medulloblastoma cohort").unwrap();
        writeln!(file, "id\trna\tribo").unwrap();
        writeln!(file, "MB1\tmb1_R1.fq.gz\tmb1_ribo.fq.gz").unwrap();
        writeln!(file, "MB2\tmb2_R1.fq.gz, mb2_R2.fq.gz\t").unwrap();

        let spec = MetadataTableSpec {
            skip_rows: 1,
            sample_id_column: "id".to_string(),
            rna_files_column: "rna".to_string(),
            ribo_files_column: "ribo".to_string(),
            attribute_columns: Vec::new(),
        };
        let meta = read_metadata(file.path(), &spec).unwrap();
        assert_eq!(meta.sample_ids(), &["MB1", "MB2"]);
        assert_eq!(meta.paired_samples(), vec![0]);
    }

    #[test]
    fn test_read_metadata_missing_column() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id,rnaseq_files").unwrap();
        writeln!(file, "MB1,a.fq").unwrap();

        let err = read_metadata(file.path(), &MetadataTableSpec::default()).unwrap_err();
        match err {
            TeError::SchemaMismatch { missing, .. } => {
                assert!(missing.contains(&"riboseq_files".to_string()));
                assert!(missing.contains(&"myc_group".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_read_feature_annotation() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "orf_id,gene_id,gene_name,orf_category").unwrap();
        writeln!(file, "ENST1_1_100,ENSG1,MYC,ORF_annotated").unwrap();
        writeln!(file, "ENST1_5_40,ENSG1,MYC,uORF").unwrap();

        let ann = read_feature_annotation(file.path(), &AnnotationTableSpec::default()).unwrap();
        assert_eq!(ann.len(), 2);
        assert_eq!(ann.is_canonical("ENST1_1_100"), Some(true));
        assert_eq!(ann.is_canonical("ENST1_5_40"), Some(false));
    }
}
