//! Quantifier outputs (featureCounts-style tables, ORF P-site tables) and
//! interval-based feature lengths

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::csv::{open_table, parse_value};
use crate::data::{CountMatrix, FeatureLengths};
use crate::error::{Result, TeError};

/// Layout of a raw quantifier table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantTableSpec {
    /// Feature annotation columns between the ID column and the first sample
    /// (featureCounts: Chr, Start, End, Strand, Length)
    pub n_metadata_columns: usize,
    /// Name of the length column among the annotation columns, if any
    pub length_column: Option<String>,
}

impl Default for QuantTableSpec {
    fn default() -> Self {
        Self {
            n_metadata_columns: 5,
            length_column: Some("Length".to_string()),
        }
    }
}

impl QuantTableSpec {
    /// Plain feature x sample table with no annotation columns
    pub fn plain() -> Self {
        Self {
            n_metadata_columns: 0,
            length_column: None,
        }
    }
}

/// A quantifier table with its raw column headers as sample IDs
#[derive(Debug, Clone)]
pub struct QuantTable {
    pub counts: CountMatrix,
    /// Lengths from the table's length column, when configured
    pub lengths: Option<FeatureLengths>,
}

/// Read a raw quantifier table.
///
/// `#` lines are skipped, the first column is the feature ID, the next
/// `n_metadata_columns` are discarded (the length column is captured), the
/// remaining columns are per-sample counts keyed by their raw header.
pub fn read_quant_table<P: AsRef<Path>>(path: P, spec: &QuantTableSpec) -> Result<QuantTable> {
    let table_name = path.as_ref().display().to_string();
    let mut reader = open_table(&path, true, Some(b'#'), 0)?;
    let header = reader.headers()?.clone();

    let first_sample = 1 + spec.n_metadata_columns;
    if header.len() <= first_sample {
        return Err(TeError::SchemaMismatch {
            table: table_name,
            missing: vec![format!(
                "{} feature annotation column(s) followed by at least one sample column",
                spec.n_metadata_columns
            )],
        });
    }

    let length_pos = match &spec.length_column {
        Some(name) => {
            let pos = header
                .iter()
                .enumerate()
                .skip(1)
                .take(spec.n_metadata_columns)
                .find(|(_, h)| *h == name.as_str())
                .map(|(p, _)| p);
            match pos {
                Some(p) => Some(p),
                None => {
                    return Err(TeError::SchemaMismatch {
                        table: table_name,
                        missing: vec![name.clone()],
                    })
                }
            }
        }
        None => None,
    };

    let sample_headers: Vec<String> = header
        .iter()
        .skip(first_sample)
        .map(|h| h.to_string())
        .collect();
    let n_samples = sample_headers.len();

    let mut feature_ids = Vec::new();
    let mut values = Vec::new();
    let mut lengths = length_pos.map(|_| FeatureLengths::new());

    for record in reader.records() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() != header.len() {
            return Err(TeError::InvalidCountMatrix {
                reason: format!(
                    "{}: row has {} columns, expected {}",
                    table_name,
                    record.len(),
                    header.len()
                ),
            });
        }
        let feature = record[0].to_string();
        if let (Some(pos), Some(lengths)) = (length_pos, lengths.as_mut()) {
            lengths.insert(feature.clone(), parse_value(&record[pos], &feature)?);
        }
        for field in record.iter().skip(first_sample) {
            values.push(parse_value(field, &feature)?);
        }
        feature_ids.push(feature);
    }

    if feature_ids.is_empty() {
        return Err(TeError::EmptyData {
            reason: format!("No features found in {}", table_name),
        });
    }

    let counts = Array2::from_shape_vec((feature_ids.len(), n_samples), values).map_err(|e| {
        TeError::InvalidCountMatrix {
            reason: e.to_string(),
        }
    })?;

    log::info!(
        "  {}: {} features, {} columns",
        table_name,
        feature_ids.len(),
        n_samples
    );

    Ok(QuantTable {
        counts: CountMatrix::new(counts, feature_ids, sample_headers)?,
        lengths,
    })
}

/// Read feature lengths from an interval file.
///
/// Rows are `feature_id, chrom, start, end` with 1-based inclusive
/// coordinates; a feature's length is the summed width of its rows, so a file
/// listing one row per nucleotide yields the row count. A non-numeric first
/// row is taken as a header.
pub fn read_interval_lengths<P: AsRef<Path>>(path: P) -> Result<FeatureLengths> {
    let mut reader = open_table(&path, false, Some(b'#'), 0)?;
    let mut lengths = FeatureLengths::new();

    for (row, record) in reader.records().enumerate() {
        let record = record?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        if record.len() < 4 {
            return Err(TeError::InvalidInput {
                reason: format!(
                    "interval row {} has {} columns, expected feature_id, chrom, start, end",
                    row + 1,
                    record.len()
                ),
            });
        }
        let coords = (record[2].parse::<u64>(), record[3].parse::<u64>());
        let (start, end) = match coords {
            (Ok(s), Ok(e)) => (s, e),
            _ if row == 0 => continue,
            _ => {
                return Err(TeError::InvalidInput {
                    reason: format!("interval row {} has non-integer coordinates", row + 1),
                })
            }
        };
        if end < start {
            return Err(TeError::InvalidInput {
                reason: format!("interval row {} ends before it starts", row + 1),
            });
        }
        lengths.add(&record[0], (end - start + 1) as f64);
    }

    log::info!("  {} feature lengths from intervals", lengths.len());
    Ok(lengths)
}

/// Write lengths as one interval per feature (`feature_id, ".", 1, length`),
/// readable by [`read_interval_lengths`]
pub fn write_interval_lengths<P: AsRef<Path>>(path: P, lengths: &FeatureLengths) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    writer.write_record(["feature_id", "chrom", "start", "end"])?;
    for (feature, length) in lengths.sorted_entries() {
        let end = length.round() as u64;
        if end == 0 {
            continue;
        }
        writer.write_record([feature, ".", "1", end.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn feature_counts_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "# Program:featureCounts v2.0.1; Command:\"featureCounts\" ...").unwrap();
        writeln!(
            file,
            "Geneid\tChr\tStart\tEnd\tStrand\tLength\t/star/MB1_R1_001Aligned.sortedByCoord.out.bam\t/star/MB2_R1_001Aligned.sortedByCoord.out.bam"
        )
        .unwrap();
        writeln!(file, "ENSG1\tchr8\t100\t1100\t+\t1000\t10\t20").unwrap();
        writeln!(file, "ENSG2\tchr1;chr1\t5;50\t254;300\t-;-\t500\t0\t0").unwrap();
        file
    }

    #[test]
    fn test_read_feature_counts_table() {
        let file = feature_counts_file();
        let table = read_quant_table(file.path(), &QuantTableSpec::default()).unwrap();
        assert_eq!(table.counts.n_features(), 2);
        assert_eq!(table.counts.n_samples(), 2);
        assert!(table.counts.sample_ids()[0].ends_with("MB1_R1_001Aligned.sortedByCoord.out.bam"));
        let lengths = table.lengths.unwrap();
        assert_eq!(lengths.get("ENSG1"), Some(1000.0));
        assert_eq!(lengths.get("ENSG2"), Some(500.0));
    }

    #[test]
    fn test_missing_length_column_is_schema_mismatch() {
        let file = feature_counts_file();
        let spec = QuantTableSpec {
            n_metadata_columns: 5,
            length_column: Some("len".to_string()),
        };
        assert!(matches!(
            read_quant_table(file.path(), &spec),
            Err(TeError::SchemaMismatch { .. })
        ));
    }

    #[test]
    fn test_too_few_columns_is_schema_mismatch() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "orf_id,S1").unwrap();
        writeln!(file, "orf1,3").unwrap();
        let err = read_quant_table(file.path(), &QuantTableSpec::default()).unwrap_err();
        assert!(matches!(err, TeError::SchemaMismatch { .. }));

        let table = read_quant_table(file.path(), &QuantTableSpec::plain()).unwrap();
        assert_eq!(table.counts.sample_ids(), &["S1"]);
        assert!(table.lengths.is_none());
    }

    #[test]
    fn test_interval_lengths() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "orf_id\tchrom\tstart\tend").unwrap();
        for pos in 100..106 {
            writeln!(file, "orfA\tchr2\t{}\t{}", pos, pos).unwrap();
        }
        writeln!(file, "orfB\tchr2\t10\t39").unwrap();
        writeln!(file, "orfB\tchr2\t60\t89").unwrap();

        let lengths = read_interval_lengths(file.path()).unwrap();
        assert_eq!(lengths.get("orfA"), Some(6.0));
        assert_eq!(lengths.get("orfB"), Some(60.0));
    }

    #[test]
    fn test_written_lengths_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lengths.tsv");
        let lengths = FeatureLengths::from_pairs(vec![("b".to_string(), 250.0), ("a".to_string(), 1200.0)]);
        write_interval_lengths(&path, &lengths).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "feature_id\tchrom\tstart\tend\na\t.\t1\t1200\nb\t.\t1\t250\n");
        assert_eq!(read_interval_lengths(&path).unwrap(), lengths);
    }
}
