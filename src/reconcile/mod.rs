//! Identifier reconciliation between quantifier columns and the sample table
//!
//! Quantifier outputs name their columns after raw read files, while the
//! sample table lists those files as free text (semicolon or comma separated,
//! with lane, read-pair and extension decorations). Matching is a literal
//! infix search in two stages:
//!
//! 1. for every metadata row, the candidate found at the leftmost position of
//!    its file field is collected (deduplicated, row order);
//! 2. every collected candidate is then joined to all rows whose field
//!    contains it, and must resolve to exactly one row.
//!
//! Candidates that never match are dropped and reported in
//! [`SampleMapping::unmatched`]; this is expected for excluded samples.

mod matcher;

pub use matcher::candidate_from_header;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::data::{LibraryType, SampleMetadata};
use crate::error::{Result, TeError};
use matcher::Matcher;

/// What to do when one candidate occurs in several metadata rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityPolicy {
    /// Fail with `ReconciliationAmbiguous`
    #[default]
    Error,
    /// Take the first matching row in table order
    FirstInTable,
}

/// How candidates are collected from each metadata row in stage one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateScan {
    /// Only the leftmost candidate of each row
    #[default]
    FirstPerRow,
    /// Every candidate occurring in the row (multi-lane samples)
    AllPerRow,
}

/// Parameters for identifier reconciliation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileParams {
    /// Suffixes removed from column headers, first match wins
    pub header_suffixes: Vec<String>,
    pub ambiguity: AmbiguityPolicy,
    pub scan: CandidateScan,
    /// Allow several candidates to map to one sample (lanes); they are summed later
    pub allow_shared_samples: bool,
    /// Compare identifiers case-insensitively
    pub ignore_case: bool,
}

impl Default for ReconcileParams {
    fn default() -> Self {
        Self {
            header_suffixes: vec![
                "Aligned.sortedByCoord.out.bam".to_string(),
                ".bam".to_string(),
            ],
            ambiguity: AmbiguityPolicy::Error,
            scan: CandidateScan::FirstPerRow,
            allow_shared_samples: false,
            ignore_case: false,
        }
    }
}

/// One resolved column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedCandidate {
    pub candidate: String,
    pub sample_id: String,
    /// Row of the sample table the candidate resolved to
    pub row: usize,
}

/// Result of reconciliation: resolved candidates in input order plus the
/// candidates that matched no row.
#[derive(Debug, Clone, Default)]
pub struct SampleMapping {
    mapped: Vec<MappedCandidate>,
    unmatched: Vec<String>,
}

impl SampleMapping {
    pub fn mapped(&self) -> &[MappedCandidate] {
        &self.mapped
    }

    pub fn unmatched(&self) -> &[String] {
        &self.unmatched
    }

    /// Sample ID a candidate resolved to
    pub fn sample_for(&self, candidate: &str) -> Option<&str> {
        self.mapped
            .iter()
            .find(|m| m.candidate == candidate)
            .map(|m| m.sample_id.as_str())
    }

    /// Distinct sample IDs, in order of first appearance
    pub fn sample_ids(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for m in &self.mapped {
            if !out.contains(&m.sample_id) {
                out.push(m.sample_id.clone());
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.mapped.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapped.is_empty()
    }
}

/// Reconcile candidates against one library's file column of the sample table
pub fn reconcile(
    candidates: &[String],
    metadata: &SampleMetadata,
    library: LibraryType,
    params: &ReconcileParams,
) -> Result<SampleMapping> {
    log::info!(
        "Reconciling {} {} identifiers against {} metadata rows",
        candidates.len(),
        library,
        metadata.n_samples()
    );
    reconcile_fields(
        candidates,
        metadata.file_fields(library),
        metadata.sample_ids(),
        params,
    )
}

/// Reconcile candidates against free-text `fields`, where `fields[i]` belongs
/// to `sample_ids[i]`.
pub fn reconcile_fields(
    candidates: &[String],
    fields: &[String],
    sample_ids: &[String],
    params: &ReconcileParams,
) -> Result<SampleMapping> {
    if fields.len() != sample_ids.len() {
        return Err(TeError::DimensionMismatch {
            expected: format!("{} file fields", sample_ids.len()),
            got: format!("{} file fields", fields.len()),
        });
    }

    let matcher = Matcher {
        ignore_case: params.ignore_case,
    };

    // Stage one: candidate set built from the metadata side
    let mut matched = vec![false; candidates.len()];
    for field in fields {
        match params.scan {
            CandidateScan::FirstPerRow => {
                if let Some(k) = matcher.leftmost(field, candidates) {
                    matched[k] = true;
                }
            }
            CandidateScan::AllPerRow => {
                for k in matcher.all(field, candidates) {
                    matched[k] = true;
                }
            }
        }
    }

    // Stage two: join each matched candidate back to its rows
    let mut mapping = SampleMapping::default();
    for (k, candidate) in candidates.iter().enumerate() {
        if !matched[k] {
            log::warn!(
                "Identifier '{}' matches no metadata row; dropping its column",
                candidate
            );
            mapping.unmatched.push(candidate.clone());
            continue;
        }

        let rows = matcher.rows_containing(candidate, fields);
        let row = match rows.as_slice() {
            [] => {
                // matched candidates occur in at least one row
                mapping.unmatched.push(candidate.clone());
                continue;
            }
            [row] => *row,
            [first, ..] => match params.ambiguity {
                AmbiguityPolicy::Error => {
                    return Err(TeError::ReconciliationAmbiguous {
                        candidate: candidate.clone(),
                        rows: rows.clone(),
                    });
                }
                AmbiguityPolicy::FirstInTable => {
                    log::warn!(
                        "Identifier '{}' matches metadata rows {:?}; using row {} ('{}')",
                        candidate,
                        rows,
                        first,
                        sample_ids[*first]
                    );
                    *first
                }
            },
        };

        log::debug!("'{}' -> '{}'", candidate, sample_ids[row]);
        mapping.mapped.push(MappedCandidate {
            candidate: candidate.clone(),
            sample_id: sample_ids[row].clone(),
            row,
        });
    }

    check_one_to_one(&mapping, params.allow_shared_samples)?;

    log::info!(
        "Reconciled {} identifiers to {} samples ({} dropped)",
        mapping.mapped.len(),
        mapping.sample_ids().len(),
        mapping.unmatched.len()
    );

    Ok(mapping)
}

fn check_one_to_one(mapping: &SampleMapping, allow_shared: bool) -> Result<()> {
    let mut by_sample: HashMap<&str, Vec<String>> = HashMap::new();
    for m in &mapping.mapped {
        by_sample
            .entry(m.sample_id.as_str())
            .or_default()
            .push(m.candidate.clone());
    }

    // Report the first offending sample in mapping order
    for m in &mapping.mapped {
        let cands = &by_sample[m.sample_id.as_str()];
        if cands.len() > 1 {
            if !allow_shared {
                return Err(TeError::DuplicateSampleMapping {
                    sample_id: m.sample_id.clone(),
                    candidates: cands.clone(),
                });
            }
            log::debug!("Sample '{}' shared by {:?}", m.sample_id, cands);
        }
    }
    Ok(())
}
