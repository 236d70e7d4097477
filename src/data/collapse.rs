//! Collapse sequencing lanes of one sample by summing counts

use std::collections::HashMap;

use ndarray::Array2;

use super::CountMatrix;
use crate::error::{Result, TeError};

/// Sum the columns of `counts` that map to the same target sample.
///
/// `targets[j]` is the sample ID column `j` belongs to. The output has one
/// column per distinct target, in order of first appearance. Used when the
/// metadata lists several lane files for one sample.
pub fn collapse_lanes(counts: &CountMatrix, targets: &[String]) -> Result<CountMatrix> {
    let n_features = counts.n_features();
    let n_samples = counts.n_samples();

    if targets.len() != n_samples {
        return Err(TeError::DimensionMismatch {
            expected: format!("{} target sample IDs", n_samples),
            got: format!("{} target sample IDs", targets.len()),
        });
    }

    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
    for (j, target) in targets.iter().enumerate() {
        let members = groups.entry(target.as_str()).or_default();
        if members.is_empty() {
            order.push(target.clone());
        }
        members.push(j);
    }

    let raw = counts.counts();
    let mut new_counts = Array2::zeros((n_features, order.len()));
    for (new_j, target) in order.iter().enumerate() {
        let members = &groups[target.as_str()];
        if members.len() > 1 {
            let lanes: Vec<&str> = members
                .iter()
                .map(|&j| counts.sample_ids()[j].as_str())
                .collect();
            log::info!("Summing {} lanes into sample '{}': {:?}", members.len(), target, lanes);
        }
        for &old_j in members {
            for i in 0..n_features {
                new_counts[[i, new_j]] += raw[[i, old_j]];
            }
        }
    }

    CountMatrix::new(new_counts, counts.feature_ids().to_vec(), order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_collapse_lanes() {
        let counts = CountMatrix::new(
            array![[10.0, 20.0, 15.0, 25.0], [100.0, 200.0, 150.0, 250.0]],
            s(&["g1", "g2"]),
            s(&["mb1_L001", "mb2_L001", "mb1_L002", "mb3_L001"]),
        )
        .unwrap();

        let collapsed = collapse_lanes(&counts, &s(&["MB1", "MB2", "MB1", "MB3"])).unwrap();
        assert_eq!(collapsed.sample_ids(), &["MB1", "MB2", "MB3"]);
        let c = collapsed.counts();
        assert_eq!(c[[0, 0]], 25.0);
        assert_eq!(c[[1, 0]], 250.0);
        assert_eq!(c[[0, 1]], 20.0);
        assert_eq!(c[[1, 2]], 250.0);
    }

    #[test]
    fn test_collapse_lanes_wrong_length() {
        let counts = CountMatrix::new(array![[1.0, 2.0]], s(&["g1"]), s(&["a", "b"])).unwrap();
        assert!(collapse_lanes(&counts, &s(&["A"])).is_err());
    }
}
