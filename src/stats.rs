//! Row summaries shared by the TE centering variants

use statrs::statistics::{Data, Median, Statistics};

/// Median of a slice; NaN for an empty slice.
/// Even lengths average the two middle values.
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    Data::new(values.to_vec()).median()
}

/// Mean and sample standard deviation (n - 1 denominator).
/// The SD is NaN for fewer than two values.
pub fn mean_sd(values: &[f64]) -> (f64, f64) {
    let mean = values.iter().mean();
    let sd = values.iter().std_dev();
    (mean, sd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
        assert!(median(&[]).is_nan());
    }

    #[test]
    fn test_mean_sd() {
        let (m, sd) = mean_sd(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((m - 5.0).abs() < 1e-12);
        // sample SD: sqrt(32 / 7)
        assert!((sd - (32.0f64 / 7.0).sqrt()).abs() < 1e-12);

        let (_, sd1) = mean_sd(&[1.0]);
        assert!(sd1.is_nan());
    }
}
