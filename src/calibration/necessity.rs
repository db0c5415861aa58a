//! Calibration necessity.
//!
//! Calibration is deemed necessary when a calibrator, fitted on part of the reference
//! data, lowers the expected calibration error (ECE) on the held-out part. The check is
//! repeated over several stratified shuffle splits and the mean errors are compared, so
//! the calibrator is never evaluated on the rows it was fitted on.
use crate::calibration::{calibrate_checked, Calibrator};
use crate::constants::{CALIBRATION_SEED, CALIBRATION_TEST_SIZE, NEEDS_CALIBRATION_THRESHOLD};
use crate::errors::MonitorError;
use crate::metrics::realized::roc_auc_score;
use crate::utils::{argsort, validate_binary_labels, validate_probabilities};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Expected calibration error over `bin_count` equal-frequency bins.
///
/// For every bin the absolute difference between the mean outcome and the mean
/// probability is weighted by the share of rows in the bin.
pub fn expected_calibration_error(y_true: &[f64], y_pred_proba: &[f64], bin_count: usize) -> f64 {
    let n = y_pred_proba.len();
    if n == 0 || bin_count == 0 {
        return 0.0;
    }
    let order = argsort(y_pred_proba);
    let mut ece = 0.0;
    for b in 0..bin_count {
        let (start, end) = (b * n / bin_count, (b + 1) * n / bin_count);
        if end <= start {
            continue;
        }
        let rows = &order[start..end];
        let size = rows.len() as f64;
        let gt_avg = rows.iter().map(|&i| y_true[i]).sum::<f64>() / size;
        let pred_avg = rows.iter().map(|&i| y_pred_proba[i]).sum::<f64>() / size;
        ece += (gt_avg - pred_avg).abs() * size / n as f64;
    }
    ece
}

/// Row indices of `split_count` stratified train/test splits.
fn stratified_shuffle_splits(
    y_true: &[f64],
    split_count: usize,
    test_size: f64,
    seed: u64,
) -> Vec<(Vec<usize>, Vec<usize>)> {
    let mut rng = StdRng::seed_from_u64(seed);
    let positives: Vec<usize> = (0..y_true.len()).filter(|&i| y_true[i] == 1.0).collect();
    let negatives: Vec<usize> = (0..y_true.len()).filter(|&i| y_true[i] != 1.0).collect();

    (0..split_count)
        .map(|_| {
            let mut train = Vec::with_capacity(y_true.len());
            let mut test = Vec::new();
            for class in [&positives, &negatives] {
                let mut idx = class.clone();
                idx.shuffle(&mut rng);
                let n_test = ((idx.len() as f64) * test_size).round() as usize;
                let n_test = n_test.min(idx.len().saturating_sub(1));
                test.extend_from_slice(&idx[..n_test]);
                train.extend_from_slice(&idx[n_test..]);
            }
            (train, test)
        })
        .collect()
}

/// Decide whether `calibrator` would improve the calibration of `y_pred_proba`.
///
/// Returns `false` outright when the probabilities already separate the outcomes
/// perfectly, which includes probabilities equal to the outcomes themselves. The
/// passed calibrator is cloned for every split and left untouched.
pub fn needs_calibration(
    y_true: &[f64],
    y_pred_proba: &[f64],
    calibrator: &dyn Calibrator,
    bin_count: usize,
    split_count: usize,
) -> Result<bool, MonitorError> {
    validate_probabilities(y_pred_proba, "y_pred_proba")?;
    validate_binary_labels(y_true, "y_true")?;
    let (y_true, y_pred_proba): (Vec<f64>, Vec<f64>) = y_true
        .iter()
        .zip(y_pred_proba)
        .filter(|(t, p)| !t.is_nan() && !p.is_nan())
        .map(|(&t, &p)| (t, p))
        .unzip();
    if y_true.is_empty() {
        return Ok(false);
    }
    if y_true.iter().zip(&y_pred_proba).all(|(t, p)| t == p) || roc_auc_score(&y_true, &y_pred_proba) == 1.0 {
        return Ok(false);
    }

    let mut ece_raw = Vec::with_capacity(split_count);
    let mut ece_calibrated = Vec::with_capacity(split_count);
    for (train, test) in stratified_shuffle_splits(&y_true, split_count, CALIBRATION_TEST_SIZE, CALIBRATION_SEED) {
        if test.is_empty() || train.is_empty() {
            continue;
        }
        let mut split_calibrator = calibrator.clone_box();
        let train_proba: Vec<f64> = train.iter().map(|&i| y_pred_proba[i]).collect();
        let train_true: Vec<f64> = train.iter().map(|&i| y_true[i]).collect();
        split_calibrator.fit(&train_proba, &train_true)?;

        let test_proba: Vec<f64> = test.iter().map(|&i| y_pred_proba[i]).collect();
        let test_true: Vec<f64> = test.iter().map(|&i| y_true[i]).collect();
        let calibrated = calibrate_checked(split_calibrator.as_ref(), &test_proba)?;
        ece_raw.push(expected_calibration_error(&test_true, &test_proba, bin_count));
        ece_calibrated.push(expected_calibration_error(&test_true, &calibrated, bin_count));
    }
    if ece_raw.is_empty() {
        return Ok(false);
    }

    let raw = ece_raw.iter().sum::<f64>() / ece_raw.len() as f64;
    let calibrated = ece_calibrated.iter().sum::<f64>() / ece_calibrated.len() as f64;
    debug!("Mean expected calibration error: raw {:.5}, calibrated {:.5}.", raw, calibrated);
    Ok(raw - calibrated > NEEDS_CALIBRATION_THRESHOLD)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::IsotonicCalibrator;
    use crate::constants::{CALIBRATION_BIN_COUNT, CALIBRATION_SPLIT_COUNT};
    use crate::utils::precision_round;
    use rand::Rng;

    fn sample(n: usize, distort: impl Fn(f64) -> f64) -> (Vec<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(11);
        let p: Vec<f64> = (0..n).map(|_| rng.gen::<f64>()).collect();
        let y: Vec<f64> = p.iter().map(|&pi| if rng.gen::<f64>() < pi { 1.0 } else { 0.0 }).collect();
        (y, p.into_iter().map(distort).collect())
    }

    #[test]
    fn test_expected_calibration_error() {
        let y = vec![0., 0., 1., 1.];
        let p = vec![0.0, 0.0, 1.0, 1.0];
        assert_eq!(expected_calibration_error(&y, &p, 2), 0.0);
        let p = vec![0.5, 0.5, 0.5, 0.5];
        // Ties keep input order, so the bins hold [0, 0] and [1, 1].
        assert_eq!(precision_round(expected_calibration_error(&y, &p, 2), 6), 0.5);
        assert_eq!(expected_calibration_error(&[], &[], 10), 0.0);
    }

    #[test]
    fn test_splits_are_stratified_and_disjoint() {
        let y: Vec<f64> = (0..100).map(|i| if i < 30 { 1.0 } else { 0.0 }).collect();
        let splits = stratified_shuffle_splits(&y, 3, 0.1, 42);
        assert_eq!(splits.len(), 3);
        for (train, test) in splits {
            assert_eq!(test.len(), 10);
            assert_eq!(test.iter().filter(|&&i| y[i] == 1.0).count(), 3);
            assert_eq!(train.len() + test.len(), 100);
            assert!(test.iter().all(|i| !train.contains(i)));
        }
    }

    #[test]
    fn test_not_needed_when_probabilities_equal_outcomes() {
        let y = vec![0., 1., 1., 0., 1., 0., 0., 1.];
        let cal = IsotonicCalibrator::new();
        assert!(!needs_calibration(&y, &y, &cal, CALIBRATION_BIN_COUNT, CALIBRATION_SPLIT_COUNT).unwrap());
    }

    #[test]
    fn test_needed_for_systematic_miscalibration() {
        let (y, p) = sample(5000, |p| p * p);
        let cal = IsotonicCalibrator::new();
        assert!(needs_calibration(&y, &p, &cal, CALIBRATION_BIN_COUNT, CALIBRATION_SPLIT_COUNT).unwrap());
    }

    /// Shifts every calibrated probability past 1.
    #[derive(Clone, Debug)]
    struct OffsetCalibrator;

    impl Calibrator for OffsetCalibrator {
        fn fit(&mut self, _: &[f64], _: &[f64]) -> Result<(), MonitorError> {
            Ok(())
        }

        fn calibrate(&self, y_pred_proba: &[f64]) -> Result<Vec<f64>, MonitorError> {
            Ok(y_pred_proba.iter().map(|p| p + 1.5).collect())
        }
    }

    #[test]
    fn test_rejects_calibrated_values_outside_unit_interval() {
        let (y, p) = sample(1000, |p| p * p);
        let err = needs_calibration(&y, &p, &OffsetCalibrator, CALIBRATION_BIN_COUNT, CALIBRATION_SPLIT_COUNT)
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidArguments(_)));
        assert!(err.to_string().contains("custom calibrator output"));
    }

    #[test]
    fn test_rejects_invalid_input() {
        let cal = IsotonicCalibrator::new();
        assert!(needs_calibration(&[0., 1.], &[0.2, 1.2], &cal, 10, 10).is_err());
        assert!(needs_calibration(&[0., 3.], &[0.2, 0.4], &cal, 10, 10).is_err());
    }
}
