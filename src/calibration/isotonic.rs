use crate::calibration::Calibrator;
use crate::errors::MonitorError;
use crate::utils::{validate_binary_labels, validate_probabilities};
use serde::{Deserialize, Serialize};

/// Isotonic regression calibrator.
///
/// Fits a non-decreasing step function from raw probability to outcome rate with the
/// pool adjacent violators algorithm, then interpolates linearly between block centres.
/// Inputs outside the fitted range are clipped to the outermost values.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct IsotonicCalibrator {
    /// Thresholds (input probabilities)
    pub thresholds: Vec<f64>,
    /// Calibrated values (output probabilities)
    pub values: Vec<f64>,
}

impl IsotonicCalibrator {
    pub fn new() -> Self {
        IsotonicCalibrator::default()
    }

    pub fn is_fitted(&self) -> bool {
        !self.thresholds.is_empty()
    }

    fn interpolate(&self, p: f64) -> f64 {
        let last = self.thresholds.len() - 1;
        if p.is_nan() {
            return f64::NAN;
        }
        if p <= self.thresholds[0] {
            return self.values[0];
        }
        if p >= self.thresholds[last] {
            return self.values[last];
        }
        // Binary search for the interval
        let idx = match self.thresholds.binary_search_by(|t| t.total_cmp(&p)) {
            Ok(i) => return self.values[i],
            Err(i) => i - 1,
        };
        let x0 = self.thresholds[idx];
        let x1 = self.thresholds[idx + 1];
        let y0 = self.values[idx];
        let y1 = self.values[idx + 1];

        let slope = (y1 - y0) / (x1 - x0);
        y0 + slope * (p - x0)
    }
}

impl Calibrator for IsotonicCalibrator {
    fn fit(&mut self, y_pred_proba: &[f64], y_true: &[f64]) -> Result<(), MonitorError> {
        if y_pred_proba.len() != y_true.len() {
            return Err(MonitorError::invalid(format!(
                "calibration needs as many probabilities as outcomes, got {} and {}.",
                y_pred_proba.len(),
                y_true.len()
            )));
        }
        validate_probabilities(y_pred_proba, "y_pred_proba")?;
        validate_binary_labels(y_true, "y_true")?;

        // Pair up (prediction, truth), skip missing values and sort by prediction
        let mut data: Vec<(f64, f64)> = y_pred_proba
            .iter()
            .zip(y_true)
            .filter(|(p, t)| !p.is_nan() && !t.is_nan())
            .map(|(&p, &t)| (p, t))
            .collect();
        if data.is_empty() {
            return Err(MonitorError::EmptyData("calibration data".to_string()));
        }
        data.sort_by(|a, b| a.0.total_cmp(&b.0));

        // Identical predictions are pooled first, so every block covers distinct inputs.
        let mut points: Vec<(f64, f64, f64)> = Vec::with_capacity(data.len());
        for (pred, target) in data {
            match points.last_mut() {
                Some((x, sum_y, count)) if *x == pred => {
                    *sum_y += target;
                    *count += 1.0;
                }
                _ => points.push((pred, target, 1.0)),
            }
        }

        // Pool adjacent violators. Blocks hold (sum_y, count, value, sum_x).
        let mut blocks: Vec<(f64, f64, f64, f64)> = Vec::with_capacity(points.len());
        for (x, sum_y, count) in points {
            let mut current_sum_y = sum_y;
            let mut current_sum_x = x * count;
            let mut current_count = count;

            // Merge down
            while let Some((prev_sum_y, prev_count, prev_val, prev_sum_x)) = blocks.last() {
                let curr_val = current_sum_y / current_count;
                if *prev_val > curr_val {
                    current_sum_y += *prev_sum_y;
                    current_count += *prev_count;
                    current_sum_x += *prev_sum_x;
                    blocks.pop();
                } else {
                    break;
                }
            }
            blocks.push((
                current_sum_y,
                current_count,
                current_sum_y / current_count,
                current_sum_x,
            ));
        }

        self.thresholds = blocks.iter().map(|(_, count, _, sum_x)| sum_x / count).collect();
        self.values = blocks.iter().map(|(_, _, value, _)| *value).collect();
        Ok(())
    }

    fn calibrate(&self, y_pred_proba: &[f64]) -> Result<Vec<f64>, MonitorError> {
        validate_probabilities(y_pred_proba, "y_pred_proba")?;
        if !self.is_fitted() {
            return Ok(y_pred_proba.to_vec());
        }
        Ok(y_pred_proba.iter().map(|&p| self.interpolate(p)).collect())
    }

    fn name(&self) -> &str {
        "isotonic"
    }
}
