//! Calibration Module
//!
//! Maps raw predicted probabilities onto calibrated ones whose averages match the
//! observed outcome rates, and decides whether such a mapping is needed at all.
//!
//! # Submodules
//!
//! * `isotonic`: Monotonic (isotonic) regression calibrator, the default.
//! * `necessity`: Expected calibration error and the calibration-necessity test.

pub mod isotonic;
pub mod necessity;

use crate::errors::MonitorError;
use crate::utils::validate_probabilities;
use std::fmt::Debug;

pub use isotonic::IsotonicCalibrator;
pub use necessity::{expected_calibration_error, needs_calibration};

/// Clone support for boxed calibrators.
pub trait CalibratorClone {
    fn clone_box(&self) -> Box<dyn Calibrator>;
}

impl<T> CalibratorClone for T
where
    T: 'static + Calibrator + Clone,
{
    fn clone_box(&self) -> Box<dyn Calibrator> {
        Box::new(self.clone())
    }
}

/// A probability calibrator.
///
/// `fit` learns the mapping from raw probabilities to outcome rates; `calibrate`
/// applies it. Implementations must be cloneable so one instance can be fitted per
/// class, and shareable across threads so chunks can be calibrated in parallel.
pub trait Calibrator: CalibratorClone + Debug + Send + Sync {
    /// Learn a mapping from `y_pred_proba` to the binary outcomes `y_true`.
    fn fit(&mut self, y_pred_proba: &[f64], y_true: &[f64]) -> Result<(), MonitorError>;

    /// Apply the learned mapping.
    fn calibrate(&self, y_pred_proba: &[f64]) -> Result<Vec<f64>, MonitorError>;

    /// Short name, used in logs.
    fn name(&self) -> &str {
        "custom"
    }
}

/// Apply `calibrator`, failing unless it returns one probability per input.
pub(crate) fn calibrate_checked(calibrator: &dyn Calibrator, y_pred_proba: &[f64]) -> Result<Vec<f64>, MonitorError> {
    let calibrated = calibrator.calibrate(y_pred_proba)?;
    if calibrated.len() != y_pred_proba.len() {
        return Err(MonitorError::invalid(format!(
            "calibrator '{}' returned {} probabilities for {} inputs.",
            calibrator.name(),
            calibrated.len(),
            y_pred_proba.len()
        )));
    }
    validate_probabilities(&calibrated, &format!("{} calibrator output", calibrator.name()))?;
    Ok(calibrated)
}

impl Clone for Box<dyn Calibrator> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
