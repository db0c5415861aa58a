use crate::cbpe::{validate_bounds, CBPE};
use crate::errors::MonitorError;
use crate::utils::validate_positive_float_parameter;

impl CBPE {
    // Set methods for parameters

    /// Set the sampling error multiplier.
    /// * `sampling_error_multiplier` - Number of sampling errors between an estimate and
    ///   each of its confidence bounds.
    pub fn set_sampling_error_multiplier(mut self, sampling_error_multiplier: f64) -> Result<Self, MonitorError> {
        validate_positive_float_parameter(sampling_error_multiplier, "sampling_error_multiplier")?;
        self.cfg.sampling_error_multiplier = sampling_error_multiplier;
        Ok(self)
    }

    /// Set the number of threads.
    /// * `num_threads` - Threads used to estimate chunks in parallel.
    pub fn set_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.cfg.num_threads = num_threads;
        self
    }

    /// Set the minimum chunk size, instead of deriving it during fit.
    pub fn set_minimum_chunk_size(mut self, minimum_chunk_size: Option<usize>) -> Self {
        self.cfg.minimum_chunk_size = minimum_chunk_size;
        if let (Some(size), Some(fitted)) = (minimum_chunk_size, self.fitted.as_mut()) {
            fitted.minimum_chunk_size = size;
        }
        self
    }

    // Overrides on a fitted estimator

    /// Override the confidence bounds. The next `estimate` clips values, confidence
    /// bounds and thresholds to `[lower, upper]`, without refitting.
    pub fn set_confidence_bounds(&mut self, lower: f64, upper: f64) -> Result<(), MonitorError> {
        validate_bounds(lower, upper)?;
        self.cfg.confidence_lower_bound = lower;
        self.cfg.confidence_upper_bound = upper;
        Ok(())
    }

    /// Override the calibration decision of every class.
    pub fn set_needs_calibration(&mut self, needs_calibration: bool) -> Result<(), MonitorError> {
        let fitted = self
            .fitted
            .as_mut()
            .ok_or_else(|| MonitorError::NotFitted("CBPE".to_string()))?;
        fitted.needs_calibration.iter_mut().for_each(|n| *n = needs_calibration);
        Ok(())
    }
}
