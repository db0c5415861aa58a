//! CBPE
//!
//! Confidence-based performance estimation. Classifier performance is estimated from
//! calibrated predicted probabilities alone: every row contributes its probability of
//! being positive to an expected confusion matrix, and ROC AUC is estimated as a soft
//! Mann-Whitney statistic. Sampling errors derived from reference data give each
//! estimate confidence bounds that depend on the chunk size only.
//!
//! Binary problems are treated as a single one-vs-rest problem for the positive class
//! `"1"`; multiclass problems as one per class, macro averaged.
pub mod config;
pub mod results;
mod setters;

pub use config::{CbpeConfig, ConfigIO, ProbabilityColumns};
pub use results::{CbpeResult, CbpeRow, MetricEstimate};

use crate::calibration::{calibrate_checked, needs_calibration, Calibrator, IsotonicCalibrator};
use crate::chunk::{Chunk, ChunkRecord, ChunkerConfig};
use crate::constants::{
    CALIBRATION_BIN_COUNT, CALIBRATION_SPLIT_COUNT, MAXIMUM_BAND_HALF_WIDTH, MINIMUM_CHUNK_SIZE_FLOOR,
    SAMPLING_ERROR_RANGE, THRESHOLD_STD_FACTOR,
};
use crate::data::Dataset;
use crate::errors::MonitorError;
use crate::metrics::estimated::estimate_multiclass;
use crate::metrics::realized::{multiclass_metric, one_vs_rest};
use crate::metrics::sampling_error::{multiclass_components, multiclass_sampling_error, SamplingErrorComponents};
use crate::metrics::Metric;
use crate::utils::{
    fmt_vec_output, mean, run_in_pool, std, validate_binary_labels, validate_float_parameter,
    validate_positive_float_parameter, validate_probabilities,
};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Label of the positive class in binary problems.
const POSITIVE_CLASS: &str = "1";

/// Reference statistics of one metric, derived during fit.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MetricBaseline {
    pub metric: Metric,
    /// Sampling error components, one per class.
    pub components: Vec<SamplingErrorComponents>,
    /// Lower alert threshold before clipping to the confidence bounds.
    pub lower_threshold: Option<f64>,
    /// Upper alert threshold before clipping to the confidence bounds.
    pub upper_threshold: Option<f64>,
}

#[derive(Clone, Debug)]
struct Fitted {
    classes: Vec<String>,
    proba_columns: Vec<String>,
    calibrators: Vec<Box<dyn Calibrator>>,
    needs_calibration: Vec<bool>,
    baselines: Vec<MetricBaseline>,
    minimum_chunk_size: usize,
}

/// Model outputs of a dataset, as one-vs-rest problems.
struct Outputs {
    y_true: Option<Vec<Option<String>>>,
    y_pred: Option<Vec<Option<String>>>,
    /// One probability vector per class.
    proba: Vec<Vec<f64>>,
}

impl Outputs {
    /// Rows with all probabilities, and a prediction when predictions are present.
    fn usable_rows(&self, rows: &[usize]) -> Vec<usize> {
        rows.iter()
            .copied()
            .filter(|&i| self.proba.iter().all(|p| !p[i].is_nan()))
            .filter(|&i| self.y_pred.as_ref().map_or(true, |y| y[i].is_some()))
            .collect()
    }

    fn predictions(&self, rows: &[usize]) -> Vec<String> {
        match &self.y_pred {
            Some(y) => rows.iter().map(|&i| y[i].clone().unwrap_or_default()).collect(),
            None => vec![String::new(); rows.len()],
        }
    }

    /// True labels of `rows`, only if every one of them is known.
    fn labels(&self, rows: &[usize]) -> Option<Vec<String>> {
        if rows.is_empty() {
            return None;
        }
        let y = self.y_true.as_ref()?;
        rows.iter().map(|&i| y[i].clone()).collect()
    }

    fn probabilities(proba: &[Vec<f64>], rows: &[usize]) -> Vec<Vec<f64>> {
        proba.iter().map(|p| rows.iter().map(|&i| p[i]).collect()).collect()
    }
}

/// Confidence-based performance estimator.
#[derive(Clone, Debug)]
pub struct CBPE {
    pub cfg: CbpeConfig,
    metrics: Vec<Metric>,
    calibrator: Box<dyn Calibrator>,
    fitted: Option<Fitted>,
}

impl CBPE {
    /// Create an estimator that calibrates with an [`IsotonicCalibrator`].
    ///
    /// Fails when the metric list is absent, empty or names an unknown metric, or when
    /// the chunking and confidence bound settings are invalid.
    pub fn new(cfg: CbpeConfig) -> Result<Self, MonitorError> {
        Self::with_calibrator(cfg, Box::new(IsotonicCalibrator::new()))
    }

    /// Create an estimator with a custom calibrator.
    pub fn with_calibrator(cfg: CbpeConfig, calibrator: Box<dyn Calibrator>) -> Result<Self, MonitorError> {
        let metrics = Metric::parse_list(cfg.metrics.as_deref())?;
        cfg.chunker.validate()?;
        validate_bounds(cfg.confidence_lower_bound, cfg.confidence_upper_bound)?;
        validate_positive_float_parameter(cfg.sampling_error_multiplier, "sampling_error_multiplier")?;
        if let ProbabilityColumns::Multiclass(mapping) = &cfg.y_pred_proba {
            if mapping.is_empty() {
                return Err(MonitorError::invalid(
                    "'y_pred_proba' maps no classes. Please provide one column per class.",
                ));
            }
        }
        Ok(CBPE {
            cfg,
            metrics,
            calibrator,
            fitted: None,
        })
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// The calibrator every class starts from.
    pub fn calibrator(&self) -> &dyn Calibrator {
        self.calibrator.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Whether estimates use calibrated probabilities, for any class.
    pub fn needs_calibration(&self) -> bool {
        self.fitted
            .as_ref()
            .map_or(false, |f| f.needs_calibration.iter().any(|n| *n))
    }

    /// Calibration decision per class, in class order.
    pub fn class_needs_calibration(&self) -> Vec<(String, bool)> {
        self.fitted.as_ref().map_or_else(Vec::new, |f| {
            f.classes.iter().cloned().zip(f.needs_calibration.iter().copied()).collect()
        })
    }

    pub fn baselines(&self) -> &[MetricBaseline] {
        self.fitted.as_ref().map_or(&[], |f| f.baselines.as_slice())
    }

    /// Chunks with fewer rows are flagged as small.
    pub fn minimum_chunk_size(&self) -> Option<usize> {
        self.fitted.as_ref().map(|f| f.minimum_chunk_size)
    }

    fn class_columns(&self) -> (Vec<String>, Vec<String>) {
        match &self.cfg.y_pred_proba {
            ProbabilityColumns::Binary(column) => (vec![POSITIVE_CLASS.to_string()], vec![column.clone()]),
            ProbabilityColumns::Multiclass(mapping) => mapping.iter().map(|(k, v)| (k.clone(), v.clone())).unzip(),
        }
    }

    fn is_binary(&self) -> bool {
        matches!(self.cfg.y_pred_proba, ProbabilityColumns::Binary(_))
    }

    /// Read label columns. Binary labels must be numeric 0/1.
    fn read_labels(&self, data: &Dataset, column: &str) -> Result<Vec<Option<String>>, MonitorError> {
        if self.is_binary() {
            validate_binary_labels(data.numeric(column)?, column)?;
        }
        data.labels(column)
    }

    fn read_outputs(
        &self,
        data: &Dataset,
        proba_columns: &[String],
        require_labels: bool,
    ) -> Result<Outputs, MonitorError> {
        let mut proba = Vec::with_capacity(proba_columns.len());
        for column in proba_columns {
            let values = data.numeric(column)?;
            validate_probabilities(values, column)?;
            proba.push(values.to_vec());
        }

        let y_pred = if data.has_column(&self.cfg.y_pred) {
            Some(self.read_labels(data, &self.cfg.y_pred)?)
        } else if self.metrics.iter().any(|m| m.requires_predictions()) {
            return Err(MonitorError::MissingColumn(self.cfg.y_pred.clone()));
        } else {
            None
        };

        let y_true = if data.has_column(&self.cfg.y_true) {
            Some(self.read_labels(data, &self.cfg.y_true)?)
        } else if require_labels {
            return Err(MonitorError::MissingColumn(self.cfg.y_true.clone()));
        } else {
            None
        };

        if matches!(self.cfg.chunker, ChunkerConfig::Period(_)) && !data.has_column(&self.cfg.timestamp_column_name) {
            return Err(MonitorError::MissingColumn(self.cfg.timestamp_column_name.clone()));
        }
        Ok(Outputs { y_true, y_pred, proba })
    }

    /// Fit the estimator on reference data.
    ///
    /// Decides per class whether calibration is needed, fits the calibrators, and
    /// derives the sampling error components, alert thresholds and minimum chunk size.
    /// Fitting again replaces all previously fitted state.
    pub fn fit(&mut self, reference: &Dataset) -> Result<&mut Self, MonitorError> {
        let (classes, proba_columns) = self.class_columns();
        let outputs = self.read_outputs(reference, &proba_columns, true)?;

        let y_true_all = outputs.y_true.as_deref().unwrap_or_default();
        if !self.is_binary() {
            let observed: BTreeSet<&String> = y_true_all.iter().flatten().collect();
            if let Some(missing) = observed.into_iter().find(|c| !classes.contains(c)) {
                return Err(MonitorError::invalid(format!(
                    "'y_pred_proba' has no column for class '{}' found in '{}'.",
                    missing, self.cfg.y_true
                )));
            }
        }

        let rows: Vec<usize> = outputs
            .usable_rows(&(0..reference.len()).collect::<Vec<_>>())
            .into_iter()
            .filter(|&i| y_true_all[i].is_some())
            .collect();
        let y_true = outputs
            .labels(&rows)
            .ok_or_else(|| MonitorError::EmptyData("reference data".to_string()))?;
        let y_pred = outputs.predictions(&rows);
        let proba = Outputs::probabilities(&outputs.proba, &rows);

        let mut calibrators = Vec::with_capacity(classes.len());
        let mut needs = Vec::with_capacity(classes.len());
        for (class, p) in classes.iter().zip(&proba) {
            let t = one_vs_rest(&y_true, class);
            needs.push(needs_calibration(
                &t,
                p,
                self.calibrator.as_ref(),
                CALIBRATION_BIN_COUNT,
                CALIBRATION_SPLIT_COUNT,
            )?);
            let mut calibrator = self.calibrator.clone_box();
            calibrator.fit(p, &t)?;
            calibrators.push(calibrator);
        }
        if needs.iter().any(|n| *n) {
            warn!(
                "Predicted probabilities are miscalibrated, estimates will use the {} calibrator.",
                self.calibrator.name()
            );
        }

        let components: Vec<Vec<SamplingErrorComponents>> = self
            .metrics
            .iter()
            .map(|m| multiclass_components(*m, &classes, &y_true, &y_pred, &proba))
            .collect();
        let minimum_chunk_size = self.cfg.minimum_chunk_size.unwrap_or_else(|| {
            components
                .iter()
                .flatten()
                .map(|c| c.minimum_chunk_size(SAMPLING_ERROR_RANGE, MAXIMUM_BAND_HALF_WIDTH))
                .max()
                .unwrap_or(0)
                .max(MINIMUM_CHUNK_SIZE_FLOOR)
        });

        let chunks = self
            .cfg
            .chunker
            .split(reference, &self.cfg.timestamp_column_name, minimum_chunk_size)?;
        let baselines = self
            .metrics
            .iter()
            .zip(components)
            .map(|(metric, components)| {
                let realized: Vec<f64> = chunks
                    .iter()
                    .filter_map(|chunk| realized_metric(*metric, &classes, &outputs, chunk))
                    .collect();
                let (lower_threshold, upper_threshold) = if realized.is_empty() {
                    (None, None)
                } else {
                    let (m, s) = (mean(&realized), std(&realized));
                    debug!("Realized {} on reference chunks: [{}]", metric, fmt_vec_output(&realized));
                    (Some(m - THRESHOLD_STD_FACTOR * s), Some(m + THRESHOLD_STD_FACTOR * s))
                };
                MetricBaseline {
                    metric: *metric,
                    components,
                    lower_threshold,
                    upper_threshold,
                }
            })
            .collect();

        info!(
            "Fitted CBPE on {} reference rows in {} chunks, needs_calibration: {:?}, minimum chunk size: {}.",
            rows.len(),
            chunks.len(),
            needs,
            minimum_chunk_size
        );
        self.fitted = Some(Fitted {
            classes,
            proba_columns,
            calibrators,
            needs_calibration: needs,
            baselines,
            minimum_chunk_size,
        });
        Ok(self)
    }

    /// Estimate the configured metrics for every chunk of `data`.
    ///
    /// Probabilities are calibrated once for the whole dataset, then chunks are
    /// estimated in parallel. Results are ordered by chunk index.
    pub fn estimate(&self, data: &Dataset) -> Result<CbpeResult, MonitorError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| MonitorError::NotFitted("CBPE".to_string()))?;
        let outputs = self.read_outputs(data, &fitted.proba_columns, false)?;
        let calibrated = calibrate(fitted, &outputs.proba)?;
        let chunks = self
            .cfg
            .chunker
            .split(data, &self.cfg.timestamp_column_name, fitted.minimum_chunk_size)?;

        let rows = run_in_pool(self.cfg.num_threads, || {
            chunks
                .par_iter()
                .map(|chunk| self.estimate_chunk(fitted, chunk, &outputs, &calibrated))
                .collect::<Vec<_>>()
        })?;
        debug!("Estimated {} metric(s) over {} chunks.", self.metrics.len(), rows.len());
        Ok(CbpeResult::new(self.metrics.clone(), rows))
    }

    fn estimate_chunk(&self, fitted: &Fitted, chunk: &Chunk, outputs: &Outputs, calibrated: &[Vec<f64>]) -> CbpeRow {
        let rows = outputs.usable_rows(&chunk.rows);
        let y_pred = outputs.predictions(&rows);
        let proba = Outputs::probabilities(calibrated, &rows);
        let (lower, upper) = (self.cfg.confidence_lower_bound, self.cfg.confidence_upper_bound);
        let clip = |v: f64| v.max(lower).min(upper);
        let z = self.cfg.sampling_error_multiplier;

        let estimates = fitted
            .baselines
            .iter()
            .map(|baseline| {
                let value = clip(estimate_multiclass(baseline.metric, &fitted.classes, &y_pred, &proba));
                let sampling_error = multiclass_sampling_error(&baseline.components, rows.len());
                let (lower_confidence_bound, upper_confidence_bound) = if sampling_error.is_nan() {
                    (lower, upper)
                } else {
                    (clip(value - z * sampling_error), clip(value + z * sampling_error))
                };
                let lower_threshold = baseline.lower_threshold.map(clip);
                let upper_threshold = baseline.upper_threshold.map(clip);
                let alert =
                    lower_threshold.map_or(false, |t| value < t) || upper_threshold.map_or(false, |t| value > t);
                MetricEstimate {
                    metric: baseline.metric,
                    value,
                    sampling_error,
                    lower_confidence_bound,
                    upper_confidence_bound,
                    lower_threshold,
                    upper_threshold,
                    alert,
                    realized: realized_metric(baseline.metric, &fitted.classes, outputs, chunk),
                }
            })
            .collect();
        CbpeRow {
            chunk: ChunkRecord::from(chunk),
            estimates,
        }
    }
}

/// Performance on the true labels, when every usable row of the chunk has one.
fn realized_metric(metric: Metric, classes: &[String], outputs: &Outputs, chunk: &Chunk) -> Option<f64> {
    let rows = outputs.usable_rows(&chunk.rows);
    let y_true = outputs.labels(&rows)?;
    let value = multiclass_metric(
        metric,
        classes,
        &y_true,
        &outputs.predictions(&rows),
        &Outputs::probabilities(&outputs.proba, &rows),
    );
    (!value.is_nan()).then_some(value)
}

/// Calibrate the classes that need it. Multiclass rows are renormalised to sum to one.
fn calibrate(fitted: &Fitted, proba: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, MonitorError> {
    let mut calibrated = Vec::with_capacity(proba.len());
    for ((p, calibrator), needed) in proba.iter().zip(&fitted.calibrators).zip(&fitted.needs_calibration) {
        calibrated.push(if *needed { calibrate_checked(calibrator.as_ref(), p)? } else { p.clone() });
    }
    if calibrated.len() > 1 && fitted.needs_calibration.iter().any(|n| *n) {
        let n = calibrated.first().map_or(0, |p| p.len());
        for i in 0..n {
            let total: f64 = calibrated.iter().map(|p| p[i]).sum();
            if total > 0.0 {
                calibrated.iter_mut().for_each(|p| p[i] /= total);
            }
        }
    }
    Ok(calibrated)
}

fn validate_bounds(lower: f64, upper: f64) -> Result<(), MonitorError> {
    validate_float_parameter(lower, f64::NEG_INFINITY, upper, "confidence_lower_bound")?;
    validate_float_parameter(upper, lower, f64::INFINITY, "confidence_upper_bound")
}
