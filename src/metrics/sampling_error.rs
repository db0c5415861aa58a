//! Sampling Error
//!
//! Closed-form standard errors for each metric. Every metric is written as the mean of
//! per-observation contributions over a relevant subset of the rows. The spread of those
//! contributions is measured once on reference data; for a chunk of `n` rows the
//! standard error is `std / sqrt(n * fraction)`, where `fraction` is the share of rows
//! that contribute.
use crate::metrics::realized::one_vs_rest;
use crate::metrics::Metric;
use crate::utils::{argsort, mean, std};
use serde::{Deserialize, Serialize};

/// Reference statistics of one metric's observation-level contributions.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct SamplingErrorComponents {
    /// Population standard deviation of the contributions.
    pub std: f64,
    /// Share of rows that contribute.
    pub fraction: f64,
}

impl SamplingErrorComponents {
    /// Standard error for a chunk of `n` rows. `NaN` when nothing contributes.
    pub fn sampling_error(&self, n: usize) -> f64 {
        let effective = n as f64 * self.fraction;
        if effective <= 0.0 || self.std.is_nan() {
            return f64::NAN;
        }
        self.std / effective.sqrt()
    }

    /// Smallest chunk size whose `range * sampling_error` does not exceed `half_width`.
    pub fn minimum_chunk_size(&self, range: f64, half_width: f64) -> usize {
        if self.fraction <= 0.0 || self.std.is_nan() {
            return 0;
        }
        ((range * self.std / half_width).powi(2) / self.fraction).ceil() as usize
    }
}

/// Compute the components of `metric` from reference labels, predictions and scores.
pub fn components(metric: Metric, y_true: &[f64], y_pred: &[f64], y_pred_proba: &[f64]) -> SamplingErrorComponents {
    match metric {
        Metric::RocAuc => roc_auc_components(y_true, y_pred_proba),
        Metric::F1 => f1_components(y_true, y_pred),
        Metric::Precision => precision_components(y_true, y_pred),
        Metric::Recall => recall_components(y_true, y_pred),
        Metric::Specificity => specificity_components(y_true, y_pred),
        Metric::Accuracy => accuracy_components(y_true, y_pred),
    }
}

/// Components per class, for multiclass problems.
pub fn multiclass_components(
    metric: Metric,
    classes: &[String],
    y_true: &[String],
    y_pred: &[String],
    y_pred_proba: &[Vec<f64>],
) -> Vec<SamplingErrorComponents> {
    classes
        .iter()
        .zip(y_pred_proba)
        .map(|(class, proba)| {
            components(
                metric,
                &one_vs_rest(y_true, class),
                &one_vs_rest(y_pred, class),
                proba,
            )
        })
        .collect()
}

/// Standard error of a macro average: the per-class errors combined as independent
/// estimates, `sqrt(sum(se_c^2)) / k`.
pub fn multiclass_sampling_error(components: &[SamplingErrorComponents], n: usize) -> f64 {
    if components.is_empty() {
        return f64::NAN;
    }
    let sum_sq: f64 = components.iter().map(|c| c.sampling_error(n).powi(2)).sum();
    sum_sq.sqrt() / components.len() as f64
}

fn from_observations(observations: &[f64], n_rows: usize) -> SamplingErrorComponents {
    SamplingErrorComponents {
        std: std(observations),
        fraction: if n_rows == 0 {
            0.0
        } else {
            observations.len() as f64 / n_rows as f64
        },
    }
}

/// Each positive contributes the share of negatives it outranks (its placement value).
/// Positives and negatives are swapped when positives are the majority.
fn roc_auc_components(y_true: &[f64], y_pred_proba: &[f64]) -> SamplingErrorComponents {
    let flip = mean(y_true) > 0.5;
    let (labels, scores): (Vec<f64>, Vec<f64>) = if flip {
        (
            y_true.iter().map(|y| 1.0 - y).collect(),
            y_pred_proba.iter().map(|p| 1.0 - p).collect(),
        )
    } else {
        (y_true.to_vec(), y_pred_proba.to_vec())
    };
    let n_pos = labels.iter().filter(|&&y| y == 1.0).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return SamplingErrorComponents {
            std: f64::NAN,
            fraction: 0.0,
        };
    }

    let mut negatives_below = 0usize;
    let mut placements = Vec::with_capacity(n_pos);
    for i in argsort(&scores) {
        if labels[i] == 1.0 {
            placements.push(negatives_below as f64 / n_neg as f64);
        } else {
            negatives_below += 1;
        }
    }
    SamplingErrorComponents {
        std: std(&placements),
        fraction: n_pos as f64 / labels.len() as f64,
    }
}

/// True positives count 1, false positives and false negatives 0, rescaled so their
/// mean equals F1.
fn f1_components(y_true: &[f64], y_pred: &[f64]) -> SamplingErrorComponents {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t == 1.0, p == 1.0) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }
    let relevant = tp + fp + fn_;
    let denominator = (fp + fn_) as f64 * 0.5 + tp as f64;
    if relevant == 0 || denominator == 0.0 {
        return SamplingErrorComponents {
            std: 0.0,
            fraction: 0.0,
        };
    }
    let correcting_factor = relevant as f64 / denominator;
    let mut observations = vec![correcting_factor; tp];
    observations.resize(relevant, 0.0);
    from_observations(&observations, y_true.len())
}

fn precision_components(y_true: &[f64], y_pred: &[f64]) -> SamplingErrorComponents {
    let observations: Vec<f64> = y_true
        .iter()
        .zip(y_pred)
        .filter(|&(_, &p)| p == 1.0)
        .map(|(&t, _)| if t == 1.0 { 1.0 } else { 0.0 })
        .collect();
    from_observations(&observations, y_true.len())
}

fn recall_components(y_true: &[f64], y_pred: &[f64]) -> SamplingErrorComponents {
    let observations: Vec<f64> = y_true
        .iter()
        .zip(y_pred)
        .filter(|&(&t, _)| t == 1.0)
        .map(|(_, &p)| if p == 1.0 { 1.0 } else { 0.0 })
        .collect();
    from_observations(&observations, y_true.len())
}

fn specificity_components(y_true: &[f64], y_pred: &[f64]) -> SamplingErrorComponents {
    let observations: Vec<f64> = y_true
        .iter()
        .zip(y_pred)
        .filter(|&(&t, _)| t == 0.0)
        .map(|(_, &p)| if p == 0.0 { 1.0 } else { 0.0 })
        .collect();
    from_observations(&observations, y_true.len())
}

fn accuracy_components(y_true: &[f64], y_pred: &[f64]) -> SamplingErrorComponents {
    let observations: Vec<f64> = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| if t == p { 1.0 } else { 0.0 })
        .collect();
    from_observations(&observations, y_true.len())
}
