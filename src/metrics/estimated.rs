//! Estimated performance, computed from calibrated probabilities only.
//!
//! A calibrated probability `p` is read as the chance that the row is positive. A row
//! predicted positive therefore adds `p` to the expected true positives and `1 - p` to
//! the expected false positives; a row predicted negative adds `p` to the expected
//! false negatives and `1 - p` to the expected true negatives.
use crate::metrics::realized::{one_vs_rest, roc_auc_score};
use crate::metrics::{ConfusionMatrix, Metric};

/// Expected confusion matrix given hard predictions and calibrated probabilities.
pub fn expected_confusion_matrix(y_pred: &[f64], calibrated: &[f64]) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();
    for (&pred, &p) in y_pred.iter().zip(calibrated) {
        if pred == 1.0 {
            cm.tp += p;
            cm.fp += 1.0 - p;
        } else {
            cm.fn_ += p;
            cm.tn += 1.0 - p;
        }
    }
    cm
}

/// Expected ROC AUC.
///
/// Each row is both a positive with weight `p` and a negative with weight `1 - p`, so
/// this is the soft-label Mann-Whitney statistic: the expected chance that a positive
/// outranks a negative, ties counted half. Yields `0.0` when every row is certain to be
/// of the same class.
pub fn estimate_roc_auc(calibrated: &[f64]) -> f64 {
    let auc = roc_auc_score(calibrated, calibrated);
    if auc.is_nan() {
        0.0
    } else {
        auc
    }
}

/// Estimated value of `metric` for a binary classifier.
pub fn estimate_binary(metric: Metric, y_pred: &[f64], calibrated: &[f64]) -> f64 {
    match metric {
        Metric::RocAuc => estimate_roc_auc(calibrated),
        _ => expected_confusion_matrix(y_pred, calibrated).metric(metric),
    }
}

/// Estimated value of `metric` for a multiclass classifier, macro averaged over the
/// one-vs-rest problems.
pub fn estimate_multiclass(metric: Metric, classes: &[String], y_pred: &[String], calibrated: &[Vec<f64>]) -> f64 {
    if classes.is_empty() {
        return 0.0;
    }
    let total: f64 = classes
        .iter()
        .zip(calibrated)
        .map(|(class, proba)| {
            let pred = one_vs_rest(y_pred, class);
            estimate_binary(metric, &pred, proba)
        })
        .sum();
    total / classes.len() as f64
}
