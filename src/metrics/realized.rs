//! Realized performance, computed from true labels.
use crate::metrics::{ConfusionMatrix, Metric};

fn trapezoid_area(x0: f64, x1: f64, y0: f64, y1: f64) -> f64 {
    (x0 - x1).abs() * (y0 + y1) * 0.5
}

/// Area under the ROC curve of `yhat` against (soft) labels `y`.
///
/// Labels may be fractional, in which case each row counts `y` as a positive and
/// `1 - y` as a negative. Returns `NaN` when there are no positives or no negatives.
pub fn roc_auc_score(y: &[f64], yhat: &[f64]) -> f64 {
    if y.is_empty() {
        return f64::NAN;
    }
    let mut indices = (0..y.len()).collect::<Vec<_>>();
    indices.sort_unstable_by(|&a, &b| yhat[b].total_cmp(&yhat[a]));
    let mut auc: f64 = 0.0;

    let mut label = y[indices[0]];
    let mut fp = 1.0 - label;
    let mut tp: f64 = label;
    let mut tp_prev: f64 = 0.0;
    let mut fp_prev: f64 = 0.0;

    for i in 1..indices.len() {
        if yhat[indices[i]] != yhat[indices[i - 1]] {
            auc += trapezoid_area(fp_prev, fp, tp_prev, tp);
            tp_prev = tp;
            fp_prev = fp;
        }
        label = y[indices[i]];
        fp += 1.0 - label;
        tp += label;
    }

    auc += trapezoid_area(fp_prev, fp, tp_prev, tp);
    if fp <= 0.0 || tp <= 0.0 {
        return f64::NAN;
    }

    auc / (tp * fp)
}

/// Confusion matrix from hard 0/1 labels.
pub fn confusion_matrix(y_true: &[f64], y_pred: &[f64]) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();
    for (&t, &p) in y_true.iter().zip(y_pred) {
        match (t == 1.0, p == 1.0) {
            (true, true) => cm.tp += 1.0,
            (false, true) => cm.fp += 1.0,
            (false, false) => cm.tn += 1.0,
            (true, false) => cm.fn_ += 1.0,
        }
    }
    cm
}

/// Realized value of `metric` for a binary classifier.
pub fn binary_metric(metric: Metric, y_true: &[f64], y_pred: &[f64], y_pred_proba: &[f64]) -> f64 {
    match metric {
        Metric::RocAuc => roc_auc_score(y_true, y_pred_proba),
        _ => confusion_matrix(y_true, y_pred).metric(metric),
    }
}

/// Realized value of `metric` for a multiclass classifier, macro averaged over
/// one-vs-rest problems.
///
/// * `classes` - Class labels, one per entry of `y_pred_proba`.
/// * `y_pred_proba` - Per class probability columns.
pub fn multiclass_metric(
    metric: Metric,
    classes: &[String],
    y_true: &[String],
    y_pred: &[String],
    y_pred_proba: &[Vec<f64>],
) -> f64 {
    let per_class: Vec<f64> = classes
        .iter()
        .zip(y_pred_proba)
        .map(|(class, proba)| {
            let t = one_vs_rest(y_true, class);
            let p = one_vs_rest(y_pred, class);
            binary_metric(metric, &t, &p, proba)
        })
        .collect();
    per_class.iter().sum::<f64>() / per_class.len() as f64
}

/// Binarize labels against a single class.
pub fn one_vs_rest(labels: &[String], class: &str) -> Vec<f64> {
    labels.iter().map(|l| if l == class { 1.0 } else { 0.0 }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::precision_round;

    #[test]
    fn test_auc_real_data() {
        let y = vec![1., 0., 1., 0., 0., 0., 0.];
        let yhat = vec![0.5, 0.01, 0.0, 1.05, 0., -4., 0.];
        let res = roc_auc_score(&y, &yhat);
        assert_eq!(precision_round(res, 5), 0.6);
    }

    #[test]
    fn test_auc_generic() {
        assert_eq!(roc_auc_score(&[0., 1.], &[0., 1.]), 1.);
        assert_eq!(roc_auc_score(&[0., 1.], &[1., 0.]), 0.);
        assert_eq!(roc_auc_score(&[1., 0.], &[1., 1.]), 0.5);
        assert_eq!(roc_auc_score(&[1., 0.], &[0.5, 0.5]), 0.5);
        assert!(roc_auc_score(&[0., 0.], &[0.25, 0.75]).is_nan());
        assert!(roc_auc_score(&[1., 1.], &[0.25, 0.75]).is_nan());
        assert!(roc_auc_score(&[], &[]).is_nan());
    }

    #[test]
    fn test_confusion_matrix() {
        let cm = confusion_matrix(&[1., 1., 0., 0., 1.], &[1., 0., 0., 1., 1.]);
        assert_eq!((cm.tp, cm.fp, cm.tn, cm.fn_), (2., 1., 1., 1.));
        assert_eq!(binary_metric(Metric::Accuracy, &[1., 0.], &[1., 1.], &[0.9, 0.8]), 0.5);
    }

    #[test]
    fn test_multiclass_macro_average() {
        let classes: Vec<String> = vec!["a".into(), "b".into()];
        let y_true: Vec<String> = vec!["a".into(), "b".into(), "a".into(), "b".into()];
        let y_pred: Vec<String> = vec!["a".into(), "b".into(), "b".into(), "b".into()];
        let proba = vec![vec![0.9, 0.2, 0.4, 0.1], vec![0.1, 0.8, 0.6, 0.9]];
        let acc = multiclass_metric(Metric::Accuracy, &classes, &y_true, &y_pred, &proba);
        assert_eq!(acc, 0.75);
        let auc = multiclass_metric(Metric::RocAuc, &classes, &y_true, &y_pred, &proba);
        assert_eq!(auc, 1.0);
    }
}
