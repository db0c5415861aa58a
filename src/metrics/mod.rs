//! Metrics
//!
//! The supported performance metrics, their realized (label based) and estimated
//! (probability based) computation, and their sampling error model.
pub mod estimated;
pub mod realized;
pub mod sampling_error;

use crate::errors::MonitorError;
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Performance metrics that can be estimated without ground truth.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    RocAuc,
    F1,
    Precision,
    Recall,
    Specificity,
    Accuracy,
}

impl Metric {
    pub const ALL: [Metric; 6] = [
        Metric::RocAuc,
        Metric::F1,
        Metric::Precision,
        Metric::Recall,
        Metric::Specificity,
        Metric::Accuracy,
    ];

    /// Key used in configuration and result column names.
    pub fn key(&self) -> &'static str {
        match self {
            Metric::RocAuc => "roc_auc",
            Metric::F1 => "f1",
            Metric::Precision => "precision",
            Metric::Recall => "recall",
            Metric::Specificity => "specificity",
            Metric::Accuracy => "accuracy",
        }
    }

    /// Whether the metric is computed from predicted labels.
    pub fn requires_predictions(&self) -> bool {
        !matches!(self, Metric::RocAuc)
    }

    /// Parse a list of metric keys, rejecting an absent or empty list and unknown keys.
    pub fn parse_list(keys: Option<&[String]>) -> Result<Vec<Metric>, MonitorError> {
        let keys = match keys {
            Some(k) if !k.is_empty() => k,
            _ => {
                return Err(MonitorError::invalid(
                    "no metrics provided. Please provide a non-empty list of metrics.",
                ))
            }
        };
        let mut metrics = Vec::with_capacity(keys.len());
        for key in keys {
            let metric = Metric::from_str(key)?;
            if !metrics.contains(&metric) {
                metrics.push(metric);
            }
        }
        Ok(metrics)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Metric {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Metric::ALL
            .iter()
            .find(|m| m.key() == s)
            .copied()
            .ok_or_else(|| {
                MonitorError::invalid(format!(
                    "unknown metric key '{}' given. Should be one of [{}].",
                    s,
                    items_to_strings(&Metric::ALL.iter().map(|m| m.key()).collect::<Vec<_>>())
                ))
            })
    }
}

/// Counts of a (possibly expected, hence fractional) binary confusion matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConfusionMatrix {
    pub tp: f64,
    pub fp: f64,
    pub tn: f64,
    pub fn_: f64,
}

impl ConfusionMatrix {
    pub fn total(&self) -> f64 {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn precision(&self) -> f64 {
        crate::utils::safe_div(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        crate::utils::safe_div(self.tp, self.tp + self.fn_)
    }

    pub fn specificity(&self) -> f64 {
        crate::utils::safe_div(self.tn, self.tn + self.fp)
    }

    pub fn accuracy(&self) -> f64 {
        crate::utils::safe_div(self.tp + self.tn, self.total())
    }

    pub fn f1(&self) -> f64 {
        crate::utils::safe_div(self.tp, self.tp + 0.5 * (self.fp + self.fn_))
    }

    /// Value of a confusion matrix based metric. `RocAuc` is not one and yields `NaN`.
    pub fn metric(&self, metric: Metric) -> f64 {
        match metric {
            Metric::RocAuc => f64::NAN,
            Metric::F1 => self.f1(),
            Metric::Precision => self.precision(),
            Metric::Recall => self.recall(),
            Metric::Specificity => self.specificity(),
            Metric::Accuracy => self.accuracy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_parsing() {
        assert_eq!(Metric::from_str("roc_auc").unwrap(), Metric::RocAuc);
        let err = Metric::from_str("foo").unwrap_err();
        assert!(err.to_string().contains("unknown metric key 'foo' given."));
    }

    #[test]
    fn test_parse_list_requires_non_empty() {
        let msg = "no metrics provided. Please provide a non-empty list of metrics.";
        assert_eq!(Metric::parse_list(None).unwrap_err().to_string(), msg);
        assert_eq!(Metric::parse_list(Some(&[])).unwrap_err().to_string(), msg);
        let keys = vec!["roc_auc".to_string(), "foo".to_string()];
        assert!(Metric::parse_list(Some(&keys))
            .unwrap_err()
            .to_string()
            .contains("unknown metric key 'foo' given."));
        let keys = vec!["f1".to_string(), "f1".to_string(), "accuracy".to_string()];
        assert_eq!(
            Metric::parse_list(Some(&keys)).unwrap(),
            vec![Metric::F1, Metric::Accuracy]
        );
    }

    #[test]
    fn test_confusion_matrix_metrics() {
        let cm = ConfusionMatrix {
            tp: 8.0,
            fp: 2.0,
            tn: 6.0,
            fn_: 4.0,
        };
        assert_eq!(cm.precision(), 0.8);
        assert_eq!(cm.recall(), 8.0 / 12.0);
        assert_eq!(cm.specificity(), 0.75);
        assert_eq!(cm.accuracy(), 0.7);
        assert_eq!(cm.f1(), 8.0 / 11.0);
        assert!(cm.metric(Metric::RocAuc).is_nan());
    }

    #[test]
    fn test_confusion_matrix_zero_denominators() {
        let cm = ConfusionMatrix::default();
        for m in Metric::ALL.iter().skip(1) {
            assert_eq!(cm.metric(*m), 0.0);
        }
    }
}
