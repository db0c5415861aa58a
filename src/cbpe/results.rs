use crate::chunk::ChunkRecord;
use crate::errors::MonitorError;
use crate::metrics::Metric;
use crate::plot::{PlotSpec, Series};
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

const PLOT_KINDS: [&str; 1] = ["performance"];

/// Estimated performance of one metric on one chunk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct MetricEstimate {
    pub metric: Metric,
    pub value: f64,
    pub sampling_error: f64,
    pub lower_confidence_bound: f64,
    pub upper_confidence_bound: f64,
    pub lower_threshold: Option<f64>,
    pub upper_threshold: Option<f64>,
    /// The estimate lies outside the thresholds.
    pub alert: bool,
    /// Performance on the true labels, when every row of the chunk has one.
    pub realized: Option<f64>,
}

type Field = fn(&MetricEstimate) -> f64;

fn fields() -> [(&'static str, Field); 8] {
    [
        ("", |e| e.value),
        ("sampling_error_", |e| e.sampling_error),
        ("lower_confidence_", |e| e.lower_confidence_bound),
        ("upper_confidence_", |e| e.upper_confidence_bound),
        ("realized_", |e| e.realized.unwrap_or(f64::NAN)),
        ("lower_threshold_", |e| e.lower_threshold.unwrap_or(f64::NAN)),
        ("upper_threshold_", |e| e.upper_threshold.unwrap_or(f64::NAN)),
        ("alert_", |e| if e.alert { 1.0 } else { 0.0 }),
    ]
}

/// One result row: a chunk and the estimate of every configured metric.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CbpeRow {
    pub chunk: ChunkRecord,
    pub estimates: Vec<MetricEstimate>,
}

impl CbpeRow {
    pub fn estimate(&self, metric: Metric) -> Option<&MetricEstimate> {
        self.estimates.iter().find(|e| e.metric == metric)
    }
}

/// Ordered per-chunk output of [`CBPE::estimate`](crate::cbpe::CBPE::estimate).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CbpeResult {
    pub metrics: Vec<Metric>,
    pub rows: Vec<CbpeRow>,
}

impl CbpeResult {
    pub fn new(metrics: Vec<Metric>, rows: Vec<CbpeRow>) -> Self {
        CbpeResult { metrics, rows }
    }

    pub fn rows(&self) -> &[CbpeRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn chunk_keys(&self) -> Vec<String> {
        self.rows.iter().map(|r| r.chunk.key.clone()).collect()
    }

    /// Names accepted by [`CbpeResult::column`].
    pub fn column_names(&self) -> Vec<String> {
        self.metrics
            .iter()
            .flat_map(|m| fields().into_iter().map(move |(prefix, _)| format!("{}{}", prefix, m.key())))
            .collect()
    }

    /// Values of a named column, one per chunk, such as `roc_auc`,
    /// `sampling_error_roc_auc` or `upper_confidence_f1`. Missing values are `NaN`
    /// and alerts are `1.0`/`0.0`.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, MonitorError> {
        for metric in &self.metrics {
            for (prefix, field) in fields() {
                if name.strip_prefix(prefix) == Some(metric.key()) {
                    return Ok(self
                        .rows
                        .iter()
                        .map(|r| r.estimate(*metric).map_or(f64::NAN, field))
                        .collect());
                }
            }
        }
        Err(MonitorError::MissingColumn(name.to_string()))
    }

    pub fn to_json(&self) -> Result<String, MonitorError> {
        serde_json::to_string(self).map_err(|e| MonitorError::UnableToWrite(e.to_string()))
    }

    /// Plot data for the estimated performance of `metric`.
    ///
    /// * `kind` - Only `performance` is supported.
    /// * `metric` - One of the estimated metric keys.
    pub fn plot(&self, kind: Option<&str>, metric: Option<&str>) -> Result<PlotSpec, MonitorError> {
        match kind {
            Some("performance") => {}
            Some(other) => {
                return Err(MonitorError::invalid(format!(
                    "unknown plot kind '{}'. Please provide one of [{}].",
                    other,
                    items_to_strings(&PLOT_KINDS)
                )))
            }
            None => {
                return Err(MonitorError::invalid(format!(
                    "no plot kind given. Please provide one of [{}].",
                    items_to_strings(&PLOT_KINDS)
                )))
            }
        }
        let keys: Vec<&str> = self.metrics.iter().map(|m| m.key()).collect();
        let key = metric.ok_or_else(|| {
            MonitorError::invalid(format!(
                "no 'metric' value given. Please provide one of [{}].",
                items_to_strings(&keys)
            ))
        })?;
        let metric = Metric::from_str(key)
            .ok()
            .filter(|m| self.metrics.contains(m))
            .ok_or_else(|| {
                MonitorError::invalid(format!(
                    "unknown 'metric' value: '{}'. Please provide one of [{}].",
                    key,
                    items_to_strings(&keys)
                ))
            })?;

        let estimates: Vec<Option<&MetricEstimate>> = self.rows.iter().map(|r| r.estimate(metric)).collect();
        let series = fields()[..5]
            .iter()
            .map(|(prefix, field)| Series {
                name: format!("{}{}", prefix, metric.key()),
                values: estimates.iter().map(|e| e.map_or(f64::NAN, field)).collect(),
            })
            .collect();
        let first = estimates.iter().flatten().next();
        Ok(PlotSpec {
            kind: "performance".to_string(),
            title: format!("Estimated {}", metric.key()),
            y_label: metric.key().to_string(),
            chunk_keys: self.chunk_keys(),
            is_reference: self.rows.iter().map(|r| r.chunk.is_reference).collect(),
            series,
            lower_threshold: first.and_then(|e| e.lower_threshold),
            upper_threshold: first.and_then(|e| e.upper_threshold),
            alerts: estimates.iter().map(|e| e.map_or(false, |e| e.alert)).collect(),
        })
    }
}
