//! Drift
//!
//! Univariate drift detection on model outputs. The reference distribution of every
//! monitored column is stored during fit; each chunk of analysis data is then compared
//! to it with a two-sample test: Kolmogorov-Smirnov for continuous columns, and the
//! chi-squared test of independence for categorical ones.
pub mod results;
pub mod stats;
#[cfg(test)]
mod tests;

pub use results::{ColumnDrift, DistributionSummary, DriftResult, DriftRow};

use crate::cbpe::config::{ConfigIO, ProbabilityColumns};
use crate::chunk::{Chunk, ChunkRecord, ChunkerConfig};
use crate::constants::{DEFAULT_MINIMUM_CHUNK_SIZE, DRIFT_ALPHA};
use crate::data::Dataset;
use crate::errors::MonitorError;
use crate::utils::{quantile_sorted, run_in_pool, validate_float_parameter};
use hashbrown::HashMap;
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stats::{chi2_test, ks_2samp, TestResult};

/// Quantiles reported by the distribution summary of continuous columns.
pub const SUMMARY_QUANTILES: [f64; 5] = [0.05, 0.25, 0.5, 0.75, 0.95];

fn default_timestamp_column_name() -> String {
    "timestamp".to_string()
}
fn default_y_pred() -> String {
    "y_pred".to_string()
}
fn default_alpha() -> f64 {
    DRIFT_ALPHA
}
fn default_minimum_chunk_size() -> usize {
    DEFAULT_MINIMUM_CHUNK_SIZE
}

/// Configuration for the [`StatisticalOutputDriftCalculator`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DriftConfig {
    #[serde(default = "default_timestamp_column_name")]
    pub timestamp_column_name: String,
    /// Predicted label, or predicted value for regression.
    #[serde(default = "default_y_pred")]
    pub y_pred: String,
    /// Predicted probability column(s). When given, `y_pred` is treated as categorical.
    #[serde(default)]
    pub y_pred_proba: Option<ProbabilityColumns>,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// Significance level below which a p-value raises an alert.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// Chunks with fewer rows are flagged as small.
    #[serde(default = "default_minimum_chunk_size")]
    pub minimum_chunk_size: usize,
}

impl Default for DriftConfig {
    fn default() -> Self {
        DriftConfig {
            timestamp_column_name: default_timestamp_column_name(),
            y_pred: default_y_pred(),
            y_pred_proba: None,
            chunker: ChunkerConfig::default(),
            alpha: default_alpha(),
            num_threads: None,
            minimum_chunk_size: default_minimum_chunk_size(),
        }
    }
}

impl DriftConfig {
    /// Configuration for a regression model, monitoring the continuous `y_pred`.
    pub fn regression(y_pred: &str) -> Self {
        DriftConfig {
            y_pred: y_pred.to_string(),
            ..Default::default()
        }
    }

    /// Configuration for a classifier, monitoring the categorical `y_pred` and every
    /// probability column.
    pub fn classification(y_pred: &str, y_pred_proba: impl Into<ProbabilityColumns>) -> Self {
        DriftConfig {
            y_pred: y_pred.to_string(),
            y_pred_proba: Some(y_pred_proba.into()),
            ..Default::default()
        }
    }

    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }

    pub fn with_timestamp_column_name(mut self, timestamp_column_name: &str) -> Self {
        self.timestamp_column_name = timestamp_column_name.to_string();
        self
    }
}

impl ConfigIO for DriftConfig {}

/// How a monitored column is compared.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Continuous,
    Categorical,
}

impl ColumnKind {
    /// Name of the statistic column produced for this kind.
    pub fn statistic_suffix(&self) -> &'static str {
        match self {
            ColumnKind::Continuous => "dstat",
            ColumnKind::Categorical => "chi2",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Reference {
    /// Sorted values, `NaN` removed.
    Continuous(Vec<f64>),
    Categorical(BTreeMap<String, usize>),
}

#[derive(Clone, Debug, PartialEq)]
struct MonitoredColumn {
    name: String,
    kind: ColumnKind,
    reference: Reference,
}

/// Values of one monitored column.
enum Values {
    Continuous(Vec<f64>),
    Categorical(Vec<Option<String>>),
}

impl Values {
    fn read(data: &Dataset, column: &str, kind: ColumnKind) -> Result<Self, MonitorError> {
        Ok(match kind {
            ColumnKind::Continuous => Values::Continuous(data.numeric(column)?.to_vec()),
            ColumnKind::Categorical => Values::Categorical(data.labels(column)?),
        })
    }

    fn sorted(values: &[f64], rows: &[usize]) -> Vec<f64> {
        let mut v: Vec<f64> = rows.iter().map(|&i| values[i]).filter(|v| !v.is_nan()).collect();
        v.sort_by(|a, b| a.total_cmp(b));
        v
    }

    fn counts(values: &[Option<String>], rows: &[usize]) -> BTreeMap<String, usize> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for label in rows.iter().filter_map(|&i| values[i].as_deref()) {
            *counts.entry(label).or_insert(0) += 1;
        }
        counts.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }
}

/// Detects drift in model outputs, chunk by chunk.
#[derive(Clone, Debug)]
pub struct StatisticalOutputDriftCalculator {
    pub cfg: DriftConfig,
    fitted: Option<Vec<MonitoredColumn>>,
}

impl StatisticalOutputDriftCalculator {
    pub fn new(cfg: DriftConfig) -> Result<Self, MonitorError> {
        cfg.chunker.validate()?;
        validate_float_parameter(cfg.alpha, 0.0, 1.0, "alpha")?;
        if let Some(ProbabilityColumns::Multiclass(mapping)) = &cfg.y_pred_proba {
            if mapping.is_empty() {
                return Err(MonitorError::invalid(
                    "'y_pred_proba' maps no classes. Please provide one column per class.",
                ));
            }
        }
        Ok(StatisticalOutputDriftCalculator { cfg, fitted: None })
    }

    pub fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }

    /// Monitored columns and how they are compared, in output order.
    pub fn columns(&self) -> Vec<(String, ColumnKind)> {
        let y_pred_kind = if self.cfg.y_pred_proba.is_some() {
            ColumnKind::Categorical
        } else {
            ColumnKind::Continuous
        };
        let mut columns = vec![(self.cfg.y_pred.clone(), y_pred_kind)];
        if let Some(proba) = &self.cfg.y_pred_proba {
            columns.extend(
                proba
                    .column_names()
                    .into_iter()
                    .map(|c| (c.to_string(), ColumnKind::Continuous)),
            );
        }
        columns
    }

    fn read_columns(&self, data: &Dataset) -> Result<Vec<Values>, MonitorError> {
        if matches!(self.cfg.chunker, ChunkerConfig::Period(_)) && !data.has_column(&self.cfg.timestamp_column_name) {
            return Err(MonitorError::MissingColumn(self.cfg.timestamp_column_name.clone()));
        }
        self.columns()
            .iter()
            .map(|(name, kind)| Values::read(data, name, *kind))
            .collect()
    }

    /// Store the reference distribution of every monitored column.
    pub fn fit(&mut self, reference: &Dataset) -> Result<&mut Self, MonitorError> {
        let values = self.read_columns(reference)?;
        let all_rows: Vec<usize> = (0..reference.len()).collect();
        let mut fitted = Vec::with_capacity(values.len());
        for ((name, kind), values) in self.columns().into_iter().zip(values) {
            let reference = match values {
                Values::Continuous(v) => {
                    let sorted = Values::sorted(&v, &all_rows);
                    if sorted.is_empty() {
                        return Err(MonitorError::EmptyData(format!("reference column '{}'", name)));
                    }
                    Reference::Continuous(sorted)
                }
                Values::Categorical(v) => {
                    let counts = Values::counts(&v, &all_rows);
                    if counts.is_empty() {
                        return Err(MonitorError::EmptyData(format!("reference column '{}'", name)));
                    }
                    Reference::Categorical(counts)
                }
            };
            fitted.push(MonitoredColumn { name, kind, reference });
        }
        info!(
            "Fitted drift calculator on {} reference rows for columns [{}].",
            reference.len(),
            fitted.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
        );
        self.fitted = Some(fitted);
        Ok(self)
    }

    /// Compare every chunk of `data` to the reference distributions.
    pub fn calculate(&self, data: &Dataset) -> Result<DriftResult, MonitorError> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| MonitorError::NotFitted("StatisticalOutputDriftCalculator".to_string()))?;
        let values = self.read_columns(data)?;
        let chunks = self
            .cfg
            .chunker
            .split(data, &self.cfg.timestamp_column_name, self.cfg.minimum_chunk_size)?;

        let rows = run_in_pool(self.cfg.num_threads, || {
            chunks
                .par_iter()
                .map(|chunk| self.calculate_chunk(fitted, &values, chunk))
                .collect::<Vec<_>>()
        })?;
        debug!("Calculated drift for {} column(s) over {} chunks.", fitted.len(), rows.len());
        Ok(DriftResult::new(
            fitted.iter().map(|c| (c.name.clone(), c.kind)).collect(),
            self.cfg.alpha,
            reference_summaries(fitted),
            rows,
        ))
    }

    fn calculate_chunk(&self, fitted: &[MonitoredColumn], values: &[Values], chunk: &Chunk) -> DriftRow {
        let columns = fitted
            .iter()
            .zip(values)
            .map(|(column, values)| {
                let (test, summary) = match (&column.reference, values) {
                    (Reference::Continuous(reference), Values::Continuous(v)) => {
                        let current = Values::sorted(v, &chunk.rows);
                        (ks_2samp(reference, &current), summarize_continuous(&current))
                    }
                    (Reference::Categorical(reference), Values::Categorical(v)) => {
                        let current = Values::counts(v, &chunk.rows);
                        (chi2_test(reference, &current), summarize_categorical(&current))
                    }
                    // Kinds come from the same configuration at fit and calculate time.
                    _ => (
                        TestResult {
                            statistic: f64::NAN,
                            p_value: f64::NAN,
                        },
                        DistributionSummary::Shares(BTreeMap::new()),
                    ),
                };
                ColumnDrift {
                    column: column.name.clone(),
                    kind: column.kind,
                    statistic: test.statistic,
                    p_value: test.p_value,
                    alert: test.p_value < self.cfg.alpha,
                    summary,
                }
            })
            .collect();
        DriftRow {
            chunk: ChunkRecord::from(chunk),
            columns,
        }
    }
}

fn summarize_continuous(sorted: &[f64]) -> DistributionSummary {
    DistributionSummary::Quantiles(SUMMARY_QUANTILES.map(|q| quantile_sorted(sorted, q)))
}

fn summarize_categorical(counts: &BTreeMap<String, usize>) -> DistributionSummary {
    let total: usize = counts.values().sum();
    DistributionSummary::Shares(
        counts
            .iter()
            .map(|(k, v)| (k.clone(), *v as f64 / total as f64))
            .collect(),
    )
}

fn reference_summaries(fitted: &[MonitoredColumn]) -> Vec<DistributionSummary> {
    fitted
        .iter()
        .map(|c| match &c.reference {
            Reference::Continuous(sorted) => summarize_continuous(sorted),
            Reference::Categorical(counts) => summarize_categorical(counts),
        })
        .collect()
}
