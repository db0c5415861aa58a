//! CBPE Configuration
//!
//! Column names, metrics, chunking strategy and confidence-bound settings of the
//! performance estimator, plus JSON IO for any serializable configuration.
use crate::chunk::ChunkerConfig;
use crate::constants::SAMPLING_ERROR_RANGE;
use crate::errors::MonitorError;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Predicted probability column(s).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum ProbabilityColumns {
    /// Single column holding the probability of the positive class.
    Binary(String),
    /// Class label to the column holding that class's probability.
    Multiclass(BTreeMap<String, String>),
}

impl ProbabilityColumns {
    pub fn column_names(&self) -> Vec<&str> {
        match self {
            ProbabilityColumns::Binary(c) => vec![c.as_str()],
            ProbabilityColumns::Multiclass(m) => m.values().map(|c| c.as_str()).collect(),
        }
    }
}

impl From<&str> for ProbabilityColumns {
    fn from(column: &str) -> Self {
        ProbabilityColumns::Binary(column.to_string())
    }
}

impl From<BTreeMap<String, String>> for ProbabilityColumns {
    fn from(mapping: BTreeMap<String, String>) -> Self {
        ProbabilityColumns::Multiclass(mapping)
    }
}

fn default_timestamp_column_name() -> String {
    "timestamp".to_string()
}
fn default_y_true() -> String {
    "y_true".to_string()
}
fn default_y_pred() -> String {
    "y_pred".to_string()
}
fn default_confidence_lower_bound() -> f64 {
    0.0
}
fn default_confidence_upper_bound() -> f64 {
    1.0
}
fn default_sampling_error_multiplier() -> f64 {
    SAMPLING_ERROR_RANGE
}

/// Configuration for the [`CBPE`](crate::cbpe::CBPE) estimator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CbpeConfig {
    /// Column used to order rows and to chunk by period.
    #[serde(default = "default_timestamp_column_name")]
    pub timestamp_column_name: String,
    /// True label column, required in reference data only.
    #[serde(default = "default_y_true")]
    pub y_true: String,
    /// Predicted label column.
    #[serde(default = "default_y_pred")]
    pub y_pred: String,
    /// Predicted probability column(s).
    pub y_pred_proba: ProbabilityColumns,
    /// Metric keys to estimate. Must be a non-empty subset of the supported metrics.
    #[serde(default)]
    pub metrics: Option<Vec<String>>,
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// Lowest value a confidence bound or threshold may take.
    #[serde(default = "default_confidence_lower_bound")]
    pub confidence_lower_bound: f64,
    /// Highest value a confidence bound or threshold may take.
    #[serde(default = "default_confidence_upper_bound")]
    pub confidence_upper_bound: f64,
    /// Number of sampling errors between an estimate and its confidence bounds.
    #[serde(default = "default_sampling_error_multiplier")]
    pub sampling_error_multiplier: f64,
    /// Number of threads for per-chunk work. All available threads when absent.
    #[serde(default)]
    pub num_threads: Option<usize>,
    /// Overrides the minimum chunk size derived during fit.
    #[serde(default)]
    pub minimum_chunk_size: Option<usize>,
}

impl CbpeConfig {
    /// Configuration with default column names for the given probability column(s)
    /// and metric keys.
    pub fn new(y_pred_proba: impl Into<ProbabilityColumns>, metrics: &[&str]) -> Self {
        CbpeConfig {
            timestamp_column_name: default_timestamp_column_name(),
            y_true: default_y_true(),
            y_pred: default_y_pred(),
            y_pred_proba: y_pred_proba.into(),
            metrics: Some(metrics.iter().map(|m| m.to_string()).collect()),
            chunker: ChunkerConfig::default(),
            confidence_lower_bound: default_confidence_lower_bound(),
            confidence_upper_bound: default_confidence_upper_bound(),
            sampling_error_multiplier: default_sampling_error_multiplier(),
            num_threads: None,
            minimum_chunk_size: None,
        }
    }

    pub fn with_columns(mut self, timestamp_column_name: &str, y_true: &str, y_pred: &str) -> Self {
        self.timestamp_column_name = timestamp_column_name.to_string();
        self.y_true = y_true.to_string();
        self.y_pred = y_pred.to_string();
        self
    }

    pub fn with_chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.chunker = chunker;
        self
    }
}

/// JSON serialization of configurations.
pub trait ConfigIO: Serialize + DeserializeOwned + Sized {
    /// Save a configuration as a json object to a file.
    ///
    /// * `path` - Path to save the configuration.
    fn save_config<P: AsRef<Path>>(&self, path: P) -> Result<(), MonitorError> {
        fs::write(path, self.json_dump()?).map_err(|e| MonitorError::UnableToWrite(e.to_string()))
    }

    /// Dump a configuration as a json object
    fn json_dump(&self) -> Result<String, MonitorError> {
        serde_json::to_string(self).map_err(|e| MonitorError::UnableToWrite(e.to_string()))
    }

    /// Load a configuration from Json string
    fn from_json(json_str: &str) -> Result<Self, MonitorError> {
        serde_json::from_str::<Self>(json_str).map_err(|e| MonitorError::UnableToRead(e.to_string()))
    }

    /// Load a configuration from a path to a json object.
    ///
    /// * `path` - Path to load the configuration from.
    fn load_config<P: AsRef<Path>>(path: P) -> Result<Self, MonitorError> {
        let json_str = fs::read_to_string(path).map_err(|e| MonitorError::UnableToRead(e.to_string()))?;
        Self::from_json(&json_str)
    }
}

impl ConfigIO for CbpeConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{IncompleteChunk, PeriodUnit};
    use tempfile::tempdir;

    #[test]
    fn test_cbpe_config_defaults_from_json() {
        let config = CbpeConfig::from_json(r#"{"y_pred_proba": "y_pred_proba", "metrics": ["roc_auc"]}"#).unwrap();
        assert_eq!(config.timestamp_column_name, "timestamp");
        assert_eq!(config.y_true, "y_true");
        assert_eq!(config.chunker, ChunkerConfig::Default);
        assert_eq!(config.confidence_lower_bound, 0.0);
        assert_eq!(config.confidence_upper_bound, 1.0);
        assert_eq!(config.sampling_error_multiplier, 3.0);
        assert_eq!(config, CbpeConfig::new("y_pred_proba", &["roc_auc"]));
    }

    #[test]
    fn test_multiclass_columns_from_json() {
        let json = r#"{"y_pred_proba": {"a": "proba_a", "b": "proba_b"}, "chunker": {"Period": "Month"}}"#;
        let config = CbpeConfig::from_json(json).unwrap();
        assert_eq!(config.y_pred_proba.column_names(), vec!["proba_a", "proba_b"]);
        assert_eq!(config.chunker, ChunkerConfig::Period(PeriodUnit::Month));
        assert_eq!(config.metrics, None);
    }

    #[test]
    fn test_cbpe_config_io_file() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("cbpe.json");
        let config = CbpeConfig::new("y_pred_proba", &["f1", "accuracy"]).with_chunker(ChunkerConfig::Size {
            size: 5000,
            incomplete: IncompleteChunk::Drop,
        });
        config.save_config(&file_path).unwrap();
        let loaded = CbpeConfig::load_config(&file_path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_unreadable_config() {
        assert!(matches!(
            CbpeConfig::from_json("{").unwrap_err(),
            MonitorError::UnableToRead(_)
        ));
        let dir = tempdir().unwrap();
        assert!(CbpeConfig::load_config(dir.path().join("missing.json")).is_err());
    }
}
