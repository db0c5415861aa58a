//! Data
//!
//! A small columnar container for model inputs and outputs. Every column has one
//! value per row; rows additionally remember whether they came from the reference
//! or the analysis partition.
use crate::errors::MonitorError;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which period a row was drawn from.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
pub enum Partition {
    /// Rows the model was validated on, with known outcomes.
    Reference,
    /// Production rows, labels usually unavailable.
    #[default]
    Analysis,
}

/// A single named column.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum Column {
    /// Floating point values, `NaN` marks a missing value.
    Numeric(Vec<f64>),
    /// String categories, such as multiclass labels.
    Categorical(Vec<String>),
    /// Timestamps without timezone.
    Timestamp(Vec<NaiveDateTime>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Categorical(v) => v.len(),
            Column::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn kind(&self) -> &'static str {
        match self {
            Column::Numeric(_) => "numeric",
            Column::Categorical(_) => "categorical",
            Column::Timestamp(_) => "timestamp",
        }
    }

    fn take(&self, indices: &[usize]) -> Column {
        match self {
            Column::Numeric(v) => Column::Numeric(indices.iter().map(|&i| v[i]).collect()),
            Column::Categorical(v) => Column::Categorical(indices.iter().map(|&i| v[i].clone()).collect()),
            Column::Timestamp(v) => Column::Timestamp(indices.iter().map(|&i| v[i]).collect()),
        }
    }

    fn append(&self, other: &Column) -> Option<Column> {
        match (self, other) {
            (Column::Numeric(a), Column::Numeric(b)) => Some(Column::Numeric([a.as_slice(), b].concat())),
            (Column::Categorical(a), Column::Categorical(b)) => {
                Some(Column::Categorical([a.as_slice(), b].concat()))
            }
            (Column::Timestamp(a), Column::Timestamp(b)) => Some(Column::Timestamp([a.as_slice(), b].concat())),
            _ => None,
        }
    }
}

/// Format a numeric label the way it would be written by hand: `1.0` becomes `"1"`.
pub fn label_to_string(value: f64) -> String {
    if value.fract() == 0.0 && value.is_finite() {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Named columns of equal length plus a partition tag per row.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Dataset {
    columns: BTreeMap<String, Column>,
    partitions: Vec<Partition>,
}

impl Dataset {
    pub fn new() -> Self {
        Dataset::default()
    }

    /// Add or replace a column. All columns must have the same length.
    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, MonitorError> {
        self.insert_column(name, column)?;
        Ok(self)
    }

    pub fn insert_column(&mut self, name: &str, column: Column) -> Result<(), MonitorError> {
        let replacing_only_column = self.columns.len() == 1 && self.columns.contains_key(name);
        if self.columns.is_empty() || replacing_only_column {
            if self.partitions.len() != column.len() {
                self.partitions = vec![Partition::default(); column.len()];
            }
        } else if column.len() != self.len() {
            return Err(MonitorError::invalid(format!(
                "column '{}' has {} rows, expected {}.",
                name,
                column.len(),
                self.len()
            )));
        }
        self.columns.insert(name.to_string(), column);
        Ok(())
    }

    /// Remove a column if present.
    pub fn without_column(mut self, name: &str) -> Self {
        self.columns.remove(name);
        self
    }

    /// Tag every row with the given partition.
    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partitions = vec![partition; self.len()];
        self
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.keys().map(|k| k.as_str()).collect()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, MonitorError> {
        self.columns
            .get(name)
            .ok_or_else(|| MonitorError::MissingColumn(name.to_string()))
    }

    pub fn numeric(&self, name: &str) -> Result<&[f64], MonitorError> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v),
            other => Err(MonitorError::invalid(format!(
                "column '{}' is {}, expected numeric.",
                name,
                other.kind()
            ))),
        }
    }

    pub fn categorical(&self, name: &str) -> Result<&[String], MonitorError> {
        match self.column(name)? {
            Column::Categorical(v) => Ok(v),
            other => Err(MonitorError::invalid(format!(
                "column '{}' is {}, expected categorical.",
                name,
                other.kind()
            ))),
        }
    }

    pub fn timestamps(&self, name: &str) -> Result<&[NaiveDateTime], MonitorError> {
        match self.column(name)? {
            Column::Timestamp(v) => Ok(v),
            other => Err(MonitorError::invalid(format!(
                "column '{}' is {}, expected timestamp.",
                name,
                other.kind()
            ))),
        }
    }

    /// Column values as label strings; `None` marks a missing value.
    pub fn labels(&self, name: &str) -> Result<Vec<Option<String>>, MonitorError> {
        match self.column(name)? {
            Column::Numeric(v) => Ok(v
                .iter()
                .map(|x| if x.is_nan() { None } else { Some(label_to_string(*x)) })
                .collect()),
            Column::Categorical(v) => Ok(v.iter().map(|s| Some(s.clone())).collect()),
            Column::Timestamp(_) => Err(MonitorError::invalid(format!(
                "column '{}' is timestamp, expected labels.",
                name
            ))),
        }
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Select rows by index, in the given order.
    pub fn take(&self, indices: &[usize]) -> Dataset {
        Dataset {
            columns: self
                .columns
                .iter()
                .map(|(name, col)| (name.clone(), col.take(indices)))
                .collect(),
            partitions: indices.iter().map(|&i| self.partitions[i]).collect(),
        }
    }

    /// Stack `other` below `self`. Both must carry the same columns with the same kinds.
    pub fn concat(&self, other: &Dataset) -> Result<Dataset, MonitorError> {
        if self.is_empty() && self.columns.is_empty() {
            return Ok(other.clone());
        }
        let mut columns = BTreeMap::new();
        for (name, col) in &self.columns {
            let rhs = other.column(name)?;
            let merged = col.append(rhs).ok_or_else(|| {
                MonitorError::invalid(format!("column '{}' has different kinds in concatenated datasets.", name))
            })?;
            columns.insert(name.clone(), merged);
        }
        if let Some(extra) = other.columns.keys().find(|k| !self.columns.contains_key(*k)) {
            return Err(MonitorError::MissingColumn(extra.clone()));
        }
        let mut partitions = self.partitions.clone();
        partitions.extend_from_slice(&other.partitions);
        Ok(Dataset { columns, partitions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 1, day).unwrap().and_hms_opt(0, 0, 0).unwrap()
    }

    fn sample() -> Dataset {
        Dataset::new()
            .with_column("timestamp", Column::Timestamp(vec![ts(1), ts(2), ts(3)]))
            .unwrap()
            .with_column("y_pred_proba", Column::Numeric(vec![0.1, 0.7, f64::NAN]))
            .unwrap()
            .with_column("label", Column::Categorical(vec!["a".into(), "b".into(), "a".into()]))
            .unwrap()
    }

    #[test]
    fn test_column_length_must_match() {
        let err = sample()
            .with_column("short", Column::Numeric(vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, MonitorError::InvalidArguments(_)));
    }

    #[test]
    fn test_missing_column_names_column() {
        let err = sample().numeric("predictions").unwrap_err();
        assert_eq!(err, MonitorError::MissingColumn("predictions".to_string()));
        assert!(err.to_string().contains("predictions"));
    }

    #[test]
    fn test_take_and_partitions() {
        let data = sample().with_partition(Partition::Reference);
        let sub = data.take(&[2, 0]);
        assert_eq!(sub.len(), 2);
        assert_eq!(sub.timestamps("timestamp").unwrap(), &[ts(3), ts(1)]);
        assert!(sub.partitions().iter().all(|p| *p == Partition::Reference));
    }

    #[test]
    fn test_concat_keeps_partitions() {
        let reference = sample().with_partition(Partition::Reference);
        let analysis = sample();
        let both = reference.concat(&analysis).unwrap();
        assert_eq!(both.len(), 6);
        assert_eq!(both.partitions()[2], Partition::Reference);
        assert_eq!(both.partitions()[3], Partition::Analysis);
    }

    #[test]
    fn test_labels() {
        let data = sample()
            .with_column("y", Column::Numeric(vec![1.0, 0.0, f64::NAN]))
            .unwrap();
        assert_eq!(
            data.labels("y").unwrap(),
            vec![Some("1".to_string()), Some("0".to_string()), None]
        );
        assert_eq!(data.labels("label").unwrap()[1], Some("b".to_string()));
        assert!(data.labels("timestamp").is_err());
        assert_eq!(data.categorical("label").unwrap(), &["a", "b", "a"]);
        assert!(data.categorical("y").is_err());
    }
}
