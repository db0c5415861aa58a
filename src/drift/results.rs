use crate::chunk::ChunkRecord;
use crate::drift::{ColumnKind, SUMMARY_QUANTILES};
use crate::errors::MonitorError;
use crate::plot::{PlotSpec, Series};
use crate::utils::items_to_strings;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

const PLOT_KINDS: [&str; 3] = ["statistic", "p_value", "distribution"];

/// Shape of a column's distribution within one chunk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub enum DistributionSummary {
    /// Values at [`SUMMARY_QUANTILES`].
    Quantiles([f64; 5]),
    /// Share of rows per category.
    Shares(BTreeMap<String, f64>),
}

/// Test outcome for one column on one chunk.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ColumnDrift {
    pub column: String,
    pub kind: ColumnKind,
    /// KS `D` for continuous columns, chi-squared for categorical ones.
    pub statistic: f64,
    pub p_value: f64,
    /// The p-value is below the configured significance level.
    pub alert: bool,
    pub summary: DistributionSummary,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DriftRow {
    pub chunk: ChunkRecord,
    pub columns: Vec<ColumnDrift>,
}

impl DriftRow {
    pub fn column(&self, name: &str) -> Option<&ColumnDrift> {
        self.columns.iter().find(|c| c.column == name)
    }
}

/// Ordered per-chunk output of
/// [`StatisticalOutputDriftCalculator::calculate`](crate::drift::StatisticalOutputDriftCalculator::calculate).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DriftResult {
    pub columns: Vec<(String, ColumnKind)>,
    pub alpha: f64,
    /// Distribution of every column over the whole reference data.
    pub reference: Vec<DistributionSummary>,
    pub rows: Vec<DriftRow>,
}

type Field = fn(&ColumnDrift) -> f64;

impl DriftResult {
    pub fn new(
        columns: Vec<(String, ColumnKind)>,
        alpha: f64,
        reference: Vec<DistributionSummary>,
        rows: Vec<DriftRow>,
    ) -> Self {
        DriftResult {
            columns,
            alpha,
            reference,
            rows,
        }
    }

    pub fn rows(&self) -> &[DriftRow] {
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

    fn fields(column: &str, kind: ColumnKind) -> [(String, Field); 3] {
        [
            (format!("{}_{}", column, kind.statistic_suffix()), |c| c.statistic),
            (format!("{}_p_value", column), |c| c.p_value),
            (format!("{}_alert", column), |c| if c.alert { 1.0 } else { 0.0 }),
        ]
    }

    /// Names accepted by [`DriftResult::column`].
    pub fn column_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|(column, kind)| Self::fields(column, *kind).map(|(name, _)| name))
            .collect()
    }

    /// Values of a named column, one per chunk, such as `y_pred_dstat`, `y_pred_chi2`
    /// or `y_pred_proba_p_value`. Alerts are `1.0`/`0.0`.
    pub fn column(&self, name: &str) -> Result<Vec<f64>, MonitorError> {
        for (column, kind) in &self.columns {
            if let Some((_, field)) = Self::fields(column, *kind).into_iter().find(|(n, _)| n == name) {
                return Ok(self
                    .rows
                    .iter()
                    .map(|r| r.column(column).map_or(f64::NAN, field))
                    .collect());
            }
        }
        Err(MonitorError::MissingColumn(name.to_string()))
    }

    pub fn to_json(&self) -> Result<String, MonitorError> {
        serde_json::to_string(self).map_err(|e| MonitorError::UnableToWrite(e.to_string()))
    }

    /// Plot data for one monitored column.
    ///
    /// * `kind` - One of `statistic`, `p_value` or `distribution`.
    /// * `column` - A monitored column name.
    pub fn plot(&self, kind: Option<&str>, column: Option<&str>) -> Result<PlotSpec, MonitorError> {
        let kind = match kind {
            Some(k) if PLOT_KINDS.contains(&k) => k,
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
        };
        let names: Vec<&str> = self.columns.iter().map(|(c, _)| c.as_str()).collect();
        let name = column.ok_or_else(|| {
            MonitorError::invalid(format!(
                "no 'column' value given. Please provide one of [{}].",
                items_to_strings(&names)
            ))
        })?;
        let position = names.iter().position(|c| *c == name).ok_or_else(|| {
            MonitorError::invalid(format!(
                "unknown 'column' value: '{}'. Please provide one of [{}].",
                name,
                items_to_strings(&names)
            ))
        })?;
        let column_kind = self.columns[position].1;
        let drifts: Vec<Option<&ColumnDrift>> = self.rows.iter().map(|r| r.column(name)).collect();
        let values = |field: Field| drifts.iter().map(|d| d.map_or(f64::NAN, field)).collect::<Vec<_>>();

        let (title, y_label, series, lower_threshold) = match kind {
            "statistic" => {
                let statistic = format!("{}_{}", name, column_kind.statistic_suffix());
                (
                    format!("{} drift", name),
                    column_kind.statistic_suffix().to_string(),
                    vec![Series {
                        name: statistic,
                        values: values(|d| d.statistic),
                    }],
                    None,
                )
            }
            "p_value" => (
                format!("{} drift p-value", name),
                "p_value".to_string(),
                vec![Series {
                    name: format!("{}_p_value", name),
                    values: values(|d| d.p_value),
                }],
                Some(self.alpha),
            ),
            _ => (
                format!("{} distribution", name),
                name.to_string(),
                self.distribution_series(name, position, &drifts),
                None,
            ),
        };
        Ok(PlotSpec {
            kind: kind.to_string(),
            title,
            y_label,
            chunk_keys: self.chunk_keys(),
            is_reference: self.rows.iter().map(|r| r.chunk.is_reference).collect(),
            series,
            lower_threshold,
            upper_threshold: None,
            alerts: drifts.iter().map(|d| d.map_or(false, |d| d.alert)).collect(),
        })
    }

    fn distribution_series(&self, name: &str, position: usize, drifts: &[Option<&ColumnDrift>]) -> Vec<Series> {
        let summaries: Vec<Option<&DistributionSummary>> = drifts.iter().map(|d| d.map(|d| &d.summary)).collect();
        match self.columns[position].1 {
            ColumnKind::Continuous => SUMMARY_QUANTILES
                .iter()
                .enumerate()
                .map(|(i, q)| Series {
                    name: format!("{}_q{:02}", name, (q * 100.0).round() as usize),
                    values: summaries
                        .iter()
                        .map(|s| match s {
                            Some(DistributionSummary::Quantiles(values)) => values[i],
                            _ => f64::NAN,
                        })
                        .collect(),
                })
                .collect(),
            ColumnKind::Categorical => {
                let mut categories = BTreeSet::new();
                for summary in self.reference.get(position).into_iter().chain(summaries.iter().flatten().copied()) {
                    if let DistributionSummary::Shares(shares) = summary {
                        categories.extend(shares.keys().cloned());
                    }
                }
                categories
                    .into_iter()
                    .map(|category| Series {
                        name: format!("{}_{}", name, category),
                        values: summaries
                            .iter()
                            .map(|s| match s {
                                Some(DistributionSummary::Shares(shares)) => {
                                    shares.get(&category).copied().unwrap_or(0.0)
                                }
                                _ => f64::NAN,
                            })
                            .collect(),
                    })
                    .collect()
            }
        }
    }
}
