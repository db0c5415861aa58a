//! Plot data
//!
//! Result objects do not render anything themselves. `plot` hands back the series a
//! renderer needs, one value per chunk, so any charting front end can draw them.
use serde::{Deserialize, Serialize};

/// One named line of a plot, with one value per chunk. Missing points are `NaN`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Series {
    pub name: String,
    pub values: Vec<f64>,
}

/// Everything needed to draw a per-chunk plot.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PlotSpec {
    pub kind: String,
    pub title: String,
    pub y_label: String,
    pub chunk_keys: Vec<String>,
    pub is_reference: Vec<bool>,
    pub series: Vec<Series>,
    pub lower_threshold: Option<f64>,
    pub upper_threshold: Option<f64>,
    pub alerts: Vec<bool>,
}

impl PlotSpec {
    pub fn series(&self, name: &str) -> Option<&Series> {
        self.series.iter().find(|s| s.name == name)
    }
}
