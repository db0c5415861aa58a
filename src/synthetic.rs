//! Synthetic Data
//!
//! Seeded generators of reference and analysis data for tests and benchmarks. Outcomes
//! are drawn from known probabilities, and the model scores are a deliberately
//! overconfident transform of those probabilities, so calibration is needed.
use crate::data::{Column, Dataset, Partition};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const MULTICLASS_CLASSES: [&str; 3] = ["prepaid_card", "highstreet_card", "upmarket_card"];

/// Settings for the synthetic generators.
#[derive(Clone, Debug)]
pub struct SyntheticData {
    pub n_reference: usize,
    pub n_analysis: usize,
    /// Analysis row from which the score distribution shifts.
    pub shift_at: Option<usize>,
    /// Time between consecutive rows.
    pub interval: Duration,
    pub seed: u64,
}

impl Default for SyntheticData {
    fn default() -> Self {
        SyntheticData {
            n_reference: 10_000,
            n_analysis: 10_000,
            shift_at: None,
            interval: Duration::minutes(10),
            seed: 42,
        }
    }
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

/// Standard normal draw via Box-Muller.
fn normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|v| v / sum).collect()
}

impl SyntheticData {
    pub fn new(n_reference: usize, n_analysis: usize) -> Self {
        SyntheticData {
            n_reference,
            n_analysis,
            ..Default::default()
        }
    }

    pub fn set_shift_at(mut self, shift_at: Option<usize>) -> Self {
        self.shift_at = shift_at;
        self
    }

    pub fn set_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn start(&self) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, 6)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default()
    }

    fn timestamps(&self, offset: usize, n: usize) -> Column {
        let start = self.start();
        Column::Timestamp(
            (offset..offset + n)
                .map(|i| start + self.interval * i as i32)
                .collect(),
        )
    }

    fn is_shifted(&self, analysis_row: Option<usize>) -> bool {
        matches!((analysis_row, self.shift_at), (Some(i), Some(s)) if i >= s)
    }

    fn split(&self, build: impl Fn(&mut StdRng, usize, Option<usize>) -> Dataset) -> (Dataset, Dataset) {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let reference = build(&mut rng, 0, None).with_partition(Partition::Reference);
        let analysis = build(&mut rng, self.n_reference, Some(0)).with_partition(Partition::Analysis);
        (reference, analysis)
    }

    /// Binary classification data with columns `timestamp`, `y_true`, `y_pred` and
    /// `y_pred_proba`. Analysis data includes `y_true` for realized performance.
    ///
    /// After the shift point, scores concentrate around 0.5, so both the true and the
    /// estimated performance drop.
    pub fn binary(&self) -> (Dataset, Dataset) {
        self.split(|rng, offset, analysis| {
            let n = if analysis.is_some() { self.n_analysis } else { self.n_reference };
            let mut y_true = Vec::with_capacity(n);
            let mut y_pred = Vec::with_capacity(n);
            let mut proba = Vec::with_capacity(n);
            for i in 0..n {
                let mut q: f64 = rng.gen_range(0.02..0.98);
                if self.is_shifted(analysis.map(|_| i)) {
                    q = 0.5 + (q - 0.5) * 0.3;
                }
                let p = sigmoid(2.0 * logit(q));
                y_true.push(if rng.gen::<f64>() < q { 1.0 } else { 0.0 });
                y_pred.push(if p >= 0.5 { 1.0 } else { 0.0 });
                proba.push(p);
            }
            Dataset::new()
                .with_column("timestamp", self.timestamps(offset, n))
                .and_then(|d| d.with_column("y_true", Column::Numeric(y_true)))
                .and_then(|d| d.with_column("y_pred", Column::Numeric(y_pred)))
                .and_then(|d| d.with_column("y_pred_proba", Column::Numeric(proba)))
                .unwrap_or_default()
        })
    }

    /// Multiclass data over [`MULTICLASS_CLASSES`] with columns `timestamp`, `y_true`,
    /// `y_pred` and `y_pred_proba_<class>`.
    pub fn multiclass(&self) -> (Dataset, Dataset) {
        self.split(|rng, offset, analysis| {
            let n = if analysis.is_some() { self.n_analysis } else { self.n_reference };
            let k = MULTICLASS_CLASSES.len();
            let mut y_true = Vec::with_capacity(n);
            let mut y_pred = Vec::with_capacity(n);
            let mut proba: Vec<Vec<f64>> = vec![Vec::with_capacity(n); k];
            for i in 0..n {
                let scale = if self.is_shifted(analysis.map(|_| i)) { 0.3 } else { 1.0 };
                let z: Vec<f64> = (0..k).map(|_| normal(rng) * 1.5 * scale).collect();
                let q = softmax(&z);
                let p = softmax(&z.iter().map(|v| v * 2.0).collect::<Vec<_>>());
                let u: f64 = rng.gen();
                let mut acc = 0.0;
                let mut truth = k - 1;
                for (c, qc) in q.iter().enumerate() {
                    acc += qc;
                    if u < acc {
                        truth = c;
                        break;
                    }
                }
                let pred = (0..k).fold(0, |best, c| if p[c] > p[best] { c } else { best });
                y_true.push(MULTICLASS_CLASSES[truth].to_string());
                y_pred.push(MULTICLASS_CLASSES[pred].to_string());
                for c in 0..k {
                    proba[c].push(p[c]);
                }
            }
            let data = Dataset::new()
                .with_column("timestamp", self.timestamps(offset, n))
                .and_then(|d| d.with_column("y_true", Column::Categorical(y_true)))
                .and_then(|d| d.with_column("y_pred", Column::Categorical(y_pred)));
            MULTICLASS_CLASSES
                .iter()
                .zip(proba)
                .fold(data, |data, (class, values)| {
                    data.and_then(|d| d.with_column(&format!("y_pred_proba_{}", class), Column::Numeric(values)))
                })
                .unwrap_or_default()
        })
    }

    /// Regression outputs with columns `timestamp` and `y_pred`. After the shift point
    /// predictions move up by 0.6 standard deviations.
    pub fn regression(&self) -> (Dataset, Dataset) {
        self.split(|rng, offset, analysis| {
            let n = if analysis.is_some() { self.n_analysis } else { self.n_reference };
            let y_pred: Vec<f64> = (0..n)
                .map(|i| {
                    let shift = if self.is_shifted(analysis.map(|_| i)) { 0.6 } else { 0.0 };
                    normal(rng) + shift
                })
                .collect();
            Dataset::new()
                .with_column("timestamp", self.timestamps(offset, n))
                .and_then(|d| d.with_column("y_pred", Column::Numeric(y_pred)))
                .unwrap_or_default()
        })
    }
}
