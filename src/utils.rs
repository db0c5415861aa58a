use crate::errors::MonitorError;

/// Create a string of all available items.
pub fn items_to_strings(items: &[&str]) -> String {
    items.join(", ")
}

pub fn fmt_vec_output(v: &[f64]) -> String {
    v.iter().map(|n| format!("{:.4}", n)).collect::<Vec<_>>().join(", ")
}

// Validation
pub fn validate_positive_float_parameter(value: f64, parameter: &str) -> Result<(), MonitorError> {
    validate_float_parameter(value, 0.0, f64::INFINITY, parameter)
}

pub fn validate_float_parameter(value: f64, min: f64, max: f64, parameter: &str) -> Result<(), MonitorError> {
    if value.is_nan() || value < min || max < value {
        let ex_msg = format!("real value within range {} and {}", min, max);
        Err(MonitorError::InvalidParameter(
            parameter.to_string(),
            ex_msg,
            value.to_string(),
        ))
    } else {
        Ok(())
    }
}

/// Check that every value is a probability, ignoring missing values.
pub fn validate_probabilities(values: &[f64], column: &str) -> Result<(), MonitorError> {
    match values.iter().find(|v| !v.is_nan() && !(0.0..=1.0).contains(*v)) {
        Some(v) => Err(MonitorError::invalid(format!(
            "predicted probabilities in '{}' must lie within [0, 1], found {}.",
            column, v
        ))),
        None => Ok(()),
    }
}

/// Coerce labels to 0/1, failing on anything else.
pub fn validate_binary_labels(values: &[f64], column: &str) -> Result<(), MonitorError> {
    match values.iter().find(|v| !v.is_nan() && **v != 0.0 && **v != 1.0) {
        Some(v) => Err(MonitorError::invalid(format!(
            "labels in '{}' must be binary (0 or 1), found {}.",
            column, v
        ))),
        None => Ok(()),
    }
}

#[inline]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (ddof = 0).
pub fn std(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    (values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64).sqrt()
}

/// Indices that sort `values` ascending. Stable, so ties keep input order.
pub fn argsort(values: &[f64]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..values.len()).collect();
    idx.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    idx
}

/// Divide, returning `0.0` when the denominator is zero.
#[inline]
pub fn safe_div(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        0.0
    } else {
        numerator / denominator
    }
}

pub fn precision_round(n: f64, precision: i32) -> f64 {
    let p = (10.0_f64).powi(precision);
    (n * p).round() / p
}

/// Linearly interpolated quantile of already sorted values. `NaN` when empty.
pub fn quantile_sorted(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Run `op` on a dedicated pool of `num_threads` threads, or on the global pool.
pub fn run_in_pool<T, F>(num_threads: Option<usize>, op: F) -> Result<T, MonitorError>
where
    T: Send,
    F: FnOnce() -> T + Send,
{
    match num_threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| MonitorError::invalid(format!("unable to build a thread pool: {}", e)))?;
            Ok(pool.install(op))
        }
        None => Ok(op()),
    }
}
