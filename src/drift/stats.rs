//! Two-sample tests used for drift detection.
use std::collections::BTreeMap;
use std::f64::consts::PI;

/// Result of a two-sample test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TestResult {
    pub statistic: f64,
    pub p_value: f64,
}

impl TestResult {
    fn undefined() -> Self {
        TestResult {
            statistic: f64::NAN,
            p_value: f64::NAN,
        }
    }
}

/// Largest distance between the empirical CDFs of two sorted samples.
pub fn ks_statistic(reference_sorted: &[f64], current_sorted: &[f64]) -> f64 {
    let (n1, n2) = (reference_sorted.len() as f64, current_sorted.len() as f64);
    let (mut i, mut j) = (0, 0);
    let mut d: f64 = 0.0;
    while i < reference_sorted.len() && j < current_sorted.len() {
        let x = reference_sorted[i].min(current_sorted[j]);
        // Step past every copy of x in both samples before comparing CDFs.
        while i < reference_sorted.len() && reference_sorted[i] <= x {
            i += 1;
        }
        while j < current_sorted.len() && current_sorted[j] <= x {
            j += 1;
        }
        d = d.max((i as f64 / n1 - j as f64 / n2).abs());
    }
    d
}

/// Survival function of the Kolmogorov distribution, `P(K > lambda)`.
pub fn kolmogorov_survival(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        return 1.0;
    }
    if lambda < 1.18 {
        let y = (-PI * PI / (8.0 * lambda * lambda)).exp();
        let cdf = (2.0 * PI).sqrt() / lambda * (y + y.powi(9) + y.powi(25) + y.powi(49));
        (1.0 - cdf).clamp(0.0, 1.0)
    } else {
        let x = (-2.0 * lambda * lambda).exp();
        (2.0 * (x - x.powi(4) + x.powi(9))).clamp(0.0, 1.0)
    }
}

/// Two-sample Kolmogorov-Smirnov test.
///
/// The p-value uses the asymptotic Kolmogorov distribution with Stephens' small
/// sample correction. Both samples must be sorted and free of `NaN`.
pub fn ks_2samp(reference_sorted: &[f64], current_sorted: &[f64]) -> TestResult {
    if reference_sorted.is_empty() || current_sorted.is_empty() {
        return TestResult::undefined();
    }
    let statistic = ks_statistic(reference_sorted, current_sorted);
    let (n1, n2) = (reference_sorted.len() as f64, current_sorted.len() as f64);
    let en = (n1 * n2 / (n1 + n2)).sqrt();
    let lambda = (en + 0.12 + 0.11 / en) * statistic;
    TestResult {
        statistic,
        p_value: kolmogorov_survival(lambda),
    }
}

/// Natural log of the gamma function (Lanczos approximation).
fn ln_gamma(x: f64) -> f64 {
    const COEFFICIENTS: [f64; 6] = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for (k, c) in COEFFICIENTS.iter().enumerate() {
        ser += c / (x + 1.0 + k as f64);
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}

/// Regularized upper incomplete gamma function `Q(a, x)`.
pub fn gamma_q(a: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 500;
    const EPS: f64 = 1e-14;
    if x <= 0.0 {
        return 1.0;
    }
    let log_prefactor = -x + a * x.ln() - ln_gamma(a);
    if x < a + 1.0 {
        // Series for P(a, x).
        let mut term = 1.0 / a;
        let mut sum = term;
        let mut ap = a;
        for _ in 0..MAX_ITERATIONS {
            ap += 1.0;
            term *= x / ap;
            sum += term;
            if term.abs() < sum.abs() * EPS {
                break;
            }
        }
        (1.0 - sum * log_prefactor.exp()).clamp(0.0, 1.0)
    } else {
        // Continued fraction for Q(a, x), modified Lentz.
        let tiny = f64::MIN_POSITIVE / EPS;
        let mut b = x + 1.0 - a;
        let mut c = 1.0 / tiny;
        let mut d = 1.0 / b;
        let mut h = d;
        for i in 1..MAX_ITERATIONS {
            let an = -(i as f64) * (i as f64 - a);
            b += 2.0;
            d = an * d + b;
            if d.abs() < tiny {
                d = tiny;
            }
            c = b + an / c;
            if c.abs() < tiny {
                c = tiny;
            }
            d = 1.0 / d;
            let delta = d * c;
            h *= delta;
            if (delta - 1.0).abs() < EPS {
                break;
            }
        }
        (log_prefactor.exp() * h).clamp(0.0, 1.0)
    }
}

/// Survival function of the chi-squared distribution.
pub fn chi2_survival(statistic: f64, dof: usize) -> f64 {
    if dof == 0 {
        return 1.0;
    }
    gamma_q(dof as f64 / 2.0, statistic / 2.0)
}

/// Chi-squared statistic of a contingency table with one row per category and one
/// column per sample, plus its degrees of freedom.
///
/// Categories seen in neither sample must be left out by the caller. With one degree
/// of freedom and `correction` set, Yates' continuity correction is applied.
pub fn chi2_contingency(table: &[[f64; 2]], correction: bool) -> (f64, usize) {
    let column_totals = table
        .iter()
        .fold([0.0, 0.0], |acc, row| [acc[0] + row[0], acc[1] + row[1]]);
    let total = column_totals[0] + column_totals[1];
    if table.len() < 2 || column_totals.iter().any(|t| *t == 0.0) {
        return (0.0, 0);
    }
    let dof = table.len() - 1;
    let mut statistic = 0.0;
    for row in table {
        let row_total = row[0] + row[1];
        for (observed, column_total) in row.iter().zip(&column_totals) {
            let expected = row_total * column_total / total;
            let mut diff = (observed - expected).abs();
            if correction && dof == 1 {
                diff = (diff - 0.5).max(0.0);
            }
            statistic += diff * diff / expected;
        }
    }
    (statistic, dof)
}

/// Chi-squared test of independence between category counts of two samples.
pub fn chi2_test(reference: &BTreeMap<String, usize>, current: &BTreeMap<String, usize>) -> TestResult {
    let reference_total: usize = reference.values().sum();
    let current_total: usize = current.values().sum();
    if reference_total == 0 || current_total == 0 {
        return TestResult::undefined();
    }
    let mut table: BTreeMap<&str, [f64; 2]> = BTreeMap::new();
    for (category, count) in reference {
        table.entry(category.as_str()).or_default()[0] += *count as f64;
    }
    for (category, count) in current {
        table.entry(category.as_str()).or_default()[1] += *count as f64;
    }
    let rows: Vec<[f64; 2]> = table.into_values().filter(|r| r[0] + r[1] > 0.0).collect();
    let (statistic, dof) = chi2_contingency(&rows, true);
    TestResult {
        statistic,
        p_value: chi2_survival(statistic, dof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::precision_round;

    fn counts(pairs: &[(&str, usize)]) -> BTreeMap<String, usize> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_chi2_contingency() {
        // Table: [[10, 5], [10, 20]]
        // (10*20 - 5*10)^2 * 45 / (15 * 30 * 20 * 25) = 4.5
        let (stat, dof) = chi2_contingency(&[[10.0, 5.0], [10.0, 20.0]], false);
        assert!((stat - 4.5).abs() < 1e-7);
        assert_eq!(dof, 1);
        let (corrected, _) = chi2_contingency(&[[10.0, 5.0], [10.0, 20.0]], true);
        assert!(corrected < stat);
        assert_eq!(chi2_contingency(&[[10.0, 5.0]], true), (0.0, 0));
    }

    #[test]
    fn test_chi2_survival() {
        // Exact for two degrees of freedom.
        for x in [0.5, 2.0, 7.3, 40.0] {
            assert!((chi2_survival(x, 2) - (-x / 2.0).exp()).abs() < 1e-10);
        }
        assert_eq!(precision_round(chi2_survival(3.841458820694124, 1), 6), 0.05);
        assert_eq!(precision_round(chi2_survival(11.070497693516351, 5), 6), 0.05);
        assert_eq!(chi2_survival(0.0, 3), 1.0);
        assert_eq!(chi2_survival(5.0, 0), 1.0);
    }

    #[test]
    fn test_chi2_test() {
        let same = chi2_test(&counts(&[("a", 500), ("b", 500)]), &counts(&[("a", 50), ("b", 50)]));
        assert_eq!(same.statistic, 0.0);
        assert_eq!(same.p_value, 1.0);
        let shifted = chi2_test(
            &counts(&[("a", 500), ("b", 500), ("c", 0)]),
            &counts(&[("a", 20), ("b", 50), ("c", 30)]),
        );
        assert!(shifted.statistic > 0.0);
        assert!(shifted.p_value < 1e-6);
        assert!(chi2_test(&counts(&[("a", 5)]), &BTreeMap::new()).p_value.is_nan());
    }

    #[test]
    fn test_kolmogorov_survival() {
        assert_eq!(kolmogorov_survival(0.0), 1.0);
        assert_eq!(precision_round(kolmogorov_survival(1.3580986393225505), 4), 0.05);
        assert!(kolmogorov_survival(0.2) > 0.9999);
        assert!(kolmogorov_survival(4.0) < 1e-12);
        // Both branches agree where they meet.
        assert!((kolmogorov_survival(1.18 - 1e-9) - kolmogorov_survival(1.18)).abs() < 1e-6);
    }

    #[test]
    fn test_ks_statistic_with_ties() {
        assert_eq!(ks_statistic(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(ks_statistic(&[1.0, 2.0], &[3.0, 4.0]), 1.0);
        assert_eq!(ks_statistic(&[1.0, 1.0, 2.0, 2.0], &[1.0, 2.0, 2.0, 2.0]), 0.25);
    }

    #[test]
    fn test_ks_2samp() {
        let reference: Vec<f64> = (0..1000).map(|i| i as f64 / 1000.0).collect();
        let same: Vec<f64> = (0..200).map(|i| i as f64 / 200.0 + 0.001).collect();
        let shifted: Vec<f64> = same.iter().map(|v| v + 0.3).collect();
        let result = ks_2samp(&reference, &same);
        assert!(result.statistic < 0.01);
        assert!(result.p_value > 0.99);
        let result = ks_2samp(&reference, &shifted);
        assert!((result.statistic - 0.3).abs() < 0.01);
        assert!(result.p_value < 1e-6);
        assert!(ks_2samp(&[], &same).statistic.is_nan());
    }
}
