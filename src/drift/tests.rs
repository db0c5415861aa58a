use super::*;
use crate::chunk::{IncompleteChunk, PeriodUnit};
use crate::data::{Column, Partition};
use crate::synthetic::{SyntheticData, MULTICLASS_CLASSES};
use tempfile::tempdir;

fn by_size(size: usize) -> ChunkerConfig {
    ChunkerConfig::Size {
        size,
        incomplete: IncompleteChunk::Keep,
    }
}

fn fitted(cfg: DriftConfig, reference: &Dataset) -> StatisticalOutputDriftCalculator {
    let mut calculator = StatisticalOutputDriftCalculator::new(cfg).unwrap();
    calculator.fit(reference).unwrap();
    calculator
}

/// Categorical predictions where every `period`-th row is "b", the rest "a".
fn categorical(n: usize, period: usize, partition: Partition) -> Dataset {
    let labels = (0..n)
        .map(|i| if i % period == 0 { "b" } else { "a" }.to_string())
        .collect();
    Dataset::new()
        .with_column("y_pred", Column::Categorical(labels))
        .unwrap()
        .with_column("y_pred_proba", Column::Numeric(vec![0.5; n]))
        .unwrap()
        .with_partition(partition)
}

fn assert_valid(result: &DriftResult) {
    for row in result.rows() {
        for column in &row.columns {
            assert!(column.statistic >= 0.0, "{:?}", column);
            assert!((0.0..=1.0).contains(&column.p_value), "{:?}", column);
            assert_eq!(column.alert, column.p_value < result.alpha);
        }
    }
}

#[test]
fn test_regression_drift_by_chunk_size() {
    let (reference, analysis) = SyntheticData::new(10_000, 10_000).set_shift_at(Some(5000)).regression();
    let calculator = fitted(DriftConfig::regression("y_pred").with_chunker(by_size(5000)), &reference);
    let result = calculator.calculate(&reference.concat(&analysis).unwrap()).unwrap();
    assert_eq!(result.len(), 4);
    assert_valid(&result);

    let dstat = result.column("y_pred_dstat").unwrap();
    let p_value = result.column("y_pred_p_value").unwrap();
    assert_eq!(dstat.len(), 4);
    assert_eq!(p_value.len(), 4);
    assert!(dstat[..3].iter().all(|d| *d < 0.05));
    assert!(dstat[3] > 0.15);
    assert!(p_value[3] < 1e-10);
    assert_eq!(result.column("y_pred_alert").unwrap()[3], 1.0);
    assert_eq!(
        result.rows().iter().map(|r| r.chunk.is_reference).collect::<Vec<_>>(),
        vec![true, true, false, false]
    );
}

#[test]
fn test_same_distribution_is_not_flagged() {
    let (reference, analysis) = SyntheticData::new(10_000, 5000).set_seed(7).regression();
    let calculator = fitted(DriftConfig::regression("y_pred").with_chunker(by_size(500)), &reference);
    let result = calculator.calculate(&analysis).unwrap();
    assert_eq!(result.len(), 10);
    assert_valid(&result);
    let p_value = result.column("y_pred_p_value").unwrap();
    let mean_p = p_value.iter().sum::<f64>() / p_value.len() as f64;
    assert!(mean_p > 0.1);
    assert!(result.column("y_pred_dstat").unwrap().iter().all(|d| *d < 0.1));
}

#[test]
fn test_reference_chunks_are_close_to_reference() {
    let (reference, _) = SyntheticData::new(10_000, 10).regression();
    let calculator = fitted(DriftConfig::regression("y_pred"), &reference);
    let result = calculator.calculate(&reference).unwrap();
    assert_eq!(result.len(), 10);
    assert!(result.rows().iter().all(|r| r.chunk.is_reference));
    assert!(result.column("y_pred_dstat").unwrap().iter().all(|d| *d < 0.1));
    let p_value = result.column("y_pred_p_value").unwrap();
    assert!(p_value.iter().sum::<f64>() / p_value.len() as f64 > 0.2);
}

#[test]
fn test_classification_drift_by_week() {
    let data = SyntheticData::new(10_000, 10_000).set_shift_at(Some(5000));
    let (reference, analysis) = data.binary();
    let cfg =
        DriftConfig::classification("y_pred", "y_pred_proba").with_chunker(ChunkerConfig::Period(PeriodUnit::Week));
    let calculator = fitted(cfg, &reference);
    assert_eq!(
        calculator.columns(),
        vec![
            ("y_pred".to_string(), ColumnKind::Categorical),
            ("y_pred_proba".to_string(), ColumnKind::Continuous)
        ]
    );
    let result = calculator.calculate(&reference.concat(&analysis).unwrap()).unwrap();
    assert_valid(&result);
    assert_eq!(
        result.column_names(),
        vec![
            "y_pred_chi2",
            "y_pred_p_value",
            "y_pred_alert",
            "y_pred_proba_dstat",
            "y_pred_proba_p_value",
            "y_pred_proba_alert"
        ]
    );
    assert!(result.column("y_pred_dstat").is_err());

    let shift_time = analysis.timestamps("timestamp").unwrap()[5000];
    let shifted: Vec<&DriftRow> = result
        .rows()
        .iter()
        .filter(|r| r.chunk.start_datetime.map_or(false, |t| t >= shift_time) && r.chunk.size >= 500)
        .collect();
    assert!(!shifted.is_empty());
    for row in shifted {
        let proba = row.column("y_pred_proba").unwrap();
        assert!(proba.statistic > 0.3);
        assert!(proba.alert);
    }
    let reference_rows = result.rows().iter().filter(|r| r.chunk.is_reference).count();
    assert!(reference_rows >= 9);
}

#[test]
fn test_categorical_shift_is_detected() {
    let reference = categorical(1000, 2, Partition::Reference);
    let cfg = DriftConfig::classification("y_pred", "y_pred_proba").with_chunker(by_size(500));
    let calculator = fitted(cfg, &reference);

    let same = calculator.calculate(&categorical(1000, 2, Partition::Analysis)).unwrap();
    assert_eq!(same.column("y_pred_chi2").unwrap(), vec![0.0, 0.0]);
    assert_eq!(same.column("y_pred_p_value").unwrap(), vec![1.0, 1.0]);

    let shifted = calculator.calculate(&categorical(1000, 5, Partition::Analysis)).unwrap();
    assert_valid(&shifted);
    assert!(shifted.column("y_pred_chi2").unwrap().iter().all(|c| *c > 50.0));
    assert!(shifted.column("y_pred_p_value").unwrap().iter().all(|p| *p < 1e-10));
    assert_eq!(shifted.column("y_pred_alert").unwrap(), vec![1.0, 1.0]);
}

#[test]
fn test_multiclass_columns() {
    let (reference, analysis) = SyntheticData::new(3000, 3000).set_shift_at(Some(1500)).multiclass();
    let mapping: std::collections::BTreeMap<String, String> = MULTICLASS_CLASSES
        .iter()
        .map(|c| (c.to_string(), format!("y_pred_proba_{}", c)))
        .collect();
    let cfg = DriftConfig::classification("y_pred", mapping).with_chunker(ChunkerConfig::Count(2));
    let calculator = fitted(cfg, &reference);
    let result = calculator.calculate(&analysis).unwrap();
    assert_valid(&result);
    assert_eq!(result.columns.len(), 1 + MULTICLASS_CLASSES.len());
    for class in MULTICLASS_CLASSES {
        let dstat = result.column(&format!("y_pred_proba_{}_dstat", class)).unwrap();
        assert!(dstat[1] > dstat[0]);
        assert_eq!(result.column(&format!("y_pred_proba_{}_alert", class)).unwrap()[1], 1.0);
    }
}

#[test]
fn test_missing_values_are_dropped() {
    let mut values: Vec<f64> = (0..1000).map(|i| (i % 100) as f64).collect();
    values[..100].iter_mut().for_each(|v| *v = f64::NAN);
    let reference = Dataset::new().with_column("y_pred", Column::Numeric(values)).unwrap();
    let calculator = fitted(DriftConfig::regression("y_pred").with_chunker(by_size(500)), &reference);

    let mut analysis: Vec<f64> = (0..1000).map(|i| (i % 100) as f64).collect();
    analysis[500..].iter_mut().for_each(|v| *v = f64::NAN);
    let result = calculator
        .calculate(&Dataset::new().with_column("y_pred", Column::Numeric(analysis)).unwrap())
        .unwrap();
    let first = result.rows()[0].column("y_pred").unwrap();
    assert!(first.statistic < 0.05);
    assert!(first.p_value > 0.5);
    let empty = result.rows()[1].column("y_pred").unwrap();
    assert!(empty.statistic.is_nan());
    assert!(empty.p_value.is_nan());
    assert!(!empty.alert);

    let all_missing = Dataset::new()
        .with_column("y_pred", Column::Numeric(vec![f64::NAN; 10]))
        .unwrap();
    let mut calculator = StatisticalOutputDriftCalculator::new(DriftConfig::regression("y_pred")).unwrap();
    assert!(matches!(calculator.fit(&all_missing).unwrap_err(), MonitorError::EmptyData(_)));
}

#[test]
fn test_not_fitted_and_missing_columns() {
    let (reference, analysis) = SyntheticData::new(500, 500).regression();
    let mut calculator = StatisticalOutputDriftCalculator::new(DriftConfig::regression("y_pred")).unwrap();
    assert!(!calculator.is_fitted());
    assert_eq!(
        calculator.calculate(&analysis).unwrap_err(),
        MonitorError::NotFitted("StatisticalOutputDriftCalculator".to_string())
    );
    assert_eq!(
        calculator.fit(&reference.clone().without_column("y_pred")).unwrap_err(),
        MonitorError::MissingColumn("y_pred".to_string())
    );

    let cfg = DriftConfig::classification("y_pred", "y_pred_proba");
    let mut calculator = StatisticalOutputDriftCalculator::new(cfg).unwrap();
    assert_eq!(
        calculator.fit(&reference).unwrap_err(),
        MonitorError::MissingColumn("y_pred_proba".to_string())
    );

    let cfg = DriftConfig::regression("y_pred").with_chunker(ChunkerConfig::Period(PeriodUnit::Day));
    let mut calculator = StatisticalOutputDriftCalculator::new(cfg).unwrap();
    assert_eq!(
        calculator.fit(&reference.without_column("timestamp")).unwrap_err(),
        MonitorError::MissingColumn("timestamp".to_string())
    );
}

#[test]
fn test_invalid_settings() {
    let mut cfg = DriftConfig::regression("y_pred");
    cfg.alpha = 1.5;
    assert!(matches!(
        StatisticalOutputDriftCalculator::new(cfg).unwrap_err(),
        MonitorError::InvalidParameter(..)
    ));
    let cfg = DriftConfig::regression("y_pred").with_chunker(ChunkerConfig::Count(0));
    assert!(StatisticalOutputDriftCalculator::new(cfg).is_err());
    let cfg = DriftConfig::classification("y_pred", std::collections::BTreeMap::<String, String>::new());
    assert!(matches!(
        StatisticalOutputDriftCalculator::new(cfg).unwrap_err(),
        MonitorError::InvalidArguments(_)
    ));
}

#[test]
fn test_calculate_is_repeatable_and_thread_independent() {
    let (reference, analysis) = SyntheticData::new(2000, 2000).set_shift_at(Some(1000)).binary();
    let cfg = DriftConfig::classification("y_pred", "y_pred_proba").with_chunker(by_size(400));
    let calculator = fitted(cfg.clone(), &reference);
    let first = calculator.calculate(&analysis).unwrap();
    let second = calculator.calculate(&analysis).unwrap();
    assert_eq!(first, second);

    let mut threaded = cfg;
    threaded.num_threads = Some(2);
    let result = fitted(threaded, &reference).calculate(&analysis).unwrap();
    assert_eq!(first, result);
    assert_eq!(first.chunk_keys(), vec!["[0:399]", "[400:799]", "[800:1199]", "[1200:1599]", "[1600:1999]"]);
}

#[test]
fn test_small_chunks_are_flagged() {
    let (reference, analysis) = SyntheticData::new(1000, 1000).regression();
    let calculator = fitted(DriftConfig::regression("y_pred").with_chunker(by_size(250)), &reference);
    let result = calculator.calculate(&analysis).unwrap();
    assert!(result.rows().iter().all(|r| r.chunk.is_small));
    let calculator = fitted(DriftConfig::regression("y_pred").with_chunker(by_size(500)), &reference);
    let result = calculator.calculate(&analysis).unwrap();
    assert!(result.rows().iter().all(|r| !r.chunk.is_small));
}

#[test]
fn test_plot_validation() {
    let reference = categorical(1000, 2, Partition::Reference);
    let cfg = DriftConfig::classification("y_pred", "y_pred_proba").with_chunker(by_size(500));
    let result = fitted(cfg, &reference)
        .calculate(&categorical(1000, 5, Partition::Analysis))
        .unwrap();

    for (kind, column) in [
        (Some("foo"), Some("y_pred")),
        (None, Some("y_pred")),
        (Some("statistic"), None),
        (Some("statistic"), Some("foo")),
    ] {
        assert!(matches!(
            result.plot(kind, column).unwrap_err(),
            MonitorError::InvalidArguments(_)
        ));
    }
    let err = result.plot(Some("p_value"), Some("foo")).unwrap_err();
    assert!(err.to_string().contains("unknown 'column' value: 'foo'."));

    let statistic = result.plot(Some("statistic"), Some("y_pred")).unwrap();
    assert_eq!(statistic.series[0].name, "y_pred_chi2");
    assert_eq!(statistic.alerts, vec![true, true]);

    let p_value = result.plot(Some("p_value"), Some("y_pred_proba")).unwrap();
    assert_eq!(p_value.lower_threshold, Some(0.05));
    assert_eq!(p_value.series("y_pred_proba_p_value").unwrap().values.len(), 2);

    let shares = result.plot(Some("distribution"), Some("y_pred")).unwrap();
    assert_eq!(shares.series("y_pred_a").unwrap().values, vec![0.8, 0.8]);
    assert_eq!(shares.series("y_pred_b").unwrap().values, vec![0.2, 0.2]);

    let quantiles = result.plot(Some("distribution"), Some("y_pred_proba")).unwrap();
    let names: Vec<&str> = quantiles.series.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "y_pred_proba_q05",
            "y_pred_proba_q25",
            "y_pred_proba_q50",
            "y_pred_proba_q75",
            "y_pred_proba_q95"
        ]
    );
    assert!(quantiles.series.iter().all(|s| s.values == vec![0.5, 0.5]));
}

#[test]
fn test_result_to_json() {
    let (reference, analysis) = SyntheticData::new(1000, 1000).regression();
    let result = fitted(DriftConfig::regression("y_pred").with_chunker(ChunkerConfig::Count(2)), &reference)
        .calculate(&analysis)
        .unwrap();
    let json = result.to_json().unwrap();
    let parsed: DriftResult = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed.columns, result.columns);
    assert!(json.contains("\"p_value\""));
}

#[test]
fn test_drift_config_io() {
    let config = DriftConfig::from_json("{}").unwrap();
    assert_eq!(config, DriftConfig::default());
    assert_eq!(config.alpha, 0.05);
    assert_eq!(config.minimum_chunk_size, 300);
    assert_eq!(config.y_pred_proba, None);

    let dir = tempdir().unwrap();
    let file_path = dir.path().join("drift.json");
    let config = DriftConfig::classification("label", "score")
        .with_timestamp_column_name("ts")
        .with_chunker(ChunkerConfig::Period(PeriodUnit::Quarter));
    config.save_config(&file_path).unwrap();
    assert_eq!(DriftConfig::load_config(&file_path).unwrap(), config);
}
