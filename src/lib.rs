// Modules
pub mod calibration;
pub mod cbpe;
pub mod chunk;
pub mod constants;
pub mod data;
pub mod drift;
pub mod errors;
pub mod metrics;
pub mod plot;
pub mod synthetic;
pub mod utils;

// Individual classes, and functions
pub use calibration::{Calibrator, IsotonicCalibrator};
pub use cbpe::{CbpeConfig, CbpeResult, ConfigIO, ProbabilityColumns, CBPE};
pub use chunk::{Chunk, ChunkerConfig, IncompleteChunk, PeriodUnit};
pub use data::{Column, Dataset, Partition};
pub use drift::{DriftConfig, DriftResult, StatisticalOutputDriftCalculator};
pub use errors::MonitorError;
pub use metrics::Metric;
pub use plot::PlotSpec;
