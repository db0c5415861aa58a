pub const DEFAULT_CHUNK_COUNT: usize = 10;
pub const DEFAULT_MINIMUM_CHUNK_SIZE: usize = 300;
pub const MINIMUM_CHUNK_SIZE_FLOOR: usize = 100;
pub const MAXIMUM_BAND_HALF_WIDTH: f64 = 0.1;
pub const SAMPLING_ERROR_RANGE: f64 = 3.0;
pub const THRESHOLD_STD_FACTOR: f64 = 3.0;
pub const CALIBRATION_BIN_COUNT: usize = 10;
pub const CALIBRATION_SPLIT_COUNT: usize = 10;
pub const CALIBRATION_TEST_SIZE: f64 = 0.1;
pub const CALIBRATION_SEED: u64 = 42;
pub const NEEDS_CALIBRATION_THRESHOLD: f64 = 0.0;
pub const DRIFT_ALPHA: f64 = 0.05;
