//! Chunking
//!
//! Splits a dataset into ordered, non-overlapping chunks either by calendar period
//! or by row count. Rows are stably sorted by timestamp before they are split, so
//! chunks always come out in ascending time order.
use crate::constants::DEFAULT_CHUNK_COUNT;
use crate::data::{Dataset, Partition};
use crate::errors::MonitorError;
use crate::utils::items_to_strings;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use log::warn;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Calendar period used for time based chunking.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug)]
pub enum PeriodUnit {
    Day,
    /// ISO weeks, starting on Monday.
    Week,
    Month,
    Quarter,
    Year,
}

impl FromStr for PeriodUnit {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "D" | "Day" => Ok(PeriodUnit::Day),
            "W" | "Week" => Ok(PeriodUnit::Week),
            "M" | "Month" => Ok(PeriodUnit::Month),
            "Q" | "Quarter" => Ok(PeriodUnit::Quarter),
            "Y" | "A" | "Year" => Ok(PeriodUnit::Year),
            _ => Err(MonitorError::invalid(format!(
                "unknown chunk period '{}', expected one of {}.",
                s,
                items_to_strings(&["D", "W", "M", "Q", "Y"])
            ))),
        }
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    // Month is always normalised to 1..=12 by the callers.
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

impl PeriodUnit {
    /// First day of the period containing `ts`.
    pub fn truncate(&self, ts: NaiveDateTime) -> NaiveDate {
        let date = ts.date();
        match self {
            PeriodUnit::Day => date,
            PeriodUnit::Week => date - Duration::days(date.weekday().num_days_from_monday() as i64),
            PeriodUnit::Month => first_of_month(date.year(), date.month()),
            PeriodUnit::Quarter => first_of_month(date.year(), (date.month0() / 3) * 3 + 1),
            PeriodUnit::Year => first_of_month(date.year(), 1),
        }
    }

    /// First day of the period following the one starting at `start`.
    pub fn next(&self, start: NaiveDate) -> NaiveDate {
        let add_months = |months: u32| {
            let total = start.month0() + months;
            first_of_month(start.year() + (total / 12) as i32, total % 12 + 1)
        };
        match self {
            PeriodUnit::Day => start + Duration::days(1),
            PeriodUnit::Week => start + Duration::days(7),
            PeriodUnit::Month => add_months(1),
            PeriodUnit::Quarter => add_months(3),
            PeriodUnit::Year => add_months(12),
        }
    }

    /// Human readable label of the period starting at `start`.
    pub fn label(&self, start: NaiveDate) -> String {
        match self {
            PeriodUnit::Day => start.format("%Y-%m-%d").to_string(),
            PeriodUnit::Week => {
                let end = start + Duration::days(6);
                format!("{}/{}", start.format("%Y-%m-%d"), end.format("%Y-%m-%d"))
            }
            PeriodUnit::Month => start.format("%Y-%m").to_string(),
            PeriodUnit::Quarter => format!("{}Q{}", start.year(), start.month0() / 3 + 1),
            PeriodUnit::Year => start.year().to_string(),
        }
    }
}

/// What to do with the trailing rows that do not fill a whole size-based chunk.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum IncompleteChunk {
    /// Emit them as a smaller last chunk.
    #[default]
    Keep,
    /// Discard them.
    Drop,
    /// Merge them into the previous chunk.
    Append,
}

/// Strategy used to split data into chunks.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub enum ChunkerConfig {
    /// Ten chunks of (nearly) equal row count.
    #[default]
    Default,
    /// One chunk per calendar period.
    Period(PeriodUnit),
    /// Chunks of a fixed number of rows.
    Size {
        size: usize,
        #[serde(default)]
        incomplete: IncompleteChunk,
    },
    /// A fixed number of chunks of (nearly) equal row count.
    Count(usize),
}

/// A contiguous, time ordered subset of rows.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Chunk {
    /// Period label, or `[start:end]` for row based chunks.
    pub key: String,
    pub index: usize,
    /// Position of the first row in timestamp order.
    pub start_index: usize,
    /// Position of the last row in timestamp order, inclusive.
    pub end_index: usize,
    pub start_datetime: Option<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
    /// Every row came from the reference partition.
    pub is_reference: bool,
    /// Rows from both partitions were mixed into this chunk.
    pub is_transition: bool,
    /// Fewer rows than the minimum chunk size.
    pub is_small: bool,
    /// Row indices into the dataset that was split.
    pub rows: Vec<usize>,
}

/// Chunk metadata as reported on result rows.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChunkRecord {
    pub key: String,
    pub index: usize,
    pub start_index: usize,
    pub end_index: usize,
    pub start_datetime: Option<NaiveDateTime>,
    pub end_datetime: Option<NaiveDateTime>,
    pub is_reference: bool,
    pub is_transition: bool,
    pub is_small: bool,
    /// Number of rows in the chunk.
    pub size: usize,
}

impl From<&Chunk> for ChunkRecord {
    fn from(chunk: &Chunk) -> Self {
        ChunkRecord {
            key: chunk.key.clone(),
            index: chunk.index,
            start_index: chunk.start_index,
            end_index: chunk.end_index,
            start_datetime: chunk.start_datetime,
            end_datetime: chunk.end_datetime,
            is_reference: chunk.is_reference,
            is_transition: chunk.is_transition,
            is_small: chunk.is_small,
            size: chunk.len(),
        }
    }
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl ChunkerConfig {
    /// Build a chunker from the optional, mutually exclusive selectors.
    pub fn from_selectors(
        chunk_period: Option<&str>,
        chunk_size: Option<usize>,
        chunk_count: Option<usize>,
    ) -> Result<Self, MonitorError> {
        let chunker = match (chunk_period, chunk_size, chunk_count) {
            (None, None, None) => ChunkerConfig::Default,
            (Some(p), None, None) => ChunkerConfig::Period(PeriodUnit::from_str(p)?),
            (None, Some(size), None) => ChunkerConfig::Size {
                size,
                incomplete: IncompleteChunk::default(),
            },
            (None, None, Some(count)) => ChunkerConfig::Count(count),
            _ => {
                return Err(MonitorError::invalid(
                    "only one of 'chunk_period', 'chunk_size' or 'chunk_count' can be given.",
                ))
            }
        };
        chunker.validate()?;
        Ok(chunker)
    }

    pub fn validate(&self) -> Result<(), MonitorError> {
        match self {
            ChunkerConfig::Size { size: 0, .. } => Err(MonitorError::invalid("'chunk_size' must be positive.")),
            ChunkerConfig::Count(0) => Err(MonitorError::invalid("'chunk_count' must be positive.")),
            _ => Ok(()),
        }
    }

    /// Split `data` into chunks. Chunks with fewer than `minimum_chunk_size` rows are
    /// still emitted, but flagged as small.
    pub fn split(
        &self,
        data: &Dataset,
        timestamp_column_name: &str,
        minimum_chunk_size: usize,
    ) -> Result<Vec<Chunk>, MonitorError> {
        self.validate()?;
        let timestamps = match (self, data.has_column(timestamp_column_name)) {
            (_, true) => Some(data.timestamps(timestamp_column_name)?),
            (ChunkerConfig::Period(_), false) => {
                return Err(MonitorError::MissingColumn(timestamp_column_name.to_string()))
            }
            (_, false) => None,
        };

        let mut order: Vec<usize> = (0..data.len()).collect();
        if let Some(ts) = timestamps {
            order.sort_by_key(|&i| ts[i]);
        }
        if order.is_empty() {
            return Ok(Vec::new());
        }

        let bounds = match self {
            ChunkerConfig::Period(unit) => {
                // Presence of a timestamp column was checked above.
                let ts = timestamps.unwrap_or_default();
                return Ok(flag_small(period_chunks(*unit, &order, ts, data.partitions()), minimum_chunk_size));
            }
            ChunkerConfig::Size { size, incomplete } => size_bounds(order.len(), *size, *incomplete),
            ChunkerConfig::Count(count) if *count > order.len() => {
                return Err(MonitorError::invalid(format!(
                    "'chunk_count' of {} exceeds the {} available rows.",
                    count,
                    order.len()
                )))
            }
            ChunkerConfig::Count(count) => count_bounds(order.len(), *count),
            ChunkerConfig::Default => count_bounds(order.len(), DEFAULT_CHUNK_COUNT.min(order.len())),
        };

        let chunks = bounds
            .into_iter()
            .enumerate()
            .map(|(index, (start, end))| {
                let rows = order[start..end].to_vec();
                let (start_datetime, end_datetime) = match timestamps {
                    Some(ts) => (Some(ts[rows[0]]), Some(ts[rows[rows.len() - 1]])),
                    None => (None, None),
                };
                build_chunk(
                    format!("[{}:{}]", start, end - 1),
                    index,
                    (start, end - 1),
                    (start_datetime, end_datetime),
                    rows,
                    data.partitions(),
                )
            })
            .collect();
        Ok(flag_small(chunks, minimum_chunk_size))
    }
}

fn build_chunk(
    key: String,
    index: usize,
    (start_index, end_index): (usize, usize),
    (start_datetime, end_datetime): (Option<NaiveDateTime>, Option<NaiveDateTime>),
    rows: Vec<usize>,
    partitions: &[Partition],
) -> Chunk {
    let n_reference = rows
        .iter()
        .filter(|&&i| partitions[i] == Partition::Reference)
        .count();
    Chunk {
        key,
        index,
        start_index,
        end_index,
        start_datetime,
        end_datetime,
        is_reference: n_reference == rows.len(),
        is_transition: n_reference > 0 && n_reference < rows.len(),
        is_small: false,
        rows,
    }
}

fn size_bounds(n: usize, size: usize, incomplete: IncompleteChunk) -> Vec<(usize, usize)> {
    let mut bounds: Vec<(usize, usize)> = (0..n).step_by(size).map(|s| (s, (s + size).min(n))).collect();
    let trailing = bounds.last().map(|(s, e)| e - s < size).unwrap_or(false);
    if trailing {
        match incomplete {
            IncompleteChunk::Keep => {}
            IncompleteChunk::Drop => {
                bounds.pop();
            }
            IncompleteChunk::Append => {
                if bounds.len() > 1 {
                    if let Some((_, end)) = bounds.pop() {
                        if let Some(prev) = bounds.last_mut() {
                            prev.1 = end;
                        }
                    }
                }
            }
        }
    }
    bounds
}

/// `count` contiguous chunks whose sizes differ by at most one row. The first
/// `n % count` chunks take the extra rows.
fn count_bounds(n: usize, count: usize) -> Vec<(usize, usize)> {
    let (size, extra) = (n / count, n % count);
    let mut start = 0;
    (0..count)
        .map(|i| {
            let end = start + size + usize::from(i < extra);
            let bounds = (start, end);
            start = end;
            bounds
        })
        .filter(|(s, e)| e > s)
        .collect()
}

fn period_chunks(unit: PeriodUnit, order: &[usize], ts: &[NaiveDateTime], partitions: &[Partition]) -> Vec<Chunk> {
    let mut groups: Vec<(NaiveDate, usize, usize)> = Vec::new();
    for (pos, &row) in order.iter().enumerate() {
        let start = unit.truncate(ts[row]);
        match groups.last_mut() {
            Some((period, _, end)) if *period == start => *end = pos + 1,
            _ => groups.push((start, pos, pos + 1)),
        }
    }

    let mut skipped = 0;
    for pair in groups.windows(2) {
        let mut expected = unit.next(pair[0].0);
        while expected < pair[1].0 {
            skipped += 1;
            expected = unit.next(expected);
        }
    }
    if skipped > 0 {
        warn!(
            "{} empty {:?} period(s) contained no rows and were dropped from the chunks.",
            skipped, unit
        );
    }

    groups
        .into_iter()
        .enumerate()
        .map(|(index, (period, start, end))| {
            let start_datetime = period.and_hms_opt(0, 0, 0);
            let end_datetime = unit
                .next(period)
                .and_hms_opt(0, 0, 0)
                .map(|next| next - Duration::nanoseconds(1));
            build_chunk(
                unit.label(period),
                index,
                (start, end - 1),
                (start_datetime, end_datetime),
                order[start..end].to_vec(),
                partitions,
            )
        })
        .collect()
}

fn flag_small(mut chunks: Vec<Chunk>, minimum_chunk_size: usize) -> Vec<Chunk> {
    let mut n_small = 0;
    for chunk in chunks.iter_mut() {
        chunk.is_small = chunk.len() < minimum_chunk_size;
        if chunk.is_small {
            n_small += 1;
        }
    }
    if n_small > 0 {
        warn!(
            "{} chunk(s) hold fewer than {} rows; their results are unreliable.",
            n_small, minimum_chunk_size
        );
    }
    chunks
}
