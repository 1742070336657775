use super::config::{ConfigError, ScheduleConfig};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ScheduleError {
    #[error("Batch index {index} is out of range (number of batches: {num_batches})")]
    IndexOutOfRange { index: usize, num_batches: usize },
    #[error("No accepted identifiers were provided")]
    EmptyIdentifierList,
}

/// The ordered, duplicate-free list of molecule identifiers a run works on.
///
/// Cloning is cheap; all clones share the same immutable storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierList {
    identifiers: Arc<[String]>,
}

impl IdentifierList {
    /// Keeps the first occurrence of every identifier and drops later repeats.
    pub fn new<I, S>(identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let mut unique = Vec::new();
        for id in identifiers {
            let id = id.into();
            if seen.contains(&id) {
                warn!(identifier = %id, "Duplicate identifier ignored.");
                continue;
            }
            seen.insert(id.clone());
            unique.push(id);
        }
        Self {
            identifiers: unique.into(),
        }
    }

    /// One identifier per line. Blank lines and `#` comments are ignored.
    pub fn parse(text: &str) -> Self {
        Self::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
    }

    pub fn read_from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        Ok(Self::parse(&text))
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.identifiers
    }
}

/// Number of batches the run window spans.
///
/// With both `start_batch` and `to_run_batches` given the window ends at
/// `start_batch + to_run_batches`; with only `to_run_batches` it ends at
/// `to_run_batches`; otherwise every batch of the list is included. The two bounded
/// cases are not symmetric: `to_run_batches` alone counts from batch zero.
pub fn plan_num_batches(
    num_identifiers: usize,
    batch_size: usize,
    start_batch: Option<usize>,
    to_run_batches: Option<usize>,
) -> usize {
    match (start_batch, to_run_batches) {
        (Some(start), Some(to_run)) => start.saturating_add(to_run),
        (None, Some(to_run)) => to_run,
        _ => num_identifiers.div_ceil(batch_size.max(1)),
    }
}

/// A contiguous, index-addressed slice of the identifier list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub index: usize,
    pub range: Range<usize>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Deterministic partition of an [`IdentifierList`] into fixed-size batches.
///
/// Batch `i` covers `identifiers[i * batch_size .. min((i + 1) * batch_size, len)]`. The
/// scheduler holds no mutable state, so every process given the same list and window
/// computes the same assignment.
#[derive(Debug, Clone)]
pub struct BatchScheduler {
    batch_size: usize,
    start_batch: Option<usize>,
    num_batches: usize,
    identifiers: IdentifierList,
}

impl BatchScheduler {
    pub fn new(
        batch_size: usize,
        start_batch: Option<usize>,
        num_batches: usize,
        identifiers: IdentifierList,
    ) -> Result<Self, ConfigError> {
        if batch_size == 0 {
            return Err(ConfigError::InvalidValue {
                parameter: "batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            batch_size,
            start_batch,
            num_batches,
            identifiers,
        })
    }

    /// Builds the scheduler for the window described by `config`.
    pub fn from_config(
        identifiers: IdentifierList,
        config: &ScheduleConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let num_batches = plan_num_batches(
            identifiers.len(),
            config.batch_size,
            config.start_batch,
            config.to_run_batches,
        );
        Self::new(
            config.batch_size,
            config.start_batch,
            num_batches,
            identifiers,
        )
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn start_batch(&self) -> Option<usize> {
        self.start_batch
    }

    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    pub fn identifiers(&self) -> &IdentifierList {
        &self.identifiers
    }

    /// Number of non-empty batches the identifier list can fill.
    pub fn available_batches(&self) -> usize {
        self.identifiers.len().div_ceil(self.batch_size)
    }

    pub fn batch(&self, index: usize) -> Result<Batch, ScheduleError> {
        if index >= self.num_batches {
            return Err(ScheduleError::IndexOutOfRange {
                index,
                num_batches: self.num_batches,
            });
        }
        let len = self.identifiers.len();
        let start = index.saturating_mul(self.batch_size).min(len);
        let end = index
            .saturating_add(1)
            .saturating_mul(self.batch_size)
            .min(len);
        Ok(Batch {
            index,
            range: start..end,
        })
    }

    /// The identifiers of batch `index`. Indices inside the window but past the end of
    /// the list yield an empty slice.
    pub fn process(&self, index: usize) -> Result<&[String], ScheduleError> {
        let batch = self.batch(index)?;
        Ok(&self.identifiers.as_slice()[batch.range])
    }

    /// Batch indices to execute, in ascending order.
    pub fn batches(&self) -> Vec<usize> {
        let start = self.start_batch.unwrap_or(0);
        let end = self.num_batches.min(self.available_batches());
        (start..end).collect()
    }
}
