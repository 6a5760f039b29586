//! Statistics aggregation over alignment blocks.
//!
//! `AggregateState` is folded one block at a time and only ever grows.
//! Once the fold is done it is handed to read-only consumers: the density
//! calculation below and the renderers in [`crate::render`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use thiserror::Error;

use crate::maf::{self, MafResult};
use crate::model::AlignmentBlock;

/// Errors from derived statistics.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StatsError {
    #[error("Density is undefined: no sequence data was aggregated")]
    UndefinedDensity,
}

/// Length-keyed occurrence counts, iterated in ascending length order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Histogram {
    counts: BTreeMap<usize, u64>,
}

impl Histogram {
    /// Creates an empty histogram.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one occurrence of `length`.
    pub fn record(&mut self, length: usize) {
        *self.counts.entry(length).or_insert(0) += 1;
    }

    /// Count recorded for `length` (0 if never seen).
    pub fn get(&self, length: usize) -> u64 {
        self.counts.get(&length).copied().unwrap_or(0)
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Number of distinct lengths.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Iterates `(length, count)` pairs in ascending length order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, u64)> + '_ {
        self.counts.iter().map(|(&length, &count)| (length, count))
    }

    /// Iterates the entries whose length does not exceed `max_length`.
    ///
    /// With `None` every entry is yielded.
    pub fn iter_up_to(&self, max_length: Option<usize>) -> impl Iterator<Item = (usize, u64)> + '_ {
        let upper = max_length.unwrap_or(usize::MAX);
        self.counts
            .range(..=upper)
            .map(|(&length, &count)| (length, count))
    }
}

impl FromIterator<(usize, u64)> for Histogram {
    fn from_iter<I: IntoIterator<Item = (usize, u64)>>(iter: I) -> Self {
        let mut histogram = Histogram::new();
        for (length, count) in iter {
            *histogram.counts.entry(length).or_insert(0) += count;
        }
        histogram
    }
}

/// Running totals over every block folded so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateState {
    /// Sum of all aligned lengths
    pub total_residues: u64,
    /// Sum of all gap characters
    pub total_gaps: u64,
    /// Length of the first record of each non-empty block
    pub block_lengths: Histogram,
    /// Length of every record
    pub sequence_lengths: Histogram,
    /// Distinct source identifiers, sorted
    pub identifiers: BTreeSet<String>,
    /// Blocks folded, empty ones included
    pub block_count: u64,
    /// Sequence records folded
    pub sequence_count: u64,
}

impl AggregateState {
    /// Creates an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one block into the state.
    pub fn add_block(&mut self, block: &AlignmentBlock) {
        self.block_count += 1;

        if let Some(length) = block.length() {
            self.block_lengths.record(length);
        }

        for record in &block.sequences {
            let length = record.len();
            self.total_residues += length as u64;
            self.total_gaps += record.gap_count() as u64;
            self.sequence_lengths.record(length);
            self.sequence_count += 1;

            if !self.identifiers.contains(&record.id) {
                self.identifiers.insert(record.id.clone());
            }
        }
    }

    /// Folds every block of a fallible block stream, stopping at the first error.
    pub fn add_blocks<I>(&mut self, blocks: I) -> MafResult<()>
    where
        I: IntoIterator<Item = MafResult<AlignmentBlock>>,
    {
        for block in blocks {
            self.add_block(&block?);
        }
        Ok(())
    }

    /// Builds a state from an infallible sequence of blocks.
    pub fn from_blocks<'a, I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a AlignmentBlock>,
    {
        blocks.into_iter().fold(Self::new(), combine_ref)
    }

    /// Gap density of the folded data. See [`density`].
    pub fn density(&self) -> Result<f64, StatsError> {
        density(self)
    }
}

/// Folds a block into a state and returns it.
pub fn combine(mut state: AggregateState, block: AlignmentBlock) -> AggregateState {
    state.add_block(&block);
    state
}

fn combine_ref(mut state: AggregateState, block: &AlignmentBlock) -> AggregateState {
    state.add_block(block);
    state
}

/// Ratio of gap characters to all aligned characters.
///
/// Returns [`StatsError::UndefinedDensity`] when nothing was aggregated.
pub fn density(state: &AggregateState) -> Result<f64, StatsError> {
    if state.total_residues == 0 {
        return Err(StatsError::UndefinedDensity);
    }
    Ok(state.total_gaps as f64 / state.total_residues as f64)
}

/// Aggregates one or more MAF files into a single state.
pub fn aggregate_files<P: AsRef<Path>>(paths: &[P]) -> MafResult<AggregateState> {
    let mut state = AggregateState::new();

    for path in paths {
        let path = path.as_ref();
        let mut blocks = maf::open_maf_file(path)?;
        let before = state.sequence_count;

        for block in blocks.by_ref() {
            state.add_block(&block?);
        }

        log::info!(
            "{}: {} lines, {} sequence records, {} malformed lines skipped",
            path.display(),
            blocks.line_number(),
            state.sequence_count - before,
            blocks.malformed_lines()
        );
    }

    Ok(state)
}
