//! # mafstats - Structural statistics for MAF alignments
//!
//! Streams Multiple Alignment Format files and reports gap density,
//! block and sequence length distributions, and distinct sequence
//! identifiers.
//!
//! ## Architecture
//!
//! The pipeline is a single forward pass followed by read-only consumers:
//! - `model`: Sequence records and alignment blocks
//! - `maf`: Lazy MAF block parser (plain or gzipped input)
//! - `stats`: Aggregation fold, histograms and density
//! - `render`: Raw data tables and gnuplot feeds
//! - `sizing`: Client for the external bit-vector sizing tool

pub mod maf;
pub mod model;
pub mod render;
pub mod sizing;
pub mod stats;
