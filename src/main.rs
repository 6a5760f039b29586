//! mafstats - Structural statistics for MAF alignments
//!
//! ## Usage
//!
//! ```bash
//! mafstats density <file.maf>...
//! mafstats count <file.maf>...
//! mafstats lengths <file.maf> <output> [max_length]
//! mafstats bitseq-assess --tool examples/bitseq_assess --output sizes.svg
//! ```
//!
//! ## Output Types (`lengths`, `bitseq-assess`)
//!
//! Selected by the output extension: gif, jpeg, jpg, mp, pdf, png, ps, svg
//! and tex are rendered through gnuplot; raw writes the data table only.

// Use jemalloc for better memory management (returns memory to OS)
#[cfg(not(windows))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use mafstats::render::{self, OutputKind, PlotCommand, PlotLayout};
use mafstats::sizing::{self, BitSequenceKind, SizingTool};
use mafstats::stats::{aggregate_files, StatsError};

/// Output path together with the kind its extension selects.
#[derive(Debug, Clone)]
struct OutputTarget {
    path: PathBuf,
    kind: OutputKind,
}

/// Placeholder for output paths, listing every supported extension so each
/// usage message shows them.
const OUTPUT_VALUE_NAME: &str = "OUTPUT.{gif,jpeg,jpg,mp,pdf,png,ps,raw,svg,tex}";

/// Validates the output extension while arguments are parsed, so an
/// unsupported type is reported before any input is read.
fn parse_output(value: &str) -> Result<OutputTarget, String> {
    let path = PathBuf::from(value);
    let kind = OutputKind::from_path(&path).map_err(|e| e.to_string())?;
    Ok(OutputTarget { path, kind })
}

/// mafstats - gap density, length distributions and identifier counts for MAF files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print gap characters / aligned characters across all sequences
    Density {
        /// MAF files (optionally .gz)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Count the distinct sequence identifiers and list them
    Count {
        /// MAF files (optionally .gz)
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Plot block and sequence length distributions
    Lengths {
        /// MAF file (optionally .gz)
        file: PathBuf,

        /// Output file; its extension selects the output type
        #[arg(value_parser = parse_output, value_name = OUTPUT_VALUE_NAME)]
        output: OutputTarget,

        /// Drop lengths above this value
        max_length: Option<usize>,

        /// Plotting program fed with the gnuplot script
        #[arg(long, env = "MAFSTATS_GNUPLOT", default_value = "gnuplot")]
        gnuplot: String,
    },

    /// Plot bit-vector sizes against sequence length using the external sizing tool
    BitseqAssess {
        /// Sizing tool executable
        #[arg(long, env = "MAFSTATS_BITSEQ_ASSESS", default_value = "examples/bitseq_assess")]
        tool: PathBuf,

        /// Probability that a position is not a gap
        #[arg(long, default_value_t = 0.9)]
        density: f64,

        /// Shortest sequence length
        #[arg(long, default_value_t = 10)]
        min: usize,

        /// Longest sequence length
        #[arg(long, default_value_t = 10000)]
        max: usize,

        /// Length increment
        #[arg(long, default_value_t = 5)]
        step: usize,

        /// Bit-vector implementations to measure
        #[arg(long, num_args = 1.., default_values_t = BitSequenceKind::ALL)]
        kinds: Vec<BitSequenceKind>,

        /// Output file; its extension selects the output type
        #[arg(
            short,
            long,
            value_parser = parse_output,
            value_name = OUTPUT_VALUE_NAME,
            default_value = "bitseq_assess.svg"
        )]
        output: OutputTarget,

        /// Plotting program fed with the gnuplot script
        #[arg(long, env = "MAFSTATS_GNUPLOT", default_value = "gnuplot")]
        gnuplot: String,
    },
}

fn setup_logging(verbose: u8, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if quiet {
        builder.filter_level(log::LevelFilter::Error);
    } else if verbose == 1 {
        builder.filter_level(log::LevelFilter::Debug);
    } else if verbose > 1 {
        builder.filter_level(log::LevelFilter::Trace);
    }

    builder.format_timestamp_secs().init();
}

fn run_density(files: &[PathBuf]) -> Result<()> {
    let state = aggregate_files(files).context("Failed to read MAF input")?;

    match state.density() {
        Ok(ratio) => println!("{}/{}; {:.6}", state.total_gaps, state.total_residues, ratio),
        Err(e @ StatsError::UndefinedDensity) => {
            log::warn!("{}", e);
            println!(
                "{}/{}; undefined (no sequence data)",
                state.total_gaps, state.total_residues
            );
        }
    }

    Ok(())
}

fn run_count(files: &[PathBuf]) -> Result<()> {
    let state = aggregate_files(files).context("Failed to read MAF input")?;

    println!("{}", state.identifiers.len());
    for id in &state.identifiers {
        println!("{}", id);
    }

    Ok(())
}

fn run_lengths(
    file: PathBuf,
    output: OutputTarget,
    max_length: Option<usize>,
    gnuplot: String,
) -> Result<()> {
    let state = aggregate_files(&[&file])
        .with_context(|| format!("Failed to read {}", file.display()))?;

    log::info!(
        "{} blocks, {} sequences, {} distinct block lengths",
        state.block_count,
        state.sequence_count,
        state.block_lengths.len()
    );

    render::render_histograms(
        &state,
        output.kind,
        &output.path,
        max_length,
        &PlotCommand::new(gnuplot),
    )
    .with_context(|| format!("Failed to render {}", output.path.display()))?;

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_bitseq_assess(
    tool: PathBuf,
    density: f64,
    min: usize,
    max: usize,
    step: usize,
    kinds: Vec<BitSequenceKind>,
    output: OutputTarget,
    gnuplot: String,
) -> Result<()> {
    if !(0.0..=1.0).contains(&density) {
        anyhow::bail!("Density must be within 0-1 (got {})", density);
    }
    if step == 0 {
        anyhow::bail!("Length step must be positive");
    }
    if min > max {
        anyhow::bail!("Minimum length {} exceeds maximum length {}", min, max);
    }

    let tool = SizingTool::new(tool);
    let mut rng = rand::rng();
    let series = sizing::assess(&tool, &kinds, (min..=max).step_by(step), density, &mut rng)
        .context("Bit-vector size assessment failed")?;

    let layout = PlotLayout {
        xlabel: "Sequence length".to_string(),
        ylabel: "Size (bytes)".to_string(),
        log_x: false,
        key: "top left".to_string(),
    };
    render::render_series(
        &series,
        &layout,
        output.kind,
        &output.path,
        &PlotCommand::new(gnuplot),
    )
    .with_context(|| format!("Failed to render {}", output.path.display()))?;

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose, args.quiet);

    match args.command {
        Commands::Density { files } => run_density(&files),
        Commands::Count { files } => run_count(&files),
        Commands::Lengths {
            file,
            output,
            max_length,
            gnuplot,
        } => run_lengths(file, output, max_length, gnuplot),
        Commands::BitseqAssess {
            tool,
            density,
            min,
            max,
            step,
            kinds,
            output,
            gnuplot,
        } => run_bitseq_assess(tool, density, min, max, step, kinds, output, gnuplot),
    }
}
