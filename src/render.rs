//! Output rendering for length distributions.
//!
//! Two kinds of output are supported:
//! - `raw`: `length count` rows per series, each series terminated by `e`
//! - plots: a gnuplot script followed by the same rows as inline data,
//!   piped to an external gnuplot process
//!
//! The output kind is chosen from the output file extension and validated
//! before anything is opened or spawned.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};

use thiserror::Error;

use crate::stats::AggregateState;

/// Output file extensions accepted by [`OutputKind::from_extension`], sorted.
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "gif", "jpeg", "jpg", "mp", "pdf", "png", "ps", "raw", "svg", "tex",
];

/// Errors that can occur while rendering.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Unsupported output type '{extension}'. Supported output types: {}", SUPPORTED_EXTENSIONS.join(" "))]
    UnsupportedOutputKind { extension: String },

    #[error("Failed to write output: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` exited with {status}")]
    ProcessFailed { program: String, status: ExitStatus },
}

/// Result type for rendering operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Gnuplot terminals reachable from an output extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlotTerminal {
    Gif,
    Jpeg,
    MetaPost,
    Pdf,
    Png,
    PostScript,
    Svg,
    Tikz,
}

impl PlotTerminal {
    /// Name passed to gnuplot's `set term`.
    pub fn gnuplot_name(&self) -> &'static str {
        match self {
            PlotTerminal::Gif => "gif",
            PlotTerminal::Jpeg => "jpeg",
            PlotTerminal::MetaPost => "mp",
            PlotTerminal::Pdf => "pdf",
            PlotTerminal::Png => "png",
            PlotTerminal::PostScript => "postscript",
            PlotTerminal::Svg => "svg",
            PlotTerminal::Tikz => "tikz",
        }
    }
}

/// The closed set of output kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Plain `length count` rows written to a file
    Raw,
    /// Gnuplot script plus inline data, rendered by an external process
    Plot(PlotTerminal),
}

impl OutputKind {
    /// Maps a file extension (without the dot) to an output kind.
    pub fn from_extension(extension: &str) -> RenderResult<Self> {
        let kind = match extension {
            "raw" => OutputKind::Raw,
            "jpg" | "jpeg" => OutputKind::Plot(PlotTerminal::Jpeg),
            "pdf" => OutputKind::Plot(PlotTerminal::Pdf),
            "png" => OutputKind::Plot(PlotTerminal::Png),
            "svg" => OutputKind::Plot(PlotTerminal::Svg),
            "mp" => OutputKind::Plot(PlotTerminal::MetaPost),
            "ps" => OutputKind::Plot(PlotTerminal::PostScript),
            "gif" => OutputKind::Plot(PlotTerminal::Gif),
            "tex" => OutputKind::Plot(PlotTerminal::Tikz),
            _ => {
                return Err(RenderError::UnsupportedOutputKind {
                    extension: extension.to_string(),
                })
            }
        };
        Ok(kind)
    }

    /// Selects the output kind from the extension of `path`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> RenderResult<Self> {
        let extension = path
            .as_ref()
            .extension()
            .and_then(OsStr::to_str)
            .unwrap_or("");
        Self::from_extension(extension)
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputKind::Raw => write!(f, "raw"),
            OutputKind::Plot(terminal) => write!(f, "gnuplot/{}", terminal.gnuplot_name()),
        }
    }
}

/// One named data series: `(x, y)` points in output order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Series {
    /// Legend title in the plot script
    pub title: String,
    /// `(x, y)` rows written before the `e` sentinel
    pub points: Vec<(usize, u64)>,
}

impl Series {
    /// Creates a series from its title and points.
    pub fn new(title: impl Into<String>, points: Vec<(usize, u64)>) -> Self {
        Self {
            title: title.into(),
            points,
        }
    }
}

/// Axis and legend settings for the plot script preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotLayout {
    pub xlabel: String,
    pub ylabel: String,
    pub log_x: bool,
    /// Gnuplot key placement, e.g. `top right`
    pub key: String,
}

impl PlotLayout {
    /// Layout for block and sequence length distributions.
    pub fn length_distribution() -> Self {
        Self {
            xlabel: "Sequence size".to_string(),
            ylabel: "Count".to_string(),
            log_x: true,
            key: "top right".to_string(),
        }
    }
}

/// The external plotting program and its leading arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlotCommand {
    pub program: OsString,
    pub args: Vec<OsString>,
}

impl PlotCommand {
    /// Runs `program` with no arguments.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Appends an argument passed before the script is fed on stdin.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    fn display_name(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }
}

impl Default for PlotCommand {
    fn default() -> Self {
        Self::new("gnuplot")
    }
}

/// A spawned plotting process fed through its stdin.
///
/// `Sink::finish` consumes it on every normal path. The `Drop` impl is a
/// safety net for unwinding: it closes stdin and reaps the child.
struct PlotProcess {
    program: String,
    child: Child,
    stdin: Option<BufWriter<ChildStdin>>,
    reaped: bool,
}

impl PlotProcess {
    fn spawn(command: &PlotCommand) -> RenderResult<Self> {
        let program = command.display_name();
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|source| RenderError::Spawn {
                program: program.clone(),
                source,
            })?;
        let stdin = child.stdin.take().map(BufWriter::new);

        log::debug!("Spawned `{}` (pid {})", program, child.id());
        Ok(Self {
            program,
            child,
            stdin,
            reaped: false,
        })
    }

    /// Flushes and closes stdin, then waits for the process to exit.
    fn close_and_wait(&mut self) -> (io::Result<()>, io::Result<ExitStatus>) {
        let flushed = match self.stdin.take() {
            Some(mut stdin) => stdin.flush(),
            None => Ok(()),
        };
        let status = self.child.wait();
        self.reaped = true;
        (flushed, status)
    }
}

impl Drop for PlotProcess {
    fn drop(&mut self) {
        if !self.reaped {
            self.stdin.take();
            let _ = self.child.wait();
        }
    }
}

/// Destination of a data feed.
enum Sink {
    File(BufWriter<File>),
    Process(PlotProcess),
}

impl Sink {
    fn open(kind: OutputKind, output: &Path, command: &PlotCommand) -> RenderResult<Self> {
        match kind {
            OutputKind::Raw => Ok(Sink::File(BufWriter::new(File::create(output)?))),
            OutputKind::Plot(_) => Ok(Sink::Process(PlotProcess::spawn(command)?)),
        }
    }

    fn writer(&mut self) -> io::Result<&mut dyn Write> {
        match self {
            Sink::File(file) => Ok(file as &mut dyn Write),
            Sink::Process(process) => match process.stdin.as_mut() {
                Some(stdin) => Ok(stdin as &mut dyn Write),
                None => Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "plot process stdin is closed",
                )),
            },
        }
    }

    /// Closes the destination and reports the outcome of the whole feed.
    ///
    /// A failed plotting process takes precedence over the write error it
    /// usually causes.
    fn finish(self, written: io::Result<()>) -> RenderResult<()> {
        match self {
            Sink::File(mut file) => {
                written?;
                file.flush()?;
                Ok(())
            }
            Sink::Process(mut process) => {
                let (flushed, status) = process.close_and_wait();
                let status = status?;
                if !status.success() {
                    return Err(RenderError::ProcessFailed {
                        program: process.program.clone(),
                        status,
                    });
                }
                written?;
                flushed?;
                Ok(())
            }
        }
    }
}

fn quote(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Builds the gnuplot preamble declaring one inline series per title.
pub fn plot_script(
    layout: &PlotLayout,
    terminal: PlotTerminal,
    output: &Path,
    titles: &[&str],
) -> String {
    let mut script = String::from("set autoscale\n");
    if layout.log_x {
        script.push_str("set logscale x\n");
    }
    script.push_str(&format!("set xlabel {}\n", quote(&layout.xlabel)));
    script.push_str(&format!("set ylabel {}\n", quote(&layout.ylabel)));
    script.push_str(&format!("set key {}\n", layout.key));
    script.push_str(&format!("set term {}\n", terminal.gnuplot_name()));
    script.push_str(&format!(
        "set output {}\n",
        quote(&output.to_string_lossy())
    ));

    let plots: Vec<String> = titles
        .iter()
        .map(|title| format!("\"-\" title {} with lines", quote(title)))
        .collect();
    script.push_str("plot ");
    script.push_str(&plots.join(", \\\n     "));
    script.push('\n');
    script
}

/// Writes each series as `x y` rows followed by the `e` sentinel.
pub fn write_series_data<W: Write + ?Sized>(writer: &mut W, series: &[Series]) -> io::Result<()> {
    for s in series {
        for &(x, y) in &s.points {
            writeln!(writer, "{} {}", x, y)?;
        }
        writer.write_all(b"e\n")?;
    }
    Ok(())
}

fn write_feed(
    sink: &mut Sink,
    series: &[Series],
    layout: &PlotLayout,
    kind: OutputKind,
    output: &Path,
) -> io::Result<()> {
    let writer = sink.writer()?;
    if let OutputKind::Plot(terminal) = kind {
        let titles: Vec<&str> = series.iter().map(|s| s.title.as_str()).collect();
        writer.write_all(plot_script(layout, terminal, output, &titles).as_bytes())?;
    }
    write_series_data(writer, series)
}

/// Renders arbitrary series to `output`.
///
/// For plot kinds the feed goes to `command`'s stdin, which is closed before
/// waiting for the process; success is reported only after it exits cleanly.
pub fn render_series(
    series: &[Series],
    layout: &PlotLayout,
    kind: OutputKind,
    output: &Path,
    command: &PlotCommand,
) -> RenderResult<()> {
    log::info!(
        "Rendering {} series to {} ({})",
        series.len(),
        output.display(),
        kind
    );

    let mut sink = Sink::open(kind, output, command)?;
    let written = write_feed(&mut sink, series, layout, kind, output);
    sink.finish(written)
}

/// Builds the `blocks` and `sequences` series, dropping lengths above `max_length`.
pub fn length_series(state: &AggregateState, max_length: Option<usize>) -> Vec<Series> {
    vec![
        Series::new("blocks", state.block_lengths.iter_up_to(max_length).collect()),
        Series::new(
            "sequences",
            state.sequence_lengths.iter_up_to(max_length).collect(),
        ),
    ]
}

/// Renders the block and sequence length distributions of `state`.
pub fn render_histograms(
    state: &AggregateState,
    kind: OutputKind,
    output: &Path,
    max_length: Option<usize>,
    command: &PlotCommand,
) -> RenderResult<()> {
    let series = length_series(state, max_length);
    render_series(
        &series,
        &PlotLayout::length_distribution(),
        kind,
        output,
        command,
    )
}
