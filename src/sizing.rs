//! Client for the external bit-vector sizing tool.
//!
//! The tool is invoked as `<tool> /dev/stdin <kind>`, reads a gapped
//! sequence on stdin and prints the size in bytes of the chosen bit-vector
//! implementation as a single decimal line. One process is spawned per
//! measurement.

use std::ffi::OsString;
use std::fmt;
use std::io::{self, BufRead, BufReader, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::str::FromStr;

use rand::Rng;
use thiserror::Error;

use crate::model::GAP;
use crate::render::Series;

/// Errors that can occur while measuring.
#[derive(Error, Debug)]
pub enum SizingError {
    #[error("I/O error talking to sizing tool: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{program}` exited with {status}")]
    ProcessFailed { program: String, status: ExitStatus },

    #[error("Sizing tool printed {0:?}, expected a byte count")]
    InvalidOutput(String),

    #[error("Unknown bit-vector implementation '{0}' (expected one of RG2 RG3 RG4 RG20 RRR SDArray)")]
    UnknownKind(String),
}

/// Result type for sizing operations.
pub type SizingResult<T> = Result<T, SizingError>;

/// Bit-vector implementations understood by the sizing tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BitSequenceKind {
    Rg2,
    Rg3,
    Rg4,
    Rg20,
    Rrr,
    SdArray,
}

impl BitSequenceKind {
    /// Every implementation, in the order they are plotted by default.
    pub const ALL: [BitSequenceKind; 6] = [
        BitSequenceKind::Rg2,
        BitSequenceKind::Rg3,
        BitSequenceKind::Rg4,
        BitSequenceKind::Rg20,
        BitSequenceKind::Rrr,
        BitSequenceKind::SdArray,
    ];

    /// Name passed on the tool's command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            BitSequenceKind::Rg2 => "RG2",
            BitSequenceKind::Rg3 => "RG3",
            BitSequenceKind::Rg4 => "RG4",
            BitSequenceKind::Rg20 => "RG20",
            BitSequenceKind::Rrr => "RRR",
            BitSequenceKind::SdArray => "SDArray",
        }
    }
}

impl fmt::Display for BitSequenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BitSequenceKind {
    type Err = SizingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SizingError::UnknownKind(s.to_string()))
    }
}

/// Handle on the external sizing tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizingTool {
    pub program: OsString,
    /// Arguments placed before `/dev/stdin <kind>`
    pub leading_args: Vec<OsString>,
}

impl SizingTool {
    /// Runs `program` as `<program> /dev/stdin <kind>`.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Appends an argument placed before `/dev/stdin <kind>`.
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.leading_args.push(arg.into());
        self
    }

    /// Measures the size in bytes of `kind` built over `sequence`.
    ///
    /// Stdin is closed before the output line is read and the process is
    /// reaped before the result is parsed.
    pub fn measure(&self, sequence: &[u8], kind: BitSequenceKind) -> SizingResult<u64> {
        let program = self.program.to_string_lossy().into_owned();
        let mut child = Command::new(&self.program)
            .args(&self.leading_args)
            .arg("/dev/stdin")
            .arg(kind.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|source| SizingError::Spawn {
                program: program.clone(),
                source,
            })?;

        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(sequence),
            None => Ok(()),
        };

        let mut line = String::new();
        let read = match child.stdout.take() {
            Some(stdout) => BufReader::new(stdout).read_line(&mut line).map(|_| ()),
            None => Ok(()),
        };

        let status = child.wait()?;
        if !status.success() {
            return Err(SizingError::ProcessFailed { program, status });
        }
        written?;
        read?;

        let trimmed = line.trim();
        trimmed
            .parse::<u64>()
            .map_err(|_| SizingError::InvalidOutput(trimmed.to_string()))
    }
}

/// Builds a random `a`/`-` sequence of `length` characters.
///
/// Each position is a gap when a uniform draw in `[0, 1)` exceeds `density`.
pub fn random_gapped_sequence<R: Rng>(length: usize, density: f64, rng: &mut R) -> Vec<u8> {
    (0..length)
        .map(|_| {
            if rng.random::<f64>() > density {
                GAP
            } else {
                b'a'
            }
        })
        .collect()
}

/// Measures every kind over random sequences of each length.
///
/// Returns one series per kind, titled with the kind's name, holding
/// `(length, size)` points in the order of `lengths`.
pub fn assess<R, I>(
    tool: &SizingTool,
    kinds: &[BitSequenceKind],
    lengths: I,
    density: f64,
    rng: &mut R,
) -> SizingResult<Vec<Series>>
where
    R: Rng,
    I: IntoIterator<Item = usize> + Clone,
{
    let mut results = Vec::with_capacity(kinds.len());

    for &kind in kinds {
        let mut points = Vec::new();
        for length in lengths.clone() {
            let sequence = random_gapped_sequence(length, density, rng);
            points.push((length, tool.measure(&sequence, kind)?));
        }
        log::info!("{} finished ({} measurements)", kind, points.len());
        results.push(Series::new(kind.as_str(), points));
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    /// Stand-in tool that reports the byte count of its input file.
    #[cfg(unix)]
    fn byte_counting_tool() -> SizingTool {
        SizingTool::new("sh")
            .arg("-c")
            .arg("wc -c < \"$1\"")
            .arg("sizing-tool")
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in BitSequenceKind::ALL {
            assert_eq!(kind.as_str().parse::<BitSequenceKind>().unwrap(), kind);
        }
        assert!(matches!(
            "RG5".parse::<BitSequenceKind>(),
            Err(SizingError::UnknownKind(_))
        ));
    }

    #[test]
    fn test_random_gapped_sequence() {
        let mut rng = StdRng::seed_from_u64(7);
        let seq = random_gapped_sequence(500, 0.9, &mut rng);

        assert_eq!(seq.len(), 500);
        assert!(seq.iter().all(|&b| b == b'a' || b == GAP));

        let all_gaps = random_gapped_sequence(50, -1.0, &mut rng);
        assert!(all_gaps.iter().all(|&b| b == GAP));
        let no_gaps = random_gapped_sequence(50, 1.0, &mut rng);
        assert!(no_gaps.iter().all(|&b| b == b'a'));
    }

    #[cfg(unix)]
    #[test]
    fn test_measure_reads_single_line() {
        let tool = byte_counting_tool();
        let size = tool.measure(b"aa-a-aaa", BitSequenceKind::Rrr).unwrap();
        assert_eq!(size, 8);
    }

    #[cfg(unix)]
    #[test]
    fn test_measure_passes_kind_argument() {
        let tool = SizingTool::new("sh")
            .arg("-c")
            .arg("cat > /dev/null; [ \"$2\" = SDArray ] && echo 42")
            .arg("sizing-tool");
        assert_eq!(tool.measure(b"a-a", BitSequenceKind::SdArray).unwrap(), 42);
        assert!(matches!(
            tool.measure(b"a-a", BitSequenceKind::Rg2),
            Err(SizingError::ProcessFailed { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_measure_invalid_output() {
        let tool = SizingTool::new("sh")
            .arg("-c")
            .arg("cat > /dev/null; echo not-a-number");
        assert!(matches!(
            tool.measure(b"aaa", BitSequenceKind::Rg2),
            Err(SizingError::InvalidOutput(ref s)) if s == "not-a-number"
        ));
    }

    #[test]
    fn test_measure_missing_tool() {
        let tool = SizingTool::new("mafstats-no-such-sizing-tool");
        assert!(matches!(
            tool.measure(b"aaa", BitSequenceKind::Rg2),
            Err(SizingError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_assess_builds_one_series_per_kind() {
        let mut rng = StdRng::seed_from_u64(1);
        let kinds = [BitSequenceKind::Rg2, BitSequenceKind::Rrr];

        let series = assess(&byte_counting_tool(), &kinds, (10..=30).step_by(10), 0.9, &mut rng).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].title, "RG2");
        assert_eq!(series[1].title, "RRR");
        assert_eq!(series[0].points, vec![(10, 10), (20, 20), (30, 30)]);
    }
}
