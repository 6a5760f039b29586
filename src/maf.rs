//! MAF block parser.
//!
//! This module turns a line stream into a lazy sequence of alignment blocks.
//! Only the fields needed for structural statistics are read.
//!
//! ## MAF Subset
//!
//! ```text
//! ##maf version=1
//! a score=23262.0
//! s hg16.chr7    27578828 38 + 158545518 AAA-GGGAATGTTAACCAAATGA---ATTGTCTCTTACGGTG
//! s panTro1.chr6 28741140 38 + 161576975 AAA-GGGAATGTTAACCAAATGA---ATTGTCTCTTACGGTG
//! ```
//!
//! A line starting with the `a` marker opens a block, a line starting with
//! the `s` marker adds a record to the open block. Every other line, indented
//! ones included, is ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use thiserror::Error;

use crate::model::{AlignmentBlock, SequenceRecord};

/// Errors that can occur during MAF parsing.
#[derive(Error, Debug)]
pub enum MafError {
    #[error("Failed to read MAF input: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Malformed sequence line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },
}

/// Result type for MAF operations.
pub type MafResult<T> = Result<T, MafError>;

/// What a single MAF line contributes to the block stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    BlockStart,
    Sequence,
    Ignored,
}

/// True if `line` starts with `marker` followed by whitespace or nothing.
fn starts_with_marker(line: &[u8], marker: u8) -> bool {
    line.first() == Some(&marker) && line.get(1).map_or(true, u8::is_ascii_whitespace)
}

fn classify_line(line: &[u8]) -> LineKind {
    if starts_with_marker(line, b'a') {
        LineKind::BlockStart
    } else if starts_with_marker(line, b's') {
        LineKind::Sequence
    } else {
        LineKind::Ignored
    }
}

/// Parses an `s` line into a record.
///
/// The identifier is the second field and the aligned text the last one.
/// Start, size, strand and source size are not interpreted.
pub fn parse_sequence_line(line: &str, line_number: usize) -> MafResult<SequenceRecord> {
    let mut fields = line.split_whitespace();
    fields.next();

    let id = fields.next().ok_or_else(|| MafError::MalformedLine {
        line: line_number,
        reason: "missing source identifier".to_string(),
    })?;
    let text = fields.last().unwrap_or(id);

    Ok(SequenceRecord::new(id, text))
}

/// Lazy, single-pass iterator over the blocks of a MAF stream.
///
/// A block is yielded once the next `a` line or the end of input is reached.
/// Sequence lines seen before any `a` line form an implicit first block.
/// Malformed sequence lines, including ones that are not valid UTF-8, are
/// logged and skipped. Other lines are never decoded.
pub struct MafBlocks<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: usize,
    current: Option<AlignmentBlock>,
    malformed: usize,
    done: bool,
}

impl<R: BufRead> MafBlocks<R> {
    /// Creates a block iterator over a buffered reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_number: 0,
            current: None,
            malformed: 0,
            done: false,
        }
    }

    /// Number of lines consumed so far.
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Number of sequence lines skipped as malformed so far.
    pub fn malformed_lines(&self) -> usize {
        self.malformed
    }

    fn add_sequence_line(&mut self) {
        let line_number = self.line_number;
        let parsed = std::str::from_utf8(&self.buf)
            .map_err(|_| MafError::MalformedLine {
                line: line_number,
                reason: "not valid UTF-8".to_string(),
            })
            .and_then(|line| parse_sequence_line(line, line_number));

        match parsed {
            Ok(record) => {
                self.current
                    .get_or_insert_with(|| {
                        log::debug!(
                            "Sequence line {} precedes any block start, opening implicit block",
                            line_number
                        );
                        AlignmentBlock::new()
                    })
                    .push(record);
            }
            Err(e) => {
                self.malformed += 1;
                log::warn!("Skipping {}", e);
            }
        }
    }
}

impl<R: BufRead> Iterator for MafBlocks<R> {
    type Item = MafResult<AlignmentBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => {
                    self.done = true;
                    return self.current.take().map(Ok);
                }
                Ok(_) => self.line_number += 1,
                Err(e) => {
                    self.done = true;
                    return Some(Err(MafError::IoError(e)));
                }
            }

            match classify_line(&self.buf) {
                LineKind::BlockStart => {
                    if let Some(block) = self.current.replace(AlignmentBlock::new()) {
                        return Some(Ok(block));
                    }
                }
                LineKind::Sequence => self.add_sequence_line(),
                LineKind::Ignored => {}
            }
        }
    }
}

/// Creates a block iterator over any buffered reader.
pub fn maf_blocks<R: BufRead>(reader: R) -> MafBlocks<R> {
    MafBlocks::new(reader)
}

/// Creates a block iterator over in-memory MAF content.
///
/// Useful for testing or processing small snippets.
pub fn maf_blocks_str(content: &str) -> MafBlocks<&[u8]> {
    MafBlocks::new(content.as_bytes())
}

/// Opens a MAF file and returns a block iterator over it.
///
/// Files ending in `.gz` are decompressed on the fly.
///
/// # Examples
///
/// ```no_run
/// use mafstats::maf::open_maf_file;
///
/// let blocks = open_maf_file("alignment.maf").unwrap();
/// println!("Read {} blocks", blocks.count());
/// ```
pub fn open_maf_file<P: AsRef<Path>>(path: P) -> MafResult<MafBlocks<Box<dyn BufRead>>> {
    let path = path.as_ref();
    let file = File::open(path)?;

    let reader: Box<dyn BufRead> = if path.extension().is_some_and(|ext| ext == "gz") {
        log::debug!("Reading {} as gzip", path.display());
        Box::new(BufReader::with_capacity(
            1024 * 1024,
            MultiGzDecoder::new(file),
        ))
    } else {
        Box::new(BufReader::with_capacity(1024 * 1024, file))
    };

    Ok(MafBlocks::new(reader))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::GzEncoder;
    use flate2::Compression;

    use super::*;

    fn collect(content: &str) -> Vec<AlignmentBlock> {
        maf_blocks_str(content)
            .collect::<MafResult<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn test_parse_single_block() {
        let blocks = collect("a score=0\ns seq1 AAA--A\ns seq2 A-AAAA\n");

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sequence_count(), 2);
        assert_eq!(blocks[0].sequences[0].id, "seq1");
        assert_eq!(blocks[0].sequences[0].text(), "AAA--A");
        assert_eq!(blocks[0].sequences[1].id, "seq2");
        assert_eq!(blocks[0].sequences[1].text(), "A-AAAA");
    }

    #[test]
    fn test_full_sequence_line_uses_last_field() {
        let content = "##maf version=1\n\
                       a score=23262.0\n\
                       s hg16.chr7    27578828 38 + 158545518 AAA-GGGAATG\n\
                       s panTro1.chr6 28741140 38 + 161576975 AAA-GGGAATG   \n";
        let blocks = collect(content);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sequences[0].id, "hg16.chr7");
        assert_eq!(blocks[0].sequences[1].text(), "AAA-GGGAATG");
    }

    #[test]
    fn test_multiple_blocks() {
        let blocks = collect("a\ns x ACGT\ns y AC-T\n\na\ns x ACGTAC\n");

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].length(), Some(4));
        assert_eq!(blocks[1].length(), Some(6));
    }

    #[test]
    fn test_ignores_other_lines() {
        let content = "# comment\na score=1\ns x ACGT\nq x 9999\ni x C 0 C 0\ne y 0 10 + 100 I\n\n";
        let blocks = collect(content);

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sequence_count(), 1);
    }

    #[test]
    fn test_orphan_sequences_form_implicit_block() {
        let blocks = collect("s x ACG\ns y A-G\na\ns z ACGTT\n");

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].sequence_count(), 2);
        assert_eq!(blocks[0].length(), Some(3));
        assert_eq!(blocks[1].length(), Some(5));
    }

    #[test]
    fn test_consecutive_block_starts_yield_empty_block() {
        let blocks = collect("a\na\ns x ACGT\n");

        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].is_empty());
        assert_eq!(blocks[1].sequence_count(), 1);
    }

    #[test]
    fn test_malformed_line_is_skipped() {
        let mut blocks = maf_blocks_str("a\ns\ns x ACGT\n");
        let block = blocks.next().unwrap().unwrap();

        assert_eq!(block.sequence_count(), 1);
        assert!(blocks.next().is_none());
        assert_eq!(blocks.malformed_lines(), 1);
        assert_eq!(blocks.line_number(), 3);
    }

    #[test]
    fn test_invalid_utf8_in_ignored_line() {
        let content: &[u8] = b"a\ns x ACGT\n# comment caf\xe9\na\ns y AC-T\n";
        let blocks: Vec<_> = maf_blocks(content).collect::<MafResult<_>>().unwrap();

        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].sequences[0].id, "x");
        assert_eq!(blocks[1].sequences[0].text(), "AC-T");
    }

    #[test]
    fn test_invalid_utf8_sequence_line_is_skipped() {
        let content: &[u8] = b"a\ns caf\xe9 ACGT\ns y AC\n";
        let mut blocks = maf_blocks(content);
        let block = blocks.next().unwrap().unwrap();

        assert_eq!(block.sequence_count(), 1);
        assert_eq!(block.sequences[0].id, "y");
        assert_eq!(blocks.malformed_lines(), 1);
    }

    #[test]
    fn test_indented_lines_are_ignored() {
        let blocks = collect("a\n  s x ACGT\ns y AC\n\ta\n");

        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sequence_count(), 1);
        assert_eq!(blocks[0].sequences[0].id, "y");
    }

    #[test]
    fn test_parse_sequence_line_error() {
        let result = parse_sequence_line("s   \n", 7);
        assert!(matches!(result, Err(MafError::MalformedLine { line: 7, .. })));
    }

    #[test]
    fn test_two_field_line_uses_identifier_as_text() {
        let record = parse_sequence_line("s ACGT", 1).unwrap();
        assert_eq!(record.id, "ACGT");
        assert_eq!(record.text(), "ACGT");
    }

    #[test]
    fn test_empty_input() {
        assert!(collect("").is_empty());
        assert!(collect("# only a comment\n").is_empty());
    }

    #[test]
    fn test_tokens_must_match_exactly() {
        // "as" and "score" lines are not block or sequence markers
        let blocks = collect("as x\na\nscore x ACGT\ns x AC\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sequence_count(), 1);
    }

    #[test]
    fn test_open_plain_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "a\ns x ACGT\na\ns y AC\n").unwrap();

        let blocks: Vec<_> = open_maf_file(file.path())
            .unwrap()
            .collect::<MafResult<_>>()
            .unwrap();
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn test_open_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.maf.gz");
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(b"a\ns x AC-T\ns y ACGT\n").unwrap();
        encoder.finish().unwrap();

        let blocks: Vec<_> = open_maf_file(&path)
            .unwrap()
            .collect::<MafResult<_>>()
            .unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].sequences[0].gap_count(), 1);
    }

    #[test]
    fn test_open_missing_file() {
        let result = open_maf_file("/nonexistent/path/input.maf");
        assert!(matches!(result, Err(MafError::IoError(_))));
    }
}
