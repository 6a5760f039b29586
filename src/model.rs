//! Data model for MAF alignment blocks.
//!
//! This module contains the typed records produced by the parser:
//! - Sequence records (one `s` line each)
//! - Alignment blocks (one `a` section each)
//!
//! Everything else in a MAF file (scores, quality lines, context lines)
//! is outside the model and never stored.

/// The character used for alignment gaps.
pub const GAP: u8 = b'-';

/// A single aligned sequence line within a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceRecord {
    /// Source identifier (second field of the `s` line, e.g. `hg38.chr1`)
    pub id: String,
    /// Aligned text, bases plus gap characters
    text: String,
}

impl SequenceRecord {
    /// Creates a new sequence record.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }

    /// Returns the aligned text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the aligned length, gaps included.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns true if the aligned text is empty.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Counts the gap characters in the aligned text.
    pub fn gap_count(&self) -> usize {
        self.text.bytes().filter(|&b| b == GAP).count()
    }
}

/// One alignment event: the sequence records found under an `a` line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentBlock {
    /// Sequence records in file order
    pub sequences: Vec<SequenceRecord>,
}

impl AlignmentBlock {
    /// Creates an empty block.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a block from already parsed records.
    pub fn from_sequences(sequences: Vec<SequenceRecord>) -> Self {
        Self { sequences }
    }

    /// Appends a record to the block.
    pub fn push(&mut self, record: SequenceRecord) {
        self.sequences.push(record);
    }

    /// Returns the number of sequence records.
    pub fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    /// Returns true if the block holds no sequence records.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Block length: the aligned length of the first record, if any.
    pub fn length(&self) -> Option<usize> {
        self.sequences.first().map(SequenceRecord::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_record_counts() {
        let record = SequenceRecord::new("seq1", "AAA--A");
        assert_eq!(record.len(), 6);
        assert_eq!(record.gap_count(), 2);
        assert_eq!(record.text(), "AAA--A");
        assert!(!record.is_empty());
    }

    #[test]
    fn test_block_length_uses_first_record() {
        let block = AlignmentBlock::from_sequences(vec![
            SequenceRecord::new("a", "ACGT"),
            SequenceRecord::new("b", "ACGTAC"),
        ]);
        assert_eq!(block.length(), Some(4));
        assert_eq!(block.sequence_count(), 2);
    }

    #[test]
    fn test_empty_block_has_no_length() {
        let block = AlignmentBlock::new();
        assert!(block.is_empty());
        assert_eq!(block.length(), None);
    }
}
