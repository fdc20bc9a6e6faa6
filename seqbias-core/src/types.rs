use std::cmp::Ordering;

use bio::bio_types::strand::ReqStrand;
use thiserror::Error;

/// A single aggregated read-start record.
///
/// One record per distinct `(tid, pos, strand)` key seen in the alignment
/// stream, with `count` holding the number of duplicate reads folded into it.
/// `pos` is the strand-aware 5' genomic position: the leftmost aligned base on
/// the forward strand, the rightmost aligned base on the reverse strand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPos {
    /// Reference sequence index from the alignment header
    pub tid: u32,
    /// 0-based 5' genomic position
    pub pos: i64,
    /// Strand the read aligned to
    pub strand: ReqStrand,
    /// Number of reads sharing this start position
    pub count: u32,
}

impl ReadPos {
    /// Comparator ordering records by reference sequence index, ascending.
    ///
    /// Used to group records by chromosome so each reference sequence is
    /// loaded at most once during a scan.
    #[must_use]
    pub fn by_tid(a: &Self, b: &Self) -> Ordering {
        a.tid.cmp(&b.tid)
    }

    /// Comparator ordering records by duplicate count, descending.
    #[must_use]
    pub fn by_count_desc(a: &Self, b: &Self) -> Ordering {
        b.count.cmp(&a.count)
    }
}

/// Parse a single-character strand specification.
///
/// # Errors
///
/// Returns [`SeqBiasError::InvalidInput`] for anything other than `+` or `-`.
pub fn strand_from_char(c: char) -> Result<ReqStrand, SeqBiasError> {
    match c {
        '+' => Ok(ReqStrand::Forward),
        '-' => Ok(ReqStrand::Reverse),
        other => Err(SeqBiasError::InvalidInput(format!(
            "strand must be '+' or '-', got '{other}'"
        ))),
    }
}

/// Single-character rendering of a strand, `+` or `-`.
#[must_use]
pub const fn strand_char(strand: ReqStrand) -> char {
    match strand {
        ReqStrand::Forward => '+',
        ReqStrand::Reverse => '-',
    }
}

/// Error types surfaced by bias estimation and prediction.
#[derive(Error, Debug)]
pub enum SeqBiasError {
    /// A required input file is absent or unreadable
    #[error("missing input: {0}")]
    MissingInput(String),
    /// An argument is outside its valid domain (empty interval, bad strand,
    /// unknown reference sequence, ...)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A k-mer extraction reached past the end of the stored sequence
    #[error("k-mer of length {k} anchored at {pos} lies outside a sequence of length {len}")]
    ShortSequence { pos: usize, k: usize, len: usize },
    /// Error parsing input data or a model file
    #[error("parse error: {0}")]
    Parse(String),
    /// File I/O operation failed mid-scan
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
