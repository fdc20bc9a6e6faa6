//! Aggregation of alignments into read-start counts.
//!
//! Every ingested alignment collapses to its strand-aware 5' genomic position
//! (leftmost aligned base on `+`, rightmost on `-`); duplicates fold into a
//! single record with a count. Only primary, ungapped alignments are kept: a
//! read whose CIGAR is anything other than a single aligned block is
//! discarded before it reaches the table.

use std::path::Path;

use bio::bio_types::strand::ReqStrand;
use rust_htslib::bam::{self, Read};
use rustc_hash::FxHashMap;

use crate::types::{ReadPos, SeqBiasError};

/// Hash table mapping `(tid, pos, strand)` to a duplicate count.
///
/// Grows without bound during ingest; [`PosTable::dump`] is the read-only
/// exit point. Not safe for concurrent insertion.
#[derive(Debug, Default)]
pub struct PosTable {
    counts: FxHashMap<(u32, i64, ReqStrand), u32>,
    seq_names: Vec<String>,
}

impl PosTable {
    /// Create an empty table over the given reference sequence names,
    /// indexed by `tid`.
    #[must_use]
    pub fn new(seq_names: Vec<String>) -> Self {
        Self {
            counts: FxHashMap::default(),
            seq_names,
        }
    }

    /// Build a table from a BAM file, keeping only primary alignments whose
    /// CIGAR is a single aligned block.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::MissingInput`] if the file cannot be opened,
    /// [`SeqBiasError::Parse`] on a malformed record.
    pub fn from_bam<P: AsRef<Path>>(path: P) -> Result<Self, SeqBiasError> {
        let path = path.as_ref();
        let mut reader = bam::Reader::from_path(path).map_err(|e| {
            SeqBiasError::MissingInput(format!("can't open BAM file {}: {e}", path.display()))
        })?;

        let seq_names = reader
            .header()
            .target_names()
            .iter()
            .map(|name| String::from_utf8_lossy(name).into_owned())
            .collect();
        let mut table = Self::new(seq_names);

        let mut scanned: u64 = 0;
        let mut record = bam::Record::new();
        while let Some(result) = reader.read(&mut record) {
            result.map_err(|e| SeqBiasError::Parse(format!("BAM read error: {e}")))?;

            if record.is_unmapped() || record.is_secondary() || record.is_supplementary() {
                continue;
            }
            if record.cigar().len() != 1 {
                continue;
            }

            let tid = record.tid();
            if tid < 0 {
                continue;
            }
            let (pos, strand) = if record.is_reverse() {
                (record.cigar().end_pos() - 1, ReqStrand::Reverse)
            } else {
                (record.pos(), ReqStrand::Forward)
            };
            table.insert(tid as u32, pos, strand);

            scanned += 1;
            if scanned % 1_000_000 == 0 {
                log::info!("hashed {scanned} reads");
            }
        }
        log::info!("hashed {scanned} reads");

        Ok(table)
    }

    /// Increment the counter for `(tid, pos, strand)`, creating it on first
    /// insertion.
    pub fn insert(&mut self, tid: u32, pos: i64, strand: ReqStrand) {
        *self.counts.entry((tid, pos, strand)).or_insert(0) += 1;
    }

    /// Number of distinct read-start positions held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Reference sequence name for a `tid`, if known.
    #[must_use]
    pub fn seq_name(&self, tid: u32) -> Option<&str> {
        self.seq_names.get(tid as usize).map(String::as_str)
    }

    /// All reference sequence names, indexed by `tid`.
    #[must_use]
    pub fn seq_names(&self) -> &[String] {
        &self.seq_names
    }

    /// Flatten the table into records, at most `limit` of them.
    ///
    /// No ordering is guaranteed; callers sort with the [`ReadPos`]
    /// comparators as needed.
    #[must_use]
    pub fn dump(&self, limit: usize) -> Vec<ReadPos> {
        self.counts
            .iter()
            .take(limit)
            .map(|(&(tid, pos, strand), &count)| ReadPos {
                tid,
                pos,
                strand,
                count,
            })
            .collect()
    }
}
