//! Read counting over genomic intervals, with optional bias correction.
//!
//! Counting anchors every read at its strand-aware 5' position, exactly like
//! the read-start table, and optionally divides each read's contribution by
//! the model's bias at that position so the result tracks abundance instead
//! of raw starts. Also hosts the per-position k-mer frequency tabulation
//! used to assess how biased a read set looks before and after correction.

use std::path::Path;

use bio::bio_types::strand::ReqStrand;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256StarStar;
use rust_htslib::bam::{self, Read};

use crate::bias::SequencingBias;
use crate::config::{DEFAULT_SEED, MAX_DUMP};
use crate::kmer_matrix::KmerMatrix;
use crate::pos_table::PosTable;
use crate::sequence::io::Reference;
use crate::sequence::{reverse_complement, TwoBitSeq};
use crate::types::{ReadPos, SeqBiasError};

/// Count read starts per position of a 1-based inclusive interval.
///
/// Each read contributes at its 5' position: `1.0` without a model, `1.0 /
/// bias` with one. When `strand` is given, reads on the other strand are
/// ignored and the returned vector runs 5' to 3' along the requested strand
/// (reversed for `-`); without a strand filter both orientations accumulate
/// and the vector stays in ascending genomic order. In `binary` mode each
/// position counts at most one read.
///
/// A sequence name absent from the BAM header yields all zeros, matching an
/// index query for an unknown region.
///
/// # Errors
///
/// [`SeqBiasError::MissingInput`] when the BAM or its index cannot be
/// opened, [`SeqBiasError::InvalidInput`] for a bad interval.
pub fn count_reads<P: AsRef<Path>>(
    reads_path: P,
    model: Option<&SequencingBias>,
    seqname: &str,
    start: i64,
    end: i64,
    strand: Option<ReqStrand>,
    binary: bool,
) -> Result<Vec<f64>, SeqBiasError> {
    if start < 1 {
        return Err(SeqBiasError::InvalidInput(
            "interval start must be positive".into(),
        ));
    }
    if end < start {
        return Err(SeqBiasError::InvalidInput(format!(
            "empty interval [{start}, {end}]"
        )));
    }
    let (start, end) = (start - 1, end - 1);
    let n_out = (end - start + 1) as usize;
    let mut counts = vec![0.0; n_out];

    let reads_path = reads_path.as_ref();
    let mut reader = bam::IndexedReader::from_path(reads_path).map_err(|e| {
        SeqBiasError::MissingInput(format!(
            "can't open indexed BAM file {}: {e}",
            reads_path.display()
        ))
    })?;

    let Some(tid) = reader.header().tid(seqname.as_bytes()) else {
        return Ok(counts);
    };

    // per-strand bias over the interval, in ascending genomic order
    let bias = match model {
        Some(model) => {
            let forward = if strand != Some(ReqStrand::Reverse) {
                Some(model.get_bias(seqname, start, end, ReqStrand::Forward)?)
            } else {
                None
            };
            let reverse = if strand != Some(ReqStrand::Forward) {
                Some(model.get_bias(seqname, start, end, ReqStrand::Reverse)?)
            } else {
                None
            };
            Some((forward, reverse))
        }
        None => None,
    };

    reader
        .fetch((tid, start, end + 1))
        .map_err(|e| SeqBiasError::Parse(format!("BAM region query failed: {e}")))?;

    let mut seen = vec![false; n_out];
    let mut record = bam::Record::new();
    while let Some(result) = reader.read(&mut record) {
        result.map_err(|e| SeqBiasError::Parse(format!("BAM read error: {e}")))?;
        if record.is_unmapped() || record.is_secondary() || record.is_supplementary() {
            continue;
        }

        let read_strand = if record.is_reverse() {
            ReqStrand::Reverse
        } else {
            ReqStrand::Forward
        };
        if let Some(wanted) = strand {
            if read_strand != wanted {
                continue;
            }
        }

        let pos = if record.is_reverse() {
            record.cigar().end_pos() - 1
        } else {
            record.pos()
        };
        if pos < start || pos > end {
            continue;
        }
        let index = (pos - start) as usize;

        if binary && seen[index] {
            continue;
        }
        seen[index] = true;

        let weight = match &bias {
            Some((forward, reverse)) => {
                let per_strand = match read_strand {
                    ReqStrand::Forward => forward,
                    ReqStrand::Reverse => reverse,
                };
                per_strand.as_ref().map_or(1.0, |b| 1.0 / b[index])
            }
            None => 1.0,
        };
        counts[index] += weight;
    }

    if strand == Some(ReqStrand::Reverse) {
        counts.reverse();
    }
    Ok(counts)
}

/// Total read count over an interval; the scalar form of [`count_reads`].
///
/// # Errors
///
/// See [`count_reads`].
pub fn count_reads_total<P: AsRef<Path>>(
    reads_path: P,
    model: Option<&SequencingBias>,
    seqname: &str,
    start: i64,
    end: i64,
    strand: Option<ReqStrand>,
    binary: bool,
) -> Result<f64, SeqBiasError> {
    Ok(count_reads(reads_path, model, seqname, start, end, strand, binary)?
        .iter()
        .sum())
}

/// Per-position k-mer frequencies around read starts, with the divergence of
/// each window position from the window-wide background composition.
#[derive(Debug)]
pub struct KmerFrequencies {
    /// Row per window position, column per k-mer, normalized to frequencies.
    pub frequencies: KmerMatrix,
    /// Symmetric KL divergence of each position against the window-wide
    /// k-mer distribution.
    pub divergence: Vec<f64>,
}

/// Tabulate k-mer frequencies in windows `[pos - left, pos + right]` around
/// read starts.
///
/// Positions with duplicate reads are preferred when the read set is large
/// enough (at least 10,000 duplicated positions), since duplicates are the
/// strongest sign of start-site preference; otherwise every position
/// contributes. At most `max_reads` positions are scanned.
///
/// # Errors
///
/// [`SeqBiasError::MissingInput`] when either file cannot be opened.
pub fn kmer_frequencies<P: AsRef<Path>, Q: AsRef<Path>>(
    ref_path: P,
    reads_path: Q,
    left: usize,
    right: usize,
    k: usize,
    max_reads: usize,
) -> Result<KmerFrequencies, SeqBiasError> {
    let window = left + 1 + right;
    let mut frequencies = KmerMatrix::new(window, k);
    let mut reference = Reference::open(ref_path)?;
    let mut rng = Xoshiro256StarStar::seed_from_u64(DEFAULT_SEED);

    let table = PosTable::from_bam(reads_path)?;
    let mut sample = table.dump(MAX_DUMP);
    sample.sort_by(ReadPos::by_count_desc);

    let duplicated = sample.partition_point(|r| r.count > 1);
    let mut max_reads = max_reads;
    if duplicated > 10_000 {
        log::info!("{duplicated} read positions with duplicates");
        max_reads = max_reads.min(duplicated);
        sample.truncate(duplicated);
    }
    sample.truncate(max_reads);
    sample.sort_by(ReadPos::by_tid);

    let mut curr_tid: Option<u32> = None;
    let mut chrom: Option<Vec<u8>> = None;

    for record in &sample {
        if curr_tid != Some(record.tid) {
            let name = table.seq_name(record.tid).unwrap_or("");
            chrom = reference.fetch_all(name);
            if chrom.is_some() {
                log::info!("read sequence {name}");
            } else {
                log::warn!("reference sequence {name} not found, skipping its reads");
            }
            curr_tid = Some(record.tid);
        }
        let Some(chrom) = chrom.as_deref() else {
            continue;
        };

        // widen the window so a full k-mer ends at its first position
        let len = chrom.len() as i64;
        let (lo, hi) = match record.strand {
            ReqStrand::Forward => (
                record.pos - left as i64 - (k as i64 - 1),
                record.pos + right as i64,
            ),
            ReqStrand::Reverse => (
                record.pos - right as i64,
                record.pos + left as i64 + (k as i64 - 1),
            ),
        };
        if lo < 0 || hi >= len {
            continue;
        }
        let mut text = chrom[lo as usize..=hi as usize].to_vec();
        if record.strand == ReqStrand::Reverse {
            reverse_complement(&mut text);
        }

        let packed = TwoBitSeq::from_ascii(&text, &mut rng);
        for offset in 0..window {
            let kmer = packed
                .get_kmer(k, offset + k - 1)
                .expect("window sized to fit every k-mer");
            frequencies.add(offset, kmer, 1.0);
        }
    }

    // window-wide background composition
    let mut background = vec![0.0; frequencies.ncols()];
    for row in 0..frequencies.nrows() {
        for (kmer, total) in background.iter_mut().enumerate() {
            *total += frequencies.get(row, kmer as u64);
        }
    }
    let total: f64 = background.iter().sum();
    if total > 0.0 {
        for value in &mut background {
            *value /= total;
        }
    }

    frequencies.make_distribution();

    let divergence = (0..frequencies.nrows())
        .map(|row| {
            let mut kl = 0.0;
            for (kmer, &bg) in background.iter().enumerate() {
                let fg = frequencies.get(row, kmer as u64);
                if fg > 0.0 && bg > 0.0 {
                    let log_ratio = (fg / bg).ln();
                    kl += fg * log_ratio;
                    kl -= bg * log_ratio;
                }
            }
            kl
        })
        .collect();

    Ok(KmerFrequencies {
        frequencies,
        divergence,
    })
}
