//! Training and application of sequencing bias models.
//!
//! [`SequencingBias`] ties a trained [`Motif`] to the reference it was
//! trained against. Building walks the read-start table one chromosome at a
//! time, extracts a foreground window around each read start and a couple of
//! Gaussian-offset background windows, and hands the two window sets to the
//! motif learner. Prediction fetches a padded reference slice and scores
//! every anchor position in the requested interval.
//!
//! FASTA and BAM handles are scoped to each call; only one chromosome is
//! resident in memory at a time during a build.

use std::fs;
use std::path::{Path, PathBuf};

use bio::bio_types::strand::ReqStrand;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};

use crate::config::{
    BiasConfig, BG_RETRY_LIMIT, MAX_DUMP, SPARSE_DATA_PENALTY, SPARSE_TRAINING_THRESHOLD,
};
use crate::motif::{Motif, MotifDoc};
use crate::pos_table::PosTable;
use crate::sequence::io::Reference;
use crate::sequence::{reverse_complement, TwoBitSeq};
use crate::types::SeqBiasError;

/// Round a float away from zero.
fn round_away(a: f64) -> f64 {
    if a < 0.0 { a.floor() } else { a.ceil() }
}

/// Cut the window `[pos - left, pos + right]` (forward) or the reverse
/// complement of `[pos - right, pos + left]` (reverse) out of a lower-cased
/// chromosome. Windows that fall off either end or contain an `n` yield
/// `None`.
fn extract_window(
    chrom: &[u8],
    pos: i64,
    strand: ReqStrand,
    left: usize,
    right: usize,
) -> Option<Vec<u8>> {
    let len = chrom.len() as i64;
    let (lo, hi) = match strand {
        ReqStrand::Forward => (pos - left as i64, pos + right as i64),
        ReqStrand::Reverse => (pos - right as i64, pos + left as i64),
    };
    if lo < 0 || hi >= len {
        return None;
    }

    let mut window = chrom[lo as usize..=hi as usize].to_vec();
    if window.contains(&b'n') {
        return None;
    }
    if strand == ReqStrand::Reverse {
        reverse_complement(&mut window);
    }
    Some(window)
}

/// On-disk model document: window extents plus the motif itself.
#[derive(Debug, Serialize, Deserialize)]
struct ModelDoc {
    #[serde(rename = "L")]
    left: usize,
    #[serde(rename = "R")]
    right: usize,
    motif: MotifDoc,
}

/// A sequencing bias model bound to a reference FASTA.
///
/// Immutable once built or loaded; prediction takes `&self` and opens its
/// own reference handle, so one model can back any number of concurrent
/// callers.
#[derive(Debug, Clone)]
pub struct SequencingBias {
    ref_path: PathBuf,
    left: usize,
    right: usize,
    motif: Motif,
}

impl SequencingBias {
    /// Train a model from a reference FASTA and a BAM of aligned reads.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::MissingInput`] when either file cannot be opened,
    /// [`SeqBiasError::InvalidInput`] for an invalid configuration.
    pub fn fit<P: AsRef<Path>, Q: AsRef<Path>>(
        ref_path: P,
        reads_path: Q,
        config: &BiasConfig,
    ) -> Result<Self, SeqBiasError> {
        let table = PosTable::from_bam(reads_path)?;
        Self::from_table(ref_path, &table, config)
    }

    /// Train a model from a prefilled read-start table.
    ///
    /// # Errors
    ///
    /// See [`SequencingBias::fit`].
    pub fn from_table<P: AsRef<Path>>(
        ref_path: P,
        table: &PosTable,
        config: &BiasConfig,
    ) -> Result<Self, SeqBiasError> {
        config.validate()?;
        let ref_path = ref_path.as_ref().to_path_buf();
        let mut rng = Xoshiro256StarStar::seed_from_u64(config.effective_seed());
        let mut reference = Reference::open(&ref_path)?;

        let mut sample = table.dump(MAX_DUMP);
        sample.shuffle(&mut rng);
        sample.truncate(config.max_reads);
        // group by chromosome so each is loaded at most once
        sample.sort_by(crate::types::ReadPos::by_tid);

        let gauss = Normal::new(0.0, config.bg_sigma)
            .map_err(|e| SeqBiasError::InvalidInput(format!("bad background sigma: {e}")))?;

        let mut foreground: Vec<TwoBitSeq> = Vec::new();
        let mut background: Vec<TwoBitSeq> = Vec::new();

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

            let Some(window) =
                extract_window(chrom, record.pos, record.strand, config.left, config.right)
            else {
                continue;
            };
            foreground.push(TwoBitSeq::from_ascii(&window, &mut rng));

            for _ in 0..config.bg_samples {
                for _ in 0..BG_RETRY_LIMIT {
                    let offset = round_away(gauss.sample(&mut rng)) as i64;
                    if let Some(window) = extract_window(
                        chrom,
                        record.pos + offset,
                        record.strand,
                        config.left,
                        config.right,
                    ) {
                        background.push(TwoBitSeq::from_ascii(&window, &mut rng));
                        break;
                    }
                }
            }
        }

        log::info!(
            "training on {} foreground and {} background windows",
            foreground.len(),
            background.len()
        );

        let mut penalty = config.complexity_penalty;
        if foreground.len() < SPARSE_TRAINING_THRESHOLD {
            penalty = SPARSE_DATA_PENALTY;
        }

        let motif = Motif::train(
            &foreground,
            &background,
            config.window_len(),
            config.max_parents,
            config.max_distance,
            penalty,
        );

        Ok(Self {
            ref_path,
            left: config.left,
            right: config.right,
            motif,
        })
    }

    /// Window positions left of the read start.
    #[must_use]
    pub const fn left(&self) -> usize {
        self.left
    }

    /// Window positions right of the read start.
    #[must_use]
    pub const fn right(&self) -> usize {
        self.right
    }

    /// The trained motif.
    #[must_use]
    pub const fn motif(&self) -> &Motif {
        &self.motif
    }

    /// Predict per-base bias over a 1-based inclusive interval.
    ///
    /// The returned vector has one entry per interval position in ascending
    /// genomic order regardless of strand. Anchors whose window extends past
    /// a chromosome boundary, or whose window contains an ambiguous
    /// nucleotide, get a bias of 1.0.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::InvalidInput`] for an empty or non-positive interval
    /// or a sequence name absent from the reference.
    pub fn predict(
        &self,
        seqname: &str,
        start: i64,
        end: i64,
        strand: ReqStrand,
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
        self.get_bias(seqname, start - 1, end - 1, strand)
    }

    /// 0-based core of [`SequencingBias::predict`].
    pub(crate) fn get_bias(
        &self,
        seqname: &str,
        start: i64,
        end: i64,
        strand: ReqStrand,
    ) -> Result<Vec<f64>, SeqBiasError> {
        let mut reference = Reference::open(&self.ref_path)?;
        let Some(chrom_len) = reference.sequence_length(seqname) else {
            return Err(SeqBiasError::InvalidInput(format!(
                "sequence {seqname} not found in {}",
                self.ref_path.display()
            )));
        };

        let n_out = (end - start + 1) as usize;
        let mut bias = vec![1.0; n_out];
        let window = self.motif.window_len();
        // substitutions for stray ambiguity codes; N windows never reach eval
        let mut rng = Xoshiro256StarStar::seed_from_u64(crate::config::DEFAULT_SEED);

        let (pad_left, pad_right) = match strand {
            ReqStrand::Forward => (self.left, self.right),
            ReqStrand::Reverse => (self.right, self.left),
        };
        let fetch_start = (start - pad_left as i64).max(0);
        let fetch_end = (end + pad_right as i64).min(chrom_len as i64 - 1);
        if fetch_start > fetch_end {
            return Ok(bias);
        }
        let Some(mut slice) = reference.fetch_seq(seqname, fetch_start as u64, fetch_end as u64)
        else {
            return Ok(bias);
        };

        let has_n = |slice: &[u8], offset: usize| slice[offset..offset + window].contains(&b'n');

        match strand {
            ReqStrand::Forward => {
                let packed = TwoBitSeq::from_ascii(&slice, &mut rng);
                for (i, out) in bias.iter_mut().enumerate() {
                    let window_start = start + i as i64 - self.left as i64;
                    if window_start < fetch_start
                        || window_start + window as i64 - 1 > fetch_end
                    {
                        continue;
                    }
                    let offset = (window_start - fetch_start) as usize;
                    if has_n(&slice, offset) {
                        continue;
                    }
                    *out = self.motif.eval(&packed, offset);
                }
            }
            ReqStrand::Reverse => {
                reverse_complement(&mut slice);
                let packed = TwoBitSeq::from_ascii(&slice, &mut rng);
                // index j of the reverse-complemented slice sits at genomic
                // position fetch_end - j, so anchors come out 3' to 5'
                for (j, out) in bias.iter_mut().enumerate() {
                    let anchor = end - j as i64;
                    let window_start = fetch_end - anchor - self.left as i64;
                    if window_start < 0 || window_start as usize + window > slice.len() {
                        continue;
                    }
                    if has_n(&slice, window_start as usize) {
                        continue;
                    }
                    *out = self.motif.eval(&packed, window_start as usize);
                }
                bias.reverse();
            }
        }

        Ok(bias)
    }

    /// Serialize the model to a YAML file.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::Io`] when the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SeqBiasError> {
        let doc = ModelDoc {
            left: self.left,
            right: self.right,
            motif: self.motif.to_doc(),
        };
        let text = serde_yaml::to_string(&doc)
            .map_err(|e| SeqBiasError::Parse(format!("can't serialize model: {e}")))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Load a model from a YAML file and bind it to a reference FASTA.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::MissingInput`] when the model file cannot be read,
    /// [`SeqBiasError::Parse`] when it is malformed.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        ref_path: P,
        model_path: Q,
    ) -> Result<Self, SeqBiasError> {
        let model_path = model_path.as_ref();
        let text = fs::read_to_string(model_path).map_err(|e| {
            SeqBiasError::MissingInput(format!(
                "can't open model file {}: {e}",
                model_path.display()
            ))
        })?;
        let doc: ModelDoc = serde_yaml::from_str(&text)
            .map_err(|e| SeqBiasError::Parse(format!("malformed model file: {e}")))?;
        let motif = Motif::from_doc(&doc.motif)?;
        if motif.window_len() != doc.left + 1 + doc.right {
            return Err(SeqBiasError::Parse(format!(
                "window length {} disagrees with L={} and R={}",
                motif.window_len(),
                doc.left,
                doc.right
            )));
        }

        Ok(Self {
            ref_path: ref_path.as_ref().to_path_buf(),
            left: doc.left,
            right: doc.right,
            motif,
        })
    }
}
