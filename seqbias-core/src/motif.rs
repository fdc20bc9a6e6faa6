//! The sequence motif model: a Bayesian network over window positions.
//!
//! A window of `n` positions surrounds each read start. For every position
//! the model holds a set of parent positions and two conditional
//! distributions, one estimated from foreground windows (anchored at real
//! read starts) and one from background windows (anchored at Gaussian
//! offsets of those starts). Scoring a window multiplies the
//! foreground/background likelihood ratios of all positions; structure
//! learning greedily adds the parent edges that most improve the separation
//! between the two window sets, charging a per-parameter penalty for each
//! table enlargement.
//!
//! Parents always precede their child in window order, so the dependency
//! graph is acyclic by construction. Conditional tables are stored as
//! [`KmerMatrix`] rows: the joint value of the parents selects a block of
//! four entries, and the child's own code selects within the block (the
//! child occupies the least-significant two bits of the table index, which
//! is exactly what the masked k-mer extractor produces for a mask covering
//! the parents and the child).

use serde::{Deserialize, Serialize};

use crate::kmer_matrix::KmerMatrix;
use crate::sequence::TwoBitSeq;
use crate::types::SeqBiasError;

/// Additive smoothing applied to both distributions before a divergence is
/// computed, keeping it finite. Never stored in the model.
const KL_SMOOTHING: f64 = 1e-6;

/// Floor added inside logarithms while scoring, so a zero probability
/// produces a very small factor instead of negative infinity.
const LOG_FLOOR: f64 = 1e-12;

/// Minimum number of foreground and background windows required for
/// training. Below this the learner refuses to fit anything and returns the
/// uniform model.
pub const MIN_TRAINING_WINDOWS: usize = 100;

/// Symmetric Kullback-Leibler divergence with the `0 * log 0 = 0`
/// convention.
fn symmetric_kl(p: &[f64], q: &[f64]) -> f64 {
    debug_assert_eq!(p.len(), q.len());
    let mut divergence = 0.0;
    for (&a, &b) in p.iter().zip(q) {
        if a > 0.0 && b > 0.0 {
            let log_ratio = (a / b).ln();
            divergence += a * log_ratio;
            divergence -= b * log_ratio;
        }
    }
    divergence
}

/// Smooth a count vector and normalize it into a distribution.
fn smoothed_distribution(counts: &[f64]) -> Vec<f64> {
    let total: f64 = counts.iter().sum::<f64>() + KL_SMOOTHING * counts.len() as f64;
    counts.iter().map(|&c| (c + KL_SMOOTHING) / total).collect()
}

/// Tally joint k-mer counts over the given window slots.
///
/// `slots` must be ascending; the first slot lands in the high-order bits of
/// the count index, the last (the child) in the low-order bits.
fn joint_counts(seqs: &[TwoBitSeq], slots: &[usize], window_len: usize) -> Vec<f64> {
    let mut mask = vec![false; window_len];
    for &slot in slots {
        mask[slot] = true;
    }

    let mut counts = vec![0.0; 1 << (2 * slots.len())];
    for seq in seqs {
        if let Ok((kmer, _)) = seq.make_kmer(0, &mask) {
            counts[kmer as usize] += 1.0;
        }
    }
    counts
}

/// A trained motif: parent sets plus foreground and background conditional
/// tables. Immutable once built and safe to share between scorers.
#[derive(Debug, Clone)]
pub struct Motif {
    n: usize,
    parents: Vec<Vec<usize>>,
    fg: KmerMatrix,
    bg: KmerMatrix,
    masks: Vec<Vec<bool>>,
}

impl Motif {
    /// The no-op model: every position independent with identical uniform
    /// foreground and background distributions, so every window scores 1.0.
    #[must_use]
    pub fn uniform(n: usize) -> Self {
        let mut fg = KmerMatrix::new(n, 1);
        fg.set_all(0.25);
        let bg = fg.clone();
        let parents = vec![Vec::new(); n];
        let masks = Self::build_masks(n, &parents);
        Self {
            n,
            parents,
            fg,
            bg,
            masks,
        }
    }

    /// Learn a motif from foreground and background window sets.
    ///
    /// All windows must have length `n`. When either set holds fewer than
    /// [`MIN_TRAINING_WINDOWS`] windows the data cannot support a model and
    /// the uniform motif is returned with a warning, so downstream
    /// prediction degrades to a bias of 1.0 rather than failing.
    #[must_use]
    pub fn train(
        foreground: &[TwoBitSeq],
        background: &[TwoBitSeq],
        n: usize,
        max_parents: usize,
        max_distance: usize,
        complexity_penalty: f64,
    ) -> Self {
        if foreground.len() < MIN_TRAINING_WINDOWS || background.len() < MIN_TRAINING_WINDOWS {
            log::warn!(
                "insufficient training data ({} foreground, {} background windows); \
                 using the uniform model",
                foreground.len(),
                background.len()
            );
            return Self::uniform(n);
        }

        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut fg = KmerMatrix::new(n, max_parents + 1);
        let mut bg = KmerMatrix::new(n, max_parents + 1);

        for i in 0..n {
            // Discrimination of the position on its own.
            let mut slots = vec![i];
            let marginal = joint_counts(foreground, &slots, n);
            let mut divergence = {
                let p = smoothed_distribution(&marginal);
                let q = smoothed_distribution(&joint_counts(background, &slots, n));
                symmetric_kl(&p, &q)
            };

            // A position where every foreground window agrees carries no
            // conditional structure worth modeling; leave it parentless.
            let degenerate = marginal.iter().filter(|&&c| c > 0.0).count() <= 1;

            while !degenerate && parents[i].len() < max_parents {
                let table_growth = {
                    let m = parents[i].len() as u32;
                    (4f64.powi(m as i32 + 1) - 4f64.powi(m as i32)) * complexity_penalty
                };

                // Candidates in order of increasing distance, so a strictly
                // greater gain is required to displace a closer parent.
                let mut best: Option<(usize, f64)> = None;
                for j in (i.saturating_sub(max_distance)..i).rev() {
                    if parents[i].contains(&j) {
                        continue;
                    }

                    let mut trial = parents[i].clone();
                    trial.push(j);
                    trial.push(i);
                    trial.sort_unstable();

                    let p = smoothed_distribution(&joint_counts(foreground, &trial, n));
                    let q = smoothed_distribution(&joint_counts(background, &trial, n));
                    let gain = symmetric_kl(&p, &q) - divergence - table_growth;

                    if gain > best.map_or(0.0, |(_, g)| g) {
                        best = Some((j, gain));
                    }
                }

                let Some((j, gain)) = best else { break };
                parents[i].push(j);
                parents[i].sort_unstable();
                divergence += gain + table_growth;
            }

            // Freeze the conditional tables for this position.
            slots = parents[i].clone();
            slots.push(i);
            let m = parents[i].len();
            for (seqs, table) in [(foreground, &mut fg), (background, &mut bg)] {
                let counts = joint_counts(seqs, &slots, n);
                let mut joint = KmerMatrix::new(1, m + 1);
                for (kmer, &c) in counts.iter().enumerate() {
                    joint.set(0, kmer as u64, c);
                }
                joint.make_distribution();
                joint.dist_conditionalize(m);
                for (kmer, &p) in joint.row(0).iter().enumerate() {
                    table.set(i, kmer as u64, p);
                }
            }
        }

        let masks = Self::build_masks(n, &parents);
        Self {
            n,
            parents,
            fg,
            bg,
            masks,
        }
    }

    fn build_masks(n: usize, parents: &[Vec<usize>]) -> Vec<Vec<bool>> {
        parents
            .iter()
            .enumerate()
            .map(|(i, ps)| {
                let mut mask = vec![false; n];
                for &p in ps {
                    mask[p] = true;
                }
                mask[i] = true;
                mask
            })
            .collect()
    }

    /// Window length `n`.
    #[must_use]
    pub const fn window_len(&self) -> usize {
        self.n
    }

    /// Parent positions of window position `i`, ascending.
    #[must_use]
    pub fn parents(&self, i: usize) -> &[usize] {
        &self.parents[i]
    }

    /// Score the window starting at `pos` in `seq`.
    ///
    /// Returns the product over window positions of the
    /// foreground/background probability ratio of the observed nucleotide
    /// given its parents, accumulated in log space. Windows extending past
    /// the end of the sequence score 1.0, as do positions whose background
    /// probability is zero.
    #[must_use]
    pub fn eval(&self, seq: &TwoBitSeq, pos: usize) -> f64 {
        if pos + self.n > seq.len() {
            return 1.0;
        }

        let mut log_ratio = 0.0;
        for i in 0..self.n {
            let Ok((kmer, _)) = seq.make_kmer(pos, &self.masks[i]) else {
                return 1.0;
            };
            let p_fg = self.fg.get(i, kmer);
            let p_bg = self.bg.get(i, kmer);
            if p_bg <= 0.0 {
                continue;
            }
            log_ratio += (p_fg + LOG_FLOOR).ln() - (p_bg + LOG_FLOOR).ln();
        }
        log_ratio.exp()
    }

    /// Per-position symmetric KL divergence between the stored foreground
    /// and background tables. A diagnostic for how much each window position
    /// contributes to discrimination.
    #[must_use]
    pub fn discrimination(&self) -> Vec<f64> {
        (0..self.n)
            .map(|i| {
                let width = 1 << (2 * (self.parents[i].len() + 1));
                let p = smoothed_distribution(&self.fg.row(i)[..width]);
                let q = smoothed_distribution(&self.bg.row(i)[..width]);
                symmetric_kl(&p, &q)
            })
            .collect()
    }

    /// Human-readable summary of the learned structure. Positions are
    /// reported relative to the read start at offset `left`.
    #[must_use]
    pub fn structure_report(&self, left: usize) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        let divergence = self.discrimination();
        for i in 0..self.n {
            let rel = i as i64 - left as i64;
            let parents: Vec<String> = self.parents[i]
                .iter()
                .map(|&p| format!("{:+}", p as i64 - left as i64))
                .collect();
            let _ = writeln!(
                out,
                "position {rel:+}: divergence {:.4}, parents [{}]",
                divergence[i],
                parents.join(", ")
            );
        }
        out
    }

    /// Convert to the serializable document form, trimming each table row to
    /// its used width.
    #[must_use]
    pub fn to_doc(&self) -> MotifDoc {
        let rows = |table: &KmerMatrix| -> Vec<Vec<f64>> {
            (0..self.n)
                .map(|i| {
                    let width = 1 << (2 * (self.parents[i].len() + 1));
                    table.row(i)[..width].to_vec()
                })
                .collect()
        };
        MotifDoc {
            n: self.n,
            k: 4,
            parents: self.parents.clone(),
            fg: rows(&self.fg),
            bg: rows(&self.bg),
        }
    }

    /// Rebuild a motif from its document form.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::Parse`] when the document is internally inconsistent
    /// (mismatched lengths, parents out of range, tables of the wrong
    /// width).
    pub fn from_doc(doc: &MotifDoc) -> Result<Self, SeqBiasError> {
        let n = doc.n;
        if doc.k != 4 {
            return Err(SeqBiasError::Parse(format!(
                "unsupported alphabet cardinality {}",
                doc.k
            )));
        }
        if doc.parents.len() != n || doc.fg.len() != n || doc.bg.len() != n {
            return Err(SeqBiasError::Parse(
                "motif field lengths disagree with window length".into(),
            ));
        }

        let max_parents = doc.parents.iter().map(Vec::len).max().unwrap_or(0);
        let mut fg = KmerMatrix::new(n, max_parents + 1);
        let mut bg = KmerMatrix::new(n, max_parents + 1);

        for i in 0..n {
            let m = doc.parents[i].len();
            if doc.parents[i].iter().any(|&p| p >= n) {
                return Err(SeqBiasError::Parse(format!(
                    "parent position out of range at window position {i}"
                )));
            }
            let width = 1usize << (2 * (m + 1));
            if doc.fg[i].len() != width || doc.bg[i].len() != width {
                return Err(SeqBiasError::Parse(format!(
                    "conditional table width mismatch at window position {i}"
                )));
            }
            for (kmer, &p) in doc.fg[i].iter().enumerate() {
                fg.set(i, kmer as u64, p);
            }
            for (kmer, &p) in doc.bg[i].iter().enumerate() {
                bg.set(i, kmer as u64, p);
            }
        }

        let mut parents = doc.parents.clone();
        for ps in &mut parents {
            ps.sort_unstable();
        }
        let masks = Self::build_masks(n, &parents);
        Ok(Self {
            n,
            parents,
            fg,
            bg,
            masks,
        })
    }
}

/// Serializable form of a [`Motif`], matching the on-disk model layout:
/// window length, alphabet cardinality, one parent list per position, and
/// the two conditional tables per position as flat rows with the child in
/// the least-significant digit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotifDoc {
    pub n: usize,
    pub k: usize,
    pub parents: Vec<Vec<usize>>,
    pub fg: Vec<Vec<f64>>,
    pub bg: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn pack_all(windows: &[&str]) -> Vec<TwoBitSeq> {
        let mut rng = Xoshiro256StarStar::seed_from_u64(7);
        windows
            .iter()
            .map(|w| TwoBitSeq::from_ascii(w.as_bytes(), &mut rng))
            .collect()
    }

    fn random_windows(count: usize, len: usize, seed: u64) -> Vec<TwoBitSeq> {
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        (0..count)
            .map(|_| {
                let chars: Vec<u8> = (0..len)
                    .map(|_| b"acgt"[rng.gen_range(0..4)])
                    .collect();
                TwoBitSeq::from_ascii(&chars, &mut rng)
            })
            .collect()
    }

    #[test]
    fn test_uniform_motif_scores_one_everywhere() {
        let motif = Motif::uniform(5);
        let mut rng = Xoshiro256StarStar::seed_from_u64(1);
        let seq = TwoBitSeq::from_ascii(b"acgtacgtacgt", &mut rng);

        for pos in 0..=seq.len() - 5 {
            assert!((motif.eval(&seq, pos) - 1.0).abs() < 1e-12);
        }
        // window past the end of the sequence
        assert!((motif.eval(&seq, 10) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_data_falls_back_to_uniform() {
        let fg = random_windows(10, 4, 2);
        let bg = random_windows(10, 4, 3);
        let motif = Motif::train(&fg, &bg, 4, 4, 10, 0.1);

        for i in 0..4 {
            assert!(motif.parents(i).is_empty());
        }
        let mut rng = Xoshiro256StarStar::seed_from_u64(4);
        let seq = TwoBitSeq::from_ascii(b"ttttgggg", &mut rng);
        assert!((motif.eval(&seq, 0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_identical_sets_learn_no_structure() {
        let windows = random_windows(500, 6, 11);
        let motif = Motif::train(&windows, &windows, 6, 4, 10, 0.1);

        // identical foreground and background: nothing discriminates
        for i in 0..6 {
            assert!(motif.parents(i).is_empty(), "position {i} grew parents");
        }
        for seq in windows.iter().take(20) {
            assert!((motif.eval(seq, 0) - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_biased_position_is_detected() {
        // foreground always has 'a' at position 1; background is uniform
        let mut fg_text = Vec::new();
        let mut rng = Xoshiro256StarStar::seed_from_u64(21);
        for _ in 0..500 {
            let mut w: Vec<u8> = (0..4).map(|_| b"acgt"[rng.gen_range(0..4)]).collect();
            w[1] = b'a';
            fg_text.push(String::from_utf8(w).unwrap());
        }
        let fg: Vec<TwoBitSeq> = fg_text
            .iter()
            .map(|w| TwoBitSeq::from_ascii(w.as_bytes(), &mut rng))
            .collect();
        let bg = random_windows(1000, 4, 22);

        let motif = Motif::train(&fg, &bg, 4, 4, 10, 0.25);
        let divergence = motif.discrimination();
        assert!(
            divergence[1] > divergence[0],
            "biased position should dominate: {divergence:?}"
        );

        let matching = pack_all(&["cata"]);
        let clashing = pack_all(&["ctta"]);
        assert!(motif.eval(&matching[0], 0) > 1.0);
        assert!(motif.eval(&clashing[0], 0) < 1.0);
    }

    #[test]
    fn test_parent_improves_dependent_positions() {
        // position 1 copies position 0; foreground only
        let mut rng = Xoshiro256StarStar::seed_from_u64(33);
        let mut fg = Vec::new();
        for _ in 0..2000 {
            let c = b"acgt"[rng.gen_range(0..4)];
            let tail = b"acgt"[rng.gen_range(0..4)];
            fg.push(TwoBitSeq::from_ascii(&[c, c, tail], &mut rng));
        }
        let bg = random_windows(2000, 3, 34);

        let motif = Motif::train(&fg, &bg, 3, 2, 10, 0.01);
        assert_eq!(motif.parents(1), &[0], "copied position should gain its source as parent");
    }

    #[test]
    fn test_doc_round_trip_preserves_scores() {
        let fg = random_windows(300, 5, 41);
        let bg = random_windows(600, 5, 42);
        let motif = Motif::train(&fg, &bg, 5, 3, 10, 0.05);

        let doc = motif.to_doc();
        let text = serde_yaml::to_string(&doc).unwrap();
        let parsed: MotifDoc = serde_yaml::from_str(&text).unwrap();
        let reloaded = Motif::from_doc(&parsed).unwrap();

        for seq in fg.iter().take(50) {
            let a = motif.eval(seq, 0);
            let b = reloaded.eval(seq, 0);
            assert!((a - b).abs() < 1e-10, "{a} vs {b}");
        }
    }

    #[test]
    fn test_from_doc_rejects_inconsistent_tables() {
        let motif = Motif::uniform(3);
        let mut doc = motif.to_doc();
        doc.fg[1] = vec![0.25; 16]; // wrong width for zero parents
        assert!(Motif::from_doc(&doc).is_err());

        let mut doc = motif.to_doc();
        doc.parents[0] = vec![9];
        assert!(Motif::from_doc(&doc).is_err());

        let mut doc = motif.to_doc();
        doc.k = 2;
        assert!(Motif::from_doc(&doc).is_err());
    }
}
