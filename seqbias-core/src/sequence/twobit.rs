use std::fmt;

use rand::Rng;

use crate::sequence::{num_to_nuc, nuc_to_num, INVALID_NUC};
use crate::types::SeqBiasError;

/// Unsigned integer carrying a packed k-mer, two bits per nucleotide with the
/// leftmost nucleotide in the high-order bits.
pub type Kmer = u64;

/// Largest extractable k-mer, limited by the width of [`Kmer`].
pub const MAX_KMER: usize = 4 * std::mem::size_of::<Kmer>();

/// A DNA sequence packed at two bits per nucleotide.
///
/// Position `i`'s code occupies bits `2*(i % 32)..2*(i % 32) + 2` of word
/// `i / 32`; bits past the final position are always zero. The sequence is
/// immutable after construction.
///
/// Characters without a 2-bit code (N among them) are replaced by a uniformly
/// random nucleotide at pack time, which is why construction takes a random
/// number generator.
///
/// # Examples
///
/// ```rust
/// use rand::SeedableRng;
/// use rand_xoshiro::Xoshiro256StarStar;
/// use seqbias_core::sequence::TwoBitSeq;
///
/// let mut rng = Xoshiro256StarStar::seed_from_u64(1);
/// let seq = TwoBitSeq::from_ascii(b"ACGTacgt", &mut rng);
/// assert_eq!(seq.len(), 8);
/// assert_eq!(seq.to_string(), "acgtacgt");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TwoBitSeq {
    words: Vec<u64>,
    len: usize,
}

impl TwoBitSeq {
    /// An empty sequence.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: Vec::new(),
            len: 0,
        }
    }

    /// Pack an ASCII sequence.
    ///
    /// `rng` supplies the substitutions for characters outside the alphabet.
    #[must_use]
    pub fn from_ascii<R: Rng>(seq: &[u8], rng: &mut R) -> Self {
        let len = seq.len();
        let mut words = vec![0u64; len.div_ceil(MAX_KMER)];

        for (i, &c) in seq.iter().enumerate() {
            let mut code = nuc_to_num(c);
            if code == INVALID_NUC {
                code = rng.gen_range(0..4);
            }
            words[i / MAX_KMER] |= u64::from(code) << (2 * (i % MAX_KMER));
        }

        Self { words, len }
    }

    /// Number of nucleotides stored.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The 2-bit code at `pos`. Panics if `pos` is out of range.
    #[must_use]
    pub fn get(&self, pos: usize) -> u8 {
        assert!(pos < self.len, "position {pos} out of range ({})", self.len);
        ((self.words[pos / MAX_KMER] >> (2 * (pos % MAX_KMER))) & 0x3) as u8
    }

    /// Extract the contiguous k-mer ending at `pos` (inclusive), covering
    /// positions `pos - k + 1 ..= pos`. The leftmost nucleotide lands in the
    /// high-order bits.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::ShortSequence`] if the k-mer extends beyond the stored
    /// range, or [`SeqBiasError::InvalidInput`] if `k` is zero or wider than
    /// [`MAX_KMER`].
    pub fn get_kmer(&self, k: usize, pos: usize) -> Result<Kmer, SeqBiasError> {
        if k == 0 || k > MAX_KMER {
            return Err(SeqBiasError::InvalidInput(format!(
                "k-mer length {k} outside 1..={MAX_KMER}"
            )));
        }
        if pos >= self.len || pos + 1 < k {
            return Err(SeqBiasError::ShortSequence {
                pos,
                k,
                len: self.len,
            });
        }

        let mut kmer: Kmer = 0;
        for p in (pos + 1 - k)..=pos {
            kmer = (kmer << 2) | Kmer::from(self.get(p));
        }
        Ok(kmer)
    }

    /// Extract the masked k-mer anchored at `pos`.
    ///
    /// Position `pos + i` contributes its code whenever `mask[i]` is true, in
    /// mask order with the first contributing position in the high-order
    /// bits. Returns the k-mer together with its effective length, the number
    /// of true mask entries.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::ShortSequence`] if the mask extends beyond the stored
    /// range.
    pub fn make_kmer(&self, pos: usize, mask: &[bool]) -> Result<(Kmer, usize), SeqBiasError> {
        if pos + mask.len() > self.len {
            return Err(SeqBiasError::ShortSequence {
                pos,
                k: mask.len(),
                len: self.len,
            });
        }

        let mut kmer: Kmer = 0;
        let mut k = 0;
        for (i, &keep) in mask.iter().enumerate() {
            if keep {
                kmer = (kmer << 2) | Kmer::from(self.get(pos + i));
                k += 1;
            }
        }
        Ok((kmer, k))
    }
}

impl fmt::Display for TwoBitSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pos in 0..self.len {
            write!(f, "{}", num_to_nuc(self.get(pos)) as char)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256StarStar;

    fn rng() -> Xoshiro256StarStar {
        Xoshiro256StarStar::seed_from_u64(0xb1a5)
    }

    #[test]
    fn test_round_trip_matches_lowercased_input() {
        let mut rng = rng();
        for input in ["acgt", "ACGTACGT", "t", "gggggggggggggggggggggggggggggggggggg"] {
            let seq = TwoBitSeq::from_ascii(input.as_bytes(), &mut rng);
            assert_eq!(seq.to_string(), input.to_lowercase());
        }
    }

    #[test]
    fn test_empty_sequence() {
        let seq = TwoBitSeq::new();
        assert!(seq.is_empty());
        assert!(seq.get_kmer(1, 0).is_err());
    }

    #[test]
    fn test_packing_crosses_word_boundaries() {
        let mut rng = rng();
        let input: String = "acgt".repeat(20); // 80 bases, three words
        let seq = TwoBitSeq::from_ascii(input.as_bytes(), &mut rng);
        assert_eq!(seq.to_string(), input);
        assert_eq!(seq.get(31), nuc_to_num(input.as_bytes()[31]));
        assert_eq!(seq.get(32), nuc_to_num(input.as_bytes()[32]));
    }

    #[test]
    fn test_get_kmer_contiguous() {
        let mut rng = rng();
        let seq = TwoBitSeq::from_ascii(b"acgtt", &mut rng);

        // "acg" ending at position 2: a=0, c=1, g=2 -> 0b000110
        assert_eq!(seq.get_kmer(3, 2).unwrap(), 0b000110);
        // single base
        assert_eq!(seq.get_kmer(1, 4).unwrap(), 0b11);
        // whole sequence
        assert_eq!(seq.get_kmer(5, 4).unwrap(), 0b00_01_10_11_11);
    }

    #[test]
    fn test_get_kmer_bounds() {
        let mut rng = rng();
        let seq = TwoBitSeq::from_ascii(b"acgt", &mut rng);

        assert!(matches!(
            seq.get_kmer(5, 3),
            Err(SeqBiasError::ShortSequence { .. })
        ));
        assert!(matches!(
            seq.get_kmer(2, 4),
            Err(SeqBiasError::ShortSequence { .. })
        ));
        assert!(seq.get_kmer(0, 0).is_err());
        assert!(seq.get_kmer(MAX_KMER + 1, 3).is_err());
    }

    #[test]
    fn test_make_kmer_masked() {
        let mut rng = rng();
        let seq = TwoBitSeq::from_ascii(b"acgta", &mut rng);

        // keep positions 0, 2, 4: a, g, a -> 0b00_10_00
        let mask = [true, false, true, false, true];
        assert_eq!(seq.make_kmer(0, &mask).unwrap(), (0b00_10_00, 3));

        // empty mask yields the empty kmer
        let mask = [false, false];
        assert_eq!(seq.make_kmer(1, &mask).unwrap(), (0, 0));

        // anchored past the end
        let mask = [true, true];
        assert!(seq.make_kmer(4, &mask).is_err());
    }

    #[test]
    fn test_invalid_characters_become_nucleotides() {
        let mut rng = rng();
        let seq = TwoBitSeq::from_ascii(b"nnnn", &mut rng);
        let text = seq.to_string();
        assert_eq!(text.len(), 4);
        assert!(text.bytes().all(|c| b"acgt".contains(&c)));
    }
}
