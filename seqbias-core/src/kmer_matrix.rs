//! Dense tables of k-mer statistics.
//!
//! A [`KmerMatrix`] holds one row per window position and one column per
//! k-mer value, `4^k` columns in total. Rows start life as raw tallies and
//! are turned into probability rows with [`KmerMatrix::make_distribution`];
//! the conditionalization and marginalization operations then reshape joint
//! distributions into the conditional form the motif learner stores.
//!
//! Slot numbering follows the packed k-mer layout: slot 0 is the
//! least-significant pair of bits (the rightmost nucleotide of the k-mer as
//! extracted), slot `k - 1` the most significant.

use std::ops::{AddAssign, MulAssign, SubAssign};

use crate::sequence::Kmer;

/// A dense `(window position x k-mer value)` table of non-negative doubles.
#[derive(Debug, Clone, PartialEq)]
pub struct KmerMatrix {
    nrows: usize,
    k: usize,
    ncols: usize,
    data: Vec<f64>,
}

impl KmerMatrix {
    /// Allocate an all-zero matrix with `nrows` rows over k-mers of length
    /// `k`.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use seqbias_core::kmer_matrix::KmerMatrix;
    ///
    /// let m = KmerMatrix::new(3, 2);
    /// assert_eq!(m.nrows(), 3);
    /// assert_eq!(m.ncols(), 16);
    /// ```
    #[must_use]
    pub fn new(nrows: usize, k: usize) -> Self {
        assert!(k <= 16, "k-mer length {k} too large for a dense table");
        let ncols = 1usize << (2 * k);
        Self {
            nrows,
            k,
            ncols,
            data: vec![0.0; nrows * ncols],
        }
    }

    #[must_use]
    pub const fn nrows(&self) -> usize {
        self.nrows
    }

    #[must_use]
    pub const fn ncols(&self) -> usize {
        self.ncols
    }

    /// K-mer length indexed by the columns.
    #[must_use]
    pub const fn ksize(&self) -> usize {
        self.k
    }

    /// Fill every entry with `v`.
    pub fn set_all(&mut self, v: f64) {
        self.data.fill(v);
    }

    #[must_use]
    pub fn get(&self, row: usize, kmer: Kmer) -> f64 {
        self.data[row * self.ncols + kmer as usize]
    }

    pub fn set(&mut self, row: usize, kmer: Kmer, v: f64) {
        self.data[row * self.ncols + kmer as usize] = v;
    }

    /// Add `v` to one entry; the tally operation.
    pub fn add(&mut self, row: usize, kmer: Kmer, v: f64) {
        self.data[row * self.ncols + kmer as usize] += v;
    }

    #[must_use]
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f64] {
        &mut self.data[row * self.ncols..(row + 1) * self.ncols]
    }

    /// Normalize every row to sum to one. Rows summing to zero are left
    /// untouched, so the operation is idempotent.
    pub fn make_distribution(&mut self) {
        for row in 0..self.nrows {
            let slice = self.row_mut(row);
            let total: f64 = slice.iter().sum();
            if total > 0.0 {
                for v in slice.iter_mut() {
                    *v /= total;
                }
            }
        }
    }

    /// Reinterpret each row, currently a joint distribution over `k` slots,
    /// as a conditional distribution given the `cond_slots` highest-order
    /// slots.
    ///
    /// Columns sharing the same values in the conditioning slots form one
    /// conditioning class (a contiguous block, since the conditioning slots
    /// are the high-order digits); each entry is divided by its class sum.
    /// Classes summing to zero stay zero. With `k = 2` and `cond_slots = 1`
    /// this is the single-slot conditionalization `P(X | X_1)`; the motif
    /// learner uses it with all parent slots conditioning the child slot.
    ///
    /// # Panics
    ///
    /// Panics if `cond_slots > k`.
    pub fn dist_conditionalize(&mut self, cond_slots: usize) {
        assert!(
            cond_slots <= self.k,
            "can't condition on {cond_slots} of {} slots",
            self.k
        );
        let class_len = 1usize << (2 * (self.k - cond_slots));
        for row in 0..self.nrows {
            for class in self.row_mut(row).chunks_mut(class_len) {
                let total: f64 = class.iter().sum();
                if total > 0.0 {
                    for v in class.iter_mut() {
                        *v /= total;
                    }
                }
            }
        }
    }

    /// Collapse one k-mer slot by summing the four columns that differ only
    /// at that slot, reducing `k` by one.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= k`.
    pub fn dist_marginalize(&mut self, slot: usize) {
        assert!(slot < self.k, "slot {slot} out of range ({})", self.k);
        let new_k = self.k - 1;
        let new_ncols = self.ncols >> 2;
        let low_mask = (1usize << (2 * slot)) - 1;
        let mut new_data = vec![0.0; self.nrows * new_ncols];

        for row in 0..self.nrows {
            for kmer in 0..self.ncols {
                let low = kmer & low_mask;
                let high = kmer >> (2 * (slot + 1));
                let collapsed = (high << (2 * slot)) | low;
                new_data[row * new_ncols + collapsed] += self.data[row * self.ncols + kmer];
            }
        }

        self.k = new_k;
        self.ncols = new_ncols;
        self.data = new_data;
    }
}

impl AddAssign<&KmerMatrix> for KmerMatrix {
    fn add_assign(&mut self, other: &KmerMatrix) {
        assert_eq!(self.nrows, other.nrows, "matrix shape mismatch");
        assert_eq!(self.ncols, other.ncols, "matrix shape mismatch");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a += b;
        }
    }
}

impl SubAssign<&KmerMatrix> for KmerMatrix {
    fn sub_assign(&mut self, other: &KmerMatrix) {
        assert_eq!(self.nrows, other.nrows, "matrix shape mismatch");
        assert_eq!(self.ncols, other.ncols, "matrix shape mismatch");
        for (a, b) in self.data.iter_mut().zip(&other.data) {
            *a -= b;
        }
    }
}

impl MulAssign<f64> for KmerMatrix {
    fn mul_assign(&mut self, scale: f64) {
        for v in &mut self.data {
            *v *= scale;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rows_close(a: &KmerMatrix, b: &KmerMatrix, tol: f64) {
        assert_eq!(a.nrows(), b.nrows());
        assert_eq!(a.ncols(), b.ncols());
        for row in 0..a.nrows() {
            for (x, y) in a.row(row).iter().zip(b.row(row)) {
                assert!((x - y).abs() < tol, "{x} vs {y}");
            }
        }
    }

    #[test]
    fn test_make_distribution_normalizes_rows() {
        let mut m = KmerMatrix::new(2, 1);
        m.set(0, 0, 1.0);
        m.set(0, 2, 3.0);
        // row 1 stays all-zero

        m.make_distribution();
        assert!((m.get(0, 0) - 0.25).abs() < 1e-12);
        assert!((m.get(0, 2) - 0.75).abs() < 1e-12);
        assert!(m.row(1).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_make_distribution_idempotent() {
        let mut m = KmerMatrix::new(3, 2);
        for (i, v) in [(3u64, 2.0), (7, 5.0), (12, 0.5)] {
            m.set(1, i, v);
        }
        m.set(2, 0, 4.0);

        let mut once = m.clone();
        once.make_distribution();
        let mut twice = once.clone();
        twice.make_distribution();
        assert_rows_close(&once, &twice, 1e-12);
    }

    #[test]
    fn test_conditionalize_single_slot() {
        // joint over 2 slots; condition on the high-order slot
        let mut m = KmerMatrix::new(1, 2);
        // class x1=0: entries at kmers 0..4
        m.set(0, 0, 1.0);
        m.set(0, 1, 3.0);
        // class x1=2: entries at kmers 8..12
        m.set(0, 8, 2.0);
        m.set(0, 10, 2.0);

        m.make_distribution();
        m.dist_conditionalize(1);

        assert!((m.get(0, 0) - 0.25).abs() < 1e-12);
        assert!((m.get(0, 1) - 0.75).abs() < 1e-12);
        assert!((m.get(0, 8) - 0.5).abs() < 1e-12);
        assert!((m.get(0, 10) - 0.5).abs() < 1e-12);
        // untouched classes stay zero
        assert_eq!(m.get(0, 4), 0.0);
    }

    #[test]
    fn test_conditionalize_idempotent_after_marginalization() {
        let mut m = KmerMatrix::new(1, 2);
        for kmer in 0..16u64 {
            m.set(0, kmer, (kmer as f64) + 1.0);
        }
        m.make_distribution();

        let mut once = m.clone();
        once.dist_conditionalize(1);
        let mut twice = once.clone();
        twice.dist_conditionalize(1);
        assert_rows_close(&once, &twice, 1e-12);
    }

    #[test]
    fn test_marginalize_low_slot() {
        let mut m = KmerMatrix::new(1, 2);
        // counts over (x1, x0); marginalizing x0 sums blocks of 4
        for kmer in 0..16u64 {
            m.set(0, kmer, 1.0 + (kmer as f64));
        }
        m.dist_marginalize(0);

        assert_eq!(m.ksize(), 1);
        assert_eq!(m.ncols(), 4);
        // x1 = 0 collects kmers 0..4: 1 + 2 + 3 + 4
        assert!((m.get(0, 0) - 10.0).abs() < 1e-12);
        // x1 = 3 collects kmers 12..16: 13 + 14 + 15 + 16
        assert!((m.get(0, 3) - 58.0).abs() < 1e-12);
    }

    #[test]
    fn test_marginalize_high_slot() {
        let mut m = KmerMatrix::new(1, 2);
        m.set(0, 0b0100, 2.0); // (x1=1, x0=0)
        m.set(0, 0b1100, 3.0); // (x1=3, x0=0)
        m.dist_marginalize(1);

        assert_eq!(m.ncols(), 4);
        assert!((m.get(0, 0) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_in_place_arithmetic() {
        let mut a = KmerMatrix::new(1, 1);
        let mut b = KmerMatrix::new(1, 1);
        a.set_all(2.0);
        b.set_all(0.5);

        a += &b;
        assert_eq!(a.get(0, 0), 2.5);
        a -= &b;
        assert_eq!(a.get(0, 0), 2.0);
        a *= 2.0;
        assert_eq!(a.get(0, 0), 4.0);
    }
}
