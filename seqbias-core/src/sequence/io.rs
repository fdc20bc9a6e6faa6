use std::fs::File;
use std::path::{Path, PathBuf};

use bio::io::fasta;

use crate::types::SeqBiasError;

/// Random access to an indexed reference FASTA.
///
/// Thin wrapper over [`fasta::IndexedReader`] that lower-cases everything it
/// returns and turns unknown sequence names into `None` instead of errors, so
/// scan loops can warn and move on. Requires a `.fai` index next to the FASTA
/// (as produced by `samtools faidx`).
#[derive(Debug)]
pub struct Reference {
    reader: fasta::IndexedReader<File>,
    path: PathBuf,
}

impl Reference {
    /// Open a reference FASTA together with its `.fai` index.
    ///
    /// # Errors
    ///
    /// [`SeqBiasError::MissingInput`] if the FASTA or its index cannot be
    /// opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SeqBiasError> {
        let path = path.as_ref().to_path_buf();
        let reader = fasta::IndexedReader::from_file(&path).map_err(|e| {
            SeqBiasError::MissingInput(format!(
                "can't open indexed FASTA file {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self { reader, path })
    }

    /// Path this reference was opened from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names and lengths of all sequences in the reference, in index order.
    #[must_use]
    pub fn sequence_lengths(&self) -> Vec<(String, u64)> {
        self.reader
            .index
            .sequences()
            .into_iter()
            .map(|seq| (seq.name, seq.len))
            .collect()
    }

    /// Length of the named sequence, or `None` if it is absent.
    #[must_use]
    pub fn sequence_length(&self, name: &str) -> Option<u64> {
        self.reader
            .index
            .sequences()
            .into_iter()
            .find(|seq| seq.name == name)
            .map(|seq| seq.len)
    }

    /// Fetch the inclusive 0-based slice `[start, end]` of the named
    /// sequence, lower-cased. The range is clamped to the sequence; `None` is
    /// returned when the name is unknown or the start lies past the end of
    /// the sequence.
    pub fn fetch_seq(&mut self, name: &str, start: u64, end: u64) -> Option<Vec<u8>> {
        let len = self.sequence_length(name)?;
        if start >= len || end < start {
            return None;
        }
        let stop = (end + 1).min(len);

        self.reader.fetch(name, start, stop).ok()?;
        let mut seq = Vec::with_capacity((stop - start) as usize);
        self.reader.read(&mut seq).ok()?;
        seq.make_ascii_lowercase();
        Some(seq)
    }

    /// Fetch an entire sequence, lower-cased.
    pub fn fetch_all(&mut self, name: &str) -> Option<Vec<u8>> {
        let len = self.sequence_length(name)?;
        if len == 0 {
            return Some(Vec::new());
        }
        self.fetch_seq(name, 0, len - 1)
    }
}
