use crate::types::SeqBiasError;

/// Seed used when [`BiasConfig::seed`] is left unset, so repeated runs on the
/// same input produce the same model.
pub const DEFAULT_SEED: u64 = 0x5eb1a5;

/// Penalty substituted when fewer than [`SPARSE_TRAINING_THRESHOLD`]
/// foreground windows are available. Small training sets otherwise tend to
/// produce overly sparse dependency structures.
pub const SPARSE_DATA_PENALTY: f64 = 0.25;

/// Foreground window count below which [`SPARSE_DATA_PENALTY`] takes over.
pub const SPARSE_TRAINING_THRESHOLD: usize = 10_000;

/// Upper bound on records pulled out of the read-start table in one dump.
pub const MAX_DUMP: usize = 10_000_000;

/// Attempts made per background sample before giving up on it. Keeps the
/// resampling loop bounded on pathological references.
pub const BG_RETRY_LIMIT: usize = 10;

/// Configuration for training a sequencing bias model.
///
/// The window examined around each read start spans `left` positions upstream
/// of the 5' base, the 5' base itself, and `right` positions downstream, for a
/// total of `left + 1 + right` window positions.
///
/// # Examples
///
/// ```rust
/// use seqbias_core::config::BiasConfig;
///
/// let config = BiasConfig {
///     left: 10,
///     right: 10,
///     max_reads: 50_000,
///     ..Default::default()
/// };
/// assert_eq!(config.window_len(), 21);
/// ```
#[derive(Debug, Clone)]
pub struct BiasConfig {
    /// Window positions to the left (5' side) of the read start.
    ///
    /// **Default**: `5`
    pub left: usize,

    /// Window positions to the right (3' side) of the read start.
    ///
    /// **Default**: `15`
    pub right: usize,

    /// Maximum number of read-start records used for training. Records beyond
    /// this bound are discarded after shuffling.
    ///
    /// **Default**: `100_000`
    pub max_reads: usize,

    /// Per-parameter cost charged when the learner considers adding a
    /// dependency edge. Larger values yield sparser models.
    ///
    /// Overridden by [`SPARSE_DATA_PENALTY`] when the foreground sample is
    /// smaller than [`SPARSE_TRAINING_THRESHOLD`].
    ///
    /// **Default**: `0.1`
    pub complexity_penalty: f64,

    /// Maximum number of parent positions any window position may depend on.
    ///
    /// **Default**: `4`
    pub max_parents: usize,

    /// Maximum distance (in window positions) between a position and any of
    /// its parents.
    ///
    /// **Default**: `10`
    pub max_distance: usize,

    /// Background windows sampled per read.
    ///
    /// **Default**: `2`
    pub bg_samples: usize,

    /// Standard deviation of the Gaussian offset used to draw background
    /// window anchors, in bases.
    ///
    /// **Default**: `500.0`
    pub bg_sigma: f64,

    /// Seed for the training random number generator. Training consumes
    /// random draws when shuffling records, substituting ambiguous
    /// nucleotides, and placing background windows; fixing the seed makes it
    /// reproducible.
    ///
    /// **Default**: `None` (use [`DEFAULT_SEED`])
    pub seed: Option<u64>,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            left: 5,
            right: 15,
            max_reads: 100_000,
            complexity_penalty: 0.1,
            max_parents: 4,
            max_distance: 10,
            bg_samples: 2,
            bg_sigma: 500.0,
            seed: None,
        }
    }
}

impl BiasConfig {
    /// Total window length, `left + 1 + right`.
    #[must_use]
    pub const fn window_len(&self) -> usize {
        self.left + 1 + self.right
    }

    /// Effective RNG seed for this configuration.
    #[must_use]
    pub fn effective_seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }

    /// Check the configuration for values outside their valid domain.
    ///
    /// # Errors
    ///
    /// Returns [`SeqBiasError::InvalidInput`] describing the first offending
    /// field.
    pub fn validate(&self) -> Result<(), SeqBiasError> {
        if self.max_reads == 0 {
            return Err(SeqBiasError::InvalidInput(
                "max_reads must be positive".into(),
            ));
        }
        if !(self.bg_sigma > 0.0) {
            return Err(SeqBiasError::InvalidInput(
                "bg_sigma must be positive".into(),
            ));
        }
        if self.complexity_penalty < 0.0 {
            return Err(SeqBiasError::InvalidInput(
                "complexity_penalty must be non-negative".into(),
            ));
        }
        Ok(())
    }
}
