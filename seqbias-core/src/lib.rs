//! # seqbias - sequence composition bias estimation for short reads
//!
//! High-throughput sequencing protocols do not sample fragments uniformly:
//! the nucleotide context around a read's 5' end makes some genomic
//! positions systematically more likely to start a read than abundance alone
//! would suggest. This crate learns a probabilistic model of that
//! preference from an aligned read set and its reference, then scores any
//! genomic interval with a per-base multiplicative bias by which observed
//! read starts should be divided.
//!
//! ## Overview
//!
//! Training collects the sequence windows around read starts (foreground)
//! and around Gaussian-offset positions nearby (background), and fits a
//! small Bayesian network over window positions that maximizes the
//! separation between the two, subject to a complexity penalty. Prediction
//! walks the learned model across an interval, multiplying per-position
//! foreground/background likelihood ratios in log space.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use bio::bio_types::strand::ReqStrand;
//! use seqbias_core::{BiasConfig, SequencingBias};
//!
//! let config = BiasConfig {
//!     left: 5,
//!     right: 15,
//!     ..Default::default()
//! };
//! let model = SequencingBias::fit("genome.fa", "reads.bam", &config)?;
//! model.save("model.yml")?;
//!
//! // 1-based inclusive coordinates
//! let bias = model.predict("chr1", 10_000, 11_000, ReqStrand::Forward)?;
//! assert_eq!(bias.len(), 1001);
//! # Ok::<(), seqbias_core::SeqBiasError>(())
//! ```
//!
//! ## Module organization
//!
//! - [`sequence`]: 2-bit packed sequences, k-mer extraction, reference FASTA
//!   access
//! - [`kmer_matrix`]: dense per-position k-mer tables with normalization,
//!   conditionalization and marginalization
//! - [`pos_table`]: aggregation of alignments into read-start counts
//! - [`motif`]: the Bayesian network motif learner and scorer
//! - [`bias`]: training, prediction and model persistence
//! - [`counts`]: interval read counting with optional bias correction
//! - [`config`]: training configuration
//! - [`types`]: core record and error types
//!
//! ## Error handling
//!
//! Fallible operations return [`Result<T, SeqBiasError>`](types::SeqBiasError).
//! Missing or malformed inputs are fatal; an undersized training set is not:
//! it degrades to a uniform model whose bias is 1.0 everywhere, with a
//! warning, so downstream pipelines keep running.
//!
//! ## Concurrency
//!
//! The crate is single-threaded. A trained [`SequencingBias`] is immutable
//! and can back any number of concurrent predictors; reference and alignment
//! handles are opened per call and never shared.

pub mod bias;
pub mod config;
pub mod counts;
pub mod kmer_matrix;
pub mod motif;
pub mod pos_table;
pub mod sequence;
pub mod types;

pub use bias::SequencingBias;
pub use config::BiasConfig;
pub use counts::{count_reads, count_reads_total};
pub use kmer_matrix::KmerMatrix;
pub use motif::Motif;
pub use pos_table::PosTable;
pub use sequence::TwoBitSeq;
pub use types::SeqBiasError;
