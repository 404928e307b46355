#![cfg_attr(docsrs, feature(doc_cfg))]

//! # nbest_tune
//!
//! Tools for tuning the feature weights of a statistical machine translation system on n-best
//! lists, following the pairwise ranking optimization (PRO) approach.
//!
//! The crate rescores n-best lines with a weight vector, selects the best hypothesis of each
//! segment, computes BLEU from n-gram statistics, and samples hypothesis pairs for an external
//! pairwise-ranking trainer.
//!
//! ## Examples
//!
//! ```no_run
//! use std::fs::File;
//! use std::io::{stdin, stdout, BufReader};
//!
//! use nbest_tune::{ScoreRecombiner, TopSelector, WeightVector};
//!
//! let weights = WeightVector::read(BufReader::new(File::open("moses.ini").unwrap())).unwrap();
//! let recombiner = ScoreRecombiner::new(&weights);
//!
//! TopSelector::new()
//!     .select_stream(stdin().lock(), stdout().lock(), Some(&recombiner))
//!     .unwrap();
//! ```

pub mod bleu;
pub mod errors;

mod nbest;
mod recombiner;
mod sampler;
mod top_selector;
mod weights;

pub use bleu::{BleuScorer, BleuStatsExtractor, RefLengthPolicy, Reference};
pub use errors::{NbestTuneError, Result};
pub use nbest::{FeatureValues, FeatureVector, Hypothesis, NBestLine, NBestList, FIELD_DELIMITER};
pub use recombiner::ScoreRecombiner;
pub use sampler::{Grouping, PairwiseSampler, Sample, SamplerConfig, TrainingInstance};
pub use top_selector::TopSelector;
pub use weights::WeightVector;
