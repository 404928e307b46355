//! BLEU statistics and scores.
//!
//! Statistics vectors have `2 * order + 1` entries: a `(correct, guess)` pair for each n-gram
//! order from 1 to `order`, followed by the reference length.

use std::str::FromStr;

use hashbrown::HashMap;

use crate::errors::{NbestTuneError, Result};

/// Default maximum n-gram order.
pub const DEFAULT_ORDER: usize = 4;

/// Default additive smoothing constant of sentence-level BLEU.
pub const DEFAULT_SMOOTHING: f64 = 1.;

fn check_order(order: usize) -> Result<()> {
    if order == 0 {
        return Err(NbestTuneError::invalid_argument(
            "order",
            "must be at least 1",
        ));
    }
    Ok(())
}

/// Scorer computing BLEU from statistics vectors.
///
/// The scorer holds no corpus state, so one instance can score any number of vectors.
///
/// # Examples
///
/// ```
/// use nbest_tune::BleuScorer;
///
/// let scorer = BleuScorer::new();
/// let bleu = scorer.score(&[2., 5., 0., 1., 1., 1., 1., 1., 5.]).unwrap();
/// assert!((bleu - 0.5f64.sqrt()).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct BleuScorer {
    smoothing: f64,
    order: usize,
    smooth_brevity: bool,
}

impl Default for BleuScorer {
    fn default() -> Self {
        Self {
            smoothing: DEFAULT_SMOOTHING,
            order: DEFAULT_ORDER,
            smooth_brevity: false,
        }
    }
}

impl BleuScorer {
    /// Creates a scorer of order 4 with smoothing constant 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a scorer with the given maximum n-gram order.
    ///
    /// # Errors
    ///
    /// If `order` is 0, an error variant will be returned.
    pub fn with_order(order: usize) -> Result<Self> {
        check_order(order)?;
        Ok(Self {
            order,
            ..Self::default()
        })
    }

    /// Sets the additive smoothing constant.
    pub fn smoothing(mut self, smoothing: f64) -> Self {
        self.smoothing = smoothing;
        self
    }

    /// Also adds the smoothing constant to the reference length of the brevity penalty.
    pub fn smooth_brevity(mut self, enabled: bool) -> Self {
        self.smooth_brevity = enabled;
        self
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Returns the length of statistics vectors this scorer accepts.
    pub fn n_stats(&self) -> usize {
        self.order * 2 + 1
    }

    fn check_len(&self, stats: &[f64]) -> Result<()> {
        if stats.len() != self.n_stats() {
            return Err(NbestTuneError::wrong_stats_count(
                self.n_stats(),
                stats.len(),
            ));
        }
        Ok(())
    }

    fn brevity(stats: &[f64], ref_len: f64) -> f64 {
        let brevity = 1. - ref_len / stats[1];
        // Longer candidates are not rewarded.
        if brevity < 0. {
            brevity
        } else {
            0.
        }
    }

    /// Computes smoothed sentence-level BLEU.
    ///
    /// # Errors
    ///
    /// If the length of `stats` is not `2 * order + 1`, an error variant will be returned.
    pub fn score(&self, stats: &[f64]) -> Result<f64> {
        self.check_len(stats)?;
        let mut log_bleu = 0.;
        for j in 0..self.order {
            log_bleu += (stats[2 * j] + self.smoothing).ln()
                - (stats[2 * j + 1] + self.smoothing).ln();
        }
        log_bleu /= self.order as f64;
        let mut ref_len = stats[self.order * 2];
        if self.smooth_brevity {
            ref_len += self.smoothing;
        }
        log_bleu += Self::brevity(stats, ref_len);
        Ok(log_bleu.exp())
    }

    /// Computes unsmoothed BLEU of statistics summed over a corpus.
    ///
    /// Returns 0 if any n-gram order has no match.
    ///
    /// # Errors
    ///
    /// If the length of `stats` is not `2 * order + 1`, an error variant will be returned.
    pub fn corpus_score(&self, stats: &[f64]) -> Result<f64> {
        self.check_len(stats)?;
        let mut log_bleu = 0.;
        for j in 0..self.order {
            if stats[2 * j] == 0. {
                return Ok(0.);
            }
            log_bleu += stats[2 * j].ln() - stats[2 * j + 1].ln();
        }
        log_bleu /= self.order as f64;
        log_bleu += Self::brevity(stats, stats[self.order * 2]);
        Ok(log_bleu.exp())
    }
}

/// Adds a statistics vector to an accumulator.
///
/// # Errors
///
/// If the lengths differ, an error variant will be returned.
pub fn add_stats(acc: &mut [f64], stats: &[f64]) -> Result<()> {
    if acc.len() != stats.len() {
        return Err(NbestTuneError::wrong_stats_count(acc.len(), stats.len()));
    }
    for (a, s) in acc.iter_mut().zip(stats) {
        *a += s;
    }
    Ok(())
}

/// Policy choosing the reference length when there are multiple references.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefLengthPolicy {
    /// The reference length closest to the candidate length. Ties go to the shorter one.
    Closest,

    /// The shortest reference length.
    Shortest,

    /// The mean reference length, rounded down.
    Average,
}

impl Default for RefLengthPolicy {
    fn default() -> Self {
        Self::Closest
    }
}

impl FromStr for RefLengthPolicy {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "closest" => Ok(Self::Closest),
            "shortest" => Ok(Self::Shortest),
            "average" => Ok(Self::Average),
            _ => Err("Could not parse a reference length policy"),
        }
    }
}

/// N-gram counts and lengths of the references of one segment.
#[derive(Debug, Clone, Default)]
pub struct Reference {
    counts: HashMap<Vec<String>, usize>,
    lengths: Vec<usize>,
}

impl Reference {
    /// Returns the lengths of the references in tokens.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    fn length(&self, policy: RefLengthPolicy, candidate_len: usize) -> usize {
        match policy {
            RefLengthPolicy::Closest => self
                .lengths
                .iter()
                .copied()
                .min_by_key(|&len| (len.abs_diff(candidate_len), len))
                .unwrap_or(0),
            RefLengthPolicy::Shortest => self.lengths.iter().copied().min().unwrap_or(0),
            RefLengthPolicy::Average => {
                if self.lengths.is_empty() {
                    0
                } else {
                    self.lengths.iter().sum::<usize>() / self.lengths.len()
                }
            }
        }
    }
}

/// Extractor of BLEU statistics from candidate and reference texts.
///
/// Texts are split on whitespace. Normalization options are fixed per extractor.
///
/// # Examples
///
/// ```
/// use nbest_tune::{BleuScorer, BleuStatsExtractor};
///
/// let extractor = BleuStatsExtractor::new();
/// let reference = extractor.reference(&["the cat sat on the mat"]);
/// let stats = extractor.stats(&reference, "the cat sat on the mat");
/// assert_eq!(vec![6., 6., 5., 5., 4., 4., 3., 3., 6.], stats);
///
/// let bleu = BleuScorer::new().score(&stats).unwrap();
/// assert!((bleu - 1.).abs() < 1e-12);
/// ```
#[derive(Debug, Clone)]
pub struct BleuStatsExtractor {
    order: usize,
    policy: RefLengthPolicy,
    lowercase: bool,
}

impl Default for BleuStatsExtractor {
    fn default() -> Self {
        Self {
            order: DEFAULT_ORDER,
            policy: RefLengthPolicy::default(),
            lowercase: false,
        }
    }
}

impl BleuStatsExtractor {
    /// Creates an extractor of order 4 using the closest reference length.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an extractor with the given maximum n-gram order.
    ///
    /// # Errors
    ///
    /// If `order` is 0, an error variant will be returned.
    pub fn with_order(order: usize) -> Result<Self> {
        check_order(order)?;
        Ok(Self {
            order,
            ..Self::default()
        })
    }

    /// Sets the reference length policy.
    pub fn ref_length_policy(mut self, policy: RefLengthPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Lowercases texts before counting n-grams.
    pub fn lowercase(mut self, enabled: bool) -> Self {
        self.lowercase = enabled;
        self
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn tokenize(&self, text: &str) -> Vec<String> {
        if self.lowercase {
            text.split_whitespace().map(|t| t.to_lowercase()).collect()
        } else {
            text.split_whitespace().map(String::from).collect()
        }
    }

    fn count_ngrams<'a>(&self, tokens: &'a [String]) -> HashMap<&'a [String], usize> {
        let mut counts = HashMap::new();
        for n in 1..=self.order {
            for ngram in tokens.windows(n) {
                *counts.entry(ngram).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Builds the reference data of a segment.
    ///
    /// The count of each n-gram is the maximum count over all references.
    pub fn reference<S>(&self, references: &[S]) -> Reference
    where
        S: AsRef<str>,
    {
        let mut result = Reference::default();
        for reference in references {
            let tokens = self.tokenize(reference.as_ref());
            for (ngram, count) in self.count_ngrams(&tokens) {
                let entry = result.counts.entry(ngram.to_vec()).or_insert(0);
                if count > *entry {
                    *entry = count;
                }
            }
            result.lengths.push(tokens.len());
        }
        result
    }

    /// Computes the statistics vector of a candidate.
    ///
    /// Matches are clipped by the reference counts.
    pub fn stats(&self, reference: &Reference, candidate: &str) -> Vec<f64> {
        let tokens = self.tokenize(candidate);
        let mut stats = vec![0.; self.order * 2 + 1];
        for (ngram, guess) in self.count_ngrams(&tokens) {
            let correct = reference
                .counts
                .get(ngram)
                .map_or(0, |&count| count.min(guess));
            let n = ngram.len();
            stats[n * 2 - 2] += correct as f64;
            stats[n * 2 - 1] += guess as f64;
        }
        stats[self.order * 2] = reference.length(self.policy, tokens.len()) as f64;
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 1e-12,
            "expected {}, got {}",
            expected,
            actual
        );
    }

    #[test]
    fn test_score_smoothed() {
        let scorer = BleuScorer::new();

        let bleu = scorer.score(&[2., 5., 0., 1., 1., 1., 1., 1., 5.]).unwrap();

        assert_close(1. / 2f64.sqrt(), bleu);
    }

    #[test]
    fn test_score_brevity_penalty() {
        let scorer = BleuScorer::new();

        let bleu = scorer.score(&[2., 2., 2., 2., 2., 2., 2., 2., 3.]).unwrap();

        assert_close((1f64 - 1.5).exp(), bleu);
    }

    #[test]
    fn test_score_no_reward_for_long_candidates() {
        let scorer = BleuScorer::new();

        let bleu = scorer.score(&[2., 2., 2., 2., 2., 2., 2., 2., 1.]).unwrap();

        assert_close(1., bleu);
    }

    #[test]
    fn test_score_wrong_stats_count() {
        let scorer = BleuScorer::new();

        for len in [8, 10] {
            let stats = vec![1.; len];
            match scorer.score(&stats) {
                Err(NbestTuneError::WrongStatsCount(e)) => {
                    assert_eq!(9, e.expected());
                    assert_eq!(len, e.found());
                }
                result => panic!("unexpected result: {:?}", result),
            }
        }
    }

    #[test]
    fn test_score_wrong_stats_count_message() {
        let result = BleuScorer::new().score(&[1.; 8]);

        assert_eq!(
            "WrongStatsCountError: expected 9 statistics, found 8",
            &result.err().unwrap().to_string()
        );
    }

    #[test]
    fn test_score_other_order() {
        let scorer = BleuScorer::with_order(2).unwrap().smoothing(0.);

        let bleu = scorer.score(&[4., 4., 1., 4., 4.]).unwrap();

        assert_close(0.5, bleu);
        assert!(scorer.score(&[1.; 9]).is_err());
    }

    #[test]
    fn test_score_invalid_order() {
        assert!(matches!(
            BleuScorer::with_order(0),
            Err(NbestTuneError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_score_smooth_brevity() {
        let scorer = BleuScorer::new().smooth_brevity(true);

        let bleu = scorer.score(&[2., 2., 2., 2., 2., 2., 2., 2., 2.]).unwrap();

        assert_close((-0.5f64).exp(), bleu);
    }

    #[test]
    fn test_score_reusable() {
        let scorer = BleuScorer::new();
        let stats = [3., 4., 2., 3., 1., 2., 0., 1., 4.];

        let first = scorer.score(&stats).unwrap();
        scorer.score(&[0.; 9]).unwrap();
        let second = scorer.score(&stats).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_corpus_score() {
        let scorer = BleuScorer::new();

        assert_close(
            1.,
            scorer
                .corpus_score(&[4., 4., 3., 3., 2., 2., 1., 1., 4.])
                .unwrap(),
        );
        assert_eq!(
            0.,
            scorer
                .corpus_score(&[4., 4., 3., 3., 2., 2., 0., 1., 4.])
                .unwrap()
        );
    }

    #[test]
    fn test_add_stats() {
        let mut acc = vec![0.; 3];
        add_stats(&mut acc, &[1., 2., 3.]).unwrap();
        add_stats(&mut acc, &[1., 0., 1.]).unwrap();

        assert_eq!(vec![2., 2., 4.], acc);
        assert!(add_stats(&mut acc, &[1.]).is_err());
    }

    #[test]
    fn test_stats_clipped() {
        let extractor = BleuStatsExtractor::new();
        let reference = extractor.reference(&["the cat"]);

        let stats = extractor.stats(&reference, "the the the");

        assert_eq!(vec![1., 3., 0., 2., 0., 1., 0., 0., 2.], stats);
    }

    #[test]
    fn test_stats_multiple_references_max_count() {
        let extractor = BleuStatsExtractor::new();
        let reference = extractor.reference(&["a a b", "a c"]);

        let stats = extractor.stats(&reference, "a a a");

        assert_eq!(2., stats[0]);
        assert_eq!(3., stats[1]);
        assert_eq!(1., stats[2]);
        assert_eq!(2., stats[3]);
    }

    #[test]
    fn test_stats_ref_length_policy() {
        let refs = ["a b", "a b c d e f", "a b c d"];
        let candidate = "a b c d e";

        let closest = BleuStatsExtractor::new();
        let shortest = BleuStatsExtractor::new().ref_length_policy(RefLengthPolicy::Shortest);
        let average = BleuStatsExtractor::new().ref_length_policy(RefLengthPolicy::Average);

        assert_eq!(4., closest.stats(&closest.reference(&refs), candidate)[8]);
        assert_eq!(2., shortest.stats(&shortest.reference(&refs), candidate)[8]);
        assert_eq!(4., average.stats(&average.reference(&refs), candidate)[8]);
    }

    #[test]
    fn test_stats_lowercase() {
        let cased = BleuStatsExtractor::new();
        let lowercased = BleuStatsExtractor::new().lowercase(true);

        let stats = cased.stats(&cased.reference(&["The House"]), "the house");
        assert_eq!(0., stats[0]);

        let stats = lowercased.stats(&lowercased.reference(&["The House"]), "the house");
        assert_eq!(2., stats[0]);
        assert_eq!(1., stats[2]);
    }

    #[test]
    fn test_stats_empty_candidate() {
        let extractor = BleuStatsExtractor::with_order(2).unwrap();
        let reference = extractor.reference(&["a b"]);

        assert_eq!(vec![0., 0., 0., 0., 2.], extractor.stats(&reference, ""));
    }

    #[test]
    fn test_ref_length_policy_from_str() {
        assert_eq!(Ok(RefLengthPolicy::Closest), "closest".parse());
        assert_eq!(Ok(RefLengthPolicy::Shortest), "shortest".parse());
        assert_eq!(Ok(RefLengthPolicy::Average), "average".parse());
        assert!("longest".parse::<RefLengthPolicy>().is_err());
    }
}
