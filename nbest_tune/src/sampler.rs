use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

use hashbrown::HashMap;
use rand::Rng;

use crate::errors::{NbestTuneError, Result};
use crate::nbest::{Hypothesis, NBestList};

/// How hypotheses are pooled before drawing pairs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grouping {
    /// Draws from all hypotheses at once. Pairs may cross segments.
    Flat,

    /// Draws from each segment separately.
    PerSegment,
}

impl FromStr for Grouping {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "flat" => Ok(Self::Flat),
            "segment" => Ok(Self::PerSegment),
            _ => Err("Could not parse a grouping value"),
        }
    }
}

/// Parameters of [`PairwiseSampler`].
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    /// Number of pairs drawn.
    pub candidate_pool_size: usize,

    /// Maximum number of pairs kept.
    pub sample_size: usize,

    /// Pairs whose score difference is below this value are rejected.
    pub min_diff: f64,

    pub grouping: Grouping,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            candidate_pool_size: 5000,
            sample_size: 50,
            min_diff: 0.05,
            grouping: Grouping::Flat,
        }
    }
}

/// Unordered pair of hypotheses.
#[derive(Clone, Debug)]
pub struct Sample<'a> {
    hyp1: &'a Hypothesis,
    hyp2: &'a Hypothesis,
    diff: f64,
}

impl<'a> Sample<'a> {
    pub fn new(hyp1: &'a Hypothesis, hyp2: &'a Hypothesis) -> Self {
        Self {
            hyp1,
            hyp2,
            diff: (hyp1.score() - hyp2.score()).abs(),
        }
    }

    pub fn hyp1(&self) -> &'a Hypothesis {
        self.hyp1
    }

    pub fn hyp2(&self) -> &'a Hypothesis {
        self.hyp2
    }

    /// Absolute score difference of the two hypotheses.
    pub fn diff(&self) -> f64 {
        self.diff
    }

    /// Converts the pair into two ranking instances, one in each direction.
    ///
    /// Each instance holds the feature difference of one hypothesis against the other and is
    /// labeled 1 if that hypothesis has the higher score, and -1 otherwise.
    ///
    /// # Returns
    ///
    /// `None` if both scores are equal.
    pub fn training_pair(&self) -> Option<[TrainingInstance; 2]> {
        let label = match self.hyp1.score().partial_cmp(&self.hyp2.score()) {
            Some(Ordering::Greater) => 1,
            Some(Ordering::Less) => -1,
            _ => return None,
        };
        let mut ids = HashMap::new();
        let mut features: Vec<(String, f64)> = vec![];
        for (hyp, sign) in [(self.hyp1, 1.), (self.hyp2, -1.)] {
            for (name, values) in hyp.features().iter() {
                for (i, value) in values.iter().enumerate() {
                    let key = format!("{}_{}", name, i);
                    let id = *ids.entry(key.clone()).or_insert_with(|| {
                        features.push((key, 0.));
                        features.len() - 1
                    });
                    features[id].1 += sign * value;
                }
            }
        }
        features.retain(|(_, value)| *value != 0.);
        let reversed = features
            .iter()
            .map(|(name, value)| (name.clone(), -value))
            .collect();
        Some([
            TrainingInstance { label, features },
            TrainingInstance {
                label: -label,
                features: reversed,
            },
        ])
    }
}

/// Orders samples by ascending score difference.
fn compare_diff(a: &Sample, b: &Sample) -> Ordering {
    a.diff.total_cmp(&b.diff)
}

// BinaryHeap is a max-heap; reversing the comparator keeps the smallest difference on top.
struct MinByDiff<'a>(Sample<'a>);

impl PartialEq for MinByDiff<'_> {
    fn eq(&self, other: &Self) -> bool {
        compare_diff(&self.0, &other.0) == Ordering::Equal
    }
}

impl Eq for MinByDiff<'_> {}

impl PartialOrd for MinByDiff<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MinByDiff<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_diff(&other.0, &self.0)
    }
}

/// Pairwise ranking example.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingInstance {
    label: i8,
    features: Vec<(String, f64)>,
}

impl TrainingInstance {
    pub fn label(&self) -> i8 {
        self.label
    }

    /// Non-zero feature differences, named `<group>_<index>`.
    pub fn features(&self) -> &[(String, f64)] {
        &self.features
    }
}

impl fmt::Display for TrainingInstance {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label)?;
        for (name, value) in &self.features {
            write!(f, " {} {}", name, value)?;
        }
        Ok(())
    }
}

/// Biased sampler of hypothesis pairs (Hopkins and May, 2011).
///
/// A fixed number of pairs is drawn uniformly with replacement. Pairs whose scores are too
/// close are rejected, and of the rest only the pairs with the largest differences are kept.
///
/// # Examples
///
/// ```
/// use nbest_tune::{FeatureVector, Hypothesis, PairwiseSampler, SamplerConfig};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let pool: Vec<_> = [0.1, 0.2, 0.3]
///     .iter()
///     .map(|&score| Hypothesis::new("0", "text", FeatureVector::default(), score))
///     .collect();
/// let mut sampler =
///     PairwiseSampler::new(SamplerConfig::default(), StdRng::seed_from_u64(42)).unwrap();
/// let samples = sampler.sample(&pool);
/// assert_eq!(50, samples.len());
/// ```
pub struct PairwiseSampler<R> {
    config: SamplerConfig,
    rng: R,
}

impl<R> PairwiseSampler<R>
where
    R: Rng,
{
    /// Creates a sampler owning the given random source.
    ///
    /// # Errors
    ///
    /// If `sample_size` is 0 or `min_diff` is negative or not finite, an error variant will be
    /// returned.
    pub fn new(config: SamplerConfig, rng: R) -> Result<Self> {
        if config.sample_size == 0 {
            return Err(NbestTuneError::invalid_argument(
                "sample_size",
                "must be at least 1",
            ));
        }
        if !config.min_diff.is_finite() || config.min_diff < 0. {
            return Err(NbestTuneError::invalid_argument(
                "min_diff",
                "must be a non-negative number",
            ));
        }
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Samples pairs from a pool of hypotheses.
    ///
    /// The result is in no particular order and may be shorter than `sample_size`. An empty
    /// pool gives an empty result.
    pub fn sample<'a>(&mut self, pool: &'a [Hypothesis]) -> Vec<Sample<'a>> {
        if pool.is_empty() {
            return vec![];
        }
        let sample_size = self.config.sample_size;
        let mut heap = BinaryHeap::with_capacity(sample_size + 1);
        for _ in 0..self.config.candidate_pool_size {
            let hyp1 = &pool[self.rng.gen_range(0..pool.len())];
            let hyp2 = &pool[self.rng.gen_range(0..pool.len())];
            let sample = Sample::new(hyp1, hyp2);
            // NaN differences from non-finite scores are rejected too.
            if !(sample.diff >= self.config.min_diff) {
                continue;
            }
            heap.push(MinByDiff(sample));
            if heap.len() > sample_size {
                heap.pop();
            }
        }
        heap.into_iter().map(|s| s.0).collect()
    }

    /// Samples pairs from an n-best list according to the configured grouping.
    ///
    /// With [`Grouping::PerSegment`], each segment is sampled separately and the results are
    /// concatenated in segment order.
    pub fn sample_list<'a>(&mut self, nbest: &'a NBestList) -> Vec<Sample<'a>> {
        match self.config.grouping {
            Grouping::Flat => self.sample(nbest.hypotheses()),
            Grouping::PerSegment => {
                let mut samples = vec![];
                for (_, hyps) in nbest.iter_segments() {
                    samples.extend(self.sample(hyps));
                }
                samples
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use rand::{rngs::StdRng, SeedableRng};

    use crate::nbest::FeatureVector;

    fn hyp(segment_id: &str, text: &str, score: f64) -> Hypothesis {
        Hypothesis::new(segment_id, text, FeatureVector::default(), score)
    }

    fn sampler(config: SamplerConfig, seed: u64) -> PairwiseSampler<StdRng> {
        PairwiseSampler::new(config, StdRng::seed_from_u64(seed)).unwrap()
    }

    #[test]
    fn test_sample_full() {
        let pool = vec![hyp("0", "a", 0.1), hyp("0", "b", 0.2), hyp("0", "c", 0.3)];

        let samples = sampler(SamplerConfig::default(), 1).sample(&pool);

        assert_eq!(50, samples.len());
        for s in &samples {
            assert!(s.diff() >= 0.05);
        }
    }

    #[test]
    fn test_sample_rejects_close_pairs() {
        let min_diff = 0.05;
        let pool = vec![
            hyp("0", "h1", 0.1),
            hyp("0", "h2", 0.1 + 0.9 * min_diff),
            hyp("0", "h3", 0.1 + 1.8 * min_diff),
        ];

        let samples = sampler(SamplerConfig::default(), 7).sample(&pool);

        assert!(!samples.is_empty());
        for s in &samples {
            let mut texts = [s.hyp1().text(), s.hyp2().text()];
            texts.sort_unstable();
            assert_eq!(["h1", "h3"], texts);
        }
    }

    #[test]
    fn test_sample_keeps_largest_diffs() {
        let pool = vec![hyp("0", "a", 0.), hyp("0", "b", 1.), hyp("0", "c", 10.)];
        let config = SamplerConfig {
            sample_size: 3,
            ..SamplerConfig::default()
        };

        let samples = sampler(config, 3).sample(&pool);

        assert_eq!(3, samples.len());
        for s in &samples {
            assert!(s.diff() >= 9.);
        }
    }

    #[test]
    fn test_sample_fewer_than_sample_size() {
        let pool = vec![hyp("0", "a", 0.5), hyp("0", "b", 0.5)];

        let samples = sampler(SamplerConfig::default(), 5).sample(&pool);

        assert!(samples.is_empty());
    }

    #[test]
    fn test_sample_empty_pool() {
        let samples = sampler(SamplerConfig::default(), 5).sample(&[]);

        assert!(samples.is_empty());
    }

    #[test]
    fn test_sample_reproducible() {
        let pool: Vec<_> = (0..20)
            .map(|i| hyp("0", &i.to_string(), i as f64 * 0.03))
            .collect();
        let config = SamplerConfig {
            candidate_pool_size: 100,
            sample_size: 10,
            ..SamplerConfig::default()
        };

        let texts = |samples: Vec<Sample>| {
            let mut texts: Vec<_> = samples
                .iter()
                .map(|s| (s.hyp1().text().to_string(), s.hyp2().text().to_string()))
                .collect();
            texts.sort();
            texts
        };

        let a = texts(sampler(config.clone(), 99).sample(&pool));
        let b = texts(sampler(config, 99).sample(&pool));

        assert_eq!(a, b);
    }

    #[test]
    fn test_sample_list_per_segment() {
        let data = "\
0 ||| a ||| F= 1 ||| 0.1
0 ||| b ||| F= 2 ||| 0.5
0 ||| c ||| F= 3 ||| 0.9
1 ||| d ||| F= 1 ||| 0.2
1 ||| e ||| F= 2 ||| 0.8
";
        let nbest = NBestList::read(data.as_bytes()).unwrap();
        let config = SamplerConfig {
            grouping: Grouping::PerSegment,
            sample_size: 5,
            ..SamplerConfig::default()
        };

        let samples = sampler(config, 11).sample_list(&nbest);

        assert_eq!(10, samples.len());
        for s in &samples {
            assert_eq!(s.hyp1().segment_id(), s.hyp2().segment_id());
        }
    }

    #[test]
    fn test_sample_list_flat_crosses_segments() {
        let data = "\
0 ||| a ||| F= 1 ||| 0.1
1 ||| b ||| F= 2 ||| 0.9
";
        let nbest = NBestList::read(data.as_bytes()).unwrap();

        let samples = sampler(SamplerConfig::default(), 11).sample_list(&nbest);

        assert_eq!(50, samples.len());
        for s in &samples {
            assert_ne!(s.hyp1().segment_id(), s.hyp2().segment_id());
        }
    }

    #[test]
    fn test_sample_rejects_nan_diffs() {
        let data = "\
0 ||| a ||| F= 1 ||| inf
0 ||| b ||| F= 2 ||| inf
0 ||| c ||| F= 3 ||| NaN
0 ||| d ||| F= 4 ||| 0.1
0 ||| e ||| F= 5 ||| 0.9
";
        let nbest = NBestList::read(data.as_bytes()).unwrap();

        let samples = sampler(SamplerConfig::default(), 1).sample_list(&nbest);

        assert!(!samples.is_empty());
        for s in &samples {
            assert!(s.diff() >= 0.05);
            assert!(s.training_pair().is_some());
        }
    }

    #[test]
    fn test_sample_only_non_finite_scores() {
        let pool = vec![
            hyp("0", "a", f64::INFINITY),
            hyp("0", "b", f64::INFINITY),
            hyp("0", "c", f64::NAN),
        ];

        let samples = sampler(SamplerConfig::default(), 1).sample(&pool);

        assert!(samples.is_empty());
    }

    #[test]
    fn test_invalid_config() {
        let config = SamplerConfig {
            sample_size: 0,
            ..SamplerConfig::default()
        };
        assert!(PairwiseSampler::new(config, StdRng::seed_from_u64(0)).is_err());

        let config = SamplerConfig {
            min_diff: -1.,
            ..SamplerConfig::default()
        };
        assert!(PairwiseSampler::new(config, StdRng::seed_from_u64(0)).is_err());
    }

    #[test]
    fn test_grouping_from_str() {
        assert_eq!(Ok(Grouping::Flat), "flat".parse());
        assert_eq!(Ok(Grouping::PerSegment), "segment".parse());
        assert!("pairs".parse::<Grouping>().is_err());
    }

    #[test]
    fn test_training_pair() {
        let hyp1 = Hypothesis::new(
            "0",
            "a",
            FeatureVector::parse("LM= -2 TM= 1 0.5").unwrap(),
            0.2,
        );
        let hyp2 = Hypothesis::new(
            "0",
            "b",
            FeatureVector::parse("LM= -1.5 TM= 1 1 WP= 2").unwrap(),
            0.7,
        );

        let [first, second] = Sample::new(&hyp1, &hyp2).training_pair().unwrap();

        assert_eq!(-1, first.label());
        assert_eq!("-1 LM_0 -0.5 TM_1 -0.5 WP_0 -2", first.to_string());
        assert_eq!(1, second.label());
        assert_eq!("1 LM_0 0.5 TM_1 0.5 WP_0 2", second.to_string());
    }

    #[test]
    fn test_training_pair_tie() {
        let hyp1 = hyp("0", "a", 0.5);
        let hyp2 = hyp("0", "b", 0.5);

        assert!(Sample::new(&hyp1, &hyp2).training_pair().is_none());
    }

    proptest! {
        #[test]
        fn test_accepted_samples_clear_min_diff(
            scores in prop::collection::vec(-1f64..1., 1..30),
            min_diff in 0f64..0.5,
            seed in any::<u64>(),
        ) {
            let pool: Vec<_> = scores.iter().map(|&s| hyp("0", "x", s)).collect();
            let config = SamplerConfig {
                candidate_pool_size: 200,
                sample_size: 20,
                min_diff,
                grouping: Grouping::Flat,
            };

            let samples = sampler(config, seed).sample(&pool);

            prop_assert!(samples.len() <= 20);
            for s in &samples {
                prop_assert!(s.diff() >= min_diff);
            }
        }
    }
}
