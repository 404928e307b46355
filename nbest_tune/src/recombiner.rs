use std::io::{BufRead, Write};

use crate::errors::{NbestTuneError, Result};
use crate::nbest::{FeatureValues, NBestLine};
use crate::weights::WeightVector;

/// Rescores n-best lines with a weight vector.
///
/// The new score is the dot product of the weights and the feature values in the feature
/// string. Only the score field changes; the feature string is never rewritten, so applying the
/// same weights twice gives the same score.
///
/// # Examples
///
/// ```
/// use nbest_tune::{ScoreRecombiner, WeightVector};
///
/// let weights = WeightVector::read("[weight]\nLM 0.5\nTM 1 2\n".as_bytes()).unwrap();
/// let recombiner = ScoreRecombiner::new(&weights);
///
/// let line = recombiner.recombine_str("0 ||| a ||| LM= -2 TM= 1 0.5 ||| 0").unwrap();
/// assert_eq!("0 ||| a ||| LM= -2 TM= 1 0.5 ||| 1", line);
/// ```
pub struct ScoreRecombiner<'a> {
    weights: &'a WeightVector,
}

impl<'a> ScoreRecombiner<'a> {
    pub fn new(weights: &'a WeightVector) -> Self {
        Self { weights }
    }

    /// Computes the weighted sum of a feature string.
    ///
    /// # Errors
    ///
    /// If a feature or a sub-feature index has no weight, or a value is malformed, an error
    /// variant will be returned.
    pub fn weighted_sum(&self, feature_string: &str) -> Result<f64> {
        let mut total = 0.;
        for item in FeatureValues::new(feature_string) {
            let (key, index, value) = item?;
            let weights = self
                .weights
                .get(key)
                .ok_or_else(|| NbestTuneError::unknown_feature(key, None))?;
            let weight = weights
                .get(index)
                .ok_or_else(|| NbestTuneError::unknown_feature(key, Some(index)))?;
            total += weight * value;
        }
        Ok(total)
    }

    /// Replaces the score of a line with the weighted sum of its features.
    ///
    /// # Errors
    ///
    /// See [`ScoreRecombiner::weighted_sum`].
    pub fn recombine(&self, line: &NBestLine) -> Result<NBestLine> {
        let score = self
            .weighted_sum(line.feature_string())
            .map_err(|e| e.with_segment_id(line.segment_id()))?;
        let mut line = line.clone();
        line.set_score(score);
        Ok(line)
    }

    /// Parses, rescores, and formats a line.
    ///
    /// # Errors
    ///
    /// If the line is malformed or a feature has no weight, an error variant will be returned.
    pub fn recombine_str(&self, line: &str) -> Result<String> {
        Ok(self.recombine(&NBestLine::parse(line)?)?.to_string())
    }

    /// Rescores every line of a stream.
    ///
    /// Lines are written in input order and are not sorted by the new score. The first bad line
    /// aborts the whole stream.
    ///
    /// # Returns
    ///
    /// The number of lines written.
    ///
    /// # Errors
    ///
    /// Errors carry the 1-based line number of the offending line.
    pub fn recombine_stream<R, W>(&self, rdr: R, mut wtr: W) -> Result<usize>
    where
        R: BufRead,
        W: Write,
    {
        let mut n_lines = 0;
        for (i, line) in rdr.lines().enumerate() {
            let line = line?;
            let line = self.recombine_str(&line).map_err(|e| e.with_line(i + 1))?;
            writeln!(wtr, "{}", line)?;
            n_lines += 1;
        }
        wtr.flush()?;
        Ok(n_lines)
    }
}
