use std::fmt;
use std::io::BufRead;
use std::ops::Range;

use hashbrown::HashMap;

use crate::bleu::{BleuScorer, BleuStatsExtractor};
use crate::errors::{NbestTuneError, Result};

/// Field delimiter of n-best lines.
pub const FIELD_DELIMITER: &str = " ||| ";

const SEGMENT_ID_FIELD: usize = 0;
const TEXT_FIELD: usize = 1;
const FEATURE_FIELD: usize = 2;
const SCORE_FIELD: usize = 3;
const MIN_FIELDS: usize = 4;

/// One line of a decoder n-best list.
///
/// The line is kept as its raw fields so that anything other than the score is written back
/// exactly as it was read.
#[derive(Debug, Clone, PartialEq)]
pub struct NBestLine {
    fields: Vec<String>,
}

impl NBestLine {
    /// Splits a line into fields.
    ///
    /// # Errors
    ///
    /// If the line has fewer than four fields, an error variant will be returned.
    ///
    /// # Examples
    ///
    /// ```
    /// use nbest_tune::NBestLine;
    ///
    /// let line = NBestLine::parse("0 ||| a house ||| LM= -2.5 ||| -1.25").unwrap();
    /// assert_eq!("0", line.segment_id());
    /// assert_eq!("a house", line.text());
    /// assert_eq!(-1.25, line.score().unwrap());
    /// ```
    pub fn parse(line: &str) -> Result<Self> {
        let fields: Vec<String> = line.split(FIELD_DELIMITER).map(String::from).collect();
        if fields.len() < MIN_FIELDS {
            return Err(NbestTuneError::malformed_line(format!(
                "expected at least {} fields, found {}",
                MIN_FIELDS,
                fields.len()
            )));
        }
        Ok(Self { fields })
    }

    pub fn segment_id(&self) -> &str {
        self.fields[SEGMENT_ID_FIELD].trim()
    }

    pub fn text(&self) -> &str {
        &self.fields[TEXT_FIELD]
    }

    pub fn feature_string(&self) -> &str {
        &self.fields[FEATURE_FIELD]
    }

    /// Parses the score field.
    ///
    /// # Errors
    ///
    /// If the field is not a number, an error variant will be returned.
    pub fn score(&self) -> Result<f64> {
        let field = self.fields[SCORE_FIELD].trim();
        field.parse().map_err(|_| {
            NbestTuneError::malformed_line(format!(
                "invalid score `{}` in segment {}",
                field,
                self.segment_id()
            ))
        })
    }

    /// Replaces the score field.
    pub fn set_score(&mut self, score: f64) {
        self.fields[SCORE_FIELD] = score.to_string();
    }

    /// Returns all fields including trailing ones.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

impl fmt::Display for NBestLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.fields.join(FIELD_DELIMITER))
    }
}

/// Iterator over the values of a feature string.
///
/// A token ending in `=` opens a feature group. Every other token is the next value of the
/// current group. Each item is `(group, sub-feature index, value)`.
pub struct FeatureValues<'a> {
    tokens: std::str::SplitWhitespace<'a>,
    key: Option<&'a str>,
    index: usize,
}

impl<'a> FeatureValues<'a> {
    pub fn new(feature_string: &'a str) -> Self {
        Self {
            tokens: feature_string.split_whitespace(),
            key: None,
            index: 0,
        }
    }
}

impl<'a> Iterator for FeatureValues<'a> {
    type Item = Result<(&'a str, usize, f64)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let token = self.tokens.next()?;
            if let Some(key) = token.strip_suffix('=') {
                self.key = Some(key);
                self.index = 0;
                continue;
            }
            let value = match feature_value(self.key, token) {
                Ok(value) => value,
                Err(e) => return Some(Err(e)),
            };
            // `feature_value` fails when no group is open.
            let key = self.key.unwrap_or_default();
            let index = self.index;
            self.index += 1;
            return Some(Ok((key, index, value)));
        }
    }
}

fn feature_value(key: Option<&str>, token: &str) -> Result<f64> {
    let key = key.ok_or_else(|| {
        NbestTuneError::malformed_line(format!(
            "value `{}` appears before any feature name",
            token
        ))
    })?;
    token.parse().map_err(|_| {
        NbestTuneError::malformed_line(format!("invalid value `{}` for feature `{}`", token, key))
    })
}

/// Feature values of a hypothesis, grouped by feature name in the order of appearance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    groups: Vec<(String, Vec<f64>)>,
}

impl FeatureVector {
    /// Parses a feature string.
    ///
    /// A group that appears twice is folded into one: values at the same sub-feature index are
    /// summed, which keeps the weighted sum unchanged.
    ///
    /// # Errors
    ///
    /// If a value is not a number or appears before any group name, an error variant will be
    /// returned.
    pub fn parse(feature_string: &str) -> Result<Self> {
        let mut groups: Vec<(String, Vec<f64>)> = vec![];
        let mut current: Option<(usize, usize)> = None;
        for token in feature_string.split_whitespace() {
            if let Some(key) = token.strip_suffix('=') {
                let pos = match groups.iter().position(|(name, _)| name == key) {
                    Some(pos) => pos,
                    None => {
                        groups.push((key.to_string(), vec![]));
                        groups.len() - 1
                    }
                };
                current = Some((pos, 0));
                continue;
            }
            let key = current.map(|(pos, _)| groups[pos].0.as_str());
            let value = feature_value(key, token)?;
            if let Some((pos, index)) = current.as_mut() {
                let values = &mut groups[*pos].1;
                if values.len() <= *index {
                    values.resize(*index + 1, 0.);
                }
                values[*index] += value;
                *index += 1;
            }
        }
        Ok(Self { groups })
    }

    /// Gets the values of a feature group.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_slice())
    }

    /// Iterates over the feature groups.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.groups.iter().map(|(n, v)| (n.as_str(), v.as_slice()))
    }

    /// Returns the number of feature groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// A candidate translation.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    segment_id: String,
    text: String,
    features: FeatureVector,
    score: f64,
}

impl Hypothesis {
    pub fn new<S, T>(segment_id: S, text: T, features: FeatureVector, score: f64) -> Self
    where
        S: Into<String>,
        T: Into<String>,
    {
        Self {
            segment_id: segment_id.into(),
            text: text.into(),
            features,
            score,
        }
    }

    /// Creates a hypothesis from an n-best line.
    ///
    /// # Errors
    ///
    /// If the feature string or the score is malformed, an error variant will be returned.
    pub fn from_line(line: &NBestLine) -> Result<Self> {
        Ok(Self {
            segment_id: line.segment_id().to_string(),
            text: line.text().trim().to_string(),
            features: FeatureVector::parse(line.feature_string())?,
            score: line.score()?,
        })
    }

    pub fn segment_id(&self) -> &str {
        &self.segment_id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn features(&self) -> &FeatureVector {
        &self.features
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn set_score(&mut self, score: f64) {
        self.score = score;
    }
}

/// N-best list of all segments.
///
/// Hypotheses are stored grouped by segment. Segments are kept in the order they first appear
/// and hypotheses in the order the decoder emitted them.
#[derive(Debug, Clone, Default)]
pub struct NBestList {
    hypotheses: Vec<Hypothesis>,
    segments: Vec<(String, Range<usize>)>,
}

impl NBestList {
    /// Creates an n-best list from hypotheses.
    pub fn from_hypotheses(hypotheses: Vec<Hypothesis>) -> Self {
        let mut segment_ids = HashMap::new();
        let mut groups: Vec<Vec<Hypothesis>> = vec![];
        for hyp in hypotheses {
            let idx = *segment_ids
                .entry(hyp.segment_id.clone())
                .or_insert_with(|| {
                    groups.push(vec![]);
                    groups.len() - 1
                });
            groups[idx].push(hyp);
        }
        let mut result = Self::default();
        for group in groups {
            let start = result.hypotheses.len();
            let segment_id = group[0].segment_id.clone();
            result.hypotheses.extend(group);
            result
                .segments
                .push((segment_id, start..result.hypotheses.len()));
        }
        result
    }

    /// Reads an n-best list.
    ///
    /// # Errors
    ///
    /// If a line is malformed, an error variant with the line number will be returned.
    pub fn read<R>(rdr: R) -> Result<Self>
    where
        R: BufRead,
    {
        let mut hypotheses = vec![];
        for (i, line) in rdr.lines().enumerate() {
            let line = line?;
            let hyp = NBestLine::parse(&line)
                .and_then(|line| Hypothesis::from_line(&line))
                .map_err(|e| e.with_line(i + 1))?;
            hypotheses.push(hyp);
        }
        Ok(Self::from_hypotheses(hypotheses))
    }

    /// Returns all hypotheses as a flat sequence.
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// Returns all hypotheses for score updates.
    pub fn hypotheses_mut(&mut self) -> &mut [Hypothesis] {
        &mut self.hypotheses
    }

    /// Replaces the score of every hypothesis with its sentence-level BLEU.
    ///
    /// Segment identifiers are 0-based indices into `references`, and each entry holds all
    /// references of that segment.
    ///
    /// # Errors
    ///
    /// If a segment identifier is not a number or has no references, an error variant will be
    /// returned and no score is changed.
    pub fn score_with_references<S>(
        &mut self,
        references: &[Vec<S>],
        extractor: &BleuStatsExtractor,
        scorer: &BleuScorer,
    ) -> Result<()>
    where
        S: AsRef<str>,
    {
        let mut segment_refs = Vec::with_capacity(self.segments.len());
        for (segment_id, range) in &self.segments {
            let refs = segment_id
                .parse::<usize>()
                .ok()
                .and_then(|i| references.get(i))
                .ok_or_else(|| {
                    NbestTuneError::invalid_argument(
                        "segment_id",
                        format!("segment {} has no reference", segment_id),
                    )
                })?;
            segment_refs.push((extractor.reference(refs.as_slice()), range.clone()));
        }
        let mut scores = Vec::with_capacity(self.hypotheses.len());
        for (reference, range) in &segment_refs {
            for hyp in &self.hypotheses[range.clone()] {
                scores.push(scorer.score(&extractor.stats(reference, &hyp.text))?);
            }
        }
        let ranges = segment_refs.into_iter().flat_map(|(_, range)| range);
        for (i, score) in ranges.zip(scores) {
            self.hypotheses[i].score = score;
        }
        Ok(())
    }

    /// Gets the hypotheses of a segment.
    pub fn segment(&self, segment_id: &str) -> Option<&[Hypothesis]> {
        self.segments
            .iter()
            .find(|(id, _)| id == segment_id)
            .map(|(_, range)| &self.hypotheses[range.clone()])
    }

    /// Iterates over segments.
    pub fn iter_segments(&self) -> impl Iterator<Item = (&str, &[Hypothesis])> {
        self.segments
            .iter()
            .map(move |(id, range)| (id.as_str(), &self.hypotheses[range.clone()]))
    }

    /// Returns the number of segments.
    pub fn n_segments(&self) -> usize {
        self.segments.len()
    }

    /// Returns the number of hypotheses.
    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }
}
