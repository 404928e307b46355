use std::io::{BufRead, Write};

use crate::errors::Result;
use crate::nbest::NBestLine;
use crate::recombiner::ScoreRecombiner;

/// Streaming selector of the best hypothesis of each segment.
///
/// Lines must be grouped by segment, but the segments need not be sorted. Only the current
/// segment is kept in memory.
///
/// # Examples
///
/// ```
/// use nbest_tune::{NBestLine, TopSelector};
///
/// let mut selector = TopSelector::new();
/// let mut best = vec![];
/// for line in ["0 ||| a ||| F= 1 ||| 0.4", "0 ||| b ||| F= 1 ||| 0.9", "1 ||| c ||| F= 1 ||| 0.1"] {
///     if let Some(text) = selector.push(&NBestLine::parse(line).unwrap()).unwrap() {
///         best.push(text);
///     }
/// }
/// best.extend(selector.finish());
/// assert_eq!(vec!["b", "c"], best);
/// ```
#[derive(Debug, Default)]
pub struct TopSelector {
    current_id: Option<String>,
    current_best: String,
    current_top_score: f64,
}

impl TopSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a line.
    ///
    /// A line of a new segment always becomes the best of that segment, whatever its score.
    /// Within a segment, a line replaces the best only if its score is strictly greater.
    ///
    /// # Returns
    ///
    /// The best text of the previous segment when `line` starts a new segment.
    ///
    /// # Errors
    ///
    /// If the score field is not a number, an error variant will be returned.
    pub fn push(&mut self, line: &NBestLine) -> Result<Option<String>> {
        let score = line.score()?;
        let segment_id = line.segment_id();
        if self.current_id.as_deref() == Some(segment_id) {
            if score > self.current_top_score {
                self.current_best = line.text().trim().to_string();
                self.current_top_score = score;
            }
            return Ok(None);
        }
        let flushed = self
            .current_id
            .replace(segment_id.to_string())
            .map(|_| std::mem::take(&mut self.current_best));
        self.current_best = line.text().trim().to_string();
        self.current_top_score = score;
        Ok(flushed)
    }

    /// Flushes the best text of the last segment.
    pub fn finish(&mut self) -> Option<String> {
        self.current_id
            .take()
            .map(|_| std::mem::take(&mut self.current_best))
    }

    /// Writes the best text of each segment of a stream, one per line.
    ///
    /// If `recombiner` is given, each line is rescored before selection.
    ///
    /// # Returns
    ///
    /// The number of segments written.
    ///
    /// # Errors
    ///
    /// The first malformed line aborts the stream. Errors carry the 1-based line number.
    pub fn select_stream<R, W>(
        mut self,
        rdr: R,
        mut wtr: W,
        recombiner: Option<&ScoreRecombiner>,
    ) -> Result<usize>
    where
        R: BufRead,
        W: Write,
    {
        let mut n_segments = 0;
        for (i, line) in rdr.lines().enumerate() {
            let line = line?;
            let flushed = NBestLine::parse(&line)
                .and_then(|line| match recombiner {
                    Some(recombiner) => recombiner.recombine(&line),
                    None => Ok(line),
                })
                .and_then(|line| self.push(&line))
                .map_err(|e| e.with_line(i + 1))?;
            if let Some(text) = flushed {
                writeln!(wtr, "{}", text)?;
                n_segments += 1;
            }
        }
        if let Some(text) = self.finish() {
            writeln!(wtr, "{}", text)?;
            n_segments += 1;
        }
        wtr.flush()?;
        Ok(n_segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::errors::NbestTuneError;
    use crate::weights::WeightVector;

    fn select(input: &str) -> Vec<String> {
        let mut output = vec![];
        TopSelector::new()
            .select_stream(input.as_bytes(), &mut output, None)
            .unwrap();
        String::from_utf8(output)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_new_segment_adopted_regardless_of_score() {
        let input = "\
1 ||| one-a ||| F= 0 ||| 0.4
1 ||| one-b ||| F= 0 ||| 0.9
1 ||| one-c ||| F= 0 ||| 0.2
2 ||| two-a ||| F= 0 ||| 0.1
";

        assert_eq!(vec!["one-b", "two-a"], select(input));
    }

    #[test]
    fn test_ties_keep_first() {
        let input = "\
0 ||| first ||| F= 0 ||| 0.5
0 ||| second ||| F= 0 ||| 0.5
";

        assert_eq!(vec!["first"], select(input));
    }

    #[test]
    fn test_unsorted_segments() {
        let input = "\
5 ||| x ||| F= 0 ||| -3
5 ||| y ||| F= 0 ||| -1
2 ||| z ||| F= 0 ||| -10
9 ||| w ||| F= 0 ||| 7
";

        assert_eq!(vec!["y", "z", "w"], select(input));
    }

    #[test]
    fn test_noncontiguous_segment_emitted_twice() {
        let input = "\
0 ||| a ||| F= 0 ||| 1
1 ||| b ||| F= 0 ||| 1
0 ||| c ||| F= 0 ||| 0
";

        assert_eq!(vec!["a", "b", "c"], select(input));
    }

    #[test]
    fn test_empty_stream() {
        assert!(select("").is_empty());
    }

    #[test]
    fn test_push_and_finish() {
        let mut selector = TopSelector::new();

        let line = NBestLine::parse("0 ||| a ||| F= 0 ||| 1").unwrap();
        assert_eq!(None, selector.push(&line).unwrap());
        assert_eq!(Some("a".to_string()), selector.finish());
        assert_eq!(None, selector.finish());
    }

    #[test]
    fn test_select_with_recombiner() {
        let weights = WeightVector::read("[weight]\nF -1\n".as_bytes()).unwrap();
        let recombiner = ScoreRecombiner::new(&weights);
        let input = "\
0 ||| a ||| F= 1 ||| 10
0 ||| b ||| F= 3 ||| 20
0 ||| c ||| F= 0.5 ||| 0
";
        let mut output = vec![];

        let n_segments = TopSelector::new()
            .select_stream(input.as_bytes(), &mut output, Some(&recombiner))
            .unwrap();

        assert_eq!(1, n_segments);
        assert_eq!("c\n", String::from_utf8(output).unwrap());
    }

    #[test]
    fn test_select_aborts_on_malformed_line() {
        let input = "0 ||| a ||| F= 1 ||| 10\n0 ||| b\n";
        let mut output = vec![];

        let result = TopSelector::new().select_stream(input.as_bytes(), &mut output, None);

        assert!(matches!(result, Err(NbestTuneError::MalformedNBestLine(_))));
        assert_eq!(
            "MalformedNBestLineError: line 2: expected at least 4 fields, found 2",
            &result.err().unwrap().to_string()
        );
    }

    #[test]
    fn test_select_aborts_on_blank_line() {
        let input = "0 ||| a ||| F= 1 ||| 10\n   \n1 ||| b ||| F= 1 ||| 10\n";
        let mut output = vec![];

        let result = TopSelector::new().select_stream(input.as_bytes(), &mut output, None);

        assert_eq!(
            "MalformedNBestLineError: line 2: expected at least 4 fields, found 1",
            &result.err().unwrap().to_string()
        );
    }
}
