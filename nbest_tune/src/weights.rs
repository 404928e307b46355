use std::io::BufRead;

use hashbrown::HashMap;

use crate::errors::{NbestTuneError, Result};

const WEIGHT_SECTION: &str = "[weight]";

/// Feature weights keyed by feature-group name.
///
/// Each group holds one weight per sub-feature, in the order the decoder emits the sub-feature
/// values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightVector {
    names: Vec<String>,
    weights: HashMap<String, Vec<f64>>,
}

impl WeightVector {
    /// Creates an empty weight vector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the weights of a feature group.
    ///
    /// # Errors
    ///
    /// If the group is already defined, an error variant will be returned.
    pub fn insert<S>(&mut self, name: S, weights: Vec<f64>) -> Result<()>
    where
        S: Into<String>,
    {
        let name = name.into();
        if self.weights.contains_key(&name) {
            return Err(NbestTuneError::config_parse(
                None,
                format!("duplicate feature `{}`", name),
            ));
        }
        self.names.push(name.clone());
        self.weights.insert(name, weights);
        Ok(())
    }

    /// Reads the `[weight]` section of a configuration.
    ///
    /// Each line of the section is a feature name followed by one or more weights. The section
    /// ends at the next `[...]` header or at the end of input. Blank lines and lines starting
    /// with `#` are skipped.
    ///
    /// # Arguments
    ///
    /// * `rdr` - A data source.
    ///
    /// # Errors
    ///
    /// If the section is absent or contains a malformed line, an error variant will be
    /// returned. Nothing is returned on failure; the weights are either read completely or not
    /// at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use nbest_tune::WeightVector;
    ///
    /// let config = "[weight]\nLM 0.5\nTM 0.2 0.3\n";
    /// let weights = WeightVector::read(config.as_bytes()).unwrap();
    /// assert_eq!(Some(0.3), weights.weight("TM", 1));
    /// ```
    pub fn read<R>(rdr: R) -> Result<Self>
    where
        R: BufRead,
    {
        let mut result = Self::new();
        let mut found = false;
        let mut in_section = false;
        for (i, line) in rdr.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.starts_with('[') && line.ends_with(']') {
                in_section = line == WEIGHT_SECTION;
                found |= in_section;
                continue;
            }
            if !in_section || line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut tokens = line.split_whitespace();
            // The line is not empty, so there is at least one token.
            let name = tokens.next().unwrap_or_default();
            let values = tokens
                .map(|t| {
                    t.parse::<f64>().map_err(|_| {
                        NbestTuneError::config_parse(
                            Some(i + 1),
                            format!("invalid weight `{}` for `{}`", t, name),
                        )
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            if values.is_empty() {
                return Err(NbestTuneError::config_parse(
                    Some(i + 1),
                    format!("no weights for `{}`", name),
                ));
            }
            result.insert(name, values).map_err(|e| match e {
                NbestTuneError::ConfigParse(mut e) => {
                    e.line = Some(i + 1);
                    NbestTuneError::ConfigParse(e)
                }
                e => e,
            })?;
        }
        if !found {
            return Err(NbestTuneError::config_parse(
                None,
                format!("section {} not found", WEIGHT_SECTION),
            ));
        }
        Ok(result)
    }

    /// Gets the weights of a feature group.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.weights.get(name).map(|w| w.as_slice())
    }

    /// Gets the weight of a sub-feature.
    pub fn weight(&self, name: &str, index: usize) -> Option<f64> {
        self.get(name).and_then(|w| w.get(index).copied())
    }

    /// Iterates over the feature groups in the order they were defined.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.names
            .iter()
            .map(move |name| (name.as_str(), self.weights[name].as_slice()))
    }

    /// Returns the number of feature groups.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
