//! Definition of errors.

use std::error::Error;
use std::fmt;

pub type Result<T, E = NbestTuneError> = std::result::Result<T, E>;

#[derive(Debug)]
pub enum NbestTuneError {
    ConfigParse(ConfigParseError),
    UnknownFeature(UnknownFeatureError),
    MalformedNBestLine(MalformedNBestLineError),
    WrongStatsCount(WrongStatsCountError),
    InvalidArgument(InvalidArgumentError),
    IOError(std::io::Error),
}

impl NbestTuneError {
    pub(crate) fn config_parse<S>(line: Option<usize>, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::ConfigParse(ConfigParseError {
            line,
            msg: msg.into(),
        })
    }

    pub(crate) fn unknown_feature<S>(feature: S, index: Option<usize>) -> Self
    where
        S: Into<String>,
    {
        Self::UnknownFeature(UnknownFeatureError {
            feature: feature.into(),
            index,
            segment_id: None,
            line: None,
        })
    }

    pub(crate) fn malformed_line<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::MalformedNBestLine(MalformedNBestLineError {
            line: None,
            msg: msg.into(),
        })
    }

    pub(crate) fn wrong_stats_count(expected: usize, found: usize) -> Self {
        Self::WrongStatsCount(WrongStatsCountError { expected, found })
    }

    pub(crate) fn invalid_argument<S>(arg: &'static str, msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::InvalidArgument(InvalidArgumentError {
            arg,
            msg: msg.into(),
        })
    }

    /// Attaches the segment identifier of the offending hypothesis.
    pub(crate) fn with_segment_id(mut self, segment_id: &str) -> Self {
        if let Self::UnknownFeature(e) = &mut self {
            e.segment_id = Some(segment_id.to_string());
        }
        self
    }

    /// Attaches a 1-based line number of the input stream.
    pub(crate) fn with_line(mut self, line_no: usize) -> Self {
        match &mut self {
            Self::UnknownFeature(e) => e.line = Some(line_no),
            Self::MalformedNBestLine(e) => e.line = Some(line_no),
            _ => (),
        }
        self
    }
}

impl fmt::Display for NbestTuneError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ConfigParse(e) => e.fmt(f),
            Self::UnknownFeature(e) => e.fmt(f),
            Self::MalformedNBestLine(e) => e.fmt(f),
            Self::WrongStatsCount(e) => e.fmt(f),
            Self::InvalidArgument(e) => e.fmt(f),
            Self::IOError(e) => e.fmt(f),
        }
    }
}

impl Error for NbestTuneError {}

/// Error used when the weight configuration is missing or malformed.
#[derive(Debug)]
pub struct ConfigParseError {
    /// Line number in the configuration, if known.
    pub(crate) line: Option<usize>,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for ConfigParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "ConfigParseError: line {}: {}", line, self.msg),
            None => write!(f, "ConfigParseError: {}", self.msg),
        }
    }
}

impl Error for ConfigParseError {}

/// Error used when a hypothesis refers to a feature that has no weight.
#[derive(Debug)]
pub struct UnknownFeatureError {
    /// Name of the feature group.
    pub(crate) feature: String,

    /// Sub-feature index, if the group exists but is too short.
    pub(crate) index: Option<usize>,

    /// Segment of the offending hypothesis.
    pub(crate) segment_id: Option<String>,

    /// Line number in the n-best stream.
    pub(crate) line: Option<usize>,
}

impl UnknownFeatureError {
    pub fn feature(&self) -> &str {
        &self.feature
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn segment_id(&self) -> Option<&str> {
        self.segment_id.as_deref()
    }
}

impl fmt::Display for UnknownFeatureError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "UnknownFeatureError: ")?;
        match self.index {
            Some(index) => write!(f, "no weight for `{}` index {}", self.feature, index)?,
            None => write!(f, "no weight for `{}`", self.feature)?,
        }
        if let Some(segment_id) = &self.segment_id {
            write!(f, " (segment {})", segment_id)?;
        }
        if let Some(line) = self.line {
            write!(f, " (line {})", line)?;
        }
        Ok(())
    }
}

impl Error for UnknownFeatureError {}

/// Error used when an n-best line cannot be split into the required fields.
#[derive(Debug)]
pub struct MalformedNBestLineError {
    /// Line number in the n-best stream, if known.
    pub(crate) line: Option<usize>,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for MalformedNBestLineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "MalformedNBestLineError: line {}: {}", line, self.msg),
            None => write!(f, "MalformedNBestLineError: {}", self.msg),
        }
    }
}

impl Error for MalformedNBestLineError {}

/// Error used when a BLEU statistics vector has the wrong length.
#[derive(Debug)]
pub struct WrongStatsCountError {
    pub(crate) expected: usize,
    pub(crate) found: usize,
}

impl WrongStatsCountError {
    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn found(&self) -> usize {
        self.found
    }
}

impl fmt::Display for WrongStatsCountError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "WrongStatsCountError: expected {} statistics, found {}",
            self.expected, self.found
        )
    }
}

impl Error for WrongStatsCountError {}

/// Error used when the argument is invalid.
#[derive(Debug)]
pub struct InvalidArgumentError {
    /// Name of the argument.
    pub(crate) arg: &'static str,

    /// Error message.
    pub(crate) msg: String,
}

impl fmt::Display for InvalidArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InvalidArgumentError: {}: {}", self.arg, self.msg)
    }
}

impl Error for InvalidArgumentError {}

impl From<std::io::Error> for NbestTuneError {
    fn from(error: std::io::Error) -> Self {
        Self::IOError(error)
    }
}
