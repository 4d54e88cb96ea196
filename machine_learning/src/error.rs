use std::{
    error::Error,
    fmt::{self, Display},
};

/// The result type used in the entire machine learning module.
pub type Result<T> = std::result::Result<T, MlErr>;

/// The machine learning module's error type.
#[derive(Debug, Clone, PartialEq)]
pub enum MlErr {
    /// A training line could not be turned into an instance.
    Parse { line: String, reason: String },
    /// The unigram table was requested over an empty frequency table.
    EmptyFrequencyTable,
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
}

impl MlErr {
    /// Creates a new `MlErr::Parse`.
    ///
    /// # Arguments
    /// * `line` - The offending line.
    /// * `reason` - What went wrong.
    pub fn parse(line: &str, reason: impl Into<String>) -> Self {
        Self::Parse {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

impl Display for MlErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlErr::Parse { line, reason } => write!(f, "malformed line {line:?}: {reason}"),
            MlErr::EmptyFrequencyTable => {
                write!(f, "the frequency table must be filled before building the unigram table")
            }
            MlErr::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "There's a size mismatch in {what}, got {got} and expected {expected}"
            ),
        }
    }
}

impl Error for MlErr {}
