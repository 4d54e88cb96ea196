use serde::{Deserialize, Serialize};

/// Where the embedding model's push update writes the learning-rate scaled term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateTarget {
    /// Both terms land in the squared-gradient accumulator, the value is left untouched.
    #[default]
    Accumulator,
    /// The value moves, as in the linear model.
    Value,
}

/// The specification for the logistic regression model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LinearSpec {
    /// Charges two window slots per instance during compute.
    #[serde(default = "default_true")]
    pub count_lines_twice: bool,
}

impl Default for LinearSpec {
    fn default() -> Self {
        Self {
            count_lines_twice: true,
        }
    }
}

/// The specification for the skip-gram negative sampling model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Word2VecSpec {
    /// Embedding dimensionality.
    pub dim: usize,
    /// Context window radius.
    pub window: usize,
    /// Negative samples per target.
    pub negative: usize,
    /// Shorter sentences are discarded.
    pub min_sentence_length: usize,
    /// Scale of the worker-side gradient.
    pub learning_rate: f32,
    #[serde(default = "default_table_size")]
    pub table_size: usize,
    #[serde(default)]
    pub update_target: UpdateTarget,
}

/// The specification for the trained model.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Linear(LinearSpec),
    Word2vec(Word2VecSpec),
}

fn default_true() -> bool {
    true
}

fn default_table_size() -> usize {
    100_000_000
}
