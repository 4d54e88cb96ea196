use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// The specification for the `ParamGen` trait, used to create a parameter the first
/// time its key is seen by the server.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGenSpec {
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    Normal { mean: f32, std_dev: f32 },
}

/// The specification for a parameter server node.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSpec {
    /// Learning rate of the server-side adaptive gradient update.
    pub learning_rate: f32,
    #[serde(default = "default_shards")]
    pub shards: NonZeroUsize,
    /// Overrides the model's default initialization.
    #[serde(default)]
    pub init: Option<ParamGenSpec>,
    #[serde(default)]
    pub seed: Option<u64>,
    /// Upper bound for any barrier wait, waits forever when missing.
    #[serde(default)]
    pub barrier_timeout_secs: Option<u64>,
}

const DEFAULT_SHARDS: NonZeroUsize = NonZeroUsize::new(16).unwrap();

fn default_shards() -> NonZeroUsize {
    DEFAULT_SHARDS
}
