use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Execution bounds for a worker process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorkerSpec {
    /// Lines per minibatch window.
    pub minibatch: NonZeroUsize,
    /// Size of the worker's thread pool.
    pub threads: NonZeroUsize,
    /// Lines handed to a task per acquisition of the file lock.
    #[serde(default = "default_chunk")]
    pub chunk: NonZeroUsize,
    #[serde(default)]
    pub seed: Option<u64>,
}

const DEFAULT_CHUNK: NonZeroUsize = NonZeroUsize::new(16).unwrap();

fn default_chunk() -> NonZeroUsize {
    DEFAULT_CHUNK
}
