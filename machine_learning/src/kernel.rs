use std::collections::{HashMap, HashSet};

use rand::Rng;

use crate::{Key, LocalParamCache, Loss, ParamAccess, Result};

/// The keys referenced by the lines of one minibatch window.
pub type ActiveKeySet = HashSet<Key>;

/// Occurrences of each key across one gathered window.
pub type FrequencyTable = HashMap<Key, u64>;

/// The model-specific half of a training round: parsing lines into instances and
/// turning an instance into gradient contributions.
pub trait Kernel: Send + Sync {
    type Access: ParamAccess;
    /// A parsed training line, reused across lines by each task.
    type Instance: Default + Send;
    /// Read-only state rebuilt on every round from the gathered frequencies, it's kept
    /// by the caller so its storage outlives the rounds.
    type Round: Default + Send + Sync;

    fn access(&self) -> Self::Access;

    /// Parses `line` into `instance`.
    ///
    /// # Returns
    /// `Ok(false)` if the line is valid but has nothing to learn from, an `MlErr::Parse`
    /// if it's malformed.
    fn parse(&self, line: &str, instance: &mut Self::Instance) -> Result<bool>;

    /// Calls `f` with every key referenced by `instance`, repeated keys included.
    fn for_each_key(&self, instance: &Self::Instance, f: impl FnMut(Key));

    /// Refills `round` for a new window.
    ///
    /// # Arguments
    /// * `freq` - The key frequencies of the round's window.
    /// * `round` - The state of the previous round, or a default one.
    fn prepare_round(&self, freq: &FrequencyTable, round: &mut Self::Round) -> Result<()>;

    /// Accumulates the gradient contributions of `instance` into `cache`.
    ///
    /// Only keys reported by `for_each_key` for this same instance may be touched.
    ///
    /// # Arguments
    /// * `instance` - The training instance.
    /// * `round` - The state refilled by `prepare_round`.
    /// * `cache` - The round's local cache, every key of `instance` must be present.
    /// * `rng` - The task's random source.
    /// * `loss` - Where the diagnostic loss terms are accumulated.
    fn learn<R: Rng + ?Sized>(
        &self,
        instance: &Self::Instance,
        round: &Self::Round,
        cache: &LocalParamCache<Self::Access>,
        rng: &mut R,
        loss: &mut Loss,
    );

    /// How many window slots each parsed instance consumes during compute.
    fn lines_per_instance(&self) -> usize {
        1
    }
}
