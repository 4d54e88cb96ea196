mod in_process;
mod partition;
mod remote;

use machine_learning::{Key, LocalParamCache, ParamAccess};

pub use in_process::InProcessClient;
pub use partition::Partition;
pub use remote::RemoteClient;

use crate::Result;

/// The synchronization boundary with the server tier.
///
/// Keys are partitioned over the servers by `key % servers`, and every server is
/// contacted on every call, even with no keys, since each one counts its cohort's
/// arrivals. All calls block until the whole cohort reached the same point.
pub trait PullPushClient<A: ParamAccess> {
    /// The rank of this worker within the cohort.
    fn rank(&self) -> usize;

    /// The size of the cohort.
    fn workers(&self) -> usize;

    /// Fetches the current values of `keys` into `cache`, overwriting stale ones.
    ///
    /// # Arguments
    /// * `keys` - The round's active keys, sorted and without repetitions.
    /// * `cache` - The worker's cache.
    fn pull(&mut self, keys: &[Key], cache: &mut LocalParamCache<A>) -> Result<()>;

    /// Sends the accumulated gradients of `keys` and drops them from `cache`.
    ///
    /// # Arguments
    /// * `keys` - The same keys given to the round's pull.
    /// * `cache` - The worker's cache.
    fn push(&mut self, keys: &[Key], cache: &mut LocalParamCache<A>) -> Result<()>;

    /// Tells the servers this worker finished its epoch and waits for the rest.
    fn epoch_done(&mut self) -> Result<()>;

    /// Leaves the cohort, the client can't be used afterwards.
    fn leave(&mut self) -> Result<()>;
}
