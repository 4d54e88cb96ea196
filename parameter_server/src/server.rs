use std::{
    fs::File,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use log::{debug, info};
use machine_learning::{Key, ParamAccess};

use crate::{Result, storage::ParamStore, synchronization::Cohort};

/// One node of the server tier: a partition of the parameters plus the cohort of
/// workers synchronizing against it.
///
/// Every call that takes part in a round blocks until the whole cohort reached the
/// same point, so it must run on a thread that's allowed to block.
pub struct ParameterServer<A: ParamAccess> {
    rank: usize,
    store: ParamStore<A>,
    cohort: Cohort,
}

impl<A: ParamAccess> ParameterServer<A> {
    /// Creates a new `ParameterServer`.
    ///
    /// # Arguments
    /// * `rank` - The index of this server, used to name its dump.
    /// * `store` - The parameter storage.
    /// * `cohort` - The workers that train against this server.
    pub fn new(rank: usize, store: ParamStore<A>, cohort: Cohort) -> Self {
        Self {
            rank,
            store,
            cohort,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn workers(&self) -> usize {
        self.cohort.workers()
    }

    pub fn store(&self) -> &ParamStore<A> {
        &self.store
    }

    /// Registers a new worker.
    ///
    /// # Returns
    /// The worker's rank within this server's cohort.
    pub fn join(&self) -> Result<usize> {
        let worker = self.cohort.join()?;
        info!(server = self.rank, worker = worker; "worker joined");
        Ok(worker)
    }

    /// Copies the values of `keys` into `out` and waits for the rest of the cohort
    /// to pull.
    ///
    /// # Arguments
    /// * `worker` - The pulling worker.
    /// * `keys` - The requested keys.
    /// * `out` - Where to write `pull_width` numbers per key.
    pub fn pull(&self, worker: usize, keys: &[Key], out: &mut [f32]) -> Result<()> {
        debug!(server = self.rank, worker = worker, keys = keys.len(); "pull");
        self.store.pull(keys, out)?;
        self.cohort.round_wait(worker)
    }

    /// Applies the gradients of `keys` and waits for the rest of the cohort to push.
    ///
    /// # Arguments
    /// * `worker` - The pushing worker.
    /// * `keys` - The pushed keys.
    /// * `grads` - `push_width` numbers per key.
    pub fn push(&self, worker: usize, keys: &[Key], grads: &[f32]) -> Result<()> {
        debug!(server = self.rank, worker = worker, keys = keys.len(); "push");
        self.store.push(keys, grads)?;
        self.cohort.round_wait(worker)
    }

    /// Takes `worker` out of the rounds until the whole cohort finishes the epoch.
    pub fn epoch_done(&self, worker: usize) -> Result<()> {
        debug!(server = self.rank, worker = worker; "epoch done");
        self.cohort.epoch_done(worker)
    }

    /// Takes `worker` out of the rounds without waiting for the rest.
    pub fn finish_epoch(&self, worker: usize) -> Result<()> {
        debug!(server = self.rank, worker = worker; "epoch finished");
        self.cohort.finish_epoch(worker)
    }

    /// Waits until the whole cohort finished the epoch.
    pub fn await_epoch(&self, worker: usize) -> Result<()> {
        self.cohort.await_epoch(worker)
    }

    /// Removes `worker` from the cohort.
    pub fn leave(&self, worker: usize) {
        self.cohort.leave(worker);
    }

    /// Detaches the whole cohort, so no worker stays blocked on a barrier.
    pub fn shutdown(&self) {
        self.cohort.dissolve();
        info!(server = self.rank; "cohort dissolved");
    }

    /// The path this server dumps its parameters to.
    ///
    /// # Arguments
    /// * `output` - The configured output prefix.
    pub fn dump_path(&self, output: &Path) -> PathBuf {
        let mut path = output.as_os_str().to_owned();
        path.push(format!("-{}.txt", self.rank));
        PathBuf::from(path)
    }

    /// Writes every parameter held by this server to `<output>-<rank>.txt`.
    ///
    /// # Returns
    /// The path written.
    pub fn dump(&self, output: &Path) -> io::Result<PathBuf> {
        let path = self.dump_path(output);
        let mut writer = BufWriter::new(File::create(&path)?);
        self.store.dump(&mut writer)?;

        info!(server = self.rank, params = self.store.len(); "parameters written to {}", path.display());
        Ok(path)
    }
}
