use std::{ops::Deref, sync::Arc};

use machine_learning::{Key, ParamAccess};
use tokio::task;

use crate::{ParameterServer, Result};

/// The async interface to a shared `ParameterServer`.
///
/// It bridges the async runtime with the blocking barriers of the server, so it
/// must only be used from a multi-threaded runtime.
pub struct ServerHandle<A: ParamAccess>(Arc<ParameterServer<A>>);

impl<A: ParamAccess> Clone for ServerHandle<A> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<A: ParamAccess> Deref for ServerHandle<A> {
    type Target = ParameterServer<A>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<A: ParamAccess> ServerHandle<A> {
    /// Creates a new `ServerHandle`.
    ///
    /// # Arguments
    /// * `server` - The underlying parameter server.
    pub fn new(server: Arc<ParameterServer<A>>) -> Self {
        Self(server)
    }

    /// Async call to `ParameterServer::join`.
    pub async fn join(&self) -> Result<usize> {
        task::block_in_place(|| self.0.join())
    }

    /// Async call to `ParameterServer::pull`.
    pub async fn pull(&self, worker: usize, keys: &[Key], out: &mut [f32]) -> Result<()> {
        task::block_in_place(|| self.0.pull(worker, keys, out))
    }

    /// Async call to `ParameterServer::push`.
    pub async fn push(&self, worker: usize, keys: &[Key], grads: &[f32]) -> Result<()> {
        task::block_in_place(|| self.0.push(worker, keys, grads))
    }

    /// Async call to `ParameterServer::epoch_done`.
    pub async fn epoch_done(&self, worker: usize) -> Result<()> {
        task::block_in_place(|| self.0.epoch_done(worker))
    }
}
