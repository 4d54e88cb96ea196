use std::sync::Arc;

use machine_learning::{Key, LocalParamCache, ParamAccess};
use parameter_server::ParameterServer;

use super::{Partition, PullPushClient};
use crate::Result;

/// A client for servers living in the same process, used by the local mode.
pub struct InProcessClient<A: ParamAccess> {
    servers: Vec<Arc<ParameterServer<A>>>,
    /// This worker's rank at each server.
    ranks: Vec<usize>,
    partition: Partition,
    values: Vec<f32>,
}

impl<A: ParamAccess> InProcessClient<A> {
    /// Joins every server's cohort.
    ///
    /// # Arguments
    /// * `servers` - The whole server tier, in partition order.
    pub fn join(servers: Vec<Arc<ParameterServer<A>>>) -> Result<Self> {
        let ranks = servers
            .iter()
            .map(|server| server.join())
            .collect::<parameter_server::Result<_>>()?;

        Ok(Self {
            partition: Partition::new(servers.len()),
            servers,
            ranks,
            values: Vec::new(),
        })
    }
}

impl<A: ParamAccess> PullPushClient<A> for InProcessClient<A> {
    fn rank(&self) -> usize {
        self.ranks[0]
    }

    fn workers(&self) -> usize {
        self.servers[0].workers()
    }

    fn pull(&mut self, keys: &[Key], cache: &mut LocalParamCache<A>) -> Result<()> {
        let width = cache.access().pull_width();

        for ((server, &rank), keys) in self.servers.iter().zip(&self.ranks).zip(self.partition.split(keys)) {
            self.values.clear();
            self.values.resize(keys.len() * width, 0.0);
            server.pull(rank, &keys, &mut self.values)?;
            cache.load_pull_values(&keys, &self.values)?;
        }

        Ok(())
    }

    fn push(&mut self, keys: &[Key], cache: &mut LocalParamCache<A>) -> Result<()> {
        for ((server, &rank), keys) in self.servers.iter().zip(&self.ranks).zip(self.partition.split(keys)) {
            cache.export_push_values(&keys, &mut self.values);
            server.push(rank, &keys, &self.values)?;
        }

        cache.remove_keys(keys);
        Ok(())
    }

    fn epoch_done(&mut self) -> Result<()> {
        for (server, &rank) in self.servers.iter().zip(&self.ranks) {
            server.finish_epoch(rank)?;
        }
        for (server, &rank) in self.servers.iter().zip(&self.ranks) {
            server.await_epoch(rank)?;
        }

        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        for (server, &rank) in self.servers.iter().zip(&self.ranks) {
            server.leave(rank);
        }

        Ok(())
    }
}
