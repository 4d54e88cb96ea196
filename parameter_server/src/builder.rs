use std::time::Duration;

use comms::specs::server::ServerSpec;
use machine_learning::{
    ParamAccess,
    initialization::{self, RandErr},
};

use crate::{ParameterServer, storage::ParamStore, synchronization::Cohort};

/// Builds a `ParameterServer` following a spec.
///
/// # Arguments
/// * `rank` - The index of the server.
/// * `workers` - The size of the cohort.
/// * `access` - The model's parameter layout.
/// * `spec` - The server's specification.
///
/// # Returns
/// A `RandErr` if the initialization distribution is invalid.
pub fn build_server<A: ParamAccess>(
    rank: usize,
    workers: usize,
    access: A,
    spec: &ServerSpec,
) -> Result<ParameterServer<A>, RandErr> {
    let init = spec.init.unwrap_or_else(|| access.default_init());
    let seed = spec.seed.map(|seed| seed.wrapping_add(rank as u64));
    let param_gen = initialization::build_param_gen(init, seed)?;

    let store = ParamStore::new(access, spec.shards, param_gen);
    let timeout = spec.barrier_timeout_secs.map(Duration::from_secs);
    let cohort = Cohort::new(workers, timeout);

    Ok(ParameterServer::new(rank, store, cohort))
}
