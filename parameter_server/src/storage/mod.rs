mod shard;
mod store;

use shard::ParamShard;
pub use store::ParamStore;
