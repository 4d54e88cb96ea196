pub mod access;
pub mod atomic;
pub mod cache;
pub mod error;
pub mod initialization;
pub mod kernel;
pub mod loss;
pub mod models;
pub mod optimization;

pub use access::{Key, ParamAccess};
pub use cache::LocalParamCache;
pub use error::{MlErr, Result};
pub use kernel::{ActiveKeySet, FrequencyTable, Kernel};
pub use loss::Loss;
