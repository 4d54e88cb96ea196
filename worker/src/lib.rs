pub mod client;
pub mod config;
pub mod data;
mod error;
pub mod gather;
pub mod loop_;
pub mod metrics;
pub mod runner;

pub use config::TrainConfig;
pub use error::{Result, WorkerErr};
pub use loop_::TrainingLoop;
