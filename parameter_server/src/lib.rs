mod builder;
mod error;
mod server;
pub mod service;
pub mod storage;
pub mod synchronization;

pub use builder::build_server;
pub use error::{Result, SyncErr};
pub use server::ParameterServer;
