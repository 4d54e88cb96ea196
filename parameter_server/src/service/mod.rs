mod handle;
mod listener;
mod session;

pub use handle::ServerHandle;
pub use listener::serve;
pub use session::run_session;
