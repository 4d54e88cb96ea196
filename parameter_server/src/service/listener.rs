use std::io;

use log::{info, warn};
use machine_learning::ParamAccess;
use tokio::{net::TcpListener, task::JoinSet};

use super::{ServerHandle, run_session};

/// Accepts exactly one connection per worker of the cohort and serves them until
/// they all disconnect.
///
/// # Arguments
/// * `listener` - A bound listener.
/// * `handle` - The served parameter server.
///
/// # Returns
/// The first session error, after every session finished.
pub async fn serve<A: ParamAccess>(listener: TcpListener, handle: ServerHandle<A>) -> io::Result<()> {
    let mut sessions = JoinSet::new();

    for _ in 0..handle.workers() {
        let (stream, addr) = listener.accept().await?;
        stream.set_nodelay(true)?;
        info!(server = handle.rank(); "worker connected from {addr}");

        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        sessions.spawn(run_session(handle.clone(), rx, tx));
    }

    let mut first_err = None;
    while let Some(res) = sessions.join_next().await {
        let res = res.map_err(io::Error::other).and_then(|res| res);
        if let Err(e) = res {
            warn!(server = handle.rank(); "session failed: {e}");
            first_err.get_or_insert(e);
        }
    }

    match first_err {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
