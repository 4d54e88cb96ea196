use std::io;

use comms::{
    OnoReceiver, OnoSender,
    exchange::{self, unexpected},
    msg::{Command, Msg, Payload},
};
use log::{debug, info, warn};
use machine_learning::ParamAccess;
use tokio::io::{AsyncRead, AsyncWrite};

use super::ServerHandle;
use crate::SyncErr;

/// Serves a single worker connection until it disconnects.
///
/// The worker is removed from the cohort whenever the connection ends, cleanly or
/// not, so the rest of the cohort doesn't wait on it.
///
/// # Arguments
/// * `handle` - The served parameter server.
/// * `rx` - The receiving end of the connection.
/// * `tx` - The sending end of the connection.
pub async fn run_session<A, R, W>(
    handle: ServerHandle<A>,
    mut rx: OnoReceiver<R>,
    mut tx: OnoSender<W>,
) -> io::Result<()>
where
    A: ParamAccess,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let cmd = exchange::recv_control(&mut rx, &mut buf).await?;
    if cmd != Command::Join {
        return Err(unexpected("control/join", &Msg::Control(cmd)));
    }

    let worker = match handle.join().await {
        Ok(worker) => worker,
        Err(e) => {
            tx.send(&Msg::Err(e.to_string().into())).await?;
            return Err(io::Error::other(e));
        }
    };

    let assign = Command::Assign {
        rank: worker,
        workers: handle.workers(),
    };
    tx.send(&Msg::Control(assign)).await?;

    let res = serve_rounds(&handle, worker, &mut rx, &mut tx).await;
    handle.leave(worker);

    match &res {
        Ok(()) => info!(server = handle.rank(), worker = worker; "worker disconnected"),
        Err(e) => warn!(server = handle.rank(), worker = worker; "session ended: {e}"),
    }

    res
}

/// Answers a failed synchronization with an error message, the worker decides
/// whether to go on.
async fn send_result<W>(tx: &mut OnoSender<W>, res: Result<Msg<'_>, SyncErr>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    match res {
        Ok(msg) => tx.send(&msg).await,
        Err(e) => {
            warn!("round failed: {e}");
            tx.send(&Msg::Err(e.to_string().into())).await
        }
    }
}

async fn serve_rounds<A, R, W>(
    handle: &ServerHandle<A>,
    worker: usize,
    rx: &mut OnoReceiver<R>,
    tx: &mut OnoSender<W>,
) -> io::Result<()>
where
    A: ParamAccess,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let width = handle.store().access().pull_width();

    let mut ctl_buf = Vec::new();
    let mut keys_buf = Vec::new();
    let mut values_buf = Vec::new();
    let mut out = Vec::new();

    loop {
        let cmd = match exchange::recv_control(rx, &mut ctl_buf).await {
            Ok(cmd) => cmd,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(worker = worker; "connection closed without disconnect");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match cmd {
            Command::Pull => {
                let keys = exchange::recv_keys(rx, &mut keys_buf).await?;
                out.clear();
                out.resize(keys.len() * width, 0.0);

                let res = handle.pull(worker, keys, &mut out).await;
                let res = res.map(|()| Msg::Data(Payload::Values(&out)));
                send_result(tx, res).await?;
            }
            Command::Push => {
                let keys = exchange::recv_keys(rx, &mut keys_buf).await?;
                let grads = exchange::recv_values(rx, &mut values_buf).await?;

                let res = handle.push(worker, keys, grads).await;
                send_result(tx, res.map(|()| Msg::Control(Command::Ack))).await?;
            }
            Command::EpochDone => {
                let res = handle.epoch_done(worker).await;
                send_result(tx, res.map(|()| Msg::Control(Command::Ack))).await?;
            }
            Command::Disconnect => return Ok(()),
            cmd => return Err(unexpected("a round command", &Msg::Control(cmd))),
        }
    }
}
