use std::{io, net::SocketAddr};

use comms::{
    OnoReceiver, OnoSender, exchange,
    msg::{Command, Msg, Payload},
};
use futures::future::try_join_all;
use log::{debug, info};
use machine_learning::{Key, LocalParamCache, ParamAccess};
use tokio::{
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    runtime::Handle,
};

use super::{Partition, PullPushClient};
use crate::{Result, WorkerErr};

/// One connection to a server of the tier.
struct Connection {
    rx: OnoReceiver<OwnedReadHalf>,
    tx: OnoSender<OwnedWriteHalf>,
    buf: Vec<u64>,
}

impl Connection {
    /// Connects and joins the server's cohort.
    ///
    /// # Returns
    /// The connection plus the rank and cohort size assigned by the server.
    async fn join(addr: SocketAddr) -> Result<(Self, usize, usize)> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;

        let (rx, tx) = stream.into_split();
        let (rx, tx) = comms::channel(rx, tx);
        let mut conn = Self {
            rx,
            tx,
            buf: Vec::new(),
        };

        conn.tx.send(&Msg::Control(Command::Join)).await?;
        match exchange::recv_control(&mut conn.rx, &mut conn.buf).await? {
            Command::Assign { rank, workers } => {
                debug!(rank = rank, workers = workers; "joined server at {addr}");
                Ok((conn, rank, workers))
            }
            cmd => Err(WorkerErr::Protocol {
                expected: "control/assign",
                got: Msg::Control(cmd).kind().to_string(),
            }),
        }
    }

    async fn pull(&mut self, keys: &[Key]) -> io::Result<Vec<f32>> {
        self.tx.feed(&Msg::Control(Command::Pull)).await?;
        self.tx.send(&Msg::Data(Payload::Keys(keys))).await?;

        let values = exchange::recv_values(&mut self.rx, &mut self.buf).await?;
        Ok(values.to_vec())
    }

    async fn push(&mut self, keys: &[Key], grads: &[f32]) -> io::Result<()> {
        self.tx.feed(&Msg::Control(Command::Push)).await?;
        self.tx.feed(&Msg::Data(Payload::Keys(keys))).await?;
        self.tx.send(&Msg::Data(Payload::Values(grads))).await?;

        exchange::recv_ack(&mut self.rx, &mut self.buf).await
    }

    async fn epoch_done(&mut self) -> io::Result<()> {
        self.tx.send(&Msg::Control(Command::EpochDone)).await?;
        exchange::recv_ack(&mut self.rx, &mut self.buf).await
    }

    async fn disconnect(&mut self) -> io::Result<()> {
        self.tx.feed(&Msg::Control(Command::Disconnect)).await?;
        self.tx.shutdown().await
    }
}

/// A client for a server tier reached over TCP.
///
/// The calls are blocking, they drive the connections on the runtime the client was
/// created on, so they must be made from outside of it, like a `spawn_blocking` task.
pub struct RemoteClient {
    runtime: Handle,
    conns: Vec<Connection>,
    partition: Partition,
    rank: usize,
    workers: usize,
}

impl RemoteClient {
    /// Connects to every server and joins their cohorts.
    ///
    /// # Arguments
    /// * `addrs` - The whole server tier, in partition order.
    ///
    /// # Returns
    /// The client, ranked by the first server.
    pub async fn connect(addrs: &[SocketAddr]) -> Result<Self> {
        if addrs.is_empty() {
            return Err(WorkerErr::Protocol {
                expected: "at least one server",
                got: "none".to_string(),
            });
        }

        let joined = try_join_all(addrs.iter().map(|&addr| Connection::join(addr))).await?;

        let (rank, workers) = (joined[0].1, joined[0].2);
        let conns = joined.into_iter().map(|(conn, ..)| conn).collect();
        info!(rank = rank, workers = workers, servers = addrs.len(); "connected to the server tier");

        Ok(Self {
            runtime: Handle::current(),
            conns,
            partition: Partition::new(addrs.len()),
            rank,
            workers,
        })
    }
}

impl<A: ParamAccess> PullPushClient<A> for RemoteClient {
    fn rank(&self) -> usize {
        self.rank
    }

    fn workers(&self) -> usize {
        self.workers
    }

    fn pull(&mut self, keys: &[Key], cache: &mut LocalParamCache<A>) -> Result<()> {
        let parts = self.partition.split(keys);
        let pulls = self.conns.iter_mut().zip(&parts).map(|(conn, keys)| conn.pull(keys));
        let values = self.runtime.block_on(try_join_all(pulls))?;

        for (keys, values) in parts.iter().zip(values) {
            cache.load_pull_values(keys, &values)?;
        }

        Ok(())
    }

    fn push(&mut self, keys: &[Key], cache: &mut LocalParamCache<A>) -> Result<()> {
        let parts = self.partition.split(keys);
        let grads: Vec<_> = parts
            .iter()
            .map(|keys| {
                let mut grads = Vec::new();
                cache.export_push_values(keys, &mut grads);
                grads
            })
            .collect();

        let pushes = self
            .conns
            .iter_mut()
            .zip(parts.iter().zip(&grads))
            .map(|(conn, (keys, grads))| conn.push(keys, grads));
        self.runtime.block_on(try_join_all(pushes))?;

        cache.remove_keys(keys);
        Ok(())
    }

    fn epoch_done(&mut self) -> Result<()> {
        let dones = self.conns.iter_mut().map(|conn| conn.epoch_done());
        self.runtime.block_on(try_join_all(dones))?;
        Ok(())
    }

    fn leave(&mut self) -> Result<()> {
        let disconnects = self.conns.iter_mut().map(|conn| conn.disconnect());
        self.runtime.block_on(try_join_all(disconnects))?;
        Ok(())
    }
}
