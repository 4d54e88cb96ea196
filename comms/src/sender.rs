//! The sending end of the framing layer.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::{LenType, Serialize};

/// The sending end handle of the communication.
///
/// Frames are written into a buffered writer, `feed` queues one without reaching the
/// peer so a request made of several frames goes out with a single `flush`.
pub struct OnoSender<W>
where
    W: AsyncWrite + Unpin,
{
    tx: BufWriter<W>,
    head: Vec<u8>,
}

impl<W: AsyncWrite + Unpin> OnoSender<W> {
    /// Creates a new `OnoSender` instance.
    ///
    /// # Arguments
    /// * `tx` - The underlying writer.
    pub(super) fn new(tx: W) -> Self {
        Self {
            tx: BufWriter::new(tx),
            head: Vec::new(),
        }
    }

    /// Queues `msg` as one frame, the length prefix followed by the owned head and
    /// the borrowed tail of the message.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    pub async fn feed<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        let Self { tx, head } = self;

        head.clear();
        let tail = msg.serialize(head).unwrap_or_default();
        let len = (head.len() + tail.len()) as LenType;

        tx.write_all(&len.to_be_bytes()).await?;
        tx.write_all(head).await?;
        tx.write_all(tail).await
    }

    /// Writes every queued frame to the peer.
    pub async fn flush(&mut self) -> io::Result<()> {
        self.tx.flush().await
    }

    /// Sends `msg` right away.
    ///
    /// # Arguments
    /// * `msg` - A serializable object.
    ///
    /// # Returns
    /// A result object that returns `io::Error` on failure.
    pub async fn send<'a, T: Serialize<'a>>(&mut self, msg: &'a T) -> io::Result<()> {
        self.feed(msg).await?;
        self.flush().await
    }

    /// Flushes the queued frames and shuts down the writing half of the stream.
    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.tx.shutdown().await
    }
}
