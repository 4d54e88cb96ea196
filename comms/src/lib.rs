mod align;
mod deserialize;
pub mod exchange;
pub mod msg;
mod receiver;
mod sender;
mod serialize;
pub mod specs;

use tokio::io::{AsyncRead, AsyncWrite};

pub use align::Align8;
pub use deserialize::Deserialize;
pub use receiver::OnoReceiver;
pub use sender::OnoSender;
pub use serialize::Serialize;

/// The frame length prefix.
type LenType = u64;
const LEN_TYPE_SIZE: usize = size_of::<LenType>();

/// Splits a stream into the two ends of a framed channel.
///
/// Every frame is a big endian `u64` length followed by a serialized `Msg`.
///
/// # Arguments
/// * `rx` - The read half of the stream.
/// * `tx` - The write half of the stream.
///
/// # Returns
/// The receiving and the sending end, in that order.
pub fn channel<R, W>(rx: R, tx: W) -> (OnoReceiver<R>, OnoSender<W>)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    (OnoReceiver::new(rx), OnoSender::new(tx))
}
