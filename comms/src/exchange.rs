//! Typed receive helpers for the request/response sequences of a training round.

use std::io;

use tokio::io::AsyncRead;

use crate::{
    OnoReceiver,
    msg::{Command, Msg, Payload},
};

/// Creates the error for a message that doesn't follow the protocol.
///
/// # Arguments
/// * `expected` - The kind that was expected.
/// * `got` - The received message, an `Err` message is surfaced with its text.
pub fn unexpected(expected: &str, got: &Msg) -> io::Error {
    match got {
        Msg::Err(text) => io::Error::other(format!("peer error: {text}")),
        msg => io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected {expected}, got {}", msg.kind()),
        ),
    }
}

/// Receives a control message.
pub async fn recv_control<R>(rx: &mut OnoReceiver<R>, buf: &mut Vec<u64>) -> io::Result<Command>
where
    R: AsyncRead + Unpin,
{
    match rx.recv_into(buf).await? {
        Msg::Control(cmd) => Ok(cmd),
        msg => Err(unexpected("control", &msg)),
    }
}

/// Receives a keys message, the keys are viewed in place inside `buf`.
pub async fn recv_keys<'buf, R>(
    rx: &mut OnoReceiver<R>,
    buf: &'buf mut Vec<u64>,
) -> io::Result<&'buf [u64]>
where
    R: AsyncRead + Unpin,
{
    match rx.recv_into(buf).await? {
        Msg::Data(Payload::Keys(keys)) => Ok(keys),
        msg => Err(unexpected("data/keys", &msg)),
    }
}

/// Receives a values message, the values are viewed in place inside `buf`.
pub async fn recv_values<'buf, R>(
    rx: &mut OnoReceiver<R>,
    buf: &'buf mut Vec<u64>,
) -> io::Result<&'buf [f32]>
where
    R: AsyncRead + Unpin,
{
    match rx.recv_into(buf).await? {
        Msg::Data(Payload::Values(values)) => Ok(values),
        msg => Err(unexpected("data/values", &msg)),
    }
}

/// Receives an `Ack`.
pub async fn recv_ack<R>(rx: &mut OnoReceiver<R>, buf: &mut Vec<u64>) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    match rx.recv_into(buf).await? {
        Msg::Control(Command::Ack) => Ok(()),
        msg => Err(unexpected("control/ack", &msg)),
    }
}

#[cfg(test)]
mod tests {
    use tokio::io as tio;

    use super::*;

    #[tokio::test]
    async fn peer_error_is_surfaced() {
        let (one, two) = tio::duplex(256);
        let (_, tx) = tio::split(one);
        let (rx, _) = tio::split(two);
        let (_, mut tx) = crate::channel(tio::empty(), tx);
        let (mut rx, _) = crate::channel(rx, tio::sink());

        tx.send(&Msg::Err("barrier timed out".into())).await.unwrap();

        let mut buf = Vec::new();
        let err = recv_ack(&mut rx, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(err.to_string().contains("barrier timed out"));
    }

    #[tokio::test]
    async fn wrong_kind_is_invalid_data() {
        let (one, two) = tio::duplex(256);
        let (_, tx) = tio::split(one);
        let (rx, _) = tio::split(two);
        let (_, mut tx) = crate::channel(tio::empty(), tx);
        let (mut rx, _) = crate::channel(rx, tio::sink());

        tx.send(&Msg::Control(Command::Ack)).await.unwrap();

        let mut buf = Vec::new();
        let err = recv_keys(&mut rx, &mut buf).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
