use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

type Header = u64;
const HEADER_SIZE: usize = size_of::<Header>();

const ERR_KIND: Header = 0;
const CONTROL_KIND: Header = 1;
const KEYS_KIND: Header = 2;
const VALUES_KIND: Header = 3;

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug, PartialEq)]
pub enum Payload<'a> {
    /// Parameter ids, the scope of a pull or a push.
    Keys(&'a [u64]),
    /// Flattened parameter values or gradients, `width` numbers per key.
    Values(&'a [f32]),
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// A worker asks to be part of the cohort.
    Join,
    /// The server's answer to `Join`.
    Assign { rank: usize, workers: usize },
    /// Followed by `Keys`, answered with `Values`.
    Pull,
    /// Followed by `Keys` and `Values`, answered with `Ack`.
    Push,
    /// The worker will not take part in more rounds of the current epoch.
    EpochDone,
    Ack,
    Disconnect,
}

/// The application layer message for the entire system.
#[derive(Debug, PartialEq)]
pub enum Msg<'a> {
    Control(Command),
    Data(Payload<'a>),
    Err(Cow<'a, str>),
}

impl Msg<'_> {
    /// A short name of the message kind, used for logging and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(Command::Join) => "control/join",
            Msg::Control(Command::Assign { .. }) => "control/assign",
            Msg::Control(Command::Pull) => "control/pull",
            Msg::Control(Command::Push) => "control/push",
            Msg::Control(Command::EpochDone) => "control/epoch_done",
            Msg::Control(Command::Ack) => "control/ack",
            Msg::Control(Command::Disconnect) => "control/disconnect",
            Msg::Data(Payload::Keys(_)) => "data/keys",
            Msg::Data(Payload::Values(_)) => "data/values",
            Msg::Err(_) => "err",
        }
    }

    fn buf_is_too_small<T>(size: usize) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("The given buffer is too small {size}, must at least be {HEADER_SIZE} bytes"),
        ))
    }

    fn invalid_kind<T>(kind: Header) -> io::Result<T> {
        Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Received an invalid kind header {kind}"),
        ))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_KIND.to_be_bytes());
                Some(e.as_bytes())
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_KIND.to_be_bytes());

                // SAFETY: Serialize impl for `Command` is derived and not implemented
                //         by hand. Nor has a non string-key map inside.
                serde_json::to_writer(buf, cmd).unwrap();
                None
            }
            Msg::Data(Payload::Keys(keys)) => {
                buf.extend_from_slice(&KEYS_KIND.to_be_bytes());
                Some(bytemuck::cast_slice(keys))
            }
            Msg::Data(Payload::Values(values)) => {
                buf.extend_from_slice(&VALUES_KIND.to_be_bytes());
                Some(bytemuck::cast_slice(values))
            }
        }
    }
}

impl<'a> Deserialize<'a> for Msg<'a> {
    fn deserialize(buf: &'a [u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::buf_is_too_small(buf.len());
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let mut header = [0; HEADER_SIZE];
        header.copy_from_slice(kind_buf);

        let cast_err = |err| io::Error::new(io::ErrorKind::InvalidData, format!("{err:?}"));

        match Header::from_be_bytes(header) {
            ERR_KIND => {
                let string = str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(Cow::Borrowed(string)))
            }
            CONTROL_KIND => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            KEYS_KIND => {
                let keys = bytemuck::try_cast_slice(rest).map_err(cast_err)?;
                Ok(Self::Data(Payload::Keys(keys)))
            }
            VALUES_KIND => {
                let values = bytemuck::try_cast_slice(rest).map_err(cast_err)?;
                Ok(Self::Data(Payload::Values(values)))
            }
            kind => Self::invalid_kind(kind),
        }
    }
}
