//! A communication channel used to send/receive messages to/from another party.

use std::{fmt, future::Future};

use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{
    Mutex,
    mpsc::{Receiver, Sender, channel},
};
use tracing::trace;

/// Errors related to sending / receiving / (de-)serializing messages.
#[derive(Debug)]
pub struct Error {
    /// The protocol phase during which the error occurred.
    pub phase: String,
    /// The specific error that was raised.
    pub reason: ErrorKind,
}

/// The specific error that occurred when trying to send / receive a message.
#[derive(Debug)]
pub enum ErrorKind {
    /// The (serialized) message could not be received over the channel.
    RecvError(String),
    /// The (serialized) message could not be sent over the channel.
    SendError(String),
    /// The message could not be (de-)serialized.
    SerdeError(String),
    /// The message does not have the expected length.
    InvalidLength,
    /// No message arrived before the round timeout elapsed.
    Timeout,
    /// A protocol tried to read a message that the party never sent in the previous round.
    MissingMessage,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = &self.phase;
        match &self.reason {
            ErrorKind::RecvError(e) => write!(f, "could not receive ({phase}): {e}"),
            ErrorKind::SendError(e) => write!(f, "could not send ({phase}): {e}"),
            ErrorKind::SerdeError(e) => write!(f, "could not (de-)serialize ({phase}): {e}"),
            ErrorKind::InvalidLength => write!(f, "message has an invalid length ({phase})"),
            ErrorKind::Timeout => write!(f, "timed out waiting for a message ({phase})"),
            ErrorKind::MissingMessage => write!(f, "expected message is missing ({phase})"),
        }
    }
}

impl std::error::Error for Error {}

impl Error {
    pub(crate) fn new(phase: impl Into<String>, reason: ErrorKind) -> Self {
        Self {
            phase: phase.into(),
            reason,
        }
    }
}

/// A communication channel used to send/receive messages to/from another party.
///
/// Implementations must deliver messages between any two parties reliably, authenticated and in
/// order. Retries, if any, are the responsibility of the channel.
pub trait Channel {
    /// The error that can occur sending messages over the channel.
    type SendError: fmt::Debug;
    /// The error that can occur receiving messages over the channel.
    type RecvError: fmt::Debug;

    /// Sends a message to the party with the given index (must be between `0..participants`).
    fn send_bytes_to(
        &self,
        party: usize,
        msg: Vec<u8>,
    ) -> impl Future<Output = Result<(), Self::SendError>> + Send;

    /// Awaits a response from the party with the given index (must be between `0..participants`).
    fn recv_bytes_from(
        &self,
        party: usize,
    ) -> impl Future<Output = Result<Vec<u8>, Self::RecvError>> + Send;
}

/// Serializes and sends a message to the other party.
pub(crate) async fn send_to(
    channel: &impl Channel,
    party: usize,
    phase: &str,
    msg: &impl Serialize,
) -> Result<(), Error> {
    let msg = bincode::serialize(msg).map_err(|e| Error {
        phase: format!("sending {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })?;
    channel.send_bytes_to(party, msg).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::SendError(format!("{e:?}")),
    })
}

/// Receives and deserializes a message from the other party.
pub(crate) async fn recv_from<T: DeserializeOwned>(
    channel: &impl Channel,
    party: usize,
    phase: &str,
) -> Result<T, Error> {
    let msg = channel.recv_bytes_from(party).await.map_err(|e| Error {
        phase: phase.to_string(),
        reason: ErrorKind::RecvError(format!("{e:?}")),
    })?;
    bincode::deserialize(&msg).map_err(|e| Error {
        phase: format!("receiving {phase}"),
        reason: ErrorKind::SerdeError(format!("{e:?}")),
    })
}

/// A simple in-memory channel using [`Sender`] and [`Receiver`].
#[derive(Debug)]
pub struct SimpleChannel {
    s: Vec<Option<Sender<Vec<u8>>>>,
    r: Vec<Option<Mutex<Receiver<Vec<u8>>>>>,
}

impl SimpleChannel {
    /// Creates channels for N parties to communicate with each other.
    pub fn channels(parties: usize) -> Vec<Self> {
        let buffer_capacity = 1024;
        let mut channels = vec![];
        for _ in 0..parties {
            let s = (0..parties).map(|_| None).collect();
            let r = (0..parties).map(|_| None).collect();
            channels.push(SimpleChannel { s, r });
        }
        for a in 0..parties {
            for b in (a + 1)..parties {
                let (send_a_to_b, recv_a_to_b) = channel(buffer_capacity);
                let (send_b_to_a, recv_b_to_a) = channel(buffer_capacity);
                channels[a].s[b] = Some(send_a_to_b);
                channels[b].s[a] = Some(send_b_to_a);
                channels[a].r[b] = Some(Mutex::new(recv_b_to_a));
                channels[b].r[a] = Some(Mutex::new(recv_a_to_b));
            }
        }
        channels
    }
}

/// The error raised by a [`SimpleChannel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimpleChannelError {
    /// There is no channel to the given party (or it is the party itself).
    NoSuchParty(usize),
    /// The channel has been closed.
    Closed,
}

impl Channel for SimpleChannel {
    type SendError = SimpleChannelError;
    type RecvError = SimpleChannelError;

    async fn send_bytes_to(&self, p: usize, msg: Vec<u8>) -> Result<(), SimpleChannelError> {
        let sender = self
            .s
            .get(p)
            .and_then(Option::as_ref)
            .ok_or(SimpleChannelError::NoSuchParty(p))?;
        trace!(party = p, bytes = msg.len(), "sending message");
        sender
            .send(msg)
            .await
            .map_err(|_| SimpleChannelError::Closed)
    }

    async fn recv_bytes_from(&self, p: usize) -> Result<Vec<u8>, SimpleChannelError> {
        let receiver = self
            .r
            .get(p)
            .and_then(Option::as_ref)
            .ok_or(SimpleChannelError::NoSuchParty(p))?;
        let msg = receiver
            .lock()
            .await
            .recv()
            .await
            .ok_or(SimpleChannelError::Closed)?;
        trace!(party = p, bytes = msg.len(), "received message");
        Ok(msg)
    }
}
