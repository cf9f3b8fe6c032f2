//! The router's view of a peer's live connection.
//!
//! The router never touches sockets. A transport hands it one
//! [`PeerConnection`] per accepted peer; sends are non-blocking queue pushes
//! and the transport's writer task does the I/O.

use crate::error::constants::{ERR_CONNECTION_CLOSED, ERR_WRITER_GONE};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::Message;
use crate::utils::time::current_timestamp;
use std::fmt::Debug;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub trait PeerConnection: Send + Sync + Debug {
    fn is_open(&self) -> bool;

    /// Queue a message for delivery.
    ///
    /// # Errors
    /// `ConnectionClosed` once closed, `TransportError` when the queue is full.
    fn send(&self, message: Message) -> Result<()>;

    /// Close the connection; idempotent.
    fn close(&self);

    fn ping(&self) -> Result<()> {
        self.send(Message::Ping {
            timestamp: current_timestamp(),
        })
    }
}

/// Connection backed by a bounded channel drained by a writer task.
#[derive(Debug, Clone)]
pub struct ChannelConnection {
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl ChannelConnection {
    /// Returns the connection and the receiving half for the writer task.
    pub fn new(capacity: usize, cancel: CancellationToken) -> (Self, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx, cancel }, rx)
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl PeerConnection for ChannelConnection {
    fn is_open(&self) -> bool {
        !self.cancel.is_cancelled() && !self.tx.is_closed()
    }

    fn send(&self, message: Message) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.tx.try_send(message).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                ProtocolError::TransportError(format!("{ERR_CONNECTION_CLOSED}: send queue full"))
            }
            mpsc::error::TrySendError::Closed(_) => ProtocolError::TransportError(ERR_WRITER_GONE.to_string()),
        })
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}
