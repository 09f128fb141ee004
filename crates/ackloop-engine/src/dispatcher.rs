//! Command dispatcher: the single write path to the outbound channel.
//!
//! Fire-and-forget. Handing a command to the transport says nothing about
//! whether the remote side received or acted on it, so transport failures are
//! logged and swallowed here; confirmation is the poller's job.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use ackloop_core::types::{Command, Field, Opcode};

use crate::error::TransportError;

/// Outbound side of the protocol. Each call is one atomic unit of encoding.
pub trait Transport: Send + Sync {
    fn send(&self, command: &Command) -> Result<(), TransportError>;
}

/// Transport that forwards commands into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<Command>,
}

impl ChannelTransport {
    /// Create the transport and the receiving end of its outbound stream.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, command: &Command) -> Result<(), TransportError> {
        self.tx
            .send(command.clone())
            .map_err(|_| TransportError::Closed)
    }
}

/// Hands commands to a [`Transport`] and counts them.
#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    sent: Arc<AtomicU64>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sent", &self.sent_count())
            .finish()
    }
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            sent: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand a command to the transport.
    pub fn send(&self, command: &Command) {
        self.sent.fetch_add(1, Ordering::Relaxed);
        match self.transport.send(command) {
            Ok(()) => tracing::trace!(command = %command, "Command dispatched"),
            Err(e) => tracing::warn!(command = %command, error = %e, "Transport refused command"),
        }
    }

    /// Build and send a command from an opcode and a field list.
    pub fn send_fields<I>(&self, opcode: Opcode, fields: I)
    where
        I: IntoIterator<Item = Field>,
    {
        let command = fields
            .into_iter()
            .fold(Command::new(opcode), |cmd, field| cmd.field(field));
        self.send(&command);
    }

    /// Commands handed off since construction, including refused ones.
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}
