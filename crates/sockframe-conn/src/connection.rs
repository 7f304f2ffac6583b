use bytes::Bytes;
use sockframe_transport::{Transport, TransportError};
use tokio::sync::mpsc;

use crate::error::{ConnectionError, Result};
use crate::observer::ConnectionObserver;
use crate::queue::SerialQueue;
use crate::worker::{Command, Worker};

/// Construction options for a [`Connection`].
#[derive(Debug, Default)]
pub struct ConnectionOptions {
    /// Serial queue for completion callbacks and observer hooks. When
    /// `None`, the connection creates a private one. A caller-supplied
    /// queue must be serial so callback ordering is preserved; it may be
    /// shared across connections.
    pub completion_queue: Option<SerialQueue>,
    /// Half-close notification hooks.
    pub observer: ConnectionObserver,
}

/// A bidirectional framed message connection over a byte transport.
///
/// Every message is transmitted as an 8-byte big-endian length prefix
/// followed by that many payload bytes. Reads and writes may be pipelined:
/// any number of requests can be outstanding per direction, and completions
/// are delivered in submission order, each direction independent of the
/// other. Submitting never blocks; all I/O and all caller-visible
/// completions happen asynchronously on the connection's work task and
/// completion queue respectively.
///
/// After creating a connection, start it with [`Connection::open`].
/// Dropping the handle forces both directions closed, failing any requests
/// still outstanding.
pub struct Connection {
    commands: mpsc::UnboundedSender<Command>,
}

impl Connection {
    /// Create a connection over an unopened transport.
    ///
    /// Must be called from within a Tokio runtime; the connection spawns
    /// its work task immediately.
    pub fn new(transport: Transport) -> Self {
        Self::with_options(transport, ConnectionOptions::default())
    }

    /// Create a connection with an explicit completion queue and observer.
    pub fn with_options(transport: Transport, options: ConnectionOptions) -> Self {
        let completions = options.completion_queue.unwrap_or_default();
        let (commands, inbox) = mpsc::unbounded_channel();
        let worker = Worker::new(inbox, transport, completions, options.observer);
        tokio::spawn(worker.run());
        Self { commands }
    }

    /// Create a connection that will connect to `host:port` when opened.
    ///
    /// Fails fast on an empty host or zero port.
    pub fn remote(host: impl Into<String>, port: u16) -> std::result::Result<Self, TransportError> {
        Ok(Self::new(Transport::remote(host, port)?))
    }

    /// Begin opening the transport.
    ///
    /// Requests may be submitted before `open`; they wait until the
    /// transport finishes opening. Only the first call has any effect.
    pub fn open(&self) {
        let _ = self.commands.send(Command::Open);
    }

    /// Enqueue a message for sending and return immediately.
    ///
    /// `on_complete` is invoked on the completion queue once the header and
    /// payload have been handed to the kernel (which does not imply the
    /// peer received them), or with an error if the write direction closed
    /// or the transport failed first.
    ///
    /// An empty message is permitted and transmits a header-only frame.
    /// The receiving side consumes such frames without completing any read
    /// request, so an empty send never produces a deliverable message.
    pub fn send(
        &self,
        message: impl Into<Bytes>,
        on_complete: impl FnOnce(Result<()>) + Send + 'static,
    ) {
        let _ = self.commands.send(Command::Send {
            payload: message.into(),
            done: Box::new(on_complete),
        });
    }

    /// Enqueue a read request and return immediately.
    ///
    /// `on_complete` is invoked on the completion queue with the next fully
    /// reassembled message, or with an error if the read direction closed
    /// or the transport failed first. Outstanding requests complete in
    /// submission order: the N-th message goes to the N-th oldest request.
    pub fn receive(&self, on_complete: impl FnOnce(Result<Bytes>) + Send + 'static) {
        let _ = self.commands.send(Command::Receive {
            done: Box::new(on_complete),
        });
    }

    /// Close the read direction.
    ///
    /// Outstanding reads are allowed to complete first; the transport's
    /// read half closes once the queue drains (immediately when it is
    /// already empty). Reads submitted afterwards fail with
    /// [`ConnectionError::ReadClosed`]. Writes are unaffected.
    pub fn close_read(&self) {
        let _ = self.commands.send(Command::CloseRead);
    }

    /// Close the write direction.
    ///
    /// Outstanding writes are flushed first; the transport's write half
    /// closes once the queue drains (immediately when it is already
    /// empty). Writes submitted afterwards fail with
    /// [`ConnectionError::WriteClosed`]. Reads are unaffected.
    pub fn close_write(&self) {
        let _ = self.commands.send(Command::CloseWrite);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish()
    }
}
