use std::sync::Arc;

use sockframe_transport::TransportError;

/// Errors delivered to completion callbacks.
///
/// A single failure can fan out to every queued request in a direction, so
/// the type is `Clone`; I/O sources are shared behind `Arc`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConnectionError {
    /// A read was submitted, or was outstanding, after the read direction
    /// was closed or a close was pending.
    #[error("read side closed")]
    ReadClosed,

    /// A write was submitted, or was outstanding, after the write direction
    /// was closed or a close was pending.
    #[error("write side closed")]
    WriteClosed,

    /// The peer closed its side of the stream. Fails outstanding requests
    /// the same way a transport error does, but is an expected condition,
    /// not an application fault.
    #[error("end of stream")]
    EndOfStream,

    /// The underlying transport reported an I/O failure, surfaced verbatim
    /// to every affected request.
    #[error("transport error: {0}")]
    Transport(Arc<std::io::Error>),

    /// Opening the transport failed; neither direction can ever open.
    #[error("open failed: {0}")]
    Open(Arc<TransportError>),
}

impl ConnectionError {
    pub(crate) fn transport(err: std::io::Error) -> Self {
        Self::Transport(Arc::new(err))
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
