/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint host is empty.
    #[error("invalid endpoint host: must not be empty")]
    InvalidHost,

    /// The endpoint port is zero.
    #[error("invalid endpoint port: must be non-zero")]
    InvalidPort,

    /// Failed to connect to the specified endpoint.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Failed to bind a listener to the specified address.
    #[error("failed to bind to {host}:{port}: {source}")]
    Bind {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
