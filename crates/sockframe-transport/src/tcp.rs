use tokio::io::DuplexStream;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::{ReadHalf, WriteHalf};

/// In-memory pair buffer capacity per direction.
const PAIR_BUFFER_CAPACITY: usize = 64 * 1024;

/// An unopened transport endpoint.
///
/// A `Transport` performs no I/O until [`Transport::open`] is called, which
/// consumes the endpoint and yields its readable and writable halves.
/// Endpoints come from three places: a remote `host:port` (connected at open
/// time), an accepted connection from a [`Listener`], or one side of an
/// in-memory loopback pair.
pub struct Transport {
    inner: TransportInner,
}

enum TransportInner {
    Remote { host: String, port: u16 },
    Established(TcpStream),
    Memory(DuplexStream),
}

impl Transport {
    /// Create an endpoint that connects to `host:port` when opened.
    ///
    /// Fails fast on an empty host or a zero port; these are programmer
    /// errors, not runtime conditions.
    pub fn remote(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(TransportError::InvalidHost);
        }
        if port == 0 {
            return Err(TransportError::InvalidPort);
        }
        Ok(Self {
            inner: TransportInner::Remote { host, port },
        })
    }

    /// Create a connected in-memory loopback pair.
    ///
    /// Bytes written to one endpoint become readable on the other. Useful
    /// for tests and in-process wiring without a real socket.
    pub fn pair() -> (Self, Self) {
        let (a, b) = tokio::io::duplex(PAIR_BUFFER_CAPACITY);
        (
            Self {
                inner: TransportInner::Memory(a),
            },
            Self {
                inner: TransportInner::Memory(b),
            },
        )
    }

    pub(crate) fn from_established(stream: TcpStream) -> Self {
        Self {
            inner: TransportInner::Established(stream),
        }
    }

    /// Open the endpoint, yielding its two halves.
    ///
    /// For remote endpoints this resolves the hostname and connects.
    pub async fn open(self) -> Result<(ReadHalf, WriteHalf)> {
        let stream = match self.inner {
            TransportInner::Remote { host, port } => {
                let stream = TcpStream::connect((host.as_str(), port))
                    .await
                    .map_err(|source| TransportError::Connect {
                        host: host.clone(),
                        port,
                        source,
                    })?;
                debug!(%host, port, "connected");
                stream
            }
            TransportInner::Established(stream) => stream,
            TransportInner::Memory(stream) => {
                let (read, write) = tokio::io::split(stream);
                return Ok((ReadHalf::from_memory(read), WriteHalf::from_memory(write)));
            }
        };

        stream.set_nodelay(true)?;
        let (read, write) = stream.into_split();
        Ok((ReadHalf::from_tcp(read), WriteHalf::from_tcp(write)))
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            TransportInner::Remote { host, port } => f
                .debug_struct("Transport")
                .field("type", &"remote")
                .field("host", host)
                .field("port", port)
                .finish(),
            TransportInner::Established(_) => f
                .debug_struct("Transport")
                .field("type", &"established")
                .finish(),
            TransportInner::Memory(_) => {
                f.debug_struct("Transport").field("type", &"memory").finish()
            }
        }
    }
}

/// Listens for and accepts incoming transport connections.
pub struct Listener {
    inner: TcpListener,
}

impl Listener {
    /// Bind to `host:port`. Pass port 0 to let the OS pick one.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let inner =
            TcpListener::bind((host, port))
                .await
                .map_err(|source| TransportError::Bind {
                    host: host.to_string(),
                    port,
                    source,
                })?;
        info!(%host, port = inner.local_addr().map(|a| a.port()).unwrap_or(port), "listening");
        Ok(Self { inner })
    }

    /// Accept one incoming connection as an unopened [`Transport`].
    pub async fn accept(&self) -> Result<Transport> {
        let (stream, addr) = self.inner.accept().await.map_err(TransportError::Accept)?;
        debug!(%addr, "accepted connection");
        Ok(Transport::from_established(stream))
    }

    /// The port this listener is bound to.
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.inner.local_addr()?.port())
    }
}
