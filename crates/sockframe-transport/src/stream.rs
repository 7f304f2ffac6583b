use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, DuplexStream, ReadBuf};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

/// The readable half of an opened transport.
///
/// On TCP this wraps the read side of a connected socket; for in-memory
/// pairs it wraps one end of a duplex pipe. Reading past the peer's
/// write-close yields a clean end-of-file (`read` returns 0).
pub struct ReadHalf {
    inner: ReadHalfInner,
}

enum ReadHalfInner {
    Tcp(OwnedReadHalf),
    Memory(tokio::io::ReadHalf<DuplexStream>),
}

impl AsyncRead for ReadHalf {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            ReadHalfInner::Tcp(half) => Pin::new(half).poll_read(cx, buf),
            ReadHalfInner::Memory(half) => Pin::new(half).poll_read(cx, buf),
        }
    }
}

impl ReadHalf {
    pub(crate) fn from_tcp(half: OwnedReadHalf) -> Self {
        Self {
            inner: ReadHalfInner::Tcp(half),
        }
    }

    pub(crate) fn from_memory(half: tokio::io::ReadHalf<DuplexStream>) -> Self {
        Self {
            inner: ReadHalfInner::Memory(half),
        }
    }

    /// Close the read direction.
    ///
    /// On TCP the socket's receive side is shut down so the kernel discards
    /// any further incoming data; the write half, if still open, is
    /// unaffected.
    pub fn close(self) {
        match self.inner {
            ReadHalfInner::Tcp(half) => {
                shutdown_read(&half);
                debug!("read half closed");
            }
            ReadHalfInner::Memory(half) => {
                drop(half);
                debug!("read half closed");
            }
        }
    }
}

#[cfg(unix)]
fn shutdown_read(half: &OwnedReadHalf) {
    use std::os::fd::AsRawFd;

    let fd = half.as_ref().as_raw_fd();
    // SAFETY: `fd` is an open socket descriptor owned by this half; SHUT_RD
    // only disables further receives and never invalidates the descriptor.
    let rc = unsafe { libc::shutdown(fd, libc::SHUT_RD) };
    if rc != 0 {
        debug!(errno = std::io::Error::last_os_error().raw_os_error(), "SHUT_RD failed");
    }
}

#[cfg(not(unix))]
fn shutdown_read(_half: &OwnedReadHalf) {}

impl std::fmt::Debug for ReadHalf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            ReadHalfInner::Tcp(_) => "tcp",
            ReadHalfInner::Memory(_) => "memory",
        };
        f.debug_struct("ReadHalf").field("type", &kind).finish()
    }
}

/// The writable half of an opened transport.
pub struct WriteHalf {
    inner: WriteHalfInner,
}

enum WriteHalfInner {
    Tcp(OwnedWriteHalf),
    Memory(tokio::io::WriteHalf<DuplexStream>),
}

impl AsyncWrite for WriteHalf {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        match &mut self.get_mut().inner {
            WriteHalfInner::Tcp(half) => Pin::new(half).poll_write(cx, buf),
            WriteHalfInner::Memory(half) => Pin::new(half).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            WriteHalfInner::Tcp(half) => Pin::new(half).poll_flush(cx),
            WriteHalfInner::Memory(half) => Pin::new(half).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        match &mut self.get_mut().inner {
            WriteHalfInner::Tcp(half) => Pin::new(half).poll_shutdown(cx),
            WriteHalfInner::Memory(half) => Pin::new(half).poll_shutdown(cx),
        }
    }
}

impl WriteHalf {
    pub(crate) fn from_tcp(half: OwnedWriteHalf) -> Self {
        Self {
            inner: WriteHalfInner::Tcp(half),
        }
    }

    pub(crate) fn from_memory(half: tokio::io::WriteHalf<DuplexStream>) -> Self {
        Self {
            inner: WriteHalfInner::Memory(half),
        }
    }

    /// Close the write direction.
    ///
    /// Flushes buffered bytes and signals end-of-stream to the peer (FIN on
    /// TCP). The read half, if still open, is unaffected.
    pub async fn close(&mut self) -> std::io::Result<()> {
        self.shutdown().await?;
        debug!("write half closed");
        Ok(())
    }
}

impl std::fmt::Debug for WriteHalf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            WriteHalfInner::Tcp(_) => "tcp",
            WriteHalfInner::Memory(_) => "memory",
        };
        f.debug_struct("WriteHalf").field("type", &kind).finish()
    }
}
