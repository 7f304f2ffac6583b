//! Per-direction frame state machines.
//!
//! Each pipeline owns its transport half, its in-flight frame state, and the
//! FIFO queue of pending completion callbacks for its direction. All fields
//! are touched only by the connection's work task, so no locking is needed.

use std::collections::VecDeque;

use bytes::{Bytes, BytesMut};
use sockframe_frame::{decode_header, encode_header, HEADER_SIZE};
use sockframe_transport::{ReadHalf, WriteHalf};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, trace};

use crate::error::ConnectionError;
use crate::queue::SerialQueue;

pub(crate) type ReceiveCallback = Box<dyn FnOnce(Result<Bytes, ConnectionError>) + Send + 'static>;
pub(crate) type SendCallback = Box<dyn FnOnce(Result<(), ConnectionError>) + Send + 'static>;
pub(crate) type ClosedHook = Box<dyn FnOnce() + Send>;

/// Reassembles one message per queued request, in FIFO order.
pub(crate) struct ReadPipeline {
    half: Option<ReadHalf>,
    state: ReadState,
    queue: VecDeque<ReceiveCallback>,
    close_pending: bool,
    closed: bool,
    completions: SerialQueue,
    on_closed: Option<ClosedHook>,
}

enum ReadState {
    Idle,
    Header { buf: [u8; HEADER_SIZE], filled: usize },
    Payload { buf: BytesMut, filled: usize },
}

impl ReadState {
    fn header() -> Self {
        ReadState::Header {
            buf: [0u8; HEADER_SIZE],
            filled: 0,
        }
    }
}

impl ReadPipeline {
    pub(crate) fn new(completions: SerialQueue, on_closed: Option<ClosedHook>) -> Self {
        Self {
            half: None,
            state: ReadState::Idle,
            queue: VecDeque::new(),
            close_pending: false,
            closed: false,
            completions,
            on_closed,
        }
    }

    /// Enqueue a read request.
    ///
    /// Starts reading immediately if the transport is open and no frame is
    /// in flight; otherwise the request waits its turn. Requests submitted
    /// after the direction closed (or while a close is pending) fail at
    /// once.
    pub(crate) fn submit(&mut self, done: ReceiveCallback) {
        if self.closed || self.close_pending {
            self.completions
                .dispatch(move || done(Err(ConnectionError::ReadClosed)));
            return;
        }
        self.queue.push_back(done);
        if self.half.is_some() && matches!(self.state, ReadState::Idle) {
            self.state = ReadState::header();
        }
    }

    /// Adopt the opened read half and start any waiting request.
    pub(crate) fn attach(&mut self, half: ReadHalf) {
        if self.closed {
            half.close();
            return;
        }
        self.half = Some(half);
        if !self.queue.is_empty() && matches!(self.state, ReadState::Idle) {
            self.state = ReadState::header();
        }
    }

    /// Whether the pipeline has transport I/O to make progress on.
    pub(crate) fn wants_io(&self) -> bool {
        self.half.is_some() && !matches!(self.state, ReadState::Idle)
    }

    /// Perform one read toward the current frame and act on the outcome.
    ///
    /// Suspends (pends) while the transport has no bytes available; the
    /// work task re-polls on the next readiness notification.
    pub(crate) async fn pump(&mut self) {
        match self.read_some().await {
            Ok(0) => {
                debug!("end of stream while a read was in flight");
                self.fail_all(ConnectionError::EndOfStream);
            }
            Ok(n) => self.advance(n),
            Err(err) => {
                debug!(%err, "transport read failed");
                self.fail_all(ConnectionError::transport(err));
            }
        }
    }

    async fn read_some(&mut self) -> std::io::Result<usize> {
        let Some(half) = self.half.as_mut() else {
            return std::future::pending().await;
        };
        match &mut self.state {
            ReadState::Header { buf, filled } => half.read(&mut buf[*filled..]).await,
            ReadState::Payload { buf, filled } => half.read(&mut buf[*filled..]).await,
            ReadState::Idle => std::future::pending().await,
        }
    }

    fn advance(&mut self, n: usize) {
        match &mut self.state {
            ReadState::Header { buf, filled } => {
                *filled += n;
                if *filled < HEADER_SIZE {
                    return;
                }
                let declared = decode_header(buf);
                if declared == 0 {
                    // Header-only frame: consumes wire bytes, never a request.
                    trace!("skipping empty frame");
                    self.state = ReadState::header();
                } else {
                    self.state = ReadState::Payload {
                        buf: BytesMut::zeroed(declared as usize),
                        filled: 0,
                    };
                }
            }
            ReadState::Payload { buf, filled } => {
                *filled += n;
                if *filled < buf.len() {
                    return;
                }
                let payload = std::mem::take(buf).freeze();
                trace!(len = payload.len(), "message assembled");
                self.state = ReadState::Idle;
                self.deliver(payload);
            }
            ReadState::Idle => {}
        }
    }

    fn deliver(&mut self, payload: Bytes) {
        if let Some(done) = self.queue.pop_front() {
            self.completions.dispatch(move || done(Ok(payload)));
        }
        if !self.queue.is_empty() {
            self.state = ReadState::header();
        } else if self.close_pending {
            self.close_now();
        }
    }

    /// Fail every queued request in FIFO order, then close the direction.
    pub(crate) fn fail_all(&mut self, err: ConnectionError) {
        self.state = ReadState::Idle;
        while let Some(done) = self.queue.pop_front() {
            let err = err.clone();
            self.completions.dispatch(move || done(Err(err)));
        }
        self.close_now();
    }

    /// Close the read direction, deferring until the queue drains if
    /// requests are outstanding.
    pub(crate) fn request_close(&mut self) {
        if self.closed || self.close_pending {
            return;
        }
        if self.queue.is_empty() {
            self.close_now();
        } else {
            debug!(pending = self.queue.len(), "read close deferred until queue drains");
            self.close_pending = true;
        }
    }

    fn close_now(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.close_pending = false;
        if let Some(half) = self.half.take() {
            half.close();
        }
        debug!("read direction closed");
        if let Some(hook) = self.on_closed.take() {
            self.completions.dispatch(hook);
        }
    }
}

/// Serializes queued messages to the transport, in FIFO order.
pub(crate) struct WritePipeline {
    half: Option<WriteHalf>,
    state: WriteState,
    queue: VecDeque<PendingWrite>,
    close_pending: bool,
    closed: bool,
    completions: SerialQueue,
    on_closed: Option<ClosedHook>,
}

struct PendingWrite {
    payload: Bytes,
    done: SendCallback,
}

enum WriteState {
    Idle,
    Header { buf: [u8; HEADER_SIZE], written: usize },
    Payload { written: usize },
}

impl WritePipeline {
    pub(crate) fn new(completions: SerialQueue, on_closed: Option<ClosedHook>) -> Self {
        Self {
            half: None,
            state: WriteState::Idle,
            queue: VecDeque::new(),
            close_pending: false,
            closed: false,
            completions,
            on_closed,
        }
    }

    /// Enqueue a write request.
    ///
    /// Completion means the bytes were handed to the kernel, not that the
    /// peer received them. Requests submitted after the direction closed
    /// (or while a close is pending) fail at once.
    pub(crate) fn submit(&mut self, payload: Bytes, done: SendCallback) {
        if self.closed || self.close_pending {
            self.completions
                .dispatch(move || done(Err(ConnectionError::WriteClosed)));
            return;
        }
        self.queue.push_back(PendingWrite { payload, done });
        if self.half.is_some() && matches!(self.state, WriteState::Idle) {
            self.begin_front();
        }
    }

    /// Adopt the opened write half and start any waiting request.
    pub(crate) async fn attach(&mut self, half: WriteHalf) {
        if self.closed {
            let mut half = half;
            let _ = half.close().await;
            return;
        }
        self.half = Some(half);
        if !self.queue.is_empty() && matches!(self.state, WriteState::Idle) {
            self.begin_front();
        }
    }

    fn begin_front(&mut self) {
        if let Some(front) = self.queue.front() {
            self.state = WriteState::Header {
                buf: encode_header(front.payload.len() as u64),
                written: 0,
            };
        }
    }

    /// Whether the pipeline has transport I/O to make progress on.
    pub(crate) fn wants_io(&self) -> bool {
        self.half.is_some() && !matches!(self.state, WriteState::Idle)
    }

    /// Perform one write toward the current frame and act on the outcome.
    ///
    /// Suspends (pends) while the transport has no space available.
    pub(crate) async fn pump(&mut self) {
        match self.write_some().await {
            Ok(0) => {
                debug!("transport accepted no bytes; treating write side as closed");
                self.fail_all(ConnectionError::WriteClosed).await;
            }
            Ok(n) => {
                if self.record_progress(n) {
                    self.finish_front().await;
                }
            }
            Err(err) => {
                debug!(%err, "transport write failed");
                self.fail_all(ConnectionError::transport(err)).await;
            }
        }
    }

    async fn write_some(&mut self) -> std::io::Result<usize> {
        let Some(half) = self.half.as_mut() else {
            return std::future::pending().await;
        };
        match &self.state {
            WriteState::Header { buf, written } => half.write(&buf[*written..]).await,
            WriteState::Payload { written } => match self.queue.front() {
                Some(front) => half.write(&front.payload[*written..]).await,
                None => std::future::pending().await,
            },
            WriteState::Idle => std::future::pending().await,
        }
    }

    /// Returns true once the frame at the front of the queue is fully
    /// written (header, and payload when one exists).
    fn record_progress(&mut self, n: usize) -> bool {
        let front_len = self
            .queue
            .front()
            .map(|front| front.payload.len())
            .unwrap_or(0);
        match &mut self.state {
            WriteState::Header { written, .. } => {
                *written += n;
                if *written < HEADER_SIZE {
                    return false;
                }
            }
            WriteState::Payload { written } => {
                *written += n;
                return *written >= front_len;
            }
            WriteState::Idle => return false,
        }
        // Header complete; an empty payload means the frame is done.
        if front_len == 0 {
            true
        } else {
            self.state = WriteState::Payload { written: 0 };
            false
        }
    }

    async fn finish_front(&mut self) {
        self.state = WriteState::Idle;
        if let Some(PendingWrite { payload, done }) = self.queue.pop_front() {
            trace!(len = payload.len(), "message written");
            self.completions.dispatch(move || done(Ok(())));
        }
        if !self.queue.is_empty() {
            self.begin_front();
        } else if self.close_pending {
            self.close_now().await;
        }
    }

    /// Fail every queued request in FIFO order, then close the direction.
    pub(crate) async fn fail_all(&mut self, err: ConnectionError) {
        self.state = WriteState::Idle;
        while let Some(PendingWrite { done, .. }) = self.queue.pop_front() {
            let err = err.clone();
            self.completions.dispatch(move || done(Err(err)));
        }
        self.close_now().await;
    }

    /// Close the write direction, deferring until the queue drains if
    /// requests are outstanding.
    pub(crate) async fn request_close(&mut self) {
        if self.closed || self.close_pending {
            return;
        }
        if self.queue.is_empty() {
            self.close_now().await;
        } else {
            debug!(pending = self.queue.len(), "write close deferred until queue drains");
            self.close_pending = true;
        }
    }

    async fn close_now(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.close_pending = false;
        if let Some(mut half) = self.half.take() {
            if let Err(err) = half.close().await {
                debug!(%err, "write shutdown failed");
            }
        }
        debug!("write direction closed");
        if let Some(hook) = self.on_closed.take() {
            self.completions.dispatch(hook);
        }
    }
}
