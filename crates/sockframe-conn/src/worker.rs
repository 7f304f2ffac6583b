//! The per-connection work task.
//!
//! One task owns both pipelines and all of their state. Submissions arrive
//! over the command channel; transport readiness is observed by polling the
//! active pipeline's pending I/O. Because everything funnels through this
//! single task, concurrent pipeline invocation is impossible by
//! construction, not by locking.

use std::sync::Arc;

use bytes::Bytes;
use sockframe_transport::Transport;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::error::ConnectionError;
use crate::observer::ConnectionObserver;
use crate::pipeline::{ReadPipeline, ReceiveCallback, SendCallback, WritePipeline};
use crate::queue::SerialQueue;

pub(crate) enum Command {
    Open,
    Send { payload: Bytes, done: SendCallback },
    Receive { done: ReceiveCallback },
    CloseRead,
    CloseWrite,
}

pub(crate) struct Worker {
    commands: mpsc::UnboundedReceiver<Command>,
    transport: Option<Transport>,
    read: ReadPipeline,
    write: WritePipeline,
}

impl Worker {
    pub(crate) fn new(
        commands: mpsc::UnboundedReceiver<Command>,
        transport: Transport,
        completions: SerialQueue,
        observer: ConnectionObserver,
    ) -> Self {
        Self {
            commands,
            transport: Some(transport),
            read: ReadPipeline::new(completions.clone(), observer.on_read_closed),
            write: WritePipeline::new(completions, observer.on_write_closed),
        }
    }

    pub(crate) async fn run(mut self) {
        loop {
            let read_io = self.read.wants_io();
            let write_io = self.write.wants_io();
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command).await,
                    None => break,
                },
                _ = self.read.pump(), if read_io => {}
                _ = self.write.pump(), if write_io => {}
            }
        }
        self.teardown().await;
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Open => self.open().await,
            Command::Send { payload, done } => self.write.submit(payload, done),
            Command::Receive { done } => self.read.submit(done),
            Command::CloseRead => self.read.request_close(),
            Command::CloseWrite => self.write.request_close().await,
        }
    }

    async fn open(&mut self) {
        // Open happens once per connection; later commands are no-ops.
        let Some(transport) = self.transport.take() else {
            return;
        };
        match transport.open().await {
            Ok((read_half, write_half)) => {
                info!("connection opened");
                self.read.attach(read_half);
                self.write.attach(write_half).await;
            }
            Err(err) => {
                debug!(%err, "open failed");
                let err = ConnectionError::Open(Arc::new(err));
                self.read.fail_all(err.clone());
                self.write.fail_all(err).await;
            }
        }
    }

    /// The handle was dropped: fail anything still queued and force both
    /// halves closed.
    async fn teardown(&mut self) {
        self.read.fail_all(ConnectionError::ReadClosed);
        self.write.fail_all(ConnectionError::WriteClosed).await;
        debug!("connection torn down");
    }
}
