//! Asynchronous framed message connections over byte transports.
//!
//! This is the core of sockframe. A [`Connection`] turns a raw byte stream
//! into a sequence of discrete, whole messages delivered exactly once, in
//! order, with independent half-close of the read and write directions,
//! pipelining of multiple outstanding requests per direction, and
//! completion callbacks on a caller-chosen serial queue.

pub mod connection;
pub mod error;
pub mod observer;
pub mod queue;

mod pipeline;
mod worker;

pub use connection::{Connection, ConnectionOptions};
pub use error::{ConnectionError, Result};
pub use observer::ConnectionObserver;
pub use queue::SerialQueue;

pub use sockframe_transport::{Listener, Transport};
