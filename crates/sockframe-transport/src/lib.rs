//! Byte transport abstraction for framed connections.
//!
//! Provides unopened [`Transport`] endpoints (remote TCP, accepted
//! connections, in-memory loopback pairs) that open into a [`ReadHalf`] and
//! a [`WriteHalf`] with independently closeable directions.
//!
//! This is the lowest layer of sockframe. Everything else builds on top of
//! the halves provided here.

pub mod error;
pub mod stream;
pub mod tcp;

pub use error::{Result, TransportError};
pub use stream::{ReadHalf, WriteHalf};
pub use tcp::{Listener, Transport};
