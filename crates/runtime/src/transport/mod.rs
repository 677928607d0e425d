//! Transports carrying JSON frames between the client and the driver.
//!
//! The connection consumes transports through the blocking [`Transport`]
//! contract only: `send`, `poll` with a short timeout, and `close`. Message
//! framing is private to each implementation:
//!
//! - [`PipeTransport`]: 4-byte little-endian length prefix over driver stdio
//! - [`WebSocketTransport`]: one JSON document per text frame
//! - [`MemoryTransport`]: in-process queue pair for tests and embedding
//!
//! Async I/O is driven by a private current-thread tokio runtime owned by the
//! transport. It only makes progress inside `send`/`poll`, so the caller's
//! thread remains the single thread of control.

mod logger;
mod memory;
mod pipe;
mod websocket;


use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};

pub use logger::LoggingTransport;
pub use memory::{MemoryPeer, MemoryTransport};
pub use pipe::PipeTransport;
pub use websocket::WebSocketTransport;

/// Bidirectional message channel to the driver.
pub trait Transport: Send {
	/// Sends one message.
	fn send(&mut self, message: Value) -> Result<()>;

	/// Waits up to `timeout` for the next inbound message.
	///
	/// Returns `Ok(None)` when nothing arrived in time and
	/// `Err(Error::ChannelClosed)` once the peer has gone away.
	fn poll(&mut self, timeout: Duration) -> Result<Option<Value>>;

	/// Closes the channel. Closing an already closed channel is a no-op.
	fn close(&mut self) -> Result<()>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
	fn send(&mut self, message: Value) -> Result<()> {
		(**self).send(message)
	}

	fn poll(&mut self, timeout: Duration) -> Result<Option<Value>> {
		(**self).poll(timeout)
	}

	fn close(&mut self) -> Result<()> {
		(**self).close()
	}
}

/// Frames decoded by a reader task, or the error that stopped it.
type Inbound = mpsc::UnboundedReceiver<Result<Value>>;

fn build_runtime() -> Result<tokio::runtime::Runtime> {
	tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.map_err(Error::from)
}

/// Drives `runtime` until a frame arrives on `inbound` or `timeout` elapses.
fn poll_inbound(
	runtime: &tokio::runtime::Runtime,
	inbound: &mut Inbound,
	timeout: Duration,
) -> Result<Option<Value>> {
	let received = runtime.block_on(async { tokio::time::timeout(timeout, inbound.recv()).await });
	match received {
		Err(_elapsed) => Ok(None),
		Ok(Some(frame)) => frame.map(Some),
		Ok(None) => Err(Error::ChannelClosed),
	}
}
