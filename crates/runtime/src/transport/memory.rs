//! In-process transport pair.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde_json::Value;

use super::Transport;
use crate::error::{Error, Result};

type Responder = Box<dyn FnMut(&Value) -> Vec<Value> + Send>;

#[derive(Default)]
struct Shared {
	inbound: Mutex<VecDeque<Value>>,
	ready: Condvar,
	sent: Mutex<Vec<Value>>,
	responder: Mutex<Option<Responder>>,
	peer_closed: AtomicBool,
	closed: AtomicBool,
}

impl Shared {
	fn deliver(&self, messages: impl IntoIterator<Item = Value>) {
		let mut inbound = self.inbound.lock();
		inbound.extend(messages);
		self.ready.notify_all();
	}
}

/// Client end of an in-process channel.
pub struct MemoryTransport {
	shared: Arc<Shared>,
}

/// Driver end of a [`MemoryTransport`].
///
/// Scripts what the client receives and records what it sent.
#[derive(Clone)]
pub struct MemoryPeer {
	shared: Arc<Shared>,
}

impl MemoryTransport {
	/// Creates a connected transport/peer pair.
	pub fn pair() -> (MemoryTransport, MemoryPeer) {
		let shared = Arc::new(Shared::default());
		(
			MemoryTransport {
				shared: Arc::clone(&shared),
			},
			MemoryPeer { shared },
		)
	}
}

impl MemoryPeer {
	/// Queues a message for the client.
	pub fn push(&self, message: Value) {
		self.shared.deliver([message]);
	}

	/// Queues several messages, delivered in order.
	pub fn push_all(&self, messages: impl IntoIterator<Item = Value>) {
		self.shared.deliver(messages);
	}

	/// Installs a closure producing replies for every message the client sends.
	///
	/// Replies are queued before `send` returns.
	pub fn respond_with<F>(&self, responder: F)
	where
		F: FnMut(&Value) -> Vec<Value> + Send + 'static,
	{
		*self.shared.responder.lock() = Some(Box::new(responder));
	}

	/// Messages the client has sent so far.
	pub fn sent(&self) -> Vec<Value> {
		self.shared.sent.lock().clone()
	}

	/// Drains the messages the client has sent so far.
	pub fn take_sent(&self) -> Vec<Value> {
		std::mem::take(&mut *self.shared.sent.lock())
	}

	/// Simulates the driver going away. Queued messages are still delivered.
	pub fn close(&self) {
		self.shared.peer_closed.store(true, Ordering::SeqCst);
		self.shared.ready.notify_all();
	}

	/// Whether the client closed its end.
	pub fn is_closed(&self) -> bool {
		self.shared.closed.load(Ordering::SeqCst)
	}
}

impl Transport for MemoryTransport {
	fn send(&mut self, message: Value) -> Result<()> {
		if self.shared.closed.load(Ordering::SeqCst) || self.shared.peer_closed.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}
		let replies = self
			.shared
			.responder
			.lock()
			.as_mut()
			.map(|respond| respond(&message))
			.unwrap_or_default();
		self.shared.sent.lock().push(message);
		if !replies.is_empty() {
			self.shared.deliver(replies);
		}
		Ok(())
	}

	fn poll(&mut self, timeout: Duration) -> Result<Option<Value>> {
		if self.shared.closed.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}
		let mut inbound = self.shared.inbound.lock();
		if inbound.is_empty() && !self.shared.peer_closed.load(Ordering::SeqCst) {
			self.shared.ready.wait_for(&mut inbound, timeout);
		}
		if let Some(message) = inbound.pop_front() {
			return Ok(Some(message));
		}
		if self.shared.peer_closed.load(Ordering::SeqCst) {
			return Err(Error::ChannelClosed);
		}
		Ok(None)
	}

	fn close(&mut self) -> Result<()> {
		self.shared.closed.store(true, Ordering::SeqCst);
		self.shared.ready.notify_all();
		Ok(())
	}
}
