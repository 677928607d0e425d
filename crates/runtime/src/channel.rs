//! Channel - RPC communication proxy for ChannelOwner objects.
//!
//! A channel sends method calls to the driver on behalf of one remote object.
//! It refuses to send once its object has been disposed.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::connection::ConnectionLike;
use crate::error::{Error, Result};
use crate::waitable::WaitableResult;

/// Disposal state shared by a node and its channel.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
	disposed: AtomicBool,
	collected: AtomicBool,
}

impl Lifecycle {
	/// Marks the node disposed. Returns `false` if it already was.
	pub(crate) fn dispose(&self, collected: bool) -> bool {
		if collected {
			self.collected.store(true, Ordering::SeqCst);
		}
		!self.disposed.swap(true, Ordering::SeqCst)
	}

	pub(crate) fn is_disposed(&self) -> bool {
		self.disposed.load(Ordering::SeqCst)
	}

	pub(crate) fn was_collected(&self) -> bool {
		self.collected.load(Ordering::SeqCst)
	}
}

/// Channel provides RPC communication for a ChannelOwner.
#[derive(Clone)]
pub struct Channel {
	guid: Arc<str>,
	connection: Weak<dyn ConnectionLike>,
	lifecycle: Arc<Lifecycle>,
}

impl Channel {
	pub(crate) fn new(guid: Arc<str>, connection: Weak<dyn ConnectionLike>, lifecycle: Arc<Lifecycle>) -> Self {
		Self {
			guid,
			connection,
			lifecycle,
		}
	}

	/// Sends a method call and pumps the connection until it is answered.
	pub fn send<P: Serialize, R: DeserializeOwned>(&self, method: &str, params: P) -> Result<R> {
		let response = self.send_value(method, serde_json::to_value(params)?)?;
		serde_json::from_value(response).map_err(Into::into)
	}

	/// Sends a method call with raw JSON params and returns the raw result.
	pub fn send_value(&self, method: &str, params: Value) -> Result<Value> {
		self.connection()?.send_message(&self.guid, method, params)
	}

	/// Sends a method call that returns no result (void).
	pub fn send_no_result<P: Serialize>(&self, method: &str, params: P) -> Result<()> {
		let _: Value = self.send(method, params)?;
		Ok(())
	}

	/// Sends a method call without waiting; the caller decides when to pump.
	pub fn send_async(&self, method: &str, params: Value) -> Result<WaitableResult<Value>> {
		self.connection()?.send_message_async(&self.guid, method, params)
	}

	/// Sends a method call whose result nobody waits for.
	pub fn send_no_reply(&self, method: &str, params: Value) -> Result<()> {
		self.send_async(method, params).map(drop)
	}

	/// Returns the GUID this channel represents.
	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub(crate) fn guid_arc(&self) -> &Arc<str> {
		&self.guid
	}

	/// Whether the owning object has been disposed.
	pub fn is_disposed(&self) -> bool {
		self.lifecycle.is_disposed()
	}

	/// The live connection, failing fast if the object is disposed.
	pub fn connection(&self) -> Result<Arc<dyn ConnectionLike>> {
		if self.lifecycle.is_disposed() {
			return Err(Error::ObjectDisposed {
				guid: self.guid.to_string(),
				collected: self.lifecycle.was_collected(),
			});
		}
		self.connection
			.upgrade()
			.ok_or_else(|| Error::ConnectionClosed("Connection has been dropped".to_string()))
	}

	pub(crate) fn connection_weak(&self) -> &Weak<dyn ConnectionLike> {
		&self.connection
	}
}

impl std::fmt::Debug for Channel {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Channel")
			.field("guid", &self.guid)
			.field("disposed", &self.lifecycle.is_disposed())
			.finish()
	}
}
