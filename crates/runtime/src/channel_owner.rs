//! ChannelOwner - Base trait for all remote protocol objects.
//!
//! Every object the driver creates is represented locally by a node that:
//! - is addressed by a peer-assigned GUID
//! - is owned by exactly one parent's child table (the root excepted)
//! - dispatches protocol events sent to its GUID
//! - talks to the driver through its [`Channel`]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use pw_protocol::StackFrame;
use serde_json::Value;

use crate::channel::{Channel, Lifecycle};
use crate::connection::{ApiZone, ApiZoneGuard, ConnectionLike};
use crate::error::Result;
use crate::logging::log_api;

/// Private module for the sealed trait pattern.
pub mod private {
	/// Marker trait that seals `ChannelOwner`.
	pub trait Sealed {}
}

type ChildrenRegistry = HashMap<Arc<str>, Arc<dyn ChannelOwner>>;

/// Reason why an object was disposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisposeReason {
	/// The driver closed the object.
	Closed,
	/// The driver collected the object to bound its heap.
	GarbageCollected,
}

impl DisposeReason {
	/// Maps the wire `reason` field; only `"gc"` means collection.
	pub fn from_wire(reason: Option<&str>) -> Self {
		match reason {
			Some("gc") => DisposeReason::GarbageCollected,
			_ => DisposeReason::Closed,
		}
	}
}

/// Parent can be either another ChannelOwner or the root Connection.
pub enum ParentOrConnection {
	Parent(Arc<dyn ChannelOwner>),
	Connection(Weak<dyn ConnectionLike>),
}

/// Base trait for all protocol objects.
///
/// Implementors embed a [`ChannelOwnerImpl`] and expose it through
/// [`base`](Self::base); everything else has a default that delegates to it.
/// The trait is sealed so that only crates in this workspace add node types.
pub trait ChannelOwner: private::Sealed + DowncastSync {
	/// Returns the embedded node state.
	fn base(&self) -> &ChannelOwnerImpl;

	/// Handles a protocol event sent to this object.
	fn on_event(&self, method: &str, params: Value) {
		self.base().on_event(method, params)
	}

	/// Returns the unique GUID for this object.
	fn guid(&self) -> &str {
		self.base().guid()
	}

	/// Returns the protocol type name (e.g., "Browser", "Page").
	fn type_name(&self) -> &str {
		self.base().type_name()
	}

	/// Returns the raw initializer JSON from the driver.
	fn initializer(&self) -> &Value {
		self.base().initializer()
	}

	/// Returns the channel for RPC communication.
	fn channel(&self) -> &Channel {
		self.base().channel()
	}

	/// Returns the parent object, if any.
	fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
		self.base().parent()
	}

	/// Returns the connection, failing if this object is disposed.
	fn connection(&self) -> Result<Arc<dyn ConnectionLike>> {
		self.base().connection()
	}

	fn is_disposed(&self) -> bool {
		self.base().is_disposed()
	}

	/// Returns true if this object was garbage collected.
	fn was_collected(&self) -> bool {
		self.base().was_collected()
	}
}

impl_downcast!(sync ChannelOwner);

impl dyn ChannelOwner {
	/// Moves `child` under this object. Its GUID and registration are unchanged.
	pub fn adopt(self: &Arc<Self>, child: Arc<dyn ChannelOwner>) {
		if let Some(old_parent) = child.parent() {
			old_parent.base().remove_child(child.guid());
		}
		child.base().set_parent(Arc::downgrade(self));
		self.base().add_child(child);
	}

	/// Disposes this object and all of its descendants.
	pub fn dispose(&self, reason: DisposeReason) {
		self.base().dispose(reason)
	}
}

/// Node state embedded in every protocol object.
pub struct ChannelOwnerImpl {
	guid: Arc<str>,
	type_name: String,
	initializer: Value,
	parent: Mutex<Option<Weak<dyn ChannelOwner>>>,
	children: Mutex<ChildrenRegistry>,
	channel: Channel,
	lifecycle: Arc<Lifecycle>,
	internal: AtomicBool,
}

impl ChannelOwnerImpl {
	/// Creates node state for `guid`. Registration with the parent and the
	/// connection is done by the dispatcher.
	pub fn new(parent: ParentOrConnection, type_name: impl Into<String>, guid: Arc<str>, initializer: Value) -> Self {
		let (connection, parent) = match parent {
			ParentOrConnection::Parent(p) => (p.base().channel.connection_weak().clone(), Some(Arc::downgrade(&p))),
			ParentOrConnection::Connection(c) => (c, None),
		};
		let lifecycle = Arc::new(Lifecycle::default());
		let channel = Channel::new(Arc::clone(&guid), connection, Arc::clone(&lifecycle));

		Self {
			guid,
			type_name: type_name.into(),
			initializer,
			parent: Mutex::new(parent),
			children: Mutex::new(HashMap::new()),
			channel,
			lifecycle,
			internal: AtomicBool::new(false),
		}
	}

	pub fn guid(&self) -> &str {
		&self.guid
	}

	pub fn type_name(&self) -> &str {
		&self.type_name
	}

	pub fn initializer(&self) -> &Value {
		&self.initializer
	}

	pub fn channel(&self) -> &Channel {
		&self.channel
	}

	pub fn parent(&self) -> Option<Arc<dyn ChannelOwner>> {
		self.parent.lock().as_ref().and_then(Weak::upgrade)
	}

	pub fn connection(&self) -> Result<Arc<dyn ConnectionLike>> {
		self.channel.connection()
	}

	pub fn is_disposed(&self) -> bool {
		self.lifecycle.is_disposed()
	}

	pub fn was_collected(&self) -> bool {
		self.lifecycle.was_collected()
	}

	/// Internal types never label their calls with an API name.
	pub fn mark_as_internal_type(&self) {
		self.internal.store(true, Ordering::SeqCst);
	}

	pub fn is_internal(&self) -> bool {
		self.internal.load(Ordering::SeqCst)
	}

	/// Returns all children of this object.
	pub fn children(&self) -> Vec<Arc<dyn ChannelOwner>> {
		self.children.lock().values().cloned().collect()
	}

	pub fn child(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.children.lock().get(guid).cloned()
	}

	pub(crate) fn add_child(&self, child: Arc<dyn ChannelOwner>) {
		let guid = Arc::clone(child.channel().guid_arc());
		self.children.lock().insert(guid, child);
	}

	pub(crate) fn remove_child(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		self.children.lock().remove(guid)
	}

	pub(crate) fn set_parent(&self, parent: Weak<dyn ChannelOwner>) {
		*self.parent.lock() = Some(parent);
	}

	/// Marks this object and its subtree disposed, detaching each node from
	/// its parent and from the connection's lookup table.
	pub fn dispose(&self, reason: DisposeReason) {
		if !self.lifecycle.dispose(reason == DisposeReason::GarbageCollected) {
			return;
		}

		if let Some(parent) = self.parent() {
			parent.base().remove_child(&self.guid);
		}
		if let Some(connection) = self.channel.connection_weak().upgrade() {
			connection.unregister_object(&self.guid);
		}

		let children = std::mem::take(&mut *self.children.lock());
		for child in children.into_values() {
			child.base().dispose(reason);
		}
	}

	/// Default event handling: the event is logged and dropped.
	pub fn on_event(&self, method: &str, params: Value) {
		tracing::debug!(guid = %self.guid, type_name = %self.type_name, method, ?params, "Unhandled event");
	}

	/// Runs `f` as one logical API call named `api_name`.
	///
	/// The first message `f` sends is labelled with the name and the caller's
	/// location; later ones are internal. Nested calls reuse the outer label.
	#[track_caller]
	pub fn with_logging<T>(&self, api_name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
		let frame = StackFrame::from(std::panic::Location::caller());
		let connection = self.connection()?;
		let internal = self.is_internal();
		let zone = ApiZone {
			api_name: (!internal).then(|| api_name.to_string()),
			frames: vec![frame],
		};
		let Some(_zone) = ApiZoneGuard::enter(connection.as_ref(), zone) else {
			return f();
		};

		let log = connection.logs_api() && !internal;
		if log {
			log_api(&format!("=> {api_name} started"));
		}
		let result = f();
		if log {
			match &result {
				Ok(_) => log_api(&format!("<= {api_name} succeeded")),
				Err(_) => log_api(&format!("<= {api_name} failed")),
			}
		}
		result
	}
}

impl std::fmt::Debug for ChannelOwnerImpl {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ChannelOwnerImpl")
			.field("guid", &self.guid)
			.field("type_name", &self.type_name)
			.field("disposed", &self.lifecycle.is_disposed())
			.finish()
	}
}
