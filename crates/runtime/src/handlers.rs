//! Handler identities and RAII unregistration.
//!
//! Every registered callback (listener, route, websocket route) gets a
//! [`HandlerId`] from one process-wide counter, so ids are comparable across
//! collections and removal never depends on closure identity.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for registered handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Synchronous handler invoked with a borrowed payload.
pub type Handler<P> = Arc<dyn Fn(&P) + Send + Sync>;

/// Handler entry with optional metadata `M`.
pub struct HandlerEntry<P, M = ()> {
	pub id: HandlerId,
	pub meta: M,
	pub handler: Handler<P>,
}

impl<P, M: Clone> Clone for HandlerEntry<P, M> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			meta: self.meta.clone(),
			handler: Arc::clone(&self.handler),
		}
	}
}

impl<P> HandlerEntry<P> {
	pub fn new(handler: Handler<P>) -> Self {
		Self {
			id: next_handler_id(),
			meta: (),
			handler,
		}
	}
}

/// RAII handle that unregisters a handler on drop.
///
/// The dropper usually holds a weak reference to its collection, so dropping
/// a subscription after the owning object is gone is a no-op.
pub struct Subscription {
	id: HandlerId,
	dropper: Option<Arc<dyn Fn(HandlerId) + Send + Sync>>,
}

impl Subscription {
	/// Creates a subscription with a custom dropper function.
	pub fn new(id: HandlerId, dropper: Arc<dyn Fn(HandlerId) + Send + Sync>) -> Self {
		Self {
			id,
			dropper: Some(dropper),
		}
	}

	/// Returns this subscription's handler ID.
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Keeps the handler registered for the lifetime of its collection.
	pub fn detach(mut self) -> HandlerId {
		self.dropper = None;
		self.id
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}
