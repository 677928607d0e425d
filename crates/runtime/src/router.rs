//! Interception chains for routed requests and websockets.
//!
//! Routes are tried newest first. A request route handler either resolves
//! the item, explicitly falls back to the next matching route, or returns
//! without doing either, in which case it owns the item asynchronously and
//! the walk stops.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::handlers::{Handler, HandlerId, next_handler_id};
use crate::url_matcher::{UrlMatcher, interception_patterns};

/// Outcome of offering an item to a [`Router`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleResult {
	/// No route matched the item.
	NoMatchingHandler,
	/// A handler resolved the item.
	Handled,
	/// Every matching handler fell back.
	Fallback,
	/// A handler kept the item and will resolve it later.
	PendingHandler,
}

/// Per-item resolution state shared by every clone of the item.
#[derive(Debug, Default)]
pub struct InterceptionState {
	handled: AtomicBool,
	fallback_called: AtomicBool,
	pending: AtomicBool,
}

impl InterceptionState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Claims the terminal resolution. Fails if it was already claimed.
	pub fn start_handling(&self) -> Result<()> {
		if self.handled.swap(true, Ordering::SeqCst) {
			return Err(Error::InvalidState("Route is already handled!".to_string()));
		}
		Ok(())
	}

	pub fn is_handled(&self) -> bool {
		self.handled.load(Ordering::SeqCst)
	}

	/// Records a fallback. Returns `true` when the item was left pending by
	/// an earlier handler, meaning the caller must now resume it.
	pub fn fallback(&self) -> Result<bool> {
		if self.is_handled() {
			return Err(Error::InvalidState("Route is already handled!".to_string()));
		}
		self.fallback_called.store(true, Ordering::SeqCst);
		Ok(self.pending.load(Ordering::SeqCst))
	}

	pub fn fallback_called(&self) -> bool {
		self.fallback_called.load(Ordering::SeqCst)
	}

	/// Whether a handler kept the item for asynchronous resolution.
	pub fn is_pending(&self) -> bool {
		self.pending.load(Ordering::SeqCst)
	}

	fn reset_fallback(&self) {
		self.fallback_called.store(false, Ordering::SeqCst);
	}

	fn set_pending(&self) {
		self.pending.store(true, Ordering::SeqCst);
	}
}

/// An intercepted item a [`Router`] can offer to its routes.
pub trait Interceptable: Clone + Send + Sync + 'static {
	/// URL the route matchers are tested against.
	fn url(&self) -> String;

	fn interception(&self) -> &InterceptionState;
}

struct RouteEntry<R> {
	id: HandlerId,
	matcher: UrlMatcher,
	handler: Handler<R>,
	times: Mutex<Option<u32>>,
}

impl<R> RouteEntry<R> {
	/// Consumes one invocation. `None` means the entry is exhausted,
	/// `Some(true)` that this was its last one.
	fn take_call(&self) -> Option<bool> {
		let mut times = self.times.lock();
		match times.as_mut() {
			None => Some(false),
			Some(0) => None,
			Some(remaining) => {
				*remaining -= 1;
				Some(*remaining == 0)
			}
		}
	}
}

/// Ordered request interception chain.
pub struct Router<R> {
	routes: Mutex<Vec<Arc<RouteEntry<R>>>>,
}

impl<R: Interceptable> Default for Router<R> {
	fn default() -> Self {
		Self::new()
	}
}

impl<R: Interceptable> Router<R> {
	pub fn new() -> Self {
		Self {
			routes: Mutex::new(Vec::new()),
		}
	}

	/// Registers a route ahead of all existing ones. `times` limits how many
	/// items it handles before it is removed.
	pub fn add<F>(&self, matcher: UrlMatcher, handler: F, times: Option<u32>) -> HandlerId
	where
		F: Fn(&R) + Send + Sync + 'static,
	{
		let id = next_handler_id();
		let entry = RouteEntry {
			id,
			matcher,
			handler: Arc::new(handler),
			// `Some(0)` still gets its one invocation.
			times: Mutex::new(times.map(|times| times.max(1))),
		};
		self.routes.lock().insert(0, Arc::new(entry));
		id
	}

	/// Removes routes registered with an equal matcher, limited to one
	/// handler when `handler` is given. Returns how many were removed.
	pub fn remove(&self, matcher: &UrlMatcher, handler: Option<HandlerId>) -> usize {
		let mut routes = self.routes.lock();
		let before = routes.len();
		routes.retain(|entry| entry.matcher != *matcher || handler.is_some_and(|id| entry.id != id));
		before - routes.len()
	}

	pub fn remove_all(&self) {
		self.routes.lock().clear();
	}

	pub fn len(&self) -> usize {
		self.routes.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.routes.lock().is_empty()
	}

	/// Offers `item` to the matching routes, newest first.
	///
	/// An item that is already handled or pending is not offered again.
	pub fn handle(&self, item: &R) -> HandleResult {
		let state = item.interception();
		if state.is_handled() {
			return HandleResult::Handled;
		}
		if state.is_pending() {
			return HandleResult::PendingHandler;
		}

		let url = item.url();
		let snapshot: Vec<_> = self.routes.lock().clone();
		let mut result = HandleResult::NoMatchingHandler;

		for entry in snapshot {
			if !entry.matcher.matches(&url) {
				continue;
			}
			let Some(last_call) = entry.take_call() else {
				continue;
			};
			if last_call {
				self.routes.lock().retain(|other| other.id != entry.id);
			}

			state.reset_fallback();
			(entry.handler)(item);
			if state.is_handled() {
				return HandleResult::Handled;
			}
			if !state.fallback_called() {
				state.set_pending();
				return HandleResult::PendingHandler;
			}
			result = HandleResult::Fallback;
		}
		result
	}

	/// Pattern payload for `setNetworkInterceptionPatterns`.
	pub fn interception_patterns(&self) -> Value {
		let routes = self.routes.lock();
		interception_patterns(routes.iter().map(|entry| &entry.matcher))
	}
}

/// A routed websocket a [`WebSocketRouter`] can offer to its routes.
pub trait WebSocketInterceptable: Clone + Send + Sync + 'static {
	fn url(&self) -> String;

	/// Runs after the owning handler returns.
	fn after_handle(&self) -> Result<()>;
}

struct WebSocketRouteEntry<W> {
	id: HandlerId,
	matcher: UrlMatcher,
	handler: Handler<W>,
}

/// Websocket interception: the newest matching route owns the socket.
pub struct WebSocketRouter<W> {
	routes: Mutex<Vec<Arc<WebSocketRouteEntry<W>>>>,
}

impl<W: WebSocketInterceptable> Default for WebSocketRouter<W> {
	fn default() -> Self {
		Self::new()
	}
}

impl<W: WebSocketInterceptable> WebSocketRouter<W> {
	pub fn new() -> Self {
		Self {
			routes: Mutex::new(Vec::new()),
		}
	}

	pub fn add<F>(&self, matcher: UrlMatcher, handler: F) -> HandlerId
	where
		F: Fn(&W) + Send + Sync + 'static,
	{
		let id = next_handler_id();
		let entry = WebSocketRouteEntry {
			id,
			matcher,
			handler: Arc::new(handler),
		};
		self.routes.lock().insert(0, Arc::new(entry));
		id
	}

	pub fn remove(&self, matcher: &UrlMatcher, handler: Option<HandlerId>) -> usize {
		let mut routes = self.routes.lock();
		let before = routes.len();
		routes.retain(|entry| entry.matcher != *matcher || handler.is_some_and(|id| entry.id != id));
		before - routes.len()
	}

	pub fn remove_all(&self) {
		self.routes.lock().clear();
	}

	pub fn is_empty(&self) -> bool {
		self.routes.lock().is_empty()
	}

	/// Hands `route` to the first matching handler. Returns whether one matched.
	pub fn handle(&self, route: &W) -> Result<bool> {
		let url = route.url();
		let owner = self.routes.lock().iter().find(|entry| entry.matcher.matches(&url)).cloned();
		let Some(owner) = owner else {
			return Ok(false);
		};
		(owner.handler)(route);
		route.after_handle()?;
		Ok(true)
	}

	/// Pattern payload for `setWebSocketInterceptionPatterns`.
	pub fn interception_patterns(&self) -> Value {
		let routes = self.routes.lock();
		interception_patterns(routes.iter().map(|entry| &entry.matcher))
	}
}
