//! Generic proxy for driver objects without type-specific behaviour.
//!
//! Every [`RemoteObject`] carries the event listeners and route scopes that
//! `Page`, `BrowserContext` and friends expose. Events are keyed by their wire
//! name; for pages and contexts the optional feeds (`console`, `request`, ...)
//! are switched on in the driver while at least one handler is registered.

use std::sync::Arc;

use pw_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, private};
use pw_runtime::waitable::{Waitable, WaitableEvent, WaitableRace, run_until};
use pw_runtime::{
	Channel, HandleResult, HandlerId, ListenerCollection, ObjectInit, Result, Router, Subscription, TimeoutSettings,
	UrlMatcher, WebSocketRouter,
};
use serde_json::Value;

use crate::route::Route;
use crate::websocket_route::WebSocketRoute;

/// Events the driver only produces for pages and contexts on request.
const SUBSCRIBABLE_EVENTS: &[&str] = &["console", "dialog", "request", "response", "requestFinished", "requestFailed"];

/// Types whose optional event feeds are toggled with `updateSubscription`.
const SUBSCRIBING_TYPES: &[&str] = &["Page", "BrowserContext"];

/// A driver object addressed by GUID.
pub struct RemoteObject {
	base: ChannelOwnerImpl,
	events: Arc<ListenerCollection<String, Value>>,
	routes: Router<Route>,
	web_socket_routes: WebSocketRouter<WebSocketRoute>,
	timeout_settings: Arc<TimeoutSettings>,
}

impl RemoteObject {
	pub(crate) fn construct(init: ObjectInit) -> Result<Arc<dyn ChannelOwner>> {
		let timeout_settings = match init.parent.clone().downcast_arc::<RemoteObject>() {
			Ok(parent) => TimeoutSettings::with_parent(Arc::clone(&parent.timeout_settings)),
			Err(_) => TimeoutSettings::new(),
		};
		let base = init.into_base();
		let events = if SUBSCRIBING_TYPES.contains(&base.type_name()) {
			ListenerCollection::with_subscriptions(
				base.channel().clone(),
				SUBSCRIBABLE_EVENTS.iter().map(|event| (event.to_string(), *event)),
			)
		} else {
			ListenerCollection::new()
		};

		Ok(Arc::new(Self {
			base,
			events: Arc::new(events),
			routes: Router::new(),
			web_socket_routes: WebSocketRouter::new(),
			timeout_settings: Arc::new(timeout_settings),
		}))
	}

	pub fn channel(&self) -> &Channel {
		self.base.channel()
	}

	/// Timeouts for waits on this object, inherited from the parent object.
	pub fn timeout_settings(&self) -> &TimeoutSettings {
		&self.timeout_settings
	}

	/// Registers `handler` for the wire event `event`.
	pub fn on<F>(&self, event: &str, handler: F) -> HandlerId
	where
		F: Fn(&Value) + Send + Sync + 'static,
	{
		self.events.add(event.to_string(), handler)
	}

	/// Removes a handler registered with [`on`](Self::on).
	pub fn off(&self, event: &str, id: HandlerId) -> bool {
		self.events.remove(&event.to_string(), id)
	}

	/// Like [`on`](Self::on), but the handler is removed when the returned
	/// [`Subscription`] drops.
	pub fn subscribe<F>(&self, event: &str, handler: F) -> Subscription
	where
		F: Fn(&Value) + Send + Sync + 'static,
	{
		self.events.subscribe(event.to_string(), handler)
	}

	pub fn has_listeners(&self, event: &str) -> bool {
		self.events.has_listeners(&event.to_string())
	}

	/// Pumps the connection until `event` fires with a payload accepted by
	/// `predicate`, failing once `timeout` milliseconds pass.
	///
	/// `None` uses the default timeout; `Some(0.0)` waits forever.
	pub fn wait_for_event<F>(&self, event: &str, predicate: F, timeout: Option<f64>) -> Result<Value>
	where
		F: Fn(&Value) -> bool + Send + Sync + 'static,
	{
		let connection = self.base.connection()?;
		let waitable = WaitableRace::new(vec![
			Box::new(WaitableEvent::with_predicate(&self.events, event.to_string(), predicate)) as Box<dyn Waitable<Value>>,
			self.timeout_settings.create_waitable(timeout),
		]);
		run_until(connection.as_ref(), || Ok(()), &waitable)
	}

	/// Intercepts requests whose URL matches `matcher`, newest route first.
	///
	/// `times` limits how many requests the route handles before it removes
	/// itself.
	#[track_caller]
	pub fn route<F>(&self, matcher: UrlMatcher, handler: F, times: Option<u32>) -> Result<HandlerId>
	where
		F: Fn(&Route) + Send + Sync + 'static,
	{
		self.base.with_logging(&self.api_name("route"), || {
			let id = self.routes.add(matcher, handler, times);
			self.update_interception_patterns()?;
			Ok(id)
		})
	}

	/// Removes routes registered with an equal matcher, or only `handler` when given.
	#[track_caller]
	pub fn unroute(&self, matcher: &UrlMatcher, handler: Option<HandlerId>) -> Result<()> {
		self.base.with_logging(&self.api_name("unroute"), || {
			self.routes.remove(matcher, handler);
			self.update_interception_patterns()
		})
	}

	#[track_caller]
	pub fn unroute_all(&self) -> Result<()> {
		self.base.with_logging(&self.api_name("unrouteAll"), || {
			self.routes.remove_all();
			self.update_interception_patterns()
		})
	}

	/// Intercepts websockets whose URL matches `matcher`.
	#[track_caller]
	pub fn route_web_socket<F>(&self, matcher: UrlMatcher, handler: F) -> Result<HandlerId>
	where
		F: Fn(&WebSocketRoute) + Send + Sync + 'static,
	{
		self.base.with_logging(&self.api_name("routeWebSocket"), || {
			let id = self.web_socket_routes.add(matcher, handler);
			self.channel().send_no_result(
				"setWebSocketInterceptionPatterns",
				self.web_socket_routes.interception_patterns(),
			)?;
			Ok(id)
		})
	}

	fn update_interception_patterns(&self) -> Result<()> {
		self.channel()
			.send_no_result("setNetworkInterceptionPatterns", self.routes.interception_patterns())
	}

	fn api_name(&self, method: &str) -> String {
		format!("{}.{method}", self.base.type_name())
	}

	/// Offers `route` to this scope and then to each enclosing scope. A route
	/// nobody claims is resumed.
	fn on_route(&self, route: Route) {
		match self.routes.handle(&route) {
			HandleResult::Handled | HandleResult::PendingHandler => return,
			HandleResult::Fallback | HandleResult::NoMatchingHandler => {}
		}

		let mut scope = self.base.parent();
		while let Some(owner) = scope {
			scope = owner.parent();
			let Ok(object) = owner.downcast_arc::<RemoteObject>() else {
				continue;
			};
			match object.routes.handle(&route) {
				HandleResult::Handled | HandleResult::PendingHandler => return,
				HandleResult::Fallback | HandleResult::NoMatchingHandler => {}
			}
		}

		if let Err(e) = route.resume() {
			tracing::warn!(error = %e, url = %route.url(), "Failed to resume unrouted request");
		}
	}

	fn on_web_socket_route(&self, route: WebSocketRoute) {
		let mut handled = self.web_socket_routes.handle(&route);
		let mut scope = self.base.parent();
		while matches!(handled, Ok(false)) {
			let Some(owner) = scope else {
				break;
			};
			scope = owner.parent();
			if let Ok(object) = owner.downcast_arc::<RemoteObject>() {
				handled = object.web_socket_routes.handle(&route);
			}
		}

		match handled {
			Ok(true) => {}
			Ok(false) => {
				if let Err(e) = route.connect_to_server() {
					tracing::warn!(error = %e, url = %route.url(), "Failed to connect unrouted websocket");
				}
			}
			Err(e) => tracing::warn!(error = %e, url = %route.url(), "WebSocket route handler failed"),
		}
	}

	fn resolve_reference(&self, params: &Value, key: &str) -> Option<Arc<dyn ChannelOwner>> {
		let guid = params.get(key)?.get("guid")?.as_str()?;
		match self.base.connection().and_then(|connection| connection.get_object(guid)) {
			Ok(object) => Some(object),
			Err(e) => {
				tracing::warn!(error = %e, guid, key, "Event references an unknown object");
				None
			}
		}
	}
}

impl private::Sealed for RemoteObject {}

impl ChannelOwner for RemoteObject {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}

	fn on_event(&self, method: &str, params: Value) {
		match method {
			"route" => {
				if let Some(route) = self.resolve_reference(&params, "route").and_then(Route::from_object) {
					self.on_route(route);
				}
			}
			"webSocketRoute" => {
				if let Some(route) = self
					.resolve_reference(&params, "webSocketRoute")
					.and_then(WebSocketRoute::from_object)
				{
					self.on_web_socket_route(route);
				}
			}
			_ => self.events.notify(&method.to_string(), &params),
		}
	}
}

impl std::fmt::Debug for RemoteObject {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RemoteObject")
			.field("guid", &self.base.guid())
			.field("type_name", &self.base.type_name())
			.field("routes", &self.routes.len())
			.finish()
	}
}

