//! Connection - dispatcher between protocol objects and the driver.
//!
//! The connection assigns request ids, stamps outgoing calls with metadata,
//! and demultiplexes inbound messages into call results, lifecycle control
//! (`__create__`, `__adopt__`, `__dispose__`) and domain events.
//!
//! There is no background reader. Blocking calls pump the transport one
//! message at a time through [`Connection::process_one_message`] until their
//! own result arrives, so events that precede a result are fully dispatched
//! first and handlers may themselves issue blocking calls.

mod factory;
mod object_store;
mod root;

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pw_protocol::{
	ADOPT, AdoptParams, CREATE, CreateParams, DISPOSE, DisposeParams, ErrorWrapper, Event, Location, Message,
	Metadata, Request, Response, StackFrame,
};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub use factory::{Constructor, ObjectFactory, ObjectInit};
pub use object_store::ObjectStore;

use crate::channel_owner::{ChannelOwner, DisposeReason};
use crate::config::ConnectionOptions;
use crate::error::{Error, Result};
use crate::transport::{LoggingTransport, Transport};
use crate::waitable::{WaitableResult, run_until};

/// Type tag whose first instance receives tracing stack bookkeeping.
pub const LOCAL_UTILS_TYPE: &str = "LocalUtils";

/// Interface that protocol objects use to reach their connection.
pub trait ConnectionLike: Send + Sync {
	/// Sends a call and pumps until its result arrives.
	fn send_message(&self, guid: &str, method: &str, params: Value) -> Result<Value>;

	/// Sends a call and returns the cell its result will land in.
	fn send_message_async(&self, guid: &str, method: &str, params: Value) -> Result<WaitableResult<Value>>;

	/// Reads and dispatches at most one inbound message.
	fn process_one_message(&self) -> Result<()>;

	/// Looks up a live object by GUID.
	fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>>;

	/// Drops `guid` from the lookup table.
	fn unregister_object(&self, guid: &str);

	/// Starts a logical API call. Returns `false` if one is already running.
	fn enter_api_zone(&self, zone: ApiZone) -> bool;

	/// Ends the logical API call started by [`enter_api_zone`](Self::enter_api_zone).
	fn exit_api_zone(&self);

	/// Whether `pw:api` logging is on for this connection.
	fn logs_api(&self) -> bool;

	/// Increments (`true`) or decrements (`false`) the tracing count.
	fn set_is_tracing(&self, tracing: bool);

	/// The first `LocalUtils` object the driver created, if it is still live.
	fn local_utils(&self) -> Option<Arc<dyn ChannelOwner>>;
}

/// State of the logical API call in progress.
///
/// `api_name` is consumed by the first message sent; the frames stay for the
/// rest of the call.
#[derive(Debug, Clone, Default)]
pub struct ApiZone {
	pub api_name: Option<String>,
	pub frames: Vec<StackFrame>,
}

/// Leaves the API zone on drop.
pub(crate) struct ApiZoneGuard<'a> {
	connection: &'a dyn ConnectionLike,
}

impl<'a> ApiZoneGuard<'a> {
	pub(crate) fn enter(connection: &'a dyn ConnectionLike, zone: ApiZone) -> Option<Self> {
		connection.enter_api_zone(zone).then_some(Self { connection })
	}
}

impl Drop for ApiZoneGuard<'_> {
	fn drop(&mut self) {
		self.connection.exit_api_zone();
	}
}

/// Dispatcher owning the transport, the object tree root and the GUID index.
pub struct Connection {
	transport: Mutex<Box<dyn Transport>>,
	options: ConnectionOptions,
	last_id: AtomicU32,
	callbacks: Mutex<HashMap<u32, WaitableResult<Value>>>,
	objects: ObjectStore,
	root: Arc<dyn ChannelOwner>,
	factory: ObjectFactory,
	api_zone: Mutex<Option<ApiZone>>,
	tracing_count: AtomicI32,
	local_utils: Mutex<Option<Arc<str>>>,
	closed: Mutex<Option<String>>,
}

impl Connection {
	/// Creates a connection with options taken from the environment.
	pub fn new<T: Transport + 'static>(transport: T, factory: ObjectFactory) -> Arc<Self> {
		Self::with_options(transport, factory, ConnectionOptions::from_env())
	}

	pub fn with_options<T: Transport + 'static>(
		transport: T,
		factory: ObjectFactory,
		options: ConnectionOptions,
	) -> Arc<Self> {
		let transport: Box<dyn Transport> = if options.log_channel {
			Box::new(LoggingTransport::new(transport))
		} else {
			Box::new(transport)
		};

		Arc::new_cyclic(|weak: &Weak<Connection>| {
			let weak: Weak<dyn ConnectionLike> = weak.clone();
			let root: Arc<dyn ChannelOwner> = Arc::new(root::Root::new(weak));
			let objects = ObjectStore::new();
			objects.insert(Arc::from(root.guid()), &root);

			Self {
				transport: Mutex::new(transport),
				options,
				last_id: AtomicU32::new(0),
				callbacks: Mutex::new(HashMap::new()),
				objects,
				root,
				factory,
				api_zone: Mutex::new(None),
				tracing_count: AtomicI32::new(0),
				local_utils: Mutex::new(None),
				closed: Mutex::new(None),
			}
		})
	}

	/// Sends `initialize` and returns the `Playwright` object the driver reports.
	pub fn initialize(&self) -> Result<Arc<dyn ChannelOwner>> {
		let result = self
			.root
			.channel()
			.send_value("initialize", json!({ "sdkLanguage": self.options.sdk_language }))?;
		let guid = result
			.get("playwright")
			.and_then(|p| p.get("guid"))
			.and_then(Value::as_str)
			.ok_or_else(|| Error::ProtocolError("initialize result has no playwright guid".to_string()))?;
		self.get_object(guid)
	}

	/// Reads at most one message from the transport and dispatches it.
	///
	/// Returns immediately when nothing arrives within the poll interval.
	/// Protocol violations and transport failures tear the connection down.
	pub fn process_one_message(&self) -> Result<()> {
		self.ensure_open()?;

		let polled = self.transport.lock().poll(self.options.poll_interval);
		let value = match polled {
			Ok(Some(value)) => value,
			Ok(None) => return Ok(()),
			Err(Error::ChannelClosed) => return Err(self.terminate("Driver closed the connection")),
			Err(e) => {
				self.terminate(&e.to_string());
				return Err(e);
			}
		};

		let outcome = Message::from_value(value)
			.map_err(|e| Error::ProtocolError(format!("Malformed message: {e}")))
			.and_then(|message| self.dispatch(message));
		if let Err(e) = &outcome {
			if e.is_protocol_violation() {
				tracing::error!(error = %e, "Protocol violation, closing connection");
				self.terminate(&e.to_string());
			}
		}
		outcome
	}

	/// Closes the transport and fails every pending call. Idempotent.
	pub fn close(&self) {
		self.terminate("Connection closed by client");
	}

	pub fn is_closed(&self) -> bool {
		self.closed.lock().is_some()
	}

	/// Root of the ownership tree.
	pub fn root(&self) -> &Arc<dyn ChannelOwner> {
		&self.root
	}

	pub fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.objects.get(guid)
	}

	/// Number of registered objects, the root included.
	pub fn object_count(&self) -> usize {
		self.objects.len()
	}

	/// Number of calls still waiting for their result.
	pub fn pending_calls(&self) -> usize {
		self.callbacks.lock().len()
	}

	pub fn is_tracing(&self) -> bool {
		self.tracing_count.load(Ordering::SeqCst) > 0
	}

	pub fn local_utils_guid(&self) -> Option<Arc<str>> {
		self.local_utils.lock().clone()
	}

	pub fn options(&self) -> &ConnectionOptions {
		&self.options
	}

	fn ensure_open(&self) -> Result<()> {
		match self.closed.lock().as_ref() {
			Some(reason) => Err(Error::ConnectionClosed(reason.clone())),
			None => Ok(()),
		}
	}

	/// Marks the connection closed, completes every pending call with
	/// [`Error::ConnectionClosed`] and closes the transport.
	fn terminate(&self, reason: &str) -> Error {
		{
			let mut closed = self.closed.lock();
			if let Some(previous) = closed.as_ref() {
				return Error::ConnectionClosed(previous.clone());
			}
			*closed = Some(reason.to_string());
		}

		let pending: Vec<_> = self.callbacks.lock().drain().collect();
		for (_, result) in pending {
			result.complete_with_error(Error::ConnectionClosed(reason.to_string()));
		}
		if let Err(e) = self.transport.lock().close() {
			tracing::debug!(error = %e, "Transport close failed");
		}
		tracing::debug!(reason, "Connection terminated");
		Error::ConnectionClosed(reason.to_string())
	}

	fn next_id(&self) -> u32 {
		self.last_id.fetch_add(1, Ordering::SeqCst) + 1
	}

	fn take_api_name(&self) -> (Option<String>, Vec<StackFrame>) {
		let mut zone = self.api_zone.lock();
		match zone.as_mut() {
			Some(zone) => (zone.api_name.take(), zone.frames.clone()),
			None => (None, Vec::new()),
		}
	}

	fn send_request(&self, request: Request) -> Result<WaitableResult<Value>> {
		let id = request.id;
		let message = serde_json::to_value(&request)?;
		let result = WaitableResult::new();
		self.callbacks.lock().insert(id, result.clone());

		let sent = self.transport.lock().send(message);
		if let Err(e) = sent {
			self.callbacks.lock().remove(&id);
			return Err(match e {
				Error::ChannelClosed => self.terminate("Driver closed the connection"),
				e => e,
			});
		}
		Ok(result)
	}

	fn send_stack_to_tracing(&self, local_utils: &Arc<str>, id: u32, frames: &[StackFrame]) {
		let request = Request {
			id: self.next_id(),
			guid: Arc::clone(local_utils),
			method: "addStackToTracingNoReply".to_string(),
			params: json!({ "callData": { "id": id, "stack": frames } }),
			metadata: Metadata {
				internal: Some(true),
				..Metadata::now()
			},
		};
		if let Err(e) = self.send_request(request) {
			tracing::debug!(error = %e, "Failed to send stack to tracing");
		}
	}

	fn dispatch(&self, message: Message) -> Result<()> {
		match message {
			Message::Response(response) => self.handle_response(response),
			Message::Event(event) => match event.method.as_str() {
				CREATE => self.handle_create(event),
				ADOPT => self.handle_adopt(event),
				DISPOSE => self.handle_dispose(event),
				_ => self.handle_event(event),
			},
			Message::Unknown(value) => {
				tracing::debug!(%value, "Ignoring message without id or method");
				Ok(())
			}
		}
	}

	fn handle_response(&self, response: Response) -> Result<()> {
		let callback = self.callbacks.lock().remove(&response.id);
		let Some(callback) = callback else {
			return Err(Error::ProtocolError(format!("Cannot find command to respond: {}", response.id)));
		};

		match response.error {
			Some(error) => callback.complete_with_error(parse_protocol_error(error, response.log.as_deref())),
			None => callback.complete(response.result.unwrap_or(Value::Null)),
		};
		Ok(())
	}

	fn handle_create(&self, event: Event) -> Result<()> {
		let params: CreateParams = decode_params(CREATE, event.params)?;
		let parent = self.objects.try_get(&event.guid).ok_or_else(|| {
			Error::ProtocolError(format!("Cannot find parent object {} to create {}", event.guid, params.guid))
		})?;
		let guid: Arc<str> = Arc::from(params.guid);
		if self.objects.contains(&guid) {
			return Err(Error::ProtocolError(format!("Object with guid {guid} already exists")));
		}

		let is_local_utils = params.type_name == LOCAL_UTILS_TYPE;
		let init = ObjectInit {
			parent: Arc::clone(&parent),
			type_name: params.type_name,
			guid: Arc::clone(&guid),
			initializer: params.initializer,
		};
		let Some(object) = self.factory.create(init)? else {
			return Ok(());
		};

		self.objects.try_insert(Arc::clone(&guid), &object)?;
		parent.base().add_child(Arc::clone(&object));
		if is_local_utils {
			self.local_utils.lock().get_or_insert(guid);
		}
		tracing::debug!(guid = object.guid(), type_name = object.type_name(), parent = parent.guid(), "Created object");
		Ok(())
	}

	fn handle_adopt(&self, event: Event) -> Result<()> {
		let params: AdoptParams = decode_params(ADOPT, event.params)?;
		let parent = self
			.objects
			.try_get(&event.guid)
			.ok_or_else(|| Error::ProtocolError(format!("Cannot find parent object {}", event.guid)))?;
		let child = self
			.objects
			.try_get(&params.guid)
			.ok_or_else(|| Error::ProtocolError(format!("Cannot find object to adopt: {}", params.guid)))?;

		parent.adopt(child);
		Ok(())
	}

	fn handle_dispose(&self, event: Event) -> Result<()> {
		let params: DisposeParams = decode_params(DISPOSE, event.params)?;
		let object = self
			.objects
			.try_get(&event.guid)
			.ok_or_else(|| Error::ProtocolError(format!("Cannot find object to dispose: {}", event.guid)))?;

		object.dispose(DisposeReason::from_wire(params.reason.as_deref()));
		Ok(())
	}

	fn handle_event(&self, event: Event) -> Result<()> {
		let object = self.objects.try_get(&event.guid).ok_or_else(|| {
			Error::ProtocolError(format!("Cannot find object to emit \"{}\": {}", event.method, event.guid))
		})?;

		// Handlers start their own logical calls.
		let outer_zone = self.api_zone.lock().take();
		object.on_event(&event.method, event.params);
		*self.api_zone.lock() = outer_zone;
		Ok(())
	}
}

impl ConnectionLike for Connection {
	fn send_message(&self, guid: &str, method: &str, params: Value) -> Result<Value> {
		let result = self.send_message_async(guid, method, params)?;
		run_until(self, || Ok(()), &result)
	}

	fn send_message_async(&self, guid: &str, method: &str, params: Value) -> Result<WaitableResult<Value>> {
		self.ensure_open()?;

		let id = self.next_id();
		let (api_name, frames) = self.take_api_name();
		let labelled = api_name.is_some();
		let mut metadata = Metadata::now();
		match api_name {
			Some(api_name) => {
				metadata.api_name = Some(api_name);
				metadata.location = frames.first().map(Location::from);
			}
			None => metadata.internal = Some(true),
		}

		let params = if params.is_null() { json!({}) } else { params };
		let result = self.send_request(Request {
			id,
			guid: Arc::from(guid),
			method: method.to_string(),
			params,
			metadata,
		})?;

		// Only the labelled message of a logical call carries its stack.
		if labelled && self.is_tracing() && !frames.is_empty() {
			if let Some(local_utils) = self.local_utils_guid().filter(|lu| lu.as_ref() != guid) {
				self.send_stack_to_tracing(&local_utils, id, &frames);
			}
		}
		Ok(result)
	}

	fn process_one_message(&self) -> Result<()> {
		Connection::process_one_message(self)
	}

	fn get_object(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.objects.get(guid)
	}

	fn unregister_object(&self, guid: &str) {
		self.objects.remove(guid);
	}

	fn enter_api_zone(&self, zone: ApiZone) -> bool {
		let mut current = self.api_zone.lock();
		if current.is_some() {
			return false;
		}
		*current = Some(zone);
		true
	}

	fn exit_api_zone(&self) {
		*self.api_zone.lock() = None;
	}

	fn logs_api(&self) -> bool {
		self.options.log_api
	}

	fn set_is_tracing(&self, tracing: bool) {
		if tracing {
			self.tracing_count.fetch_add(1, Ordering::SeqCst);
		} else {
			let _ = self
				.tracing_count
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| (count > 0).then(|| count - 1));
		}
	}

	fn local_utils(&self) -> Option<Arc<dyn ChannelOwner>> {
		let guid = self.local_utils_guid()?;
		self.objects.try_get(&guid)
	}
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("objects", &self.objects.len())
			.field("pending_calls", &self.callbacks.lock().len())
			.field("closed", &self.closed.lock().is_some())
			.finish()
	}
}

fn decode_params<T: DeserializeOwned>(method: &str, params: Value) -> Result<T> {
	let params = if params.is_null() { json!({}) } else { params };
	serde_json::from_value(params).map_err(|e| Error::ProtocolError(format!("Invalid {method} params: {e}")))
}

/// Renders the driver's call log; an all-empty log renders as nothing.
fn format_call_log(log: Option<&[String]>) -> String {
	let Some(lines) = log else {
		return String::new();
	};
	if lines.iter().all(|line| line.is_empty()) {
		return String::new();
	}
	format!("\nCall log:\n- {}\n", lines.join("\n- "))
}

/// Classifies a driver-reported error by its `name`.
fn parse_protocol_error(error: ErrorWrapper, log: Option<&[String]>) -> Error {
	let call_log = format_call_log(log);
	let Some(payload) = error.error else {
		let message = error
			.value
			.map(|value| value.to_string())
			.unwrap_or_else(|| "Unknown error".to_string());
		return Error::Remote {
			name: "Error".to_string(),
			message,
			stack: None,
			call_log,
		};
	};

	match payload.name.as_deref() {
		Some("TimeoutError") => Error::Timeout(format!("{}{call_log}", payload.message)),
		Some("TargetClosedError") => Error::TargetClosed(format!("{}{call_log}", payload.message)),
		name => Error::Remote {
			name: name.unwrap_or("Error").to_string(),
			message: payload.message,
			stack: payload.stack,
			call_log,
		},
	}
}
