//! [`WebSocketRoute`]: a websocket whose traffic passes through client code.
//!
//! The page side and the server side each get a message and a close
//! callback. A side without a callback forwards to the other side, so an
//! unhandled route behaves like a plain proxy once connected.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use pw_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, private};
use pw_runtime::{Error, ObjectInit, Result, WebSocketInterceptable};
use serde_json::{Value, json};

type MessageHandler = Arc<dyn Fn(&WebSocketFrame) + Send + Sync>;
type CloseHandler = Arc<dyn Fn(Option<u16>, Option<&str>) + Send + Sync>;

/// One websocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebSocketFrame {
	Text(String),
	Binary(Vec<u8>),
}

impl WebSocketFrame {
	fn from_wire(params: &Value) -> Result<Self> {
		let message = params["message"].as_str().unwrap_or_default();
		if params["isBase64"].as_bool().unwrap_or(false) {
			let bytes = STANDARD
				.decode(message)
				.map_err(|e| Error::ProtocolError(format!("Invalid base64 websocket frame: {e}")))?;
			return Ok(WebSocketFrame::Binary(bytes));
		}
		Ok(WebSocketFrame::Text(message.to_string()))
	}

	fn to_wire(&self) -> Value {
		match self {
			WebSocketFrame::Text(text) => json!({ "message": text, "isBase64": false }),
			WebSocketFrame::Binary(bytes) => json!({ "message": STANDARD.encode(bytes), "isBase64": true }),
		}
	}
}

impl From<&str> for WebSocketFrame {
	fn from(text: &str) -> Self {
		WebSocketFrame::Text(text.to_string())
	}
}

impl From<String> for WebSocketFrame {
	fn from(text: String) -> Self {
		WebSocketFrame::Text(text)
	}
}

impl From<Vec<u8>> for WebSocketFrame {
	fn from(bytes: Vec<u8>) -> Self {
		WebSocketFrame::Binary(bytes)
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
	Page,
	Server,
}

impl Side {
	fn other(self) -> Self {
		match self {
			Side::Page => Side::Server,
			Side::Server => Side::Page,
		}
	}

	fn send_method(self) -> &'static str {
		match self {
			Side::Page => "sendToPage",
			Side::Server => "sendToServer",
		}
	}

	fn close_method(self) -> &'static str {
		match self {
			Side::Page => "closePage",
			Side::Server => "closeServer",
		}
	}
}

#[derive(Default)]
struct SideHandlers {
	on_message: Option<MessageHandler>,
	on_close: Option<CloseHandler>,
}

/// Node backing a [`WebSocketRoute`].
pub(crate) struct WebSocketRouteObject {
	base: ChannelOwnerImpl,
	connected: AtomicBool,
	page: Mutex<SideHandlers>,
	server: Mutex<SideHandlers>,
}

pub(crate) fn construct(init: ObjectInit) -> Result<Arc<dyn ChannelOwner>> {
	let base = init.into_base();
	base.mark_as_internal_type();
	Ok(Arc::new(WebSocketRouteObject {
		base,
		connected: AtomicBool::new(false),
		page: Mutex::new(SideHandlers::default()),
		server: Mutex::new(SideHandlers::default()),
	}))
}

impl WebSocketRouteObject {
	fn handlers(&self, side: Side) -> &Mutex<SideHandlers> {
		match side {
			Side::Page => &self.page,
			Side::Server => &self.server,
		}
	}

	fn url(&self) -> &str {
		self.base.initializer()["url"].as_str().unwrap_or_default()
	}

	fn send_to(&self, side: Side, frame: &WebSocketFrame) -> Result<()> {
		self.base.channel().send_no_reply(side.send_method(), frame.to_wire())
	}

	fn close(&self, side: Side, code: Option<u16>, reason: Option<&str>) -> Result<()> {
		let mut params = json!({ "wasClean": true });
		if let Some(code) = code {
			params["code"] = json!(code);
		}
		if let Some(reason) = reason {
			params["reason"] = json!(reason);
		}
		self.base.channel().send_no_reply(side.close_method(), params)
	}

	/// Forwards driver traffic; failures have no caller to report to.
	fn forward(&self, method: &str, params: Value) {
		if let Err(e) = self.base.channel().send_no_reply(method, params) {
			tracing::warn!(error = %e, method, url = self.url(), "Failed to forward websocket traffic");
		}
	}

	/// A message arrived from `from`.
	fn on_message(&self, from: Side, params: Value) {
		let handler = self.handlers(from).lock().on_message.clone();
		if let Some(handler) = handler {
			match WebSocketFrame::from_wire(&params) {
				Ok(frame) => handler(&frame),
				Err(e) => tracing::warn!(error = %e, url = self.url(), "Dropping websocket frame"),
			}
			return;
		}
		if from == Side::Page && !self.connected.load(Ordering::SeqCst) {
			return;
		}
		let forwarded = json!({ "message": params["message"], "isBase64": params["isBase64"] });
		self.forward(from.other().send_method(), forwarded);
	}

	/// `from` closed its end.
	fn on_close(&self, from: Side, params: Value) {
		let code = params["code"].as_u64().and_then(|code| u16::try_from(code).ok());
		let reason = params["reason"].as_str();
		let handler = self.handlers(from).lock().on_close.clone();
		match handler {
			Some(handler) => handler(code, reason),
			None => {
				let forwarded = json!({ "code": params["code"], "reason": params["reason"], "wasClean": params["wasClean"] });
				self.forward(from.other().close_method(), forwarded);
			}
		}
	}
}

impl private::Sealed for WebSocketRouteObject {}

impl ChannelOwner for WebSocketRouteObject {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}

	fn on_event(&self, method: &str, params: Value) {
		match method {
			"messageFromPage" => self.on_message(Side::Page, params),
			"messageFromServer" => self.on_message(Side::Server, params),
			"closePage" => self.on_close(Side::Page, params),
			"closeServer" => self.on_close(Side::Server, params),
			_ => self.base.on_event(method, params),
		}
	}
}

/// Page side of an intercepted websocket.
///
/// See <https://playwright.dev/docs/api/class-websocketroute>
#[derive(Clone)]
pub struct WebSocketRoute {
	object: Arc<WebSocketRouteObject>,
}

impl WebSocketRoute {
	pub(crate) fn from_object(object: Arc<dyn ChannelOwner>) -> Option<Self> {
		match object.downcast_arc::<WebSocketRouteObject>() {
			Ok(object) => Some(Self { object }),
			Err(other) => {
				tracing::warn!(guid = other.guid(), type_name = other.type_name(), "Expected a WebSocketRoute object");
				None
			}
		}
	}

	pub fn url(&self) -> &str {
		self.object.url()
	}

	/// Sends a message to the page.
	pub fn send(&self, frame: impl Into<WebSocketFrame>) -> Result<()> {
		self.object.send_to(Side::Page, &frame.into())
	}

	/// Closes the page side.
	pub fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
		self.object.close(Side::Page, code, reason)
	}

	/// Handles messages from the page instead of forwarding them to the server.
	pub fn on_message<F>(&self, handler: F)
	where
		F: Fn(&WebSocketFrame) + Send + Sync + 'static,
	{
		self.object.page.lock().on_message = Some(Arc::new(handler));
	}

	/// Handles the page closing instead of closing the server side.
	pub fn on_close<F>(&self, handler: F)
	where
		F: Fn(Option<u16>, Option<&str>) + Send + Sync + 'static,
	{
		self.object.page.lock().on_close = Some(Arc::new(handler));
	}

	/// Opens the real server connection. Allowed once per route.
	pub fn connect_to_server(&self) -> Result<WebSocketServer> {
		if self.object.connected.swap(true, Ordering::SeqCst) {
			return Err(Error::InvalidState("Already connected to the server".to_string()));
		}
		self.object.base.channel().send_no_reply("connect", json!({}))?;
		Ok(WebSocketServer {
			object: Arc::clone(&self.object),
		})
	}

	pub fn is_connected(&self) -> bool {
		self.object.connected.load(Ordering::SeqCst)
	}
}

impl WebSocketInterceptable for WebSocketRoute {
	fn url(&self) -> String {
		self.object.url().to_string()
	}

	/// Without a server connection the driver still has to open the page
	/// side so the page can exchange messages with the handler.
	fn after_handle(&self) -> Result<()> {
		if self.is_connected() {
			return Ok(());
		}
		self.object.base.channel().send_no_reply("ensureOpened", json!({}))
	}
}

impl std::fmt::Debug for WebSocketRoute {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WebSocketRoute")
			.field("url", &self.url())
			.field("connected", &self.is_connected())
			.finish()
	}
}

/// Server side of an intercepted websocket, from
/// [`WebSocketRoute::connect_to_server`].
#[derive(Clone)]
pub struct WebSocketServer {
	object: Arc<WebSocketRouteObject>,
}

impl WebSocketServer {
	pub fn url(&self) -> &str {
		self.object.url()
	}

	/// Sends a message to the server.
	pub fn send(&self, frame: impl Into<WebSocketFrame>) -> Result<()> {
		self.object.send_to(Side::Server, &frame.into())
	}

	pub fn close(&self, code: Option<u16>, reason: Option<&str>) -> Result<()> {
		self.object.close(Side::Server, code, reason)
	}

	/// Handles messages from the server instead of forwarding them to the page.
	pub fn on_message<F>(&self, handler: F)
	where
		F: Fn(&WebSocketFrame) + Send + Sync + 'static,
	{
		self.object.server.lock().on_message = Some(Arc::new(handler));
	}

	pub fn on_close<F>(&self, handler: F)
	where
		F: Fn(Option<u16>, Option<&str>) + Send + Sync + 'static,
	{
		self.object.server.lock().on_close = Some(Arc::new(handler));
	}
}
