//! Bootstrap: the root `Playwright` object and the session owning the connection.

use std::process::Child;
use std::sync::Arc;

use pw_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, private};
use pw_runtime::{
	Connection, ConnectionOptions, Error, ObjectInit, PipeTransport, Result, Transport, WebSocketTransport,
};

use crate::local_utils::LocalUtils;
use crate::object_factory::default_factory;
use crate::remote_object::RemoteObject;

/// Entry object the driver reports from `initialize`.
///
/// Its initializer references the browser types and the connection's
/// [`LocalUtils`].
///
/// See <https://playwright.dev/docs/api/class-playwright>
pub struct Playwright {
	base: ChannelOwnerImpl,
}

impl Playwright {
	pub(crate) fn construct(init: ObjectInit) -> Result<Arc<dyn ChannelOwner>> {
		Ok(Arc::new(Self { base: init.into_base() }))
	}

	pub fn chromium(&self) -> Result<Arc<RemoteObject>> {
		self.referenced("chromium")
	}

	pub fn firefox(&self) -> Result<Arc<RemoteObject>> {
		self.referenced("firefox")
	}

	pub fn webkit(&self) -> Result<Arc<RemoteObject>> {
		self.referenced("webkit")
	}

	pub fn selectors(&self) -> Result<Arc<RemoteObject>> {
		self.referenced("selectors")
	}

	pub fn local_utils(&self) -> Result<Arc<LocalUtils>> {
		self.referenced("utils")
	}

	/// Resolves the object the initializer names under `key`.
	fn referenced<T: ChannelOwner>(&self, key: &str) -> Result<Arc<T>> {
		let guid = self.base.initializer()[key]["guid"]
			.as_str()
			.ok_or_else(|| Error::ProtocolError(format!("Playwright initializer missing '{key}.guid' field")))?;
		self.base
			.connection()?
			.get_object(guid)?
			.downcast_arc::<T>()
			.map_err(|object| {
				Error::ProtocolError(format!("Playwright '{key}' has unexpected type {}", object.type_name()))
			})
	}
}

impl private::Sealed for Playwright {}

impl ChannelOwner for Playwright {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

impl std::fmt::Debug for Playwright {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Playwright").field("guid", &self.base.guid()).finish()
	}
}

/// An initialized connection to a driver.
///
/// Owns the [`Connection`] and therefore the whole object tree; dropping the
/// session closes the connection.
///
/// # Example
///
/// ```ignore
/// let mut driver = std::process::Command::new("node")
///     .args(["cli.js", "run-driver"])
///     .stdin(Stdio::piped())
///     .stdout(Stdio::piped())
///     .spawn()?;
/// let session = Session::from_child(&mut driver)?;
/// let chromium = session.playwright().chromium()?;
/// ```
pub struct Session {
	connection: Arc<Connection>,
	playwright: Arc<Playwright>,
}

impl Session {
	/// Initializes a connection over `transport`, with log switches from `DEBUG`.
	pub fn connect<T: Transport + 'static>(transport: T) -> Result<Self> {
		Self::connect_with_options(transport, ConnectionOptions::from_env())
	}

	pub fn connect_with_options<T: Transport + 'static>(transport: T, options: ConnectionOptions) -> Result<Self> {
		let connection = Connection::with_options(transport, default_factory(), options);
		let playwright = connection
			.initialize()?
			.downcast_arc::<Playwright>()
			.map_err(|object| {
				Error::ProtocolError(format!("initialize returned {} instead of Playwright", object.type_name()))
			})?;
		tracing::debug!(guid = playwright.guid(), "Playwright session initialized");
		Ok(Self { connection, playwright })
	}

	/// Talks to a driver child process over its piped stdio.
	pub fn from_child(child: &mut Child) -> Result<Self> {
		let stdin = child
			.stdin
			.take()
			.ok_or_else(|| Error::InvalidArgument("driver stdin is not piped".to_string()))?;
		let stdout = child
			.stdout
			.take()
			.ok_or_else(|| Error::InvalidArgument("driver stdout is not piped".to_string()))?;
		Self::connect(PipeTransport::from_child(stdin, stdout)?)
	}

	/// Talks to a driver listening on a websocket endpoint.
	pub fn connect_over_websocket(ws_endpoint: &str) -> Result<Self> {
		Self::connect(WebSocketTransport::connect(ws_endpoint)?)
	}

	pub fn playwright(&self) -> &Arc<Playwright> {
		&self.playwright
	}

	pub fn connection(&self) -> &Arc<Connection> {
		&self.connection
	}

	pub fn close(&self) {
		self.connection.close();
	}
}

impl Drop for Session {
	fn drop(&mut self) {
		self.connection.close();
	}
}
