//! Constructor table for every type tag the driver may create.

use pw_runtime::ObjectFactory;
use pw_runtime::connection::LOCAL_UTILS_TYPE;

use crate::local_utils::LocalUtils;
use crate::playwright::Playwright;
use crate::remote_object::RemoteObject;
use crate::tracing_session::Tracing;
use crate::{route, websocket_route};

/// Types represented by a plain [`RemoteObject`].
pub const GENERIC_TYPES: &[&str] = &[
	"APIRequestContext",
	"Artifact",
	"BindingCall",
	"Browser",
	"BrowserContext",
	"BrowserType",
	"CDPSession",
	"Dialog",
	"ElementHandle",
	"Frame",
	"JSHandle",
	"JsonPipe",
	"Page",
	"Request",
	"Response",
	"Selectors",
	"Stream",
	"WebSocket",
	"Worker",
	"WritableStream",
];

/// Types the driver may create that this binding does not support.
pub const UNSUPPORTED_TYPES: &[&str] = &["Android", "AndroidSocket", "AndroidDevice", "Electron", "SocksSupport"];

/// Builds the constructor table used by [`Session`](crate::Session).
///
/// Pass it to [`Connection::with_options`](pw_runtime::Connection::with_options)
/// directly to drive a connection without a session.
pub fn default_factory() -> ObjectFactory {
	UNSUPPORTED_TYPES.iter().fold(
		ObjectFactory::new()
			.register_all(GENERIC_TYPES, RemoteObject::construct)
			.register("Playwright", Playwright::construct)
			.register(LOCAL_UTILS_TYPE, LocalUtils::construct)
			.register("Tracing", Tracing::construct)
			.register("Route", route::construct)
			.register("WebSocketRoute", websocket_route::construct),
		|factory, type_name| factory.ignore(*type_name),
	)
}
