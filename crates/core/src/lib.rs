//! pw: domain objects on top of the Playwright channel core.
//!
//! [`pw_runtime`] keeps the object tree and the dispatcher; this crate
//! registers the constructors the driver's type tags map to and gives the
//! objects that need behaviour of their own a typed API.
//!
//! # Example
//!
//! ```ignore
//! use pw::{Session, UrlMatcher};
//!
//! let session = Session::connect_over_websocket("ws://127.0.0.1:3000/")?;
//! let page = page_from_somewhere(&session);
//!
//! page.route(UrlMatcher::glob(None, "**/*.png")?, |route| {
//!     if let Err(e) = route.abort(None) {
//!         tracing::warn!(error = %e, "abort failed");
//!     }
//! }, None)?;
//!
//! let console = page.wait_for_event("console", |_| true, None)?;
//! ```
//!
//! Everything runs on the calling thread: handlers fire while a blocking call
//! or [`RemoteObject::wait_for_event`] pumps the connection.

pub mod local_utils;
pub mod object_factory;
pub mod playwright;
pub mod remote_object;
pub mod route;
pub mod tracing_session;
pub mod websocket_route;

pub use local_utils::{LocalUtils, ZipMode, ZipOptions};
pub use object_factory::default_factory;
pub use playwright::{Playwright, Session};
pub use pw_runtime::{Error, HandlerId, Result, Subscription, UrlMatcher};
pub use remote_object::RemoteObject;
pub use route::{Body, ContinueOptions, FulfillOptions, Route};
pub use tracing_session::{Tracing, TracingStartOptions};
pub use websocket_route::{WebSocketFrame, WebSocketRoute, WebSocketServer};
