//! Channel RPC core for the Playwright driver protocol.
//!
//! This crate keeps a local tree of proxies for the objects living in the
//! driver process and gives them synchronous call semantics over the
//! multiplexed JSON channel.
//!
//! # Architecture
//!
//! - [`Transport`]: blocking `send`/`poll`/`close` over pipes, websockets or memory
//! - [`Connection`]: request ids, metadata, dispatch, the cooperative pump loop
//! - [`ChannelOwner`] / [`ChannelOwnerImpl`]: proxy nodes and their ownership tree
//! - [`ObjectFactory`]: constructor table for `__create__` type tags
//! - [`Waitable`]: completion cells resolved while the pump runs
//! - [`ListenerCollection`]: event handlers with peer subscription toggling
//! - [`Router`] / [`WebSocketRouter`]: newest-first interception chains
//!
//! Everything runs on the caller's thread. A blocking call dispatches every
//! message that arrives before its result, including events whose handlers
//! issue further blocking calls.

pub mod channel;
pub mod channel_owner;
pub mod config;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod listeners;
pub mod logging;
pub mod router;
pub mod timeout_settings;
pub mod transport;
pub mod url_matcher;
pub mod waitable;

pub use channel::Channel;
pub use channel_owner::{ChannelOwner, ChannelOwnerImpl, DisposeReason, ParentOrConnection};
pub use config::ConnectionOptions;
pub use connection::{ApiZone, Connection, ConnectionLike, ObjectFactory, ObjectInit, ObjectStore};
pub use error::{Error, Result};
pub use handlers::{Handler, HandlerId, Subscription, next_handler_id};
pub use listeners::ListenerCollection;
pub use logging::DebugFlags;
pub use router::{HandleResult, Interceptable, InterceptionState, Router, WebSocketInterceptable, WebSocketRouter};
pub use timeout_settings::TimeoutSettings;
pub use transport::{LoggingTransport, MemoryPeer, MemoryTransport, PipeTransport, Transport, WebSocketTransport};
pub use url_matcher::UrlMatcher;
pub use waitable::{
	Waitable, WaitableEvent, WaitableNever, WaitableRace, WaitableResult, WaitableTimeout, run_until,
};
