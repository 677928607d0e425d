//! Error types for the Playwright runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the Playwright runtime.
///
/// Peer-reported failures ([`Timeout`](Self::Timeout),
/// [`TargetClosed`](Self::TargetClosed), [`Remote`](Self::Remote)) are
/// recoverable at the caller's discretion. [`ProtocolError`](Self::ProtocolError)
/// means the local object graph can no longer be trusted and is fatal to the
/// connection.
#[derive(Debug, Error)]
pub enum Error {
	/// A bounded wait elapsed, or the driver reported a `TimeoutError`.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The driver reported that the target object or session closed mid-call.
	#[error("Target closed: {0}")]
	TargetClosed(String),

	/// Remote Playwright server error with full context.
	#[error("{name}: {message}{call_log}")]
	Remote {
		/// Error type name (e.g., "Error")
		name: String,
		/// Human-readable error message
		message: String,
		/// JavaScript stack trace from the server (if available)
		stack: Option<String>,
		/// Formatted call log attached by the server (may be empty).
		call_log: String,
	},

	/// Locally detected protocol inconsistency.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// Unknown protocol object type.
	#[error("Unknown protocol object type: {0}")]
	UnknownObjectType(String),

	/// Object not found in the connection registry.
	#[error("Object not found: {guid}")]
	ObjectNotFound { guid: String },

	/// Call attempted on an object the driver already disposed.
	#[error("{}", disposed_message(guid, *collected))]
	ObjectDisposed { guid: String, collected: bool },

	/// The connection was torn down; no further calls are possible.
	#[error("Connection closed: {0}")]
	ConnectionClosed(String),

	/// Channel closed unexpectedly.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// Transport-level error (framing, stdio or websocket).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Invalid argument provided to method.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// Operation not valid in the object's current state.
	#[error("Invalid state: {0}")]
	InvalidState(String),

	/// I/O error.
	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

fn disposed_message(guid: &str, collected: bool) -> String {
	if collected {
		format!("The object has been collected to prevent unbounded heap growth: {guid}")
	} else {
		format!("Object has been disposed: {guid}")
	}
}

impl Error {
	/// Returns the error name if this is a Remote error.
	pub fn error_name(&self) -> Option<&str> {
		match self {
			Error::Remote { name, .. } => Some(name),
			Error::Timeout(_) => Some("TimeoutError"),
			Error::TargetClosed(_) => Some("TargetClosedError"),
			_ => None,
		}
	}

	/// Returns the stack trace if this is a Remote error with a stack.
	pub fn stack_trace(&self) -> Option<&str> {
		match self {
			Error::Remote { stack, .. } => stack.as_deref(),
			_ => None,
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if this is a target closed error.
	pub fn is_target_closed(&self) -> bool {
		matches!(self, Error::TargetClosed(_))
	}

	/// Returns true if the error signals a corrupted object graph.
	pub fn is_protocol_violation(&self) -> bool {
		matches!(
			self,
			Error::ProtocolError(_) | Error::UnknownObjectType(_) | Error::ObjectNotFound { .. }
		)
	}

	/// Returns true if the call targeted an already disposed object.
	pub fn is_disposed(&self) -> bool {
		matches!(self, Error::ObjectDisposed { .. })
	}
}
