//! Debug flags and API-call logging.
//!
//! The `DEBUG` environment variable is read once per process. `pw:channel`
//! turns on wire logging (see [`LoggingTransport`](crate::transport::LoggingTransport)),
//! `pw:api` turns on `=> started` / `<= succeeded` records around every
//! logical API call.

use std::sync::OnceLock;

/// Log target for wire-level records.
pub const CHANNEL_TARGET: &str = "pw:channel";
/// Log target for API-call records.
pub const API_TARGET: &str = "pw:api";

/// Debug switches parsed from the `DEBUG` environment variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugFlags {
	pub channel: bool,
	pub api: bool,
}

impl DebugFlags {
	/// Returns the process-wide flags, reading `DEBUG` on first use.
	pub fn from_env() -> Self {
		static FLAGS: OnceLock<DebugFlags> = OnceLock::new();
		*FLAGS.get_or_init(|| Self::parse(std::env::var("DEBUG").ok().as_deref()))
	}

	/// Parses a `DEBUG` value such as `"pw:api,pw:channel"`.
	pub fn parse(debug: Option<&str>) -> Self {
		let debug = debug.unwrap_or_default();
		Self {
			channel: debug.contains(CHANNEL_TARGET),
			api: debug.contains(API_TARGET),
		}
	}
}

/// Emits one API-call log record.
pub(crate) fn log_api(message: &str) {
	tracing::info!(target: "pw:api", "{message}");
}
