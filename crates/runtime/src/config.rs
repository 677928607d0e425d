//! Connection configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::logging::DebugFlags;

/// Options controlling a [`Connection`](crate::Connection).
///
/// # Example
///
/// ```ignore
/// let options = ConnectionOptions::from_env()
///     .poll_interval(Duration::from_millis(5))
///     .sdk_language("rust");
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectionOptions {
	/// Upper bound a single pump iteration waits for the next message.
	#[serde(with = "millis")]
	pub poll_interval: Duration,
	/// Log every frame sent and received (`DEBUG=pw:channel`).
	pub log_channel: bool,
	/// Log every logical API call (`DEBUG=pw:api`).
	pub log_api: bool,
	/// Value of `sdkLanguage` sent with `initialize`.
	pub sdk_language: String,
}

impl Default for ConnectionOptions {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_millis(10),
			log_channel: false,
			log_api: false,
			sdk_language: "rust".to_string(),
		}
	}
}

impl ConnectionOptions {
	/// Defaults with the log switches taken from `DEBUG`.
	pub fn from_env() -> Self {
		let flags = DebugFlags::from_env();
		Self {
			log_channel: flags.channel,
			log_api: flags.api,
			..Self::default()
		}
	}

	pub fn poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval;
		self
	}

	pub fn log_channel(mut self, enabled: bool) -> Self {
		self.log_channel = enabled;
		self
	}

	pub fn log_api(mut self, enabled: bool) -> Self {
		self.log_api = enabled;
		self
	}

	pub fn sdk_language(mut self, language: impl Into<String>) -> Self {
		self.sdk_language = language.into();
		self
	}
}

mod millis {
	use std::time::Duration;

	use serde::{Deserialize, Deserializer};

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		u64::deserialize(deserializer).map(Duration::from_millis)
	}
}
