use std::time::Duration;

use serde_json::Value;

use super::Transport;
use crate::error::Result;

/// Wraps a transport and traces every frame on the `pw:channel` target.
pub struct LoggingTransport<T> {
	inner: T,
}

impl<T: Transport> LoggingTransport<T> {
	pub fn new(inner: T) -> Self {
		Self { inner }
	}

	pub fn into_inner(self) -> T {
		self.inner
	}
}

impl<T: Transport> Transport for LoggingTransport<T> {
	fn send(&mut self, message: Value) -> Result<()> {
		tracing::info!(target: "pw:channel", "SEND> {message}");
		self.inner.send(message)
	}

	fn poll(&mut self, timeout: Duration) -> Result<Option<Value>> {
		let received = self.inner.poll(timeout)?;
		if let Some(message) = &received {
			tracing::info!(target: "pw:channel", "<RECV {message}");
		}
		Ok(received)
	}

	fn close(&mut self) -> Result<()> {
		self.inner.close()
	}
}
