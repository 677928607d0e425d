//! Default timeouts, inherited along the object hierarchy.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::waitable::{Waitable, WaitableNever, WaitableTimeout};

/// Timeout used when nothing in the chain sets one, in milliseconds.
pub const DEFAULT_TIMEOUT_MS: f64 = 30_000.0;

/// Default and navigation timeouts falling back to a parent's settings.
#[derive(Debug, Default)]
pub struct TimeoutSettings {
	parent: Option<Arc<TimeoutSettings>>,
	default_timeout: Mutex<Option<f64>>,
	default_navigation_timeout: Mutex<Option<f64>>,
}

impl TimeoutSettings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_parent(parent: Arc<TimeoutSettings>) -> Self {
		Self {
			parent: Some(parent),
			..Self::default()
		}
	}

	pub fn set_default_timeout(&self, timeout: Option<f64>) {
		*self.default_timeout.lock() = timeout;
	}

	pub fn set_default_navigation_timeout(&self, timeout: Option<f64>) {
		*self.default_navigation_timeout.lock() = timeout;
	}

	pub fn default_timeout(&self) -> Option<f64> {
		*self.default_timeout.lock()
	}

	pub fn default_navigation_timeout(&self) -> Option<f64> {
		*self.default_navigation_timeout.lock()
	}

	/// Resolves an optional per-call timeout.
	pub fn timeout(&self, timeout: Option<f64>) -> f64 {
		if let Some(timeout) = timeout.or_else(|| self.default_timeout()) {
			return timeout;
		}
		match &self.parent {
			Some(parent) => parent.timeout(None),
			None => DEFAULT_TIMEOUT_MS,
		}
	}

	/// Resolves a navigation timeout; the default timeout applies when no
	/// navigation timeout is set at this level.
	pub fn navigation_timeout(&self, timeout: Option<f64>) -> f64 {
		if let Some(timeout) = timeout
			.or_else(|| self.default_navigation_timeout())
			.or_else(|| self.default_timeout())
		{
			return timeout;
		}
		match &self.parent {
			Some(parent) => parent.navigation_timeout(None),
			None => DEFAULT_TIMEOUT_MS,
		}
	}

	/// Deadline waitable for a call; an explicit `0` means wait forever.
	pub fn create_waitable<T: 'static>(&self, timeout: Option<f64>) -> Box<dyn Waitable<T>> {
		if timeout == Some(0.0) {
			return Box::new(WaitableNever::new());
		}
		Box::new(WaitableTimeout::new(self.timeout(timeout)))
	}
}
