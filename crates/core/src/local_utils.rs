//! Driver-side helpers that do not belong to any browser object.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pw_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, private};
use pw_runtime::{ObjectInit, Result};
use serde::Serialize;
use serde_json::{Value, json};

/// Utility object the driver creates once per connection.
///
/// Besides the calls below it receives the call stacks recorded while
/// tracing is active.
pub struct LocalUtils {
	base: ChannelOwnerImpl,
}

impl LocalUtils {
	pub(crate) fn construct(init: ObjectInit) -> Result<Arc<dyn ChannelOwner>> {
		let base = init.into_base();
		base.mark_as_internal_type();
		Ok(Arc::new(Self { base }))
	}

	/// Device emulation presets shipped with the driver.
	pub fn device_descriptors(&self) -> Option<&Value> {
		self.base.initializer().get("deviceDescriptors")
	}

	/// Writes trace entries (and the recorded stacks) into a zip file.
	pub fn zip(&self, options: ZipOptions) -> Result<()> {
		self.base.channel().send_no_result("zip", options)
	}

	/// Drops the stacks recorded for a trace that will not be saved.
	pub fn trace_discarded(&self, stacks_id: &str) -> Result<()> {
		self.base
			.channel()
			.send_no_result("traceDiscarded", json!({ "stacksId": stacks_id }))
	}

	/// Announces a new trace chunk; returns the id its stacks are kept under.
	pub fn tracing_started(&self, traces_dir: Option<&Path>, trace_name: &str) -> Result<Option<String>> {
		let mut params = json!({ "traceName": trace_name });
		if let Some(dir) = traces_dir {
			params["tracesDir"] = json!(dir.to_string_lossy());
		}
		let result = self.base.channel().send_value("tracingStarted", params)?;
		Ok(result["stacksId"].as_str().map(str::to_string))
	}
}

impl private::Sealed for LocalUtils {}

impl ChannelOwner for LocalUtils {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

impl std::fmt::Debug for LocalUtils {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("LocalUtils").field("guid", &self.base.guid()).finish()
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZipMode {
	Write,
	Append,
}

/// Parameters for [`LocalUtils::zip`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ZipOptions {
	pub zip_file: PathBuf,
	pub entries: Vec<Value>,
	pub mode: ZipMode,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stacks_id: Option<String>,
	pub include_sources: bool,
}
