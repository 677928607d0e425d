//! Trace recording for a browser context.
//!
//! While a trace chunk is recording the connection's tracing count is held
//! up, so every labelled call also ships its call-site stack to
//! [`LocalUtils`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use pw_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, private};
use pw_runtime::{Error, ObjectInit, Result};
use serde::Serialize;
use serde_json::json;

use crate::local_utils::{LocalUtils, ZipMode, ZipOptions};

/// Options for [`Tracing::start`].
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TracingStartOptions {
	/// Trace file name prefix inside the traces directory.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Title shown in the trace viewer.
	#[serde(skip_serializing)]
	pub title: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub screenshots: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub snapshots: Option<bool>,
	/// Include source files of the recorded call sites.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub sources: Option<bool>,
}

#[derive(Debug, Default)]
struct TracingState {
	recording: bool,
	stacks_id: Option<String>,
	include_sources: bool,
	traces_dir: Option<PathBuf>,
}

/// Trace recorder attached to a browser context.
///
/// See <https://playwright.dev/docs/api/class-tracing>
pub struct Tracing {
	base: ChannelOwnerImpl,
	state: Mutex<TracingState>,
}

impl Tracing {
	pub(crate) fn construct(init: ObjectInit) -> Result<Arc<dyn ChannelOwner>> {
		let base = init.into_base();
		base.mark_as_internal_type();
		Ok(Arc::new(Self {
			base,
			state: Mutex::new(TracingState::default()),
		}))
	}

	/// Directory the driver writes trace chunks to, passed on to [`LocalUtils`].
	pub fn set_traces_dir(&self, dir: Option<PathBuf>) {
		self.state.lock().traces_dir = dir;
	}

	pub fn is_recording(&self) -> bool {
		self.state.lock().recording
	}

	/// Starts tracing and its first chunk.
	pub fn start(&self, options: TracingStartOptions) -> Result<()> {
		self.state.lock().include_sources = options.sources.unwrap_or(false);
		self.base
			.channel()
			.send_no_result("tracingStart", serde_json::to_value(&options)?)?;
		self.start_chunk(options.name.as_deref(), options.title.as_deref())
	}

	/// Starts a new chunk of an already started trace.
	pub fn start_chunk(&self, name: Option<&str>, title: Option<&str>) -> Result<()> {
		let mut params = json!({});
		if let Some(name) = name {
			params["name"] = json!(name);
		}
		if let Some(title) = title {
			params["title"] = json!(title);
		}
		let result = self.base.channel().send_value("tracingStartChunk", params)?;
		let trace_name = result["traceName"].as_str().unwrap_or_default();
		self.start_collecting_stacks(trace_name)
	}

	/// Stops the current chunk, saving it to `path` or discarding it.
	pub fn stop_chunk(&self, path: Option<&Path>) -> Result<()> {
		let (was_recording, stacks_id, include_sources) = {
			let mut state = self.state.lock();
			let was_recording = std::mem::replace(&mut state.recording, false);
			(was_recording, state.stacks_id.take(), state.include_sources)
		};
		if was_recording {
			self.base.connection()?.set_is_tracing(false);
		}

		let Some(path) = path else {
			self.base
				.channel()
				.send_no_result("tracingStopChunk", json!({ "mode": "discard" }))?;
			if let Some(stacks_id) = stacks_id {
				self.local_utils()?.trace_discarded(&stacks_id)?;
			}
			return Ok(());
		};

		let result = self
			.base
			.channel()
			.send_value("tracingStopChunk", json!({ "mode": "entries" }))?;
		let entries = result["entries"].as_array().cloned().unwrap_or_default();
		self.local_utils()?.zip(ZipOptions {
			zip_file: path.to_path_buf(),
			entries,
			mode: ZipMode::Write,
			stacks_id,
			include_sources,
		})
	}

	/// Stops tracing, saving the last chunk to `path` or discarding it.
	pub fn stop(&self, path: Option<&Path>) -> Result<()> {
		self.stop_chunk(path)?;
		self.base.channel().send_no_result("tracingStop", json!({}))
	}

	/// Opens a named group in the trace viewer's action list.
	#[track_caller]
	pub fn group(&self, name: &str) -> Result<()> {
		self.base.with_logging("Tracing.group", || {
			self.base
				.channel()
				.send_no_result("tracingGroup", json!({ "name": name }))
		})
	}

	#[track_caller]
	pub fn group_end(&self) -> Result<()> {
		self.base.with_logging("Tracing.groupEnd", || {
			self.base.channel().send_no_result("tracingGroupEnd", json!({}))
		})
	}

	fn start_collecting_stacks(&self, trace_name: &str) -> Result<()> {
		let (newly_recording, traces_dir) = {
			let mut state = self.state.lock();
			let newly_recording = !std::mem::replace(&mut state.recording, true);
			(newly_recording, state.traces_dir.clone())
		};
		if newly_recording {
			self.base.connection()?.set_is_tracing(true);
		}

		let started = self
			.local_utils()
			.and_then(|local_utils| local_utils.tracing_started(traces_dir.as_deref(), trace_name));
		match started {
			Ok(stacks_id) => {
				self.state.lock().stacks_id = stacks_id;
				Ok(())
			}
			Err(e) => {
				if newly_recording {
					self.state.lock().recording = false;
					self.base.connection()?.set_is_tracing(false);
				}
				Err(e)
			}
		}
	}

	fn local_utils(&self) -> Result<Arc<LocalUtils>> {
		self.base
			.connection()?
			.local_utils()
			.and_then(|object| object.downcast_arc::<LocalUtils>().ok())
			.ok_or_else(|| Error::InvalidState("LocalUtils is not available".to_string()))
	}
}

impl private::Sealed for Tracing {}

impl ChannelOwner for Tracing {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

impl std::fmt::Debug for Tracing {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Tracing")
			.field("guid", &self.base.guid())
			.field("recording", &self.is_recording())
			.finish()
	}
}

