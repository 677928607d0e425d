//! Metadata attached to every outbound call.

use serde::{Deserialize, Serialize};

/// Metadata attached to every Playwright protocol message
///
/// Contains timing information, the logical api name and optional location
/// data for debugging and trace viewing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
	/// Unix timestamp in milliseconds
	pub wall_time: i64,
	/// Logical API call this message belongs to (first message only).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub api_name: Option<String>,
	/// Whether this is an internal call (not user-facing API)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub internal: Option<bool>,
	/// Source location where the API was called
	#[serde(skip_serializing_if = "Option::is_none")]
	pub location: Option<Location>,
	/// Optional title for the operation
	#[serde(skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
}

impl Metadata {
	/// Create minimal metadata with current timestamp
	pub fn now() -> Self {
		Self {
			wall_time: std::time::SystemTime::now()
				.duration_since(std::time::UNIX_EPOCH)
				.map(|d| d.as_millis() as i64)
				.unwrap_or_default(),
			..Self::default()
		}
	}
}

/// Source code location for a protocol call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
	/// Source file path
	pub file: String,
	/// Line number (1-indexed)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub line: Option<u32>,
	/// Column number (1-indexed)
	#[serde(skip_serializing_if = "Option::is_none")]
	pub column: Option<u32>,
}

/// One captured frame of the client call stack, as sent to trace recording.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
	pub file: String,
	pub line: u32,
	pub column: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub function: Option<String>,
}

impl From<&StackFrame> for Location {
	fn from(frame: &StackFrame) -> Self {
		Self {
			file: frame.file.clone(),
			line: Some(frame.line),
			column: Some(frame.column),
		}
	}
}

impl From<&std::panic::Location<'_>> for StackFrame {
	fn from(location: &std::panic::Location<'_>) -> Self {
		Self {
			file: location.file().to_string(),
			line: location.line(),
			column: location.column(),
			function: None,
		}
	}
}
