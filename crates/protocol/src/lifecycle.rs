//! Reserved lifecycle-control events.
//!
//! The driver owns the authoritative object graph. It announces new remote
//! objects with [`CREATE`], moves them between parents with [`ADOPT`] and tears
//! down whole subtrees with [`DISPOSE`]. All three arrive as ordinary events;
//! the event's `guid` names the parent (create), the new parent (adopt) or the
//! disposed object itself (dispose).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event name announcing a new remote object.
pub const CREATE: &str = "__create__";
/// Event name moving an object under a new parent.
pub const ADOPT: &str = "__adopt__";
/// Event name destroying an object and all of its descendants.
pub const DISPOSE: &str = "__dispose__";

/// Params of a `__create__` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateParams {
	/// Protocol type tag (e.g. `"Page"`, `"Route"`).
	#[serde(rename = "type")]
	pub type_name: String,
	/// Guid assigned to the new object by the driver.
	pub guid: String,
	/// Initial state captured at creation.
	#[serde(default)]
	pub initializer: Value,
}

/// Params of an `__adopt__` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdoptParams {
	/// Guid of the child changing parents.
	pub guid: String,
}

/// Params of a `__dispose__` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisposeParams {
	/// `"gc"` when the driver collected the object to bound its heap.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
}

impl DisposeParams {
	/// Returns true if the driver disposed the object as garbage.
	pub fn is_gc(&self) -> bool {
		self.reason.as_deref() == Some("gc")
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn create_params_use_type_key() {
		let params: CreateParams = serde_json::from_value(json!({
			"type": "Page",
			"guid": "page@1",
			"initializer": {"url": "about:blank"}
		}))
		.unwrap();

		assert_eq!(params.type_name, "Page");
		assert_eq!(params.guid, "page@1");
		assert_eq!(params.initializer["url"], "about:blank");
	}

	#[test]
	fn create_params_default_initializer() {
		let params: CreateParams =
			serde_json::from_value(json!({"type": "Route", "guid": "route@1"})).unwrap();
		assert!(params.initializer.is_null());
	}

	#[test]
	fn dispose_reason() {
		let gc: DisposeParams = serde_json::from_value(json!({"reason": "gc"})).unwrap();
		let closed: DisposeParams = serde_json::from_value(json!({})).unwrap();
		assert!(gc.is_gc());
		assert!(!closed.is_gc());
	}
}
