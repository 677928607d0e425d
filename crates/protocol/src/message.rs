//! Request, response and event frames.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::metadata::Metadata;

/// Outbound call sent to the Playwright driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique request id for correlating the response (never zero).
	pub id: u32,
	/// Guid of the target object (format: "type@hash").
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	/// Method name to invoke.
	pub method: String,
	/// Method parameters as JSON object.
	pub params: Value,
	/// Timing, api name and call-site information.
	pub metadata: Metadata,
}

/// Serde helpers for `Arc<str>` serialization
pub fn serialize_arc_str<S>(arc: &Arc<str>, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
	S: serde::Serializer,
{
	serializer.serialize_str(arc)
}

pub fn deserialize_arc_str<'de, D>(deserializer: D) -> std::result::Result<Arc<str>, D::Error>
where
	D: serde::Deserializer<'de>,
{
	let s: String = serde::Deserialize::deserialize(deserializer)?;
	Ok(Arc::from(s.as_str()))
}

/// Reply correlated to a prior [`Request`] by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	/// Request id this response correlates to.
	pub id: u32,
	/// Success result (mutually exclusive with error).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	/// Error result (mutually exclusive with result).
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorWrapper>,
	/// Human-readable call log the driver attaches to failures.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub log: Option<Vec<String>>,
}

/// Wrapper for protocol error payload.
///
/// The driver either sends a structured `error` or, for values thrown from
/// page scripts, a serialized `value`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorWrapper {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ErrorPayload>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
}

/// Protocol error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
	/// Error message
	pub message: String,
	/// Error type name (e.g., "TimeoutError", "TargetClosedError")
	#[serde(skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Stack trace
	#[serde(skip_serializing_if = "Option::is_none")]
	pub stack: Option<String>,
}

/// Unsolicited notification from the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	/// Guid of the object that emitted the event.
	#[serde(
		serialize_with = "serialize_arc_str",
		deserialize_with = "deserialize_arc_str"
	)]
	pub guid: Arc<str>,
	/// Event method name.
	pub method: String,
	/// Event parameters as JSON object.
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of inbound protocol messages.
///
/// Classification follows the wire rule rather than field shapes: a nonzero
/// `id` makes a frame a [`Response`]; otherwise a frame with a `method` is an
/// [`Event`]. Anything else is kept as [`Message::Unknown`].
#[derive(Debug, Clone)]
pub enum Message {
	/// Response message (nonzero `id`).
	Response(Response),
	/// Event message (no `id`, or `id == 0`).
	Event(Event),
	/// Unknown message type (forward-compatible catch-all).
	Unknown(Value),
}

#[derive(Deserialize)]
struct RawMessage {
	#[serde(default)]
	id: u32,
	#[serde(default)]
	guid: Option<String>,
	#[serde(default)]
	method: Option<String>,
	#[serde(default)]
	params: Option<Value>,
	#[serde(default)]
	result: Option<Value>,
	#[serde(default)]
	error: Option<ErrorWrapper>,
	#[serde(default)]
	log: Option<Vec<String>>,
}

impl Message {
	/// Classifies a decoded JSON frame.
	pub fn from_value(value: Value) -> serde_json::Result<Self> {
		let raw: RawMessage = serde_json::from_value(value.clone())?;
		if raw.id != 0 {
			return Ok(Message::Response(Response {
				id: raw.id,
				result: raw.result,
				error: raw.error,
				log: raw.log,
			}));
		}
		match raw.method {
			Some(method) => Ok(Message::Event(Event {
				guid: Arc::from(raw.guid.unwrap_or_default().as_str()),
				method,
				params: raw.params.unwrap_or(Value::Null),
			})),
			None => Ok(Message::Unknown(value)),
		}
	}
}

impl<'de> Deserialize<'de> for Message {
	fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
	where
		D: serde::Deserializer<'de>,
	{
		let value = Value::deserialize(deserializer)?;
		Message::from_value(value).map_err(serde::de::Error::custom)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_message_deserialization_response() {
		let json = r#"{"id": 42, "result": {"status": "ok"}}"#;
		let message: Message = serde_json::from_str(json).unwrap();

		match message {
			Message::Response(response) => {
				assert_eq!(response.id, 42);
				assert!(response.result.is_some());
				assert!(response.error.is_none());
			}
			_ => panic!("Expected Response"),
		}
	}

	#[test]
	fn test_message_deserialization_event() {
		let json = r#"{"guid": "page@abc", "method": "console", "params": {"text": "hello"}}"#;
		let message: Message = serde_json::from_str(json).unwrap();

		match message {
			Message::Event(event) => {
				assert_eq!(event.guid.as_ref(), "page@abc");
				assert_eq!(event.method, "console");
				assert_eq!(event.params["text"], "hello");
			}
			_ => panic!("Expected Event"),
		}
	}

	#[test]
	fn zero_id_is_an_event() {
		let message = Message::from_value(json!({
			"id": 0,
			"guid": "",
			"method": "__create__",
			"params": {"type": "Playwright", "guid": "playwright"}
		}))
		.unwrap();
		assert!(matches!(message, Message::Event(event) if event.guid.is_empty()));
	}

	#[test]
	fn error_response_keeps_call_log() {
		let message = Message::from_value(json!({
			"id": 7,
			"error": {"error": {"message": "boom", "name": "TimeoutError"}},
			"log": ["waiting for locator", "  locator resolved"]
		}))
		.unwrap();

		let Message::Response(response) = message else {
			panic!("Expected Response");
		};
		let payload = response.error.unwrap().error.unwrap();
		assert_eq!(payload.name.as_deref(), Some("TimeoutError"));
		assert_eq!(response.log.unwrap().len(), 2);
	}

	#[test]
	fn frame_without_id_or_method_is_unknown() {
		let message = Message::from_value(json!({"guid": "page@1"})).unwrap();
		assert!(matches!(message, Message::Unknown(_)));
	}

	#[test]
	fn test_request_format() {
		let request = Request {
			id: 1,
			guid: Arc::from("page@abc123"),
			method: "goto".to_string(),
			params: json!({"url": "https://example.com"}),
			metadata: Metadata::now(),
		};

		let value = serde_json::to_value(&request).unwrap();
		assert_eq!(value["id"], 1);
		assert_eq!(value["guid"], "page@abc123");
		assert_eq!(value["method"], "goto");
		assert_eq!(value["params"]["url"], "https://example.com");
		assert!(value["metadata"]["wallTime"].as_i64().unwrap() > 0);
	}
}
