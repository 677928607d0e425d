//! [`Route`]: a network request held by the driver until a handler resolves it.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use pw_runtime::channel_owner::{ChannelOwner, ChannelOwnerImpl, private};
use pw_runtime::{Error, Interceptable, InterceptionState, ObjectInit, Result};
use serde::Serialize;
use serde_json::{Value, json};

/// Node backing a [`Route`].
pub(crate) struct RouteObject {
	base: ChannelOwnerImpl,
	request_guid: String,
	url: String,
	interception: InterceptionState,
}

impl private::Sealed for RouteObject {}

impl ChannelOwner for RouteObject {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}

/// The route's request must already exist; its `url` is what route
/// matchers see.
pub(crate) fn construct(init: ObjectInit) -> Result<Arc<dyn ChannelOwner>> {
	let request_guid = init.initializer["request"]["guid"]
		.as_str()
		.ok_or_else(|| Error::ProtocolError("Route initializer missing 'request.guid' field".to_string()))?
		.to_string();
	let base = init.into_base();
	let request = base.connection()?.get_object(&request_guid)?;
	let url = request.initializer()["url"].as_str().unwrap_or_default().to_string();

	Ok(Arc::new(RouteObject {
		base,
		request_guid,
		url,
		interception: InterceptionState::new(),
	}))
}

/// An intercepted request.
///
/// Handlers registered with [`RemoteObject::route`](crate::RemoteObject::route)
/// receive a `Route` and must either resolve it with [`fulfill`](Self::fulfill),
/// [`abort`](Self::abort) or [`continue_`](Self::continue_), pass it on with
/// [`fallback`](Self::fallback), or keep it and resolve it later.
///
/// See <https://playwright.dev/docs/api/class-route>
#[derive(Clone)]
pub struct Route {
	object: Arc<RouteObject>,
}

impl Route {
	pub(crate) fn from_object(object: Arc<dyn ChannelOwner>) -> Option<Self> {
		match object.downcast_arc::<RouteObject>() {
			Ok(object) => Some(Self { object }),
			Err(other) => {
				tracing::warn!(guid = other.guid(), type_name = other.type_name(), "Expected a Route object");
				None
			}
		}
	}

	pub fn guid(&self) -> &str {
		self.object.base.guid()
	}

	/// URL of the intercepted request.
	pub fn url(&self) -> &str {
		&self.object.url
	}

	/// Returns the intercepted request object.
	pub fn request(&self) -> Result<Arc<dyn ChannelOwner>> {
		self.object.base.connection()?.get_object(&self.object.request_guid)
	}

	pub fn is_handled(&self) -> bool {
		self.object.interception.is_handled()
	}

	/// Answers the request without contacting the server.
	#[track_caller]
	pub fn fulfill(&self, options: FulfillOptions) -> Result<()> {
		let params = serde_json::to_value(options.into_params())?;
		self.resolve("Route.fulfill", "fulfill", params)
	}

	/// Fails the request, `error_code` defaulting to `"failed"` in the driver.
	#[track_caller]
	pub fn abort(&self, error_code: Option<&str>) -> Result<()> {
		let params = match error_code {
			Some(code) => json!({ "errorCode": code }),
			None => json!({}),
		};
		self.resolve("Route.abort", "abort", params)
	}

	/// Sends the request on to the server with optional overrides.
	#[track_caller]
	pub fn continue_(&self, options: ContinueOptions) -> Result<()> {
		let params = serde_json::to_value(options.into_params(false))?;
		self.resolve("Route.continue", "continue", params)
	}

	/// Passes the request to the next matching route.
	///
	/// Called after the handler returned, the request is resumed instead,
	/// since the chain walk is already over.
	pub fn fallback(&self) -> Result<()> {
		if self.object.interception.fallback()? {
			self.resume()?;
		}
		Ok(())
	}

	/// Continues a request no route claimed.
	pub(crate) fn resume(&self) -> Result<()> {
		self.object.interception.start_handling()?;
		let params = serde_json::to_value(ContinueOptions::default().into_params(true))?;
		self.object.base.channel().send_no_result("continue", params)
	}

	#[track_caller]
	fn resolve(&self, api_name: &str, method: &str, params: Value) -> Result<()> {
		self.object.interception.start_handling()?;
		let base = &self.object.base;
		base.with_logging(api_name, || base.channel().send_no_result(method, params))
	}
}

impl Interceptable for Route {
	fn url(&self) -> String {
		self.object.url.clone()
	}

	fn interception(&self) -> &InterceptionState {
		&self.object.interception
	}
}

impl std::fmt::Debug for Route {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Route")
			.field("guid", &self.guid())
			.field("url", &self.object.url)
			.field("handled", &self.is_handled())
			.finish()
	}
}

/// Response body for [`Route::fulfill`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
	Text(String),
	Bytes(Vec<u8>),
}

impl Body {
	fn len(&self) -> usize {
		match self {
			Body::Text(text) => text.len(),
			Body::Bytes(bytes) => bytes.len(),
		}
	}
}

impl From<&str> for Body {
	fn from(text: &str) -> Self {
		Body::Text(text.to_string())
	}
}

impl From<String> for Body {
	fn from(text: String) -> Self {
		Body::Text(text)
	}
}

impl From<Vec<u8>> for Body {
	fn from(bytes: Vec<u8>) -> Self {
		Body::Bytes(bytes)
	}
}

/// Options for [`Route::fulfill`].
#[derive(Debug, Clone, Default)]
pub struct FulfillOptions {
	/// HTTP status, 200 when unset.
	pub status: Option<u16>,
	pub headers: Vec<(String, String)>,
	/// Shorthand for a `content-type` header.
	pub content_type: Option<String>,
	pub body: Option<Body>,
}

impl FulfillOptions {
	pub fn body(mut self, body: impl Into<Body>) -> Self {
		self.body = Some(body.into());
		self
	}

	pub fn status(mut self, status: u16) -> Self {
		self.status = Some(status);
		self
	}

	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.headers.push((name.into(), value.into()));
		self
	}

	pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
		self.content_type = Some(content_type.into());
		self
	}

	fn into_params(self) -> FulfillParams {
		let mut headers: Vec<Header> = self.headers.into_iter().map(Header::from).collect();
		if let Some(content_type) = self.content_type {
			headers.retain(|h| !h.name.eq_ignore_ascii_case("content-type"));
			headers.push(Header::new("content-type", content_type));
		}
		if let Some(body) = &self.body {
			if !headers.iter().any(|h| h.name.eq_ignore_ascii_case("content-length")) {
				headers.push(Header::new("content-length", body.len().to_string()));
			}
		}

		let (body, is_base64) = match self.body {
			Some(Body::Text(text)) => (Some(text), false),
			Some(Body::Bytes(bytes)) => (Some(STANDARD.encode(bytes)), true),
			None => (None, false),
		};
		FulfillParams {
			status: self.status.unwrap_or(200),
			headers,
			body,
			is_base64,
		}
	}
}

/// Overrides for [`Route::continue_`].
#[derive(Debug, Clone, Default)]
pub struct ContinueOptions {
	pub url: Option<String>,
	pub method: Option<String>,
	pub headers: Option<Vec<(String, String)>>,
	pub post_data: Option<Vec<u8>>,
}

impl ContinueOptions {
	fn into_params(self, is_fallback: bool) -> ContinueParams {
		ContinueParams {
			url: self.url,
			method: self.method,
			headers: self.headers.map(|headers| headers.into_iter().map(Header::from).collect()),
			post_data: self.post_data.map(|data| STANDARD.encode(data)),
			is_fallback,
		}
	}
}

#[derive(Debug, Serialize)]
struct Header {
	name: String,
	value: String,
}

impl Header {
	fn new(name: &str, value: String) -> Self {
		Self {
			name: name.to_string(),
			value,
		}
	}
}

impl From<(String, String)> for Header {
	fn from((name, value): (String, String)) -> Self {
		Self { name, value }
	}
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FulfillParams {
	status: u16,
	headers: Vec<Header>,
	#[serde(skip_serializing_if = "Option::is_none")]
	body: Option<String>,
	is_base64: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ContinueParams {
	#[serde(skip_serializing_if = "Option::is_none")]
	url: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	method: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	headers: Option<Vec<Header>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	post_data: Option<String>,
	is_fallback: bool,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn fulfill_params_encode_bytes_and_headers() {
		let params = FulfillOptions::default()
			.status(404)
			.content_type("application/octet-stream")
			.body(vec![0u8, 1, 2])
			.into_params();
		let value = serde_json::to_value(params).unwrap();

		assert_eq!(value["status"], 404);
		assert_eq!(value["body"], "AAEC");
		assert_eq!(value["isBase64"], true);
		assert_eq!(
			value["headers"],
			json!([
				{ "name": "content-type", "value": "application/octet-stream" },
				{ "name": "content-length", "value": "3" },
			])
		);
	}

	#[test]
	fn fulfill_defaults_to_ok_without_body() {
		let value = serde_json::to_value(FulfillOptions::default().into_params()).unwrap();

		assert_eq!(value, json!({ "status": 200, "headers": [], "isBase64": false }));
	}

	#[test]
	fn explicit_content_length_is_kept() {
		let params = FulfillOptions::default().header("Content-Length", "99").body("abc").into_params();
		let value = serde_json::to_value(params).unwrap();

		assert_eq!(value["headers"], json!([{ "name": "Content-Length", "value": "99" }]));
		assert_eq!(value["body"], "abc");
	}

	#[test]
	fn continue_params_mark_fallback() {
		let options = ContinueOptions {
			method: Some("POST".to_string()),
			post_data: Some(b"hi".to_vec()),
			..ContinueOptions::default()
		};
		let value = serde_json::to_value(options.into_params(true)).unwrap();

		assert_eq!(value, json!({ "method": "POST", "postData": "aGk=", "isFallback": true }));
	}
}
