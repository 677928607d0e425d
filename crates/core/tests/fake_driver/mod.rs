//! Scripted driver on the far end of a memory transport.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pw::{RemoteObject, Session};
use pw_runtime::{ChannelOwner, ConnectionOptions, MemoryPeer, MemoryTransport};
use serde_json::{Value, json};

/// Starts a session whose driver answers `initialize` with a small object
/// graph and every other call with `results(method, params)`.
pub fn connect<F>(results: F) -> (Session, MemoryPeer)
where
	F: Fn(&str, &Value) -> Value + Send + 'static,
{
	connect_with_replies(move |method, params| json!({ "result": results(method, params) }))
}

/// Like [`connect`], but `replies` builds the whole reply body, so calls can
/// fail with `{"error": ...}`.
pub fn connect_with_replies<F>(replies: F) -> (Session, MemoryPeer)
where
	F: Fn(&str, &Value) -> Value + Send + 'static,
{
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
	let (transport, peer) = MemoryTransport::pair();

	peer.respond_with(move |message| {
		let method = message["method"].as_str().unwrap_or_default();
		if method == "initialize" {
			let mut replies = bootstrap();
			replies.push(json!({ "id": message["id"], "result": { "playwright": { "guid": "Playwright" } } }));
			return replies;
		}
		let mut reply = replies(method, &message["params"]);
		reply["id"] = message["id"].clone();
		vec![reply]
	});

	let options = ConnectionOptions::default().poll_interval(Duration::from_millis(1));
	let session = Session::connect_with_options(transport, options).expect("session connects");
	peer.take_sent();
	(session, peer)
}

/// Answers every call with an empty result.
pub fn connect_default() -> (Session, MemoryPeer) {
	connect(|_, _| json!({}))
}

fn bootstrap() -> Vec<Value> {
	vec![
		create("", "LocalUtils", "localUtils", json!({ "deviceDescriptors": [] })),
		create("", "BrowserType", "browserType@chromium", json!({ "name": "chromium" })),
		create("", "BrowserType", "browserType@firefox", json!({ "name": "firefox" })),
		create("", "BrowserType", "browserType@webkit", json!({ "name": "webkit" })),
		create(
			"",
			"Playwright",
			"Playwright",
			json!({
				"chromium": { "guid": "browserType@chromium" },
				"firefox": { "guid": "browserType@firefox" },
				"webkit": { "guid": "browserType@webkit" },
				"utils": { "guid": "localUtils" },
			}),
		),
	]
}

pub fn create(parent: &str, type_name: &str, guid: &str, initializer: Value) -> Value {
	json!({
		"guid": parent,
		"method": "__create__",
		"params": { "type": type_name, "guid": guid, "initializer": initializer },
	})
}

pub fn event(guid: &str, method: &str, params: Value) -> Value {
	json!({ "guid": guid, "method": method, "params": params })
}

/// Dispatches `messages` queued messages.
pub fn pump(session: &Session, messages: usize) {
	for _ in 0..messages {
		session.connection().process_one_message().expect("dispatch succeeds");
	}
}

/// Dispatches whatever is queued, including replies to fire-and-forget calls.
pub fn settle(session: &Session) {
	pump(session, 16);
}

/// Creates a browser, a context under it and a page under the context.
pub fn open_page(session: &Session, peer: &MemoryPeer) -> (Arc<RemoteObject>, Arc<RemoteObject>) {
	peer.push_all([
		create("browserType@chromium", "Browser", "browser@1", json!({ "version": "1" })),
		create("browser@1", "BrowserContext", "context@1", json!({})),
		create("context@1", "Tracing", "tracing@1", json!({})),
		create("context@1", "Page", "page@1", json!({ "mainFrame": { "guid": "frame@1" } })),
		create("page@1", "Frame", "frame@1", json!({ "url": "about:blank" })),
	]);
	pump(session, 5);
	(remote(session, "context@1"), remote(session, "page@1"))
}

pub fn remote(session: &Session, guid: &str) -> Arc<RemoteObject> {
	session
		.connection()
		.get_object(guid)
		.expect("object exists")
		.downcast_arc::<RemoteObject>()
		.ok()
		.expect("object is a RemoteObject")
}

pub fn object(session: &Session, guid: &str) -> Arc<dyn ChannelOwner> {
	session.connection().get_object(guid).expect("object exists")
}

/// Calls sent to `guid`, as `(method, params, metadata)`.
pub fn calls_to(peer: &MemoryPeer, guid: &str) -> Vec<(String, Value, Value)> {
	peer.sent()
		.into_iter()
		.filter(|m| m["guid"] == guid)
		.map(|m| {
			(
				m["method"].as_str().unwrap_or_default().to_string(),
				m["params"].clone(),
				m["metadata"].clone(),
			)
		})
		.collect()
}

pub fn methods_to(peer: &MemoryPeer, guid: &str) -> Vec<String> {
	calls_to(peer, guid).into_iter().map(|(method, _, _)| method).collect()
}
