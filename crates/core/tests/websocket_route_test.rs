// WebSocket interception: ownership by the newest matching route and the
// default forwarding between page and server.

mod fake_driver;

use std::sync::Arc;

use fake_driver::{calls_to, connect_default, create, event, methods_to, open_page, settle};
use parking_lot::Mutex;
use pw::{UrlMatcher, WebSocketFrame, WebSocketRoute};
use serde_json::json;

fn intercept_socket(peer: &pw_runtime::MemoryPeer, url: &str) {
	peer.push_all([
		create("page@1", "WebSocketRoute", "wsRoute@1", json!({ "url": url })),
		event("page@1", "webSocketRoute", json!({ "webSocketRoute": { "guid": "wsRoute@1" } })),
	]);
}

#[test]
fn test_mocked_socket_is_opened_without_server() {
	let (session, peer) = connect_default();
	let (_context, page) = open_page(&session, &peer);
	let received = Arc::new(Mutex::new(Vec::new()));

	let frames = Arc::clone(&received);
	page.route_web_socket(UrlMatcher::glob(None, "wss://example.com/live").unwrap(), move |ws: &WebSocketRoute| {
		let frames = Arc::clone(&frames);
		let reply = ws.clone();
		ws.on_message(move |frame| {
			frames.lock().push(frame.clone());
			reply.send("pong").unwrap();
		});
	})
	.unwrap();

	let updates = calls_to(&peer, "page@1");
	assert_eq!(updates[0].0, "setWebSocketInterceptionPatterns");
	assert_eq!(updates[0].1, json!({ "patterns": [{ "glob": "wss://example.com/live" }] }));

	intercept_socket(&peer, "wss://example.com/live");
	settle(&session);
	assert_eq!(methods_to(&peer, "wsRoute@1"), vec!["ensureOpened"]);

	peer.push(event("wsRoute@1", "messageFromPage", json!({ "message": "ping", "isBase64": false })));
	settle(&session);

	assert_eq!(*received.lock(), vec![WebSocketFrame::Text("ping".to_string())]);
	let calls = calls_to(&peer, "wsRoute@1");
	assert_eq!(calls[1].0, "sendToPage");
	assert_eq!(calls[1].1, json!({ "message": "pong", "isBase64": false }));
	assert_eq!(calls[1].2["internal"], true);
}

#[test]
fn test_connected_socket_forwards_by_default() {
	let (session, peer) = connect_default();
	let (_context, page) = open_page(&session, &peer);
	let closed = Arc::new(Mutex::new(None));

	let close_slot = Arc::clone(&closed);
	page.route_web_socket(UrlMatcher::Any, move |ws: &WebSocketRoute| {
		let server = ws.connect_to_server().unwrap();
		assert!(ws.connect_to_server().is_err());
		let close_slot = Arc::clone(&close_slot);
		server.on_close(move |code, reason| {
			*close_slot.lock() = Some((code, reason.map(str::to_string)));
		});
	})
	.unwrap();

	intercept_socket(&peer, "wss://example.com/feed");
	peer.push_all([
		event("wsRoute@1", "messageFromPage", json!({ "message": "AQI=", "isBase64": true })),
		event("wsRoute@1", "messageFromServer", json!({ "message": "tick", "isBase64": false })),
		event("wsRoute@1", "closePage", json!({ "code": 1000, "reason": "bye", "wasClean": true })),
		event("wsRoute@1", "closeServer", json!({ "code": 1001, "reason": "gone", "wasClean": true })),
	]);
	settle(&session);

	let calls = calls_to(&peer, "wsRoute@1");
	let methods: Vec<_> = calls.iter().map(|(m, _, _)| m.as_str()).collect();
	assert_eq!(methods, vec!["connect", "sendToServer", "sendToPage", "closeServer"]);
	assert_eq!(calls[1].1, json!({ "message": "AQI=", "isBase64": true }));
	assert_eq!(calls[2].1, json!({ "message": "tick", "isBase64": false }));
	assert_eq!(calls[3].1, json!({ "code": 1000, "reason": "bye", "wasClean": true }));
	assert_eq!(*closed.lock(), Some((Some(1001), Some("gone".to_string()))));
}

#[test]
fn test_unrouted_socket_connects_to_server() {
	let (session, peer) = connect_default();
	let (_context, _page) = open_page(&session, &peer);

	intercept_socket(&peer, "wss://example.com/other");
	peer.push(event("wsRoute@1", "messageFromPage", json!({ "message": "hi", "isBase64": false })));
	settle(&session);

	assert_eq!(methods_to(&peer, "wsRoute@1"), vec!["connect", "sendToServer"]);
}

#[test]
fn test_page_messages_are_dropped_before_connecting() {
	let (session, peer) = connect_default();
	let (_context, page) = open_page(&session, &peer);

	page.route_web_socket(UrlMatcher::Any, |_: &WebSocketRoute| {}).unwrap();
	intercept_socket(&peer, "wss://example.com/quiet");
	peer.push(event("wsRoute@1", "messageFromPage", json!({ "message": "hi", "isBase64": false })));
	settle(&session);

	assert_eq!(methods_to(&peer, "wsRoute@1"), vec!["ensureOpened"]);
}
