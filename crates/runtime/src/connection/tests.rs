use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use super::*;
use crate::channel_owner::{ChannelOwnerImpl, private};
use crate::listeners::ListenerCollection;
use crate::transport::{MemoryPeer, MemoryTransport};
use crate::waitable::{Waitable, WaitableEvent, WaitableRace, WaitableTimeout};

/// Minimal node that republishes its events.
struct TestObject {
	base: ChannelOwnerImpl,
	events: Arc<ListenerCollection<String, Value>>,
}

impl TestObject {
	fn construct(init: ObjectInit) -> Result<Arc<dyn ChannelOwner>> {
		let base = init.into_base();
		let events = Arc::new(ListenerCollection::with_subscriptions(
			base.channel().clone(),
			[("console".to_string(), "console")],
		));
		Ok(Arc::new(TestObject { base, events }))
	}
}

impl private::Sealed for TestObject {}

impl ChannelOwner for TestObject {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}

	fn on_event(&self, method: &str, params: Value) {
		self.events.notify(&method.to_string(), &params);
	}
}

fn init_tracing() {
	let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn factory() -> ObjectFactory {
	ObjectFactory::new()
		.register_all(&["Object", LOCAL_UTILS_TYPE], TestObject::construct)
		.ignore("Android")
}

fn connect() -> (Arc<Connection>, MemoryPeer) {
	init_tracing();
	let (transport, peer) = MemoryTransport::pair();
	let options = ConnectionOptions::default().poll_interval(Duration::from_millis(1));
	(Connection::with_options(transport, factory(), options), peer)
}

fn create(peer: &MemoryPeer, parent: &str, type_name: &str, guid: &str) {
	peer.push(json!({
		"guid": parent,
		"method": "__create__",
		"params": { "type": type_name, "guid": guid, "initializer": { "name": guid } },
	}));
}

/// Dispatches everything currently queued.
fn drain(connection: &Connection, messages: usize) {
	for _ in 0..messages {
		connection.process_one_message().unwrap();
	}
}

/// Answers every call with `{id, result: {}}`.
fn echo_results(peer: &MemoryPeer) {
	peer.respond_with(|message| vec![json!({ "id": message["id"], "result": {} })]);
}

fn test_object(connection: &Connection, guid: &str) -> Arc<TestObject> {
	connection.get_object(guid).unwrap().downcast_arc::<TestObject>().ok().unwrap()
}

#[test]
fn test_request_ids_start_at_one() {
	let (connection, peer) = connect();
	echo_results(&peer);

	for _ in 0..3 {
		connection.send_message("", "noop", Value::Null).unwrap();
	}

	let ids: Vec<_> = peer.sent().iter().map(|m| m["id"].as_u64().unwrap()).collect();
	assert_eq!(ids, vec![1, 2, 3]);
	assert_eq!(connection.pending_calls(), 0);
}

#[test]
fn test_request_format() {
	let (connection, peer) = connect();

	let _pending = connection.send_message_async("page@abc123", "goto", json!({"url": "https://example.com"})).unwrap();

	let sent = peer.take_sent();
	assert_eq!(sent.len(), 1);
	let request = &sent[0];
	assert_eq!(request["guid"], "page@abc123");
	assert_eq!(request["method"], "goto");
	assert_eq!(request["params"]["url"], "https://example.com");
	assert_eq!(request["metadata"]["internal"], true);
	assert!(request["metadata"]["wallTime"].as_i64().unwrap() > 0);
	assert!(request["metadata"].get("apiName").is_none());
}

#[test]
fn test_null_params_are_sent_as_object() {
	let (connection, peer) = connect();

	let _pending = connection.send_message_async("", "noop", Value::Null).unwrap();

	assert_eq!(peer.take_sent()[0]["params"], json!({}));
}

#[test]
fn test_dispatch_response_success() {
	let (connection, peer) = connect();
	peer.push(json!({ "id": 1, "result": { "status": "ok" } }));

	let result = connection.send_message("", "ping", json!({})).unwrap();

	assert_eq!(result["status"], "ok");
}

#[test]
fn test_dispatch_response_errors_are_classified() {
	let (connection, peer) = connect();
	peer.push_all([
		json!({ "id": 1, "error": { "error": { "name": "TimeoutError", "message": "Timeout 10ms exceeded" } } }),
		json!({ "id": 2, "error": { "error": { "name": "TargetClosedError", "message": "Target page closed" } } }),
		json!({
			"id": 3,
			"error": { "error": { "name": "Error", "message": "element is not visible", "stack": "at x" } },
			"log": ["waiting for locator", "retrying"],
		}),
		json!({ "id": 4, "error": { "value": { "v": "undefined" } } }),
	]);

	let timeout = connection.send_message("", "a", json!({})).unwrap_err();
	assert!(timeout.is_timeout());

	let closed = connection.send_message("", "b", json!({})).unwrap_err();
	assert!(closed.is_target_closed());

	let remote = connection.send_message("", "c", json!({})).unwrap_err();
	assert_eq!(remote.error_name(), Some("Error"));
	assert_eq!(remote.stack_trace(), Some("at x"));
	assert_eq!(
		remote.to_string(),
		"Error: element is not visible\nCall log:\n- waiting for locator\n- retrying\n"
	);

	let value = connection.send_message("", "d", json!({})).unwrap_err();
	assert_eq!(value.error_name(), Some("Error"));

	assert!(!connection.is_closed());
}

#[test]
fn test_empty_call_log_is_omitted() {
	assert_eq!(format_call_log(Some(&["".to_string(), "".to_string()])), "");
	assert_eq!(format_call_log(Some(&["  ".to_string()])), "\nCall log:\n-   \n");
	assert_eq!(format_call_log(None), "");
	assert_eq!(format_call_log(Some(&["a".to_string()])), "\nCall log:\n- a\n");
}

#[test]
fn test_events_before_result_are_dispatched_first() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	drain(&connection, 1);

	let seen = Arc::new(Mutex::new(Vec::new()));
	let log = Arc::clone(&seen);
	test_object(&connection, "g1").events.add("tick".to_string(), move |params: &Value| {
		log.lock().push(params["n"].as_u64().unwrap());
	});

	peer.push_all([
		json!({ "guid": "g1", "method": "tick", "params": { "n": 1 } }),
		json!({ "guid": "g1", "method": "tick", "params": { "n": 2 } }),
		json!({ "id": 1, "result": {} }),
	]);
	connection.send_message("g1", "work", json!({})).unwrap();

	assert_eq!(*seen.lock(), vec![1, 2]);
}

#[test]
fn test_handler_can_issue_blocking_call() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	drain(&connection, 1);
	echo_results(&peer);

	let object = test_object(&connection, "g1");
	let channel = object.channel().clone();
	let nested = Arc::new(Mutex::new(None));
	let slot = Arc::clone(&nested);
	object.events.add("dialog".to_string(), move |_| {
		*slot.lock() = Some(channel.send_value("dismiss", json!({})).is_ok());
	});

	peer.push(json!({ "guid": "g1", "method": "dialog", "params": {} }));
	drain(&connection, 1);

	assert_eq!(*nested.lock(), Some(true));
	assert_eq!(peer.sent().last().unwrap()["method"], "dismiss");
}

#[test]
fn test_unknown_response_id_is_fatal() {
	let (connection, peer) = connect();
	let pending = connection.send_message_async("", "ping", json!({})).unwrap();

	peer.push(json!({ "id": 99, "result": {} }));
	let err = connection.process_one_message().unwrap_err();

	assert!(err.is_protocol_violation());
	assert!(connection.is_closed());
	assert!(peer.is_closed());
	assert!(matches!(pending.get(), Err(Error::ConnectionClosed(_))));
	assert!(matches!(
		connection.send_message("", "ping", json!({})),
		Err(Error::ConnectionClosed(_))
	));
}

#[test]
fn test_redelivered_response_is_fatal() {
	let (connection, peer) = connect();
	peer.push_all([json!({ "id": 1, "result": {} }), json!({ "id": 1, "result": {} })]);

	connection.send_message("", "ping", json!({})).unwrap();
	let err = connection.process_one_message().unwrap_err();

	assert!(matches!(err, Error::ProtocolError(_)));
	assert!(connection.is_closed());
}

#[test]
fn test_event_for_unknown_guid_is_fatal() {
	let (connection, peer) = connect();
	peer.push(json!({ "guid": "nobody", "method": "console", "params": {} }));

	assert!(connection.process_one_message().unwrap_err().is_protocol_violation());
	assert!(connection.is_closed());
}

#[test]
fn test_unknown_frames_are_ignored() {
	let (connection, peer) = connect();
	peer.push(json!({ "guid": "g1" }));

	connection.process_one_message().unwrap();
	assert!(!connection.is_closed());
}

#[test]
fn test_create_registers_under_parent() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	create(&peer, "g1", "Object", "g2");
	drain(&connection, 2);

	let g1 = connection.get_object("g1").unwrap();
	let g2 = connection.get_object("g2").unwrap();
	assert_eq!(g1.type_name(), "Object");
	assert_eq!(g2.initializer()["name"], "g2");
	assert_eq!(g2.parent().unwrap().guid(), "g1");
	assert!(g1.base().child("g2").is_some());
	assert!(connection.root().base().child("g1").is_some());
	assert_eq!(connection.object_count(), 3);
}

#[test]
fn test_create_under_missing_parent_is_fatal() {
	let (connection, peer) = connect();
	create(&peer, "missing", "Object", "g1");

	assert!(connection.process_one_message().unwrap_err().is_protocol_violation());
}

#[test]
fn test_duplicate_guid_is_fatal() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	create(&peer, "", "Object", "g1");
	drain(&connection, 1);

	assert!(matches!(connection.process_one_message(), Err(Error::ProtocolError(_))));
}

#[test]
fn test_ignored_and_unknown_types() {
	let (connection, peer) = connect();
	create(&peer, "", "Android", "android@1");
	drain(&connection, 1);
	assert!(connection.get_object("android@1").is_err());
	assert!(!connection.is_closed());

	create(&peer, "", "Mystery", "mystery@1");
	let err = connection.process_one_message().unwrap_err();
	assert!(matches!(err, Error::UnknownObjectType(ref t) if t == "Mystery"));
	assert!(connection.is_closed());
}

#[test]
fn test_gc_dispose_rejects_stale_reference() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	drain(&connection, 1);
	let stale = connection.get_object("g1").unwrap();

	peer.push(json!({ "guid": "g1", "method": "__dispose__", "params": { "reason": "gc" } }));
	drain(&connection, 1);

	assert!(matches!(connection.get_object("g1"), Err(Error::ObjectNotFound { .. })));
	assert!(stale.is_disposed());
	assert!(stale.was_collected());
	let err = stale.channel().send_value("ping", json!({})).unwrap_err();
	assert!(matches!(err, Error::ObjectDisposed { collected: true, .. }));
	assert!(peer.sent().is_empty());
}

#[test]
fn test_dispose_cascades_through_subtree() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "keep");
	create(&peer, "", "Object", "a");
	create(&peer, "a", "Object", "b");
	create(&peer, "b", "Object", "c");
	create(&peer, "a", "Object", "d");
	drain(&connection, 5);
	assert_eq!(connection.object_count(), 6);
	let c = connection.get_object("c").unwrap();

	peer.push(json!({ "guid": "a", "method": "__dispose__", "params": {} }));
	drain(&connection, 1);

	assert_eq!(connection.object_count(), 2);
	for guid in ["a", "b", "c", "d"] {
		assert!(connection.get_object(guid).is_err(), "{guid} still registered");
	}
	assert!(c.is_disposed());
	assert!(!c.was_collected());
	assert!(c.base().children().is_empty());
	let root_children: Vec<_> = connection.root().base().children().iter().map(|o| o.guid().to_string()).collect();
	assert_eq!(root_children, vec!["keep"]);
}

#[test]
fn test_adopt_moves_child_between_parents() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "p1");
	create(&peer, "", "Object", "p2");
	create(&peer, "p1", "Object", "child");
	drain(&connection, 3);
	let count = connection.object_count();

	peer.push(json!({ "guid": "p2", "method": "__adopt__", "params": { "guid": "child" } }));
	drain(&connection, 1);

	let child = connection.get_object("child").unwrap();
	assert_eq!(child.parent().unwrap().guid(), "p2");
	assert!(connection.get_object("p1").unwrap().base().child("child").is_none());
	assert!(connection.get_object("p2").unwrap().base().child("child").is_some());
	assert_eq!(connection.object_count(), count);

	// Disposing the old parent leaves the adopted child alone.
	peer.push(json!({ "guid": "p1", "method": "__dispose__", "params": {} }));
	drain(&connection, 1);
	assert!(connection.get_object("child").is_ok());
}

#[test]
fn test_subscription_updates_only_on_edges() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "page@1");
	drain(&connection, 1);
	let object = test_object(&connection, "page@1");
	let key = "console".to_string();

	let first = object.events.add(key.clone(), |_| {});
	let second = object.events.add(key.clone(), |_| {});
	object.events.remove(&key, second);
	let third = object.events.add(key.clone(), |_| {});
	object.events.remove(&key, first);
	object.events.remove(&key, third);
	object.events.add("tick".to_string(), |_| {});

	let updates: Vec<_> = peer
		.sent()
		.into_iter()
		.filter(|m| m["method"] == "updateSubscription")
		.map(|m| (m["guid"].clone(), m["params"].clone()))
		.collect();
	assert_eq!(
		updates,
		vec![
			(json!("page@1"), json!({ "event": "console", "enabled": true })),
			(json!("page@1"), json!({ "event": "console", "enabled": false })),
		]
	);
}

#[test]
fn test_with_logging_labels_first_message_only() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	drain(&connection, 1);
	echo_results(&peer);
	let object = connection.get_object("g1").unwrap();

	object
		.base()
		.with_logging("Page.click", || {
			object.channel().send_value("scroll", json!({}))?;
			object.channel().send_value("click", json!({}))
		})
		.unwrap();
	object.channel().send_value("after", json!({})).unwrap();

	let sent = peer.sent();
	assert_eq!(sent[0]["metadata"]["apiName"], "Page.click");
	assert!(sent[0]["metadata"]["location"]["file"].as_str().unwrap().ends_with("tests.rs"));
	assert!(sent[0]["metadata"].get("internal").is_none());
	assert_eq!(sent[1]["metadata"]["internal"], true);
	assert_eq!(sent[2]["metadata"]["internal"], true);
}

#[test]
fn test_internal_types_never_label_calls() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	drain(&connection, 1);
	echo_results(&peer);
	let object = connection.get_object("g1").unwrap();
	object.base().mark_as_internal_type();

	object
		.base()
		.with_logging("Route.fulfill", || object.channel().send_value("fulfill", json!({})))
		.unwrap();

	assert_eq!(peer.sent()[0]["metadata"]["internal"], true);
}

#[test]
fn test_with_logging_on_disposed_object_fails_before_sending() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	drain(&connection, 1);
	let object = connection.get_object("g1").unwrap();

	peer.push(json!({ "guid": "g1", "method": "__dispose__", "params": {} }));
	drain(&connection, 1);

	let err = object
		.base()
		.with_logging("Page.click", || object.channel().send_value("click", json!({})))
		.unwrap_err();
	assert!(matches!(err, Error::ObjectDisposed { collected: false, .. }));
	assert!(connection.root().base().children().is_empty());
	assert!(peer.sent().is_empty());
}

#[test]
fn test_tracing_sends_stack_to_local_utils() {
	let (connection, peer) = connect();
	create(&peer, "", LOCAL_UTILS_TYPE, "localUtils");
	create(&peer, "", "Object", "g1");
	drain(&connection, 2);
	echo_results(&peer);
	assert_eq!(connection.local_utils_guid().as_deref(), Some("localUtils"));
	let object = connection.get_object("g1").unwrap();

	connection.set_is_tracing(true);
	object
		.base()
		.with_logging("Page.goto", || object.channel().send_value("goto", json!({})))
		.unwrap();
	connection.set_is_tracing(false);
	object
		.base()
		.with_logging("Page.reload", || object.channel().send_value("reload", json!({})))
		.unwrap();

	let sent = peer.sent();
	let methods: Vec<_> = sent.iter().map(|m| m["method"].as_str().unwrap()).collect();
	assert_eq!(methods, vec!["goto", "addStackToTracingNoReply", "reload"]);
	assert_eq!(sent[1]["guid"], "localUtils");
	assert_eq!(sent[1]["params"]["callData"]["id"], sent[0]["id"]);
	assert!(sent[1]["params"]["callData"]["stack"][0]["file"].is_string());
	assert_eq!(sent[1]["metadata"]["internal"], true);
	assert_eq!(connection.pending_calls(), 0);
}

#[test]
fn test_tracing_sends_one_stack_per_logical_call() {
	let (connection, peer) = connect();
	create(&peer, "", LOCAL_UTILS_TYPE, "localUtils");
	create(&peer, "", "Object", "g1");
	drain(&connection, 2);
	echo_results(&peer);
	let object = connection.get_object("g1").unwrap();

	connection.set_is_tracing(true);
	object
		.base()
		.with_logging("Page.click", || {
			object.channel().send_value("scroll", json!({}))?;
			object.channel().send_value("click", json!({}))
		})
		.unwrap();
	drain(&connection, 2);

	let sent = peer.sent();
	let methods: Vec<_> = sent.iter().map(|m| m["method"].as_str().unwrap()).collect();
	assert_eq!(methods, vec!["scroll", "addStackToTracingNoReply", "click"]);
	assert_eq!(sent[0]["metadata"]["apiName"], "Page.click");
	assert_eq!(sent[1]["params"]["callData"]["id"], sent[0]["id"]);
	assert_eq!(sent[2]["metadata"]["internal"], true);
	assert_eq!(connection.pending_calls(), 0);
}

#[test]
fn test_tracing_count_never_goes_negative() {
	let (connection, _peer) = connect();

	connection.set_is_tracing(false);
	assert!(!connection.is_tracing());
	connection.set_is_tracing(true);
	assert!(connection.is_tracing());
	connection.set_is_tracing(false);
	assert!(!connection.is_tracing());
}

#[test]
fn test_tracing_skips_calls_to_local_utils() {
	let (connection, peer) = connect();
	create(&peer, "", LOCAL_UTILS_TYPE, "localUtils");
	drain(&connection, 1);
	echo_results(&peer);
	let local_utils = connection.get_object("localUtils").unwrap();

	connection.set_is_tracing(true);
	local_utils
		.base()
		.with_logging("LocalUtils.zip", || local_utils.channel().send_value("zip", json!({})))
		.unwrap();

	assert_eq!(peer.sent().len(), 1);
}

#[test]
fn test_initialize_returns_playwright_object() {
	let (connection, peer) = connect();
	peer.respond_with(|message| {
		assert_eq!(message["method"], "initialize");
		assert_eq!(message["params"]["sdkLanguage"], "rust");
		vec![
			json!({
				"guid": "",
				"method": "__create__",
				"params": { "type": "Object", "guid": "Playwright", "initializer": {} },
			}),
			json!({ "id": message["id"], "result": { "playwright": { "guid": "Playwright" } } }),
		]
	});

	let playwright = connection.initialize().unwrap();

	assert_eq!(playwright.guid(), "Playwright");
}

#[test]
fn test_peer_close_fails_pending_calls() {
	let (connection, peer) = connect();
	let pending = connection.send_message_async("", "ping", json!({})).unwrap();

	peer.close();
	let err = connection.process_one_message().unwrap_err();

	assert!(matches!(err, Error::ConnectionClosed(_)));
	assert!(pending.is_done());
	assert!(matches!(pending.get(), Err(Error::ConnectionClosed(_))));
	assert_eq!(connection.pending_calls(), 0);
}

#[test]
fn test_close_is_idempotent() {
	let (connection, peer) = connect();

	connection.close();
	connection.close();

	assert!(peer.is_closed());
	assert!(connection.process_one_message().is_err());
}

#[test]
fn test_run_until_event_or_timeout() {
	let (connection, peer) = connect();
	create(&peer, "", "Object", "g1");
	drain(&connection, 1);
	let object = test_object(&connection, "g1");

	peer.push(json!({ "guid": "g1", "method": "load", "params": { "url": "/" } }));
	let waitable = WaitableEvent::new(&object.events, "load".to_string());
	let loaded = run_until(connection.as_ref(), || Ok(()), &waitable).unwrap();
	assert_eq!(loaded["url"], "/");
	assert!(!object.events.has_listeners(&"load".to_string()));

	let members: Vec<Box<dyn Waitable<Value>>> = vec![
		Box::new(WaitableEvent::new(&object.events, "never".to_string())),
		Box::new(WaitableTimeout::<Value>::new(20.0)),
	];
	let race = WaitableRace::new(members);
	let err = run_until(connection.as_ref(), || Ok(()), &race).unwrap_err();
	assert!(err.is_timeout());
	assert!(!object.events.has_listeners(&"never".to_string()));
}
