//! Keyed publish/subscribe registry with peer subscription side effects.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::json;

use crate::channel::Channel;
use crate::handlers::{Handler, HandlerEntry, HandlerId, Subscription};

/// Ordered handler lists keyed by event.
///
/// When a key with a wire event mapping gains its first handler, the peer is
/// told to start producing that event (`updateSubscription {enabled: true}`);
/// losing the last handler disables it again. Intermediate transitions send
/// nothing.
///
/// Handlers run on a snapshot of the list, so handlers added or removed while
/// a notification is in flight only affect later notifications.
pub struct ListenerCollection<K, P> {
	listeners: Mutex<IndexMap<K, Vec<HandlerEntry<P>>>>,
	subscriptions: HashMap<K, String>,
	channel: Option<Channel>,
}

impl<K, P> Default for ListenerCollection<K, P>
where
	K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
	P: 'static,
{
	fn default() -> Self {
		Self::new()
	}
}

impl<K, P> ListenerCollection<K, P>
where
	K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
	P: 'static,
{
	/// Creates a collection without subscription side effects.
	pub fn new() -> Self {
		Self {
			listeners: Mutex::new(IndexMap::new()),
			subscriptions: HashMap::new(),
			channel: None,
		}
	}

	/// Creates a collection that toggles the mapped wire events on `channel`.
	pub fn with_subscriptions<I, S>(channel: Channel, subscriptions: I) -> Self
	where
		I: IntoIterator<Item = (K, S)>,
		S: Into<String>,
	{
		Self {
			listeners: Mutex::new(IndexMap::new()),
			subscriptions: subscriptions.into_iter().map(|(k, s)| (k, s.into())).collect(),
			channel: Some(channel),
		}
	}

	pub fn add<F>(&self, key: K, handler: F) -> HandlerId
	where
		F: Fn(&P) + Send + Sync + 'static,
	{
		self.add_handler(key, Arc::new(handler))
	}

	pub fn add_handler(&self, key: K, handler: Handler<P>) -> HandlerId {
		let entry = HandlerEntry::new(handler);
		let id = entry.id;
		let first = {
			let mut listeners = self.listeners.lock();
			let list = listeners.entry(key.clone()).or_default();
			list.push(entry);
			list.len() == 1
		};
		if first {
			self.update_subscription(&key, true);
		}
		id
	}

	/// Adds a handler that is removed when the returned guard drops.
	pub fn subscribe<F>(self: &Arc<Self>, key: K, handler: F) -> Subscription
	where
		F: Fn(&P) + Send + Sync + 'static,
	{
		let id = self.add(key.clone(), handler);
		let weak = Arc::downgrade(self);
		Subscription::new(
			id,
			Arc::new(move |id| {
				if let Some(listeners) = weak.upgrade() {
					listeners.remove(&key, id);
				}
			}),
		)
	}

	/// Removes one handler. Returns whether it was registered.
	pub fn remove(&self, key: &K, id: HandlerId) -> bool {
		let (removed, emptied) = {
			let mut listeners = self.listeners.lock();
			let Some(list) = listeners.get_mut(key) else {
				return false;
			};
			let before = list.len();
			list.retain(|entry| entry.id != id);
			let removed = list.len() != before;
			let emptied = list.is_empty();
			if emptied {
				listeners.shift_remove(key);
			}
			(removed, emptied)
		};
		if emptied {
			self.update_subscription(key, false);
		}
		removed
	}

	pub fn notify(&self, key: &K, payload: &P) {
		let snapshot: Vec<Handler<P>> = {
			let listeners = self.listeners.lock();
			match listeners.get(key) {
				Some(list) => list.iter().map(|entry| Arc::clone(&entry.handler)).collect(),
				None => return,
			}
		};
		for handler in snapshot {
			handler(payload);
		}
	}

	pub fn has_listeners(&self, key: &K) -> bool {
		self.listeners.lock().contains_key(key)
	}

	pub fn listener_count(&self, key: &K) -> usize {
		self.listeners.lock().get(key).map_or(0, Vec::len)
	}

	fn update_subscription(&self, key: &K, enabled: bool) {
		let (Some(event), Some(channel)) = (self.subscriptions.get(key), &self.channel) else {
			return;
		};
		let params = json!({ "event": event, "enabled": enabled });
		if let Err(e) = channel.send_no_reply("updateSubscription", params) {
			tracing::warn!(guid = channel.guid(), event = %event, enabled, error = %e, "Failed to update subscription");
		}
	}
}
