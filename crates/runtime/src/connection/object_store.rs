//! Flat GUID index over the ownership tree.
//!
//! Entries are [`Weak`]: nodes are owned by their parent's child table and
//! the index never keeps a detached subtree alive.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::channel_owner::ChannelOwner;
use crate::error::{Error, Result};

/// Registry of live protocol objects by GUID.
pub struct ObjectStore {
	objects: DashMap<Arc<str>, Weak<dyn ChannelOwner>>,
}

impl Default for ObjectStore {
	fn default() -> Self {
		Self::new()
	}
}

impl ObjectStore {
	pub fn new() -> Self {
		Self {
			objects: DashMap::new(),
		}
	}

	/// Registers `object`, replacing any previous entry for `guid`.
	pub fn insert(&self, guid: Arc<str>, object: &Arc<dyn ChannelOwner>) {
		self.objects.insert(guid, Arc::downgrade(object));
	}

	/// Registers `object`. A GUID that is still live cannot be registered twice.
	pub fn try_insert(&self, guid: Arc<str>, object: &Arc<dyn ChannelOwner>) -> Result<()> {
		match self.objects.entry(guid) {
			Entry::Occupied(mut slot) => {
				if slot.get().strong_count() > 0 {
					return Err(Error::ProtocolError(format!("Object with guid {} already exists", slot.key())));
				}
				slot.insert(Arc::downgrade(object));
			}
			Entry::Vacant(slot) => {
				slot.insert(Arc::downgrade(object));
			}
		}
		Ok(())
	}

	pub fn remove(&self, guid: &str) -> bool {
		self.objects.remove(guid).is_some()
	}

	/// Synchronous lookup. Entries whose node is gone count as absent.
	pub fn try_get(&self, guid: &str) -> Option<Arc<dyn ChannelOwner>> {
		let weak = self.objects.get(guid).map(|entry| entry.value().clone())?;
		weak.upgrade()
	}

	pub fn get(&self, guid: &str) -> Result<Arc<dyn ChannelOwner>> {
		self.try_get(guid).ok_or_else(|| Error::ObjectNotFound { guid: guid.to_string() })
	}

	pub fn contains(&self, guid: &str) -> bool {
		self.try_get(guid).is_some()
	}

	pub fn len(&self) -> usize {
		self.objects.len()
	}

	pub fn is_empty(&self) -> bool {
		self.objects.is_empty()
	}

	pub fn guids(&self) -> Vec<Arc<str>> {
		self.objects.iter().map(|entry| Arc::clone(entry.key())).collect()
	}
}
