//! Constructor table mapping protocol type tags to node constructors.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;

use crate::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection};
use crate::error::{Error, Result};

/// Everything a constructor receives for one `__create__` message.
pub struct ObjectInit {
	pub parent: Arc<dyn ChannelOwner>,
	pub type_name: String,
	pub guid: Arc<str>,
	pub initializer: Value,
}

impl ObjectInit {
	/// Builds the node state for the new object under its parent.
	pub fn into_base(self) -> ChannelOwnerImpl {
		ChannelOwnerImpl::new(
			ParentOrConnection::Parent(self.parent),
			self.type_name,
			self.guid,
			self.initializer,
		)
	}
}

/// Node constructor registered for one type tag.
pub type Constructor = Arc<dyn Fn(ObjectInit) -> Result<Arc<dyn ChannelOwner>> + Send + Sync>;

/// Registered constructors plus the tags that deliberately construct nothing.
///
/// A tag in neither set is unknown and fails the create with
/// [`Error::UnknownObjectType`].
#[derive(Clone, Default)]
pub struct ObjectFactory {
	constructors: HashMap<String, Constructor>,
	ignored: HashSet<String>,
}

impl ObjectFactory {
	pub fn new() -> Self {
		Self::default()
	}

	/// Registers `constructor` for `type_name`, replacing any earlier one.
	pub fn register<F>(mut self, type_name: impl Into<String>, constructor: F) -> Self
	where
		F: Fn(ObjectInit) -> Result<Arc<dyn ChannelOwner>> + Send + Sync + 'static,
	{
		let type_name = type_name.into();
		self.ignored.remove(&type_name);
		self.constructors.insert(type_name, Arc::new(constructor));
		self
	}

	/// Registers the same constructor for several tags.
	pub fn register_all<F>(mut self, type_names: &[&str], constructor: F) -> Self
	where
		F: Fn(ObjectInit) -> Result<Arc<dyn ChannelOwner>> + Send + Sync + 'static,
	{
		let constructor: Constructor = Arc::new(constructor);
		for type_name in type_names {
			self.ignored.remove(*type_name);
			self.constructors.insert(type_name.to_string(), Arc::clone(&constructor));
		}
		self
	}

	/// Marks a tag as intentionally unsupported.
	pub fn ignore(mut self, type_name: impl Into<String>) -> Self {
		let type_name = type_name.into();
		self.constructors.remove(&type_name);
		self.ignored.insert(type_name);
		self
	}

	pub fn is_registered(&self, type_name: &str) -> bool {
		self.constructors.contains_key(type_name)
	}

	pub fn is_ignored(&self, type_name: &str) -> bool {
		self.ignored.contains(type_name)
	}

	/// Constructs the node for `init`, or `None` for an ignored tag.
	pub fn create(&self, init: ObjectInit) -> Result<Option<Arc<dyn ChannelOwner>>> {
		if let Some(constructor) = self.constructors.get(&init.type_name) {
			return constructor(init).map(Some);
		}
		if self.ignored.contains(&init.type_name) {
			tracing::debug!(type_name = %init.type_name, guid = %init.guid, "Ignoring unsupported object type");
			return Ok(None);
		}
		Err(Error::UnknownObjectType(init.type_name))
	}
}

impl std::fmt::Debug for ObjectFactory {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let mut registered: Vec<_> = self.constructors.keys().collect();
		registered.sort();
		let mut ignored: Vec<_> = self.ignored.iter().collect();
		ignored.sort();
		f.debug_struct("ObjectFactory")
			.field("registered", &registered)
			.field("ignored", &ignored)
			.finish()
	}
}
