use std::sync::{Arc, Weak};

use serde_json::Value;

use super::ConnectionLike;
use crate::channel_owner::{ChannelOwner, ChannelOwnerImpl, ParentOrConnection, private};

/// Implicit root of the ownership tree, GUID `""`.
///
/// The driver creates top-level objects under it; `initialize` is sent to it.
pub(crate) struct Root {
	base: ChannelOwnerImpl,
}

impl Root {
	pub(crate) fn new(connection: Weak<dyn ConnectionLike>) -> Self {
		Self {
			base: ChannelOwnerImpl::new(ParentOrConnection::Connection(connection), "Root", Arc::from(""), Value::Null),
		}
	}
}

impl private::Sealed for Root {}

impl ChannelOwner for Root {
	fn base(&self) -> &ChannelOwnerImpl {
		&self.base
	}
}
