//! Wire types for the Playwright channel protocol.
//!
//! This crate contains the serde-serializable shapes exchanged with the
//! Playwright driver. Every inbound frame decodes into a [`Message`]: either a
//! [`Response`] correlated to an earlier [`Request`] by id, or an [`Event`]
//! addressed to a remote object by guid. Three reserved event names carry
//! object lifecycle control, see [`lifecycle`].
//!
//! Types in this crate are pure data. The correlation and dispatch logic that
//! consumes them lives in `pw-runtime`.

pub mod lifecycle;
pub mod message;
pub mod metadata;

pub use lifecycle::{ADOPT, AdoptParams, CREATE, CreateParams, DISPOSE, DisposeParams};
pub use message::{ErrorPayload, ErrorWrapper, Event, Message, Request, Response};
pub use metadata::{Location, Metadata, StackFrame};
