//! # Device Shadow Engine
//!
//! Keeps a device's attributes in sync with its cloud-side shadow document.
//!
//! This crate provides:
//! - Attribute registry with typed values and desired-value callbacks
//! - Acknowledgment wait list correlating replies by `clientToken`
//! - Asynchronous and blocking updates with deadlines
//! - Delta dispatch for control messages and document pulls
//! - Transport abstraction with an in-memory mock and a simulated cloud
//!
//! ## Architecture
//!
//! The engine is driven by the caller. Nothing happens in the background:
//! every reply, control message and timeout is processed inside
//! [`ShadowContext::yield_for`], which the blocking operations call in a
//! loop until their own acknowledgment arrives.
//!
//! ## Key Invariants
//!
//! - Every pending update is resolved exactly once
//! - Callbacks never run while the context lock is held
//! - A failed publish leaves no pending entry behind
//! - Attribute names are unique within a context

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod attribute;
mod cloud;
mod config;
mod context;
mod delta;
mod error;
mod transport;
mod wait_list;

pub use attribute::{Attribute, AttributeRegistry, DeltaCallback};
pub use cloud::{reply_message, SimulatedCloud};
pub use config::{ShadowConfig, DEFAULT_REQUEST_BUFFER_SIZE, DEFAULT_WAIT_LIST_CAPACITY};
pub use context::{DocumentMetadata, InitialSync, ShadowContext};
pub use delta::{resolve_delta, DeltaUpdate};
pub use error::{ShadowError, ShadowResult};
pub use transport::{
    MockTransport, PacketId, Published, Responder, ShadowTransport, SubscribeOutcome,
    TransportEvent,
};
pub use wait_list::{AckWaitList, PendingUpdate, UpdateCallback};

pub use devshadow_protocol::{AckCode, AttrKind, AttrValue, Patch, PatchBuilder};
