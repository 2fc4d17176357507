//! # Device Shadow Protocol
//!
//! Wire types for the device shadow.
//!
//! This crate provides:
//! - `AttrValue` / `AttrKind` for typed attribute values
//! - `PatchBuilder` for capacity-checked request composition
//! - `TokenGenerator` for `clientToken` correlation ids
//! - `AckCode` and `InboundMessage` for decoding replies and control messages
//! - `ShadowTopics` for topic naming
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod ack;
mod error;
mod format;
mod message;
mod token;
mod topic;
mod value;

pub use ack::AckCode;
pub use error::{ProtocolError, ProtocolResult};
pub use format::{Patch, PatchBuilder, REPORTED_CLOSING, REPORTED_OPENING};
pub use message::{desired_state, extract_client_token, InboundMessage, Method, ENVELOPE_KEYS};
pub use token::TokenGenerator;
pub use topic::ShadowTopics;
pub use value::{AttrKind, AttrValue};
