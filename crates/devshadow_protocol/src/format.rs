//! Incremental, capacity-checked patch builder.
//!
//! A patch is assembled in three steps:
//!
//! 1. [`PatchBuilder::init`] writes the envelope (`method`, `clientToken`)
//!    followed by a caller-supplied opening fragment.
//! 2. [`PatchBuilder::add`] appends one `"name":value` pair per call.
//! 3. [`PatchBuilder::finalize`] appends the closing fragment and closes the
//!    envelope.
//!
//! Every append is checked against the remaining capacity first. A write
//! that does not fit fails and leaves the buffer exactly as it was.

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::Method;
use crate::value::AttrValue;
use serde_json::Value;

/// Opening fragment for requests that carry reported state.
pub const REPORTED_OPENING: &str = ",\"state\":{\"reported\":{";

/// Closing fragment matching [`REPORTED_OPENING`].
pub const REPORTED_CLOSING: &str = "}}";

/// Builds one outbound shadow request.
#[derive(Debug)]
pub struct PatchBuilder {
    buf: String,
    capacity: usize,
    method: Method,
    token: String,
    fields: usize,
}

impl PatchBuilder {
    /// Starts a request with the given method and correlation token.
    ///
    /// Fails with [`ProtocolError::NoMemory`] if the envelope and opening
    /// fragment alone exceed `capacity`.
    pub fn init(
        method: Method,
        token: impl Into<String>,
        capacity: usize,
        opening: Option<&str>,
    ) -> ProtocolResult<Self> {
        let token = token.into();
        let mut envelope = format!(
            "{{\"method\":\"{}\",\"clientToken\":{}",
            method.as_str(),
            Value::from(token.as_str())
        );
        if let Some(opening) = opening {
            envelope.push_str(opening);
        }

        if envelope.len() > capacity {
            return Err(ProtocolError::NoMemory {
                needed: envelope.len(),
                capacity,
            });
        }

        // Capacity only bounds the output; the buffer grows as fields land.
        Ok(Self {
            buf: envelope,
            capacity,
            method,
            token,
            fields: 0,
        })
    }

    /// Starts an `update` request whose pairs land under `state.reported`.
    pub fn update(token: impl Into<String>, capacity: usize) -> ProtocolResult<Self> {
        Self::init(Method::Update, token, capacity, Some(REPORTED_OPENING))
    }

    /// Starts a `delete` request whose pairs land under `state.reported`.
    pub fn delete(token: impl Into<String>, capacity: usize) -> ProtocolResult<Self> {
        Self::init(Method::Delete, token, capacity, Some(REPORTED_OPENING))
    }

    /// Starts a `get` request.
    pub fn get(token: impl Into<String>, capacity: usize) -> ProtocolResult<Self> {
        Self::init(Method::Get, token, capacity, None)
    }

    /// Appends one key/value pair.
    pub fn add(&mut self, name: &str, value: &AttrValue) -> ProtocolResult<()> {
        let mut fragment = String::new();
        if self.fields > 0 {
            fragment.push(',');
        }
        fragment.push_str(&Value::from(name).to_string());
        fragment.push(':');
        fragment.push_str(&value.to_json_literal());

        self.append(&fragment)?;
        self.fields += 1;
        Ok(())
    }

    /// Appends the closing fragment, closes the envelope and returns the patch.
    pub fn finalize(mut self, closing: Option<&str>) -> ProtocolResult<Patch> {
        let mut tail = String::from(closing.unwrap_or(""));
        tail.push('}');
        self.append(&tail)?;

        Ok(Patch {
            method: self.method,
            token: self.token,
            text: self.buf,
        })
    }

    /// Returns the write cursor.
    pub fn offset(&self) -> usize {
        self.buf.len()
    }

    /// Returns the capacity the builder was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the bytes still available.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    /// Returns the number of pairs added so far.
    pub fn field_count(&self) -> usize {
        self.fields
    }

    /// Returns the request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the correlation token written into the envelope.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the partial document written so far.
    pub fn as_str(&self) -> &str {
        &self.buf
    }

    fn append(&mut self, fragment: &str) -> ProtocolResult<()> {
        if fragment.len() > self.remaining() {
            return Err(ProtocolError::NoEnoughSpace {
                needed: fragment.len(),
                remaining: self.remaining(),
            });
        }
        self.buf.push_str(fragment);
        Ok(())
    }
}

/// A finalized request ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    method: Method,
    token: String,
    text: String,
}

impl Patch {
    /// Returns the request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// Returns the correlation token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the bytes to publish.
    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    /// Returns the document as text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Returns the publish length in bytes.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    /// Returns true if the patch is empty. A finalized patch never is.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Consumes the patch, returning its bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.text.into_bytes()
    }
}
