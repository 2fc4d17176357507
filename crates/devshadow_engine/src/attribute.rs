//! Attributes and the attribute registry.

use crate::error::{ShadowError, ShadowResult};
use devshadow_protocol::{AttrKind, AttrValue};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Callback invoked with the new value when a delta is applied.
pub type DeltaCallback = Arc<dyn Fn(&AttrValue) + Send + Sync>;

/// A named, typed device attribute.
///
/// `Attribute` is a cheap handle: clones share the same value cell, so the
/// application can keep one clone and register another. The kind is fixed
/// at creation.
#[derive(Clone)]
pub struct Attribute {
    name: Arc<str>,
    kind: AttrKind,
    value: Arc<RwLock<AttrValue>>,
    on_delta: Option<DeltaCallback>,
}

impl Attribute {
    /// Creates an attribute holding `initial`; its kind is the value's kind.
    pub fn new(name: impl Into<String>, initial: impl Into<AttrValue>) -> Self {
        let initial = initial.into();
        Self {
            name: Arc::from(name.into()),
            kind: initial.kind(),
            value: Arc::new(RwLock::new(initial)),
            on_delta: None,
        }
    }

    /// Creates an attribute of the given kind holding its zero value.
    pub fn with_kind(name: impl Into<String>, kind: AttrKind) -> Self {
        let initial = match kind {
            AttrKind::String => AttrValue::String(String::new()),
            AttrKind::Int => AttrValue::Int(0),
            AttrKind::Float => AttrValue::Float(0.0),
            AttrKind::Bool => AttrValue::Bool(false),
            AttrKind::Null => AttrValue::Null,
        };
        Self::new(name, initial)
    }

    /// Sets the callback invoked after a delta updates this attribute.
    pub fn on_delta<F>(mut self, callback: F) -> Self
    where
        F: Fn(&AttrValue) + Send + Sync + 'static,
    {
        self.on_delta = Some(Arc::new(callback));
        self
    }

    /// Returns the attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the attribute kind.
    pub fn kind(&self) -> AttrKind {
        self.kind
    }

    /// Returns a copy of the current value.
    pub fn value(&self) -> AttrValue {
        self.value.read().clone()
    }

    /// Replaces the current value.
    ///
    /// Fails with [`ShadowError::InvalidArgument`] if the kind differs.
    pub fn set(&self, value: impl Into<AttrValue>) -> ShadowResult<()> {
        let value = value.into();
        if value.kind() != self.kind {
            return Err(ShadowError::InvalidArgument(format!(
                "attribute {} is {}, got {}",
                self.name,
                self.kind,
                value.kind()
            )));
        }
        *self.value.write() = value;
        Ok(())
    }

    /// Returns true if a delta callback is set.
    pub fn has_delta_callback(&self) -> bool {
        self.on_delta.is_some()
    }

    /// Stores a delta value and returns the callback to run afterwards.
    pub(crate) fn store_delta(&self, value: AttrValue) -> Option<DeltaCallback> {
        *self.value.write() = value;
        self.on_delta.clone()
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("value", &*self.value.read())
            .field("on_delta", &self.on_delta.is_some())
            .finish()
    }
}

/// Ordered set of registered attributes with unique names.
#[derive(Debug, Default)]
pub struct AttributeRegistry {
    attributes: Vec<Attribute>,
}

impl AttributeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an attribute.
    ///
    /// Fails with [`ShadowError::AttrExists`] if the name is taken; the
    /// registry is left unchanged.
    pub fn register(&mut self, attribute: Attribute) -> ShadowResult<()> {
        if self.contains(attribute.name()) {
            return Err(ShadowError::AttrExists(attribute.name().to_string()));
        }
        self.attributes.push(attribute);
        Ok(())
    }

    /// Returns true if an attribute with this name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name() == name)
    }

    /// Looks up an attribute by name.
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name() == name)
    }

    /// Removes an attribute by name.
    pub fn remove(&mut self, name: &str) -> Option<Attribute> {
        let index = self.attributes.iter().position(|a| a.name() == name)?;
        Some(self.attributes.remove(index))
    }

    /// Returns the registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.attributes.iter().map(|a| a.name().to_string()).collect()
    }

    /// Iterates over attributes in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    /// Returns the number of registered attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Removes every attribute.
    pub fn clear(&mut self) {
        self.attributes.clear();
    }
}
