//! Desired-state dispatch.
//!
//! Resolution happens under the context lock and produces a list of
//! [`DeltaUpdate`]s; applying them (storing values, running callbacks)
//! happens after the lock is released.

use crate::attribute::{Attribute, AttributeRegistry};
use devshadow_protocol::AttrValue;
use serde_json::Value;
use tracing::{debug, warn};

/// A decoded desired value bound to its registered attribute.
#[derive(Debug)]
pub struct DeltaUpdate {
    attribute: Attribute,
    value: AttrValue,
}

impl DeltaUpdate {
    /// Returns the attribute being updated.
    pub fn attribute(&self) -> &Attribute {
        &self.attribute
    }

    /// Returns the decoded value.
    pub fn value(&self) -> &AttrValue {
        &self.value
    }

    /// Stores the value in the attribute, then runs its callback.
    pub fn apply(self) {
        if let Some(callback) = self.attribute.store_delta(self.value.clone()) {
            callback(&self.value);
        }
    }
}

/// Matches desired entries against the registry.
///
/// Unknown keys and values whose JSON type does not match the attribute's
/// kind are skipped.
pub fn resolve_delta<'a, I>(registry: &AttributeRegistry, entries: I) -> Vec<DeltaUpdate>
where
    I: IntoIterator<Item = (&'a str, &'a Value)>,
{
    let mut updates = Vec::new();

    for (name, raw) in entries {
        let Some(attribute) = registry.get(name) else {
            debug!(attribute = name, "ignoring desired value for unregistered attribute");
            continue;
        };

        match AttrValue::from_json(raw, attribute.kind()) {
            Some(value) => updates.push(DeltaUpdate {
                attribute: attribute.clone(),
                value,
            }),
            None => warn!(
                attribute = name,
                kind = %attribute.kind(),
                value = %raw,
                "desired value does not match attribute kind"
            ),
        }
    }

    updates
}
