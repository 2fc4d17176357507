//! Topic naming.

/// Topics used by one device's shadow.
///
/// Requests of every method are published on the update topic; replies and
/// control messages arrive on the get topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowTopics {
    update: String,
    get: String,
}

impl ShadowTopics {
    /// Derives the topics from the device identity.
    pub fn for_device(product_key: &str, device_name: &str) -> Self {
        Self {
            update: format!("/shadow/update/{product_key}/{device_name}"),
            get: format!("/shadow/get/{product_key}/{device_name}"),
        }
    }

    /// Topic requests are published to.
    pub fn update(&self) -> &str {
        &self.update
    }

    /// Topic replies and control messages arrive on.
    pub fn get(&self) -> &str {
        &self.get
    }
}
