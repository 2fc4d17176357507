//! Configuration for a shadow context.

use std::time::Duration;

/// Default number of updates that may await acknowledgment at once.
pub const DEFAULT_WAIT_LIST_CAPACITY: usize = 10;

/// Default capacity of internally composed requests.
pub const DEFAULT_REQUEST_BUFFER_SIZE: usize = 256;

/// Configuration for a shadow context.
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    /// Product the device belongs to.
    pub product_key: String,
    /// Device name, unique within the product.
    pub device_name: String,
    /// Maximum number of pending updates.
    pub wait_list_capacity: usize,
    /// Capacity of requests built by `sync` and `delete_attribute`.
    pub request_buffer_size: usize,
    /// Quantum passed to `yield_for` while `update_sync` waits.
    pub yield_quantum: Duration,
    /// Quantum passed to `yield_for` while construction waits.
    pub construct_yield: Duration,
    /// Timeout for requests issued by `sync` and `delete_attribute`.
    pub request_timeout: Duration,
    /// Upper bound on the initial subscription wait.
    pub initial_sync_timeout: Duration,
    /// Upper bound on draining pending updates during teardown.
    pub teardown_grace: Duration,
}

impl ShadowConfig {
    /// Creates a configuration for the given device identity.
    pub fn new(product_key: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            product_key: product_key.into(),
            device_name: device_name.into(),
            wait_list_capacity: DEFAULT_WAIT_LIST_CAPACITY,
            request_buffer_size: DEFAULT_REQUEST_BUFFER_SIZE,
            yield_quantum: Duration::from_millis(200),
            construct_yield: Duration::from_millis(100),
            request_timeout: Duration::from_secs(10),
            initial_sync_timeout: Duration::from_secs(10),
            teardown_grace: Duration::from_secs(2),
        }
    }

    /// Sets the wait list capacity.
    pub fn with_wait_list_capacity(mut self, capacity: usize) -> Self {
        self.wait_list_capacity = capacity;
        self
    }

    /// Sets the capacity of internally composed requests.
    pub fn with_request_buffer_size(mut self, size: usize) -> Self {
        self.request_buffer_size = size;
        self
    }

    /// Sets the `update_sync` yield quantum.
    pub fn with_yield_quantum(mut self, quantum: Duration) -> Self {
        self.yield_quantum = quantum;
        self
    }

    /// Sets the construction yield quantum.
    pub fn with_construct_yield(mut self, quantum: Duration) -> Self {
        self.construct_yield = quantum;
        self
    }

    /// Sets the timeout for `sync` and `delete_attribute`.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the bound on the initial subscription wait.
    pub fn with_initial_sync_timeout(mut self, timeout: Duration) -> Self {
        self.initial_sync_timeout = timeout;
        self
    }

    /// Sets the teardown drain bound.
    pub fn with_teardown_grace(mut self, grace: Duration) -> Self {
        self.teardown_grace = grace;
        self
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self::new("", "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shadow_config_builder() {
        let config = ShadowConfig::new("a1B2c3", "lamp")
            .with_wait_list_capacity(4)
            .with_request_buffer_size(512)
            .with_yield_quantum(Duration::from_millis(10))
            .with_request_timeout(Duration::from_secs(3))
            .with_teardown_grace(Duration::ZERO);

        assert_eq!(config.product_key, "a1B2c3");
        assert_eq!(config.device_name, "lamp");
        assert_eq!(config.wait_list_capacity, 4);
        assert_eq!(config.request_buffer_size, 512);
        assert_eq!(config.yield_quantum, Duration::from_millis(10));
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.teardown_grace, Duration::ZERO);
    }

    #[test]
    fn defaults() {
        let config = ShadowConfig::default();
        assert_eq!(config.wait_list_capacity, DEFAULT_WAIT_LIST_CAPACITY);
        assert_eq!(config.request_buffer_size, DEFAULT_REQUEST_BUFFER_SIZE);
        assert_eq!(config.yield_quantum, Duration::from_millis(200));
        assert_eq!(config.construct_yield, Duration::from_millis(100));
    }
}
