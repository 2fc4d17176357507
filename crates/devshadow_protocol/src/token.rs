//! Correlation token generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// Generates `clientToken` values for outbound requests.
///
/// Tokens have the form `{product_key}-{device_name}-{n}`. Each shadow
/// context owns its own generator, so two contexts never share a sequence.
#[derive(Debug)]
pub struct TokenGenerator {
    prefix: String,
    next: AtomicU64,
}

impl TokenGenerator {
    /// Creates a generator for the given device identity.
    pub fn new(product_key: &str, device_name: &str) -> Self {
        Self {
            prefix: format!("{product_key}-{device_name}"),
            next: AtomicU64::new(1),
        }
    }

    /// Returns a fresh token.
    pub fn next_token(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.prefix, n)
    }

    /// Returns how many tokens have been issued.
    pub fn issued(&self) -> u64 {
        self.next.load(Ordering::Relaxed) - 1
    }
}
