//! Table of updates awaiting acknowledgment.
//!
//! Each entry is keyed by its `clientToken` and carries a deadline. An entry
//! leaves the table exactly once: taken by a matching reply, taken by the
//! expiry sweep, or removed after a failed publish. Callers invoke
//! [`PendingUpdate::resolve`] only after the entry is out of the table.

use crate::error::{ShadowError, ShadowResult};
use devshadow_protocol::AckCode;
use std::fmt;
use std::time::Instant;

/// Callback receiving the outcome of an update and the reply message exactly
/// as it arrived on the wire. Timeouts carry no reply.
pub type UpdateCallback = Box<dyn FnOnce(AckCode, Option<&[u8]>) + Send>;

/// An update awaiting acknowledgment.
pub struct PendingUpdate {
    token: String,
    deadline: Instant,
    callback: UpdateCallback,
}

impl PendingUpdate {
    /// Returns the correlation token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the deadline.
    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Returns true if the deadline has passed at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }

    /// Consumes the entry and runs its callback.
    pub fn resolve(self, ack: AckCode, reply: Option<&[u8]>) {
        (self.callback)(ack, reply);
    }
}

impl fmt::Debug for PendingUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingUpdate")
            .field("token", &self.token)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

/// Bounded table of pending updates.
#[derive(Debug)]
pub struct AckWaitList {
    capacity: usize,
    entries: Vec<PendingUpdate>,
}

impl AckWaitList {
    /// Creates an empty table holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::new(),
        }
    }

    /// Adds an entry.
    ///
    /// Fails with [`ShadowError::WaitListOverflow`] when full and with
    /// [`ShadowError::InvalidArgument`] if the token is already live.
    pub fn register(
        &mut self,
        token: impl Into<String>,
        deadline: Instant,
        callback: UpdateCallback,
    ) -> ShadowResult<()> {
        let token = token.into();
        if self.contains(&token) {
            return Err(ShadowError::InvalidArgument(format!(
                "token {token} is already pending"
            )));
        }
        if self.entries.len() >= self.capacity {
            return Err(ShadowError::WaitListOverflow {
                capacity: self.capacity,
            });
        }

        self.entries.push(PendingUpdate {
            token,
            deadline,
            callback,
        });
        Ok(())
    }

    /// Removes and returns the entry for `token`.
    pub fn take(&mut self, token: &str) -> Option<PendingUpdate> {
        let index = self.entries.iter().position(|e| e.token == token)?;
        Some(self.entries.remove(index))
    }

    /// Removes and returns every entry whose deadline has passed at `now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<PendingUpdate> {
        let (expired, live): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.is_expired(now));
        self.entries = live;
        expired
    }

    /// Removes and returns every entry.
    pub fn drain(&mut self) -> Vec<PendingUpdate> {
        std::mem::take(&mut self.entries)
    }

    /// Returns true if `token` is live.
    pub fn contains(&self, token: &str) -> bool {
        self.entries.iter().any(|e| e.token == token)
    }

    /// Returns the live tokens.
    pub fn tokens(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.token.clone()).collect()
    }

    /// Returns the number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the maximum number of entries.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
