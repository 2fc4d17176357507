//! Publish/subscribe transport abstraction.

use crate::error::{ShadowError, ShadowResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Identifier the transport assigns to a subscribe request.
pub type PacketId = u32;

/// Events a transport delivers to the shadow context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The subscription with this packet id was acknowledged.
    SubscribeSuccess(PacketId),
    /// The subscription with this packet id was never acknowledged.
    SubscribeTimeout(PacketId),
    /// The subscription with this packet id was refused.
    SubscribeNack(PacketId),
    /// A message arrived on a subscribed topic.
    Message {
        /// Topic the message arrived on.
        topic: String,
        /// Raw message bytes.
        payload: Vec<u8>,
    },
}

/// A publish/subscribe client carrying shadow traffic.
///
/// This trait abstracts the MQTT (or similar) client. All events are
/// delivered from inside [`yield_events`](Self::yield_events), and the
/// handler may publish, so implementations must not hold their own locks
/// while invoking it.
pub trait ShadowTransport: Send + Sync {
    /// Establishes the connection.
    fn connect(&self) -> ShadowResult<()>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;

    /// Subscribes to a topic; the outcome arrives later as an event.
    fn subscribe(&self, topic: &str) -> ShadowResult<PacketId>;

    /// Unsubscribes from a topic.
    fn unsubscribe(&self, topic: &str) -> ShadowResult<()>;

    /// Publishes a message.
    fn publish(&self, topic: &str, payload: &[u8]) -> ShadowResult<()>;

    /// Runs receive and retry processing for up to `timeout`, passing every
    /// event to `handler`.
    fn yield_events(
        &self,
        timeout: Duration,
        handler: &mut dyn FnMut(TransportEvent),
    ) -> ShadowResult<()>;

    /// Closes the connection.
    fn disconnect(&self) -> ShadowResult<()>;
}

/// Produces the events a publish triggers, such as a cloud reply.
pub type Responder = Arc<dyn Fn(&str, &[u8]) -> Vec<TransportEvent> + Send + Sync>;

/// How a [`MockTransport`] answers subscribe requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscribeOutcome {
    /// Queue a `SubscribeSuccess`.
    #[default]
    Ack,
    /// Queue a `SubscribeTimeout`.
    Timeout,
    /// Queue a `SubscribeNack`.
    Nack,
    /// Queue nothing.
    Silent,
}

/// A message recorded by [`MockTransport::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Topic published to.
    pub topic: String,
    /// Message bytes.
    pub payload: Vec<u8>,
}

impl Published {
    /// Returns the payload as text.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Default)]
struct MockState {
    connected: bool,
    fail_connect: bool,
    fail_publish: bool,
    subscribe_outcome: SubscribeOutcome,
    next_packet_id: PacketId,
    subscriptions: Vec<String>,
    unsubscribed: Vec<String>,
    published: Vec<Published>,
    inbox: VecDeque<TransportEvent>,
    responder: Option<Responder>,
    disconnects: usize,
}

/// A mock transport for testing.
///
/// Clones share state, so a test can keep one handle after moving another
/// into a shadow context.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// How long an idle `yield_events` sleeps.
const IDLE_SLEEP: Duration = Duration::from_millis(2);

impl MockTransport {
    /// Creates a new, disconnected mock transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `connect` fail.
    pub fn set_fail_connect(&self, fail: bool) {
        self.state.lock().fail_connect = fail;
    }

    /// Makes every `publish` fail.
    pub fn set_fail_publish(&self, fail: bool) {
        self.state.lock().fail_publish = fail;
    }

    /// Sets how subscribe requests are answered.
    pub fn set_subscribe_outcome(&self, outcome: SubscribeOutcome) {
        self.state.lock().subscribe_outcome = outcome;
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.state.lock().connected = connected;
    }

    /// Installs a responder invoked for every successful publish.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: Fn(&str, &[u8]) -> Vec<TransportEvent> + Send + Sync + 'static,
    {
        self.state.lock().responder = Some(Arc::new(responder));
    }

    /// Removes the responder.
    pub fn clear_responder(&self) {
        self.state.lock().responder = None;
    }

    /// Queues an inbound message.
    pub fn push_message(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.push_event(TransportEvent::Message {
            topic: topic.into(),
            payload: payload.into(),
        });
    }

    /// Queues an arbitrary event.
    pub fn push_event(&self, event: TransportEvent) {
        self.state.lock().inbox.push_back(event);
    }

    /// Returns every published message.
    pub fn published(&self) -> Vec<Published> {
        self.state.lock().published.clone()
    }

    /// Returns the number of published messages.
    pub fn published_count(&self) -> usize {
        self.state.lock().published.len()
    }

    /// Returns the most recently published message.
    pub fn last_published(&self) -> Option<Published> {
        self.state.lock().published.last().cloned()
    }

    /// Returns the topics subscribed to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    /// Returns the topics unsubscribed from.
    pub fn unsubscribed(&self) -> Vec<String> {
        self.state.lock().unsubscribed.clone()
    }

    /// Returns how many times `disconnect` was called.
    pub fn disconnect_count(&self) -> usize {
        self.state.lock().disconnects
    }

    /// Returns the number of queued events.
    pub fn queued_events(&self) -> usize {
        self.state.lock().inbox.len()
    }
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockTransport")
            .field("connected", &state.connected)
            .field("published", &state.published.len())
            .field("queued", &state.inbox.len())
            .finish()
    }
}

impl ShadowTransport for MockTransport {
    fn connect(&self) -> ShadowResult<()> {
        let mut state = self.state.lock();
        if state.fail_connect {
            return Err(ShadowError::transport_retryable("mock connect refused"));
        }
        state.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.state.lock().connected
    }

    fn subscribe(&self, topic: &str) -> ShadowResult<PacketId> {
        let mut state = self.state.lock();
        if !state.connected {
            return Err(ShadowError::InvalidState);
        }

        state.next_packet_id += 1;
        let packet_id = state.next_packet_id;
        state.subscriptions.push(topic.to_string());

        let event = match state.subscribe_outcome {
            SubscribeOutcome::Ack => Some(TransportEvent::SubscribeSuccess(packet_id)),
            SubscribeOutcome::Timeout => Some(TransportEvent::SubscribeTimeout(packet_id)),
            SubscribeOutcome::Nack => Some(TransportEvent::SubscribeNack(packet_id)),
            SubscribeOutcome::Silent => None,
        };
        state.inbox.extend(event);
        Ok(packet_id)
    }

    fn unsubscribe(&self, topic: &str) -> ShadowResult<()> {
        let mut state = self.state.lock();
        state.subscriptions.retain(|t| t != topic);
        state.unsubscribed.push(topic.to_string());
        Ok(())
    }

    fn publish(&self, topic: &str, payload: &[u8]) -> ShadowResult<()> {
        let responder = {
            let mut state = self.state.lock();
            if !state.connected {
                return Err(ShadowError::InvalidState);
            }
            if state.fail_publish {
                return Err(ShadowError::transport_retryable("mock publish failed"));
            }
            state.published.push(Published {
                topic: topic.to_string(),
                payload: payload.to_vec(),
            });
            state.responder.clone()
        };

        if let Some(responder) = responder {
            let events = responder(topic, payload);
            self.state.lock().inbox.extend(events);
        }
        Ok(())
    }

    fn yield_events(
        &self,
        timeout: Duration,
        handler: &mut dyn FnMut(TransportEvent),
    ) -> ShadowResult<()> {
        let mut delivered = 0usize;
        loop {
            // The guard is released before the handler runs.
            let event = self.state.lock().inbox.pop_front();
            match event {
                Some(event) => {
                    handler(event);
                    delivered += 1;
                }
                None => break,
            }
        }

        if delivered == 0 {
            std::thread::sleep(timeout.min(IDLE_SLEEP));
        }
        Ok(())
    }

    fn disconnect(&self) -> ShadowResult<()> {
        let mut state = self.state.lock();
        state.connected = false;
        state.disconnects += 1;
        Ok(())
    }
}
