//! Shadow context and lifecycle.

use crate::attribute::{Attribute, AttributeRegistry};
use crate::config::ShadowConfig;
use crate::delta::resolve_delta;
use crate::error::{ShadowError, ShadowResult};
use crate::transport::{PacketId, ShadowTransport, TransportEvent};
use crate::wait_list::AckWaitList;
use devshadow_protocol::{
    extract_client_token, AckCode, AttrValue, InboundMessage, Method, Patch, PatchBuilder,
    ShadowTopics, TokenGenerator, REPORTED_CLOSING,
};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Progress of the initial subscription made during construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitialSync {
    /// Waiting for the subscription with this packet id to settle.
    Pending(PacketId),
    /// The subscription was acknowledged.
    Synced,
    /// The subscription timed out or was refused.
    Failed,
}

/// Last-known metadata of the remote document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DocumentMetadata {
    /// Document version.
    pub version: Option<u64>,
    /// Cloud timestamp of the latest message.
    pub timestamp: Option<u64>,
}

/// State guarded by the context lock.
#[derive(Debug)]
struct SharedState {
    attributes: AttributeRegistry,
    wait_list: AckWaitList,
}

/// A device shadow bound to one transport connection.
///
/// All protocol progress happens inside [`yield_for`](Self::yield_for):
/// replies are matched, deltas applied and expired updates reclaimed there.
/// The lock guarding the registry and the wait list is held only for
/// lookups and mutations, never across a publish or a user callback.
pub struct ShadowContext<T: ShadowTransport> {
    config: ShadowConfig,
    topics: ShadowTopics,
    tokens: TokenGenerator,
    transport: Option<T>,
    state: Mutex<SharedState>,
    initial_sync: Mutex<Option<InitialSync>>,
    metadata: RwLock<DocumentMetadata>,
    subscribed: AtomicBool,
    torn_down: bool,
}

impl<T: ShadowTransport> ShadowContext<T> {
    /// Connects the transport, subscribes the reply topic, requests the
    /// document and blocks until the subscription settles.
    ///
    /// On any failure everything acquired so far is released and no context
    /// is returned.
    pub fn construct(config: ShadowConfig, transport: T) -> ShadowResult<Self> {
        if config.product_key.is_empty() || config.device_name.is_empty() {
            return Err(ShadowError::InvalidArgument(
                "product key and device name are required".into(),
            ));
        }
        if config.wait_list_capacity == 0 {
            return Err(ShadowError::InvalidArgument(
                "wait list capacity must be positive".into(),
            ));
        }

        info!(
            product_key = %config.product_key,
            device_name = %config.device_name,
            "constructing device shadow"
        );

        let mut shadow = Self {
            topics: ShadowTopics::for_device(&config.product_key, &config.device_name),
            tokens: TokenGenerator::new(&config.product_key, &config.device_name),
            transport: None,
            state: Mutex::new(SharedState {
                attributes: AttributeRegistry::new(),
                wait_list: AckWaitList::new(config.wait_list_capacity),
            }),
            initial_sync: Mutex::new(None),
            metadata: RwLock::new(DocumentMetadata::default()),
            subscribed: AtomicBool::new(false),
            torn_down: false,
            config,
        };

        if let Err(e) = shadow.start(transport) {
            warn!(error = %e, "device shadow construction failed");
            shadow.teardown(false);
            return Err(e);
        }

        info!("device shadow ready");
        Ok(shadow)
    }

    fn start(&mut self, transport: T) -> ShadowResult<()> {
        transport.connect()?;
        self.transport = Some(transport);

        let packet_id = self.transport()?.subscribe(self.topics.get())?;
        self.subscribed.store(true, Ordering::SeqCst);
        *self.initial_sync.lock() = Some(InitialSync::Pending(packet_id));
        debug!(packet_id, topic = %self.topics.get(), "subscribing reply topic");

        let request = PatchBuilder::get(self.tokens.next_token(), self.config.request_buffer_size)?
            .finalize(None)?;
        self.update_async(
            request.as_bytes(),
            self.config.request_timeout,
            |ack, _| debug!(%ack, "initial document request settled"),
        )?;

        let started = Instant::now();
        loop {
            match self.initial_sync() {
                Some(InitialSync::Pending(_)) | None => {}
                Some(InitialSync::Synced) => {
                    info!("sync device data successfully");
                    return Ok(());
                }
                Some(InitialSync::Failed) => {
                    info!("sync device data failed");
                    return Err(ShadowError::InitialSyncFailed);
                }
            }

            if started.elapsed() >= self.config.initial_sync_timeout {
                *self.initial_sync.lock() = Some(InitialSync::Failed);
                continue;
            }
            self.yield_for(self.config.construct_yield);
        }
    }

    fn transport(&self) -> ShadowResult<&T> {
        self.transport.as_ref().ok_or(ShadowError::InvalidState)
    }

    /// Pumps the transport for up to `timeout`, then reclaims expired updates.
    ///
    /// This is the only place callbacks run.
    pub fn yield_for(&self, timeout: Duration) {
        if let Some(transport) = self.transport.as_ref() {
            if let Err(e) = transport.yield_events(timeout, &mut |event| self.handle_event(event)) {
                debug!(error = %e, "transport yield failed");
            }
        }
        self.sweep_expired(Instant::now());
    }

    /// Resolves every pending update whose deadline has passed at `now`
    /// with [`AckCode::Timeout`]. Returns how many were resolved.
    pub fn sweep_expired(&self, now: Instant) -> usize {
        let expired = self.state.lock().wait_list.take_expired(now);
        let count = expired.len();
        for entry in expired {
            info!(token = entry.token(), "update wait ack timeout");
            entry.resolve(AckCode::Timeout, None);
        }
        count
    }

    fn handle_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::SubscribeSuccess(packet_id) => {
                info!(packet_id, "subscribe success");
                self.settle_initial_sync(packet_id, InitialSync::Synced);
            }
            TransportEvent::SubscribeTimeout(packet_id) => {
                info!(packet_id, "subscribe wait ack timeout");
                self.settle_initial_sync(packet_id, InitialSync::Failed);
            }
            TransportEvent::SubscribeNack(packet_id) => {
                info!(packet_id, "subscribe nack");
                self.settle_initial_sync(packet_id, InitialSync::Failed);
            }
            TransportEvent::Message { topic, payload } => {
                if topic == self.topics.get() {
                    self.handle_shadow_message(&payload);
                } else {
                    info!(
                        %topic,
                        payload = %String::from_utf8_lossy(&payload),
                        "topic message arrived but without any related handle"
                    );
                }
            }
        }
    }

    fn settle_initial_sync(&self, packet_id: PacketId, outcome: InitialSync) {
        let mut status = self.initial_sync.lock();
        if *status == Some(InitialSync::Pending(packet_id)) {
            *status = Some(outcome);
        }
    }

    fn handle_shadow_message(&self, payload: &[u8]) {
        let message = match InboundMessage::parse(payload) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "dropping invalid shadow message");
                return;
            }
        };

        self.update_metadata(&message);

        match message.method() {
            Some(Method::Control) => {
                debug!("receive 'control' method");
                self.dispatch_delta(message.desired_entries());
            }
            Some(Method::Reply) => {
                debug!("receive 'reply' method");
                self.handle_reply(&message, payload);
            }
            _ => warn!(method = ?message.method_name(), "invalid 'method' key"),
        }
    }

    fn update_metadata(&self, message: &InboundMessage) {
        let (version, timestamp) = (message.version(), message.timestamp());
        if version.is_none() && timestamp.is_none() {
            return;
        }
        let mut metadata = self.metadata.write();
        if let Some(timestamp) = timestamp {
            metadata.timestamp = Some(timestamp);
        }
        if let Some(version) = version {
            metadata.version = Some(version);
        }
    }

    fn handle_reply(&self, message: &InboundMessage, raw: &[u8]) {
        let Some(token) = message.client_token() else {
            debug!("dropping reply without clientToken");
            return;
        };

        let Some(entry) = self.state.lock().wait_list.take(token) else {
            debug!(token, "no pending update for reply");
            return;
        };

        let ack = message.ack_code();
        debug!(token, %ack, "update acknowledged");
        entry.resolve(ack, Some(raw));
    }

    /// Applies a control message: every registered attribute named in its
    /// desired state is updated and its callback invoked. Returns how many
    /// attributes were updated.
    pub fn apply_control_message(&self, raw: &[u8]) -> ShadowResult<usize> {
        let message = InboundMessage::parse(raw)?;
        self.update_metadata(&message);
        Ok(self.dispatch_delta(message.desired_entries()))
    }

    fn dispatch_delta<'a>(&self, entries: Vec<(&'a str, &'a Value)>) -> usize {
        let updates = resolve_delta(&self.state.lock().attributes, entries);
        let count = updates.len();
        for update in updates {
            debug!(attribute = update.attribute().name(), value = %update.value(), "applying desired value");
            update.apply();
        }
        count
    }

    /// Publishes an update and registers `callback` to receive its outcome.
    ///
    /// The payload must carry a `clientToken`. The pending entry is
    /// registered before publishing and removed again if the publish fails.
    pub fn update_async<F>(&self, payload: &[u8], timeout: Duration, callback: F) -> ShadowResult<()>
    where
        F: FnOnce(AckCode, Option<&[u8]>) + Send + 'static,
    {
        if payload.is_empty() {
            return Err(ShadowError::InvalidArgument("payload is empty".into()));
        }

        let transport = self.transport()?;
        if !transport.is_connected() {
            warn!("the transport must be connected before an update");
            return Err(ShadowError::InvalidState);
        }

        let token = extract_client_token(payload).map_err(|e| {
            ShadowError::InvalidArgument(format!("payload has no usable clientToken: {e}"))
        })?;
        let deadline = Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| ShadowError::InvalidArgument("timeout is too large".into()))?;

        self.state
            .lock()
            .wait_list
            .register(token.as_str(), deadline, Box::new(callback))?;

        if let Err(e) = transport.publish(self.topics.update(), payload) {
            self.state.lock().wait_list.take(&token);
            warn!(%token, error = %e, "publish failed, pending update removed");
            return Err(e);
        }

        debug!(%token, len = payload.len(), "update published");
        Ok(())
    }

    /// Publishes an update and blocks, yielding, until it is acknowledged or
    /// times out.
    ///
    /// An empty remote document counts as success.
    pub fn update_sync(&self, payload: &[u8], timeout: Duration) -> ShadowResult<()> {
        let (ack, _) = self.await_ack(payload, timeout)?;
        ack_to_result(ack)
    }

    fn await_ack(&self, payload: &[u8], timeout: Duration) -> ShadowResult<(AckCode, Option<Vec<u8>>)> {
        let slot = Arc::new(Mutex::new((AckCode::None, None::<Vec<u8>>)));
        let sink = Arc::clone(&slot);
        self.update_async(payload, timeout, move |ack, reply| {
            *sink.lock() = (ack, reply.map(<[u8]>::to_vec));
        })?;

        loop {
            {
                let mut outcome = slot.lock();
                if outcome.0.is_terminal() {
                    return Ok((outcome.0, outcome.1.take()));
                }
            }
            self.yield_for(self.config.yield_quantum);
        }
    }

    /// Requests the whole document and waits for the reply.
    ///
    /// Desired state carried by the reply is applied to registered
    /// attributes.
    pub fn sync(&self) -> ShadowResult<()> {
        info!("device shadow sync start");

        let request = PatchBuilder::get(self.tokens.next_token(), self.config.request_buffer_size)?
            .finalize(None)?;
        let (ack, reply) = self.await_ack(request.as_bytes(), self.config.request_timeout)?;

        let result = ack_to_result(ack);
        match &result {
            Ok(()) => {
                if let Some(reply) = reply.as_deref() {
                    self.apply_reply_desired(reply);
                }
                info!("device shadow sync success");
            }
            Err(e) => info!(error = %e, "device shadow sync failed"),
        }
        result
    }

    fn apply_reply_desired(&self, reply: &[u8]) {
        if let Ok(message) = InboundMessage::parse(reply) {
            self.dispatch_delta(message.desired_entries());
        }
    }

    /// Registers an attribute.
    ///
    /// Fails with [`ShadowError::AttrExists`] if the name is taken.
    pub fn register_attribute(&self, attribute: Attribute) -> ShadowResult<()> {
        let name = attribute.name().to_string();
        self.state.lock().attributes.register(attribute)?;
        debug!(attribute = %name, "attribute registered");
        Ok(())
    }

    /// Removes an attribute from the remote document, then locally.
    ///
    /// Fails with [`ShadowError::AttrNotExist`] without publishing anything
    /// if the attribute is not registered. If the remote delete fails the
    /// attribute stays registered.
    pub fn delete_attribute(&self, attribute: &Attribute) -> ShadowResult<()> {
        let name = attribute.name();
        if !self.state.lock().attributes.contains(name) {
            return Err(ShadowError::AttrNotExist(name.to_string()));
        }

        let mut builder =
            PatchBuilder::delete(self.tokens.next_token(), self.config.request_buffer_size)?;
        builder.add(name, &AttrValue::Null)?;
        let request = builder.finalize(Some(REPORTED_CLOSING))?;

        self.update_sync(request.as_bytes(), self.config.request_timeout)?;

        if self.state.lock().attributes.remove(name).is_none() {
            return Err(ShadowError::AttrNotExist(name.to_string()));
        }
        debug!(attribute = name, "attribute deleted");
        Ok(())
    }

    /// Reports the current values of `attributes` and waits for the ack.
    pub fn report(&self, attributes: &[&Attribute]) -> ShadowResult<()> {
        if attributes.is_empty() {
            return Err(ShadowError::InvalidArgument("nothing to report".into()));
        }

        let mut builder = self.update_format_init()?;
        for attribute in attributes {
            self.update_format_add(&mut builder, attribute)?;
        }
        let request = self.update_format_finalize(builder)?;
        self.update_sync(request.as_bytes(), self.config.request_timeout)
    }

    /// Starts an update request with the configured buffer size.
    pub fn update_format_init(&self) -> ShadowResult<PatchBuilder> {
        self.update_format_init_with_capacity(self.config.request_buffer_size)
    }

    /// Starts an update request with a fresh token and the given capacity.
    pub fn update_format_init_with_capacity(&self, capacity: usize) -> ShadowResult<PatchBuilder> {
        Ok(PatchBuilder::update(self.tokens.next_token(), capacity)?)
    }

    /// Appends the current value of `attribute`.
    pub fn update_format_add(&self, builder: &mut PatchBuilder, attribute: &Attribute) -> ShadowResult<()> {
        builder.add(attribute.name(), &attribute.value())?;
        Ok(())
    }

    /// Closes an update request.
    pub fn update_format_finalize(&self, builder: PatchBuilder) -> ShadowResult<Patch> {
        Ok(builder.finalize(Some(REPORTED_CLOSING))?)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ShadowConfig {
        &self.config
    }

    /// Returns the topics in use.
    pub fn topics(&self) -> &ShadowTopics {
        &self.topics
    }

    /// Returns the outcome of the initial subscription.
    pub fn initial_sync(&self) -> Option<InitialSync> {
        *self.initial_sync.lock()
    }

    /// Returns the last-known document metadata.
    pub fn metadata(&self) -> DocumentMetadata {
        *self.metadata.read()
    }

    /// Returns the last-known document version.
    pub fn document_version(&self) -> Option<u64> {
        self.metadata.read().version
    }

    /// Returns the last-known cloud timestamp.
    pub fn last_timestamp(&self) -> Option<u64> {
        self.metadata.read().timestamp
    }

    /// Returns the number of updates awaiting acknowledgment.
    pub fn pending_updates(&self) -> usize {
        self.state.lock().wait_list.len()
    }

    /// Returns true if `token` is awaiting acknowledgment.
    pub fn is_pending(&self, token: &str) -> bool {
        self.state.lock().wait_list.contains(token)
    }

    /// Returns the names of registered attributes.
    pub fn attribute_names(&self) -> Vec<String> {
        self.state.lock().attributes.names()
    }

    /// Returns true if an attribute with this name is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.state.lock().attributes.contains(name)
    }

    /// Tears the context down.
    ///
    /// Pending updates get up to `teardown_grace` to be acknowledged; any
    /// still pending afterwards resolve with [`AckCode::Timeout`].
    pub fn deconstruct(mut self) -> ShadowResult<()> {
        info!("deconstructing device shadow");
        self.teardown(true);
        Ok(())
    }

    fn teardown(&mut self, drain: bool) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if drain && self.transport.is_some() {
            let deadline = Instant::now() + self.config.teardown_grace;
            loop {
                let now = Instant::now();
                if self.pending_updates() == 0 || now >= deadline {
                    break;
                }
                self.yield_for(self.config.yield_quantum.min(deadline - now));
            }
        }

        let leftovers = self.state.lock().wait_list.drain();
        for entry in leftovers {
            debug!(token = entry.token(), "pending update dropped at teardown");
            entry.resolve(AckCode::Timeout, None);
        }

        if let Some(transport) = self.transport.take() {
            if self.subscribed.swap(false, Ordering::SeqCst) {
                if let Err(e) = transport.unsubscribe(self.topics.get()) {
                    warn!(error = %e, "unsubscribe failed");
                }
            }
            if let Err(e) = transport.disconnect() {
                warn!(error = %e, "transport disconnect failed");
            }
        }

        self.state.lock().attributes.clear();
        *self.initial_sync.lock() = None;
    }
}

impl<T: ShadowTransport> Drop for ShadowContext<T> {
    fn drop(&mut self) {
        self.teardown(false);
    }
}

fn ack_to_result(ack: AckCode) -> ShadowResult<()> {
    if ack.is_accepted() {
        info!("update success");
        Ok(())
    } else if ack == AckCode::Timeout {
        info!("update timeout");
        Err(ShadowError::UpdateTimeout)
    } else {
        info!(%ack, "update negative ack");
        Err(ShadowError::UpdateNegativeAck(ack))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::reply_message;
    use crate::transport::{MockTransport, SubscribeOutcome};

    fn config() -> ShadowConfig {
        ShadowConfig::new("pk", "dev")
            .with_yield_quantum(Duration::from_millis(5))
            .with_construct_yield(Duration::from_millis(5))
            .with_request_timeout(Duration::from_millis(200))
            .with_initial_sync_timeout(Duration::from_millis(200))
            .with_teardown_grace(Duration::ZERO)
    }

    fn construct() -> (ShadowContext<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        let shadow = ShadowContext::construct(config(), transport.clone()).unwrap();
        (shadow, transport)
    }

    fn reply_topic() -> &'static str {
        "/shadow/get/pk/dev"
    }

    #[test]
    fn construct_subscribes_and_requests_document() {
        let (shadow, transport) = construct();
        assert_eq!(shadow.initial_sync(), Some(InitialSync::Synced));
        assert_eq!(transport.subscriptions(), vec![reply_topic()]);

        let get = transport.published();
        assert_eq!(get.len(), 1);
        assert_eq!(get[0].topic, "/shadow/update/pk/dev");
        assert!(get[0].text().contains(r#""method":"get""#));
        assert_eq!(shadow.pending_updates(), 1);
    }

    #[test]
    fn construct_rejects_missing_identity() {
        let result = ShadowContext::construct(ShadowConfig::default(), MockTransport::new());
        assert!(matches!(result, Err(ShadowError::InvalidArgument(_))));
    }

    #[test]
    fn construct_fails_on_subscribe_nack() {
        let transport = MockTransport::new();
        transport.set_subscribe_outcome(SubscribeOutcome::Nack);
        let result = ShadowContext::construct(config(), transport.clone());
        assert!(matches!(result, Err(ShadowError::InitialSyncFailed)));
        assert!(!transport.is_connected());
        assert_eq!(transport.unsubscribed(), vec![reply_topic()]);
    }

    #[test]
    fn construct_gives_up_on_silent_subscribe() {
        let transport = MockTransport::new();
        transport.set_subscribe_outcome(SubscribeOutcome::Silent);
        let result = ShadowContext::construct(config(), transport.clone());
        assert!(matches!(result, Err(ShadowError::InitialSyncFailed)));
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[test]
    fn construct_fails_when_connect_fails() {
        let transport = MockTransport::new();
        transport.set_fail_connect(true);
        let result = ShadowContext::construct(config(), transport.clone());
        assert!(matches!(result, Err(ShadowError::Transport { .. })));
        assert!(transport.subscriptions().is_empty());
    }

    #[test]
    fn reply_matches_pending_update() {
        let (shadow, transport) = construct();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        shadow
            .update_async(
                br#"{"method":"update","clientToken":"tok-1","state":{"reported":{"a":1}}}"#,
                Duration::from_secs(5),
                move |ack, reply| sink.lock().push((ack, reply.is_some())),
            )
            .unwrap();
        assert!(shadow.is_pending("tok-1"));

        transport.push_message(reply_topic(), reply_message("tok-1", AckCode::Success, Some(3)));
        shadow.yield_for(Duration::ZERO);

        assert!(!shadow.is_pending("tok-1"));
        assert_eq!(*seen.lock(), vec![(AckCode::Success, true)]);
        assert_eq!(shadow.document_version(), Some(3));

        // A duplicate reply finds nothing.
        transport.push_message(reply_topic(), reply_message("tok-1", AckCode::Success, None));
        shadow.yield_for(Duration::ZERO);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn sweep_resolves_expired_updates() {
        let (shadow, _transport) = construct();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        shadow
            .update_async(
                br#"{"method":"update","clientToken":"tok-2"}"#,
                Duration::from_millis(50),
                move |ack, reply| sink.lock().push((ack, reply.is_none())),
            )
            .unwrap();

        assert_eq!(shadow.sweep_expired(Instant::now()), 0);
        let later = Instant::now() + Duration::from_secs(1);
        // The initial GET expires as well.
        assert_eq!(shadow.sweep_expired(later), 2);
        assert_eq!(*seen.lock(), vec![(AckCode::Timeout, true)]);
        assert_eq!(shadow.sweep_expired(later), 0);
    }

    #[test]
    fn callback_may_reuse_its_token() {
        let (shadow, transport) = construct();
        let shadow = Arc::new(shadow);
        let inner = Arc::clone(&shadow);
        let reissued = Arc::new(Mutex::new(None));
        let result = Arc::clone(&reissued);

        shadow
            .update_async(
                br#"{"method":"update","clientToken":"again"}"#,
                Duration::from_secs(5),
                move |_, _| {
                    *result.lock() = Some(inner.update_async(
                        br#"{"method":"update","clientToken":"again"}"#,
                        Duration::from_secs(5),
                        |_, _| {},
                    ));
                },
            )
            .unwrap();

        transport.push_message(reply_topic(), reply_message("again", AckCode::Success, None));
        shadow.yield_for(Duration::ZERO);

        assert_eq!(*reissued.lock(), Some(Ok(())));
        assert!(shadow.is_pending("again"));
    }

    #[test]
    fn update_async_requires_connection() {
        let (shadow, transport) = construct();
        transport.set_connected(false);
        let result = shadow.update_async(br#"{"clientToken":"x"}"#, Duration::from_secs(1), |_, _| {});
        assert_eq!(result, Err(ShadowError::InvalidState));
    }

    #[test]
    fn update_async_validates_payload() {
        let (shadow, _transport) = construct();
        assert!(matches!(
            shadow.update_async(b"", Duration::from_secs(1), |_, _| {}),
            Err(ShadowError::InvalidArgument(_))
        ));
        assert!(matches!(
            shadow.update_async(br#"{"method":"update"}"#, Duration::from_secs(1), |_, _| {}),
            Err(ShadowError::InvalidArgument(_))
        ));
    }

    #[test]
    fn failed_publish_leaves_no_pending_entry() {
        let (shadow, transport) = construct();
        let before = shadow.pending_updates();
        transport.set_fail_publish(true);

        let result = shadow.update_async(
            br#"{"method":"update","clientToken":"lost"}"#,
            Duration::from_secs(5),
            |_, _| panic!("callback must not run"),
        );
        assert!(matches!(result, Err(ShadowError::Transport { .. })));
        assert!(!shadow.is_pending("lost"));
        assert_eq!(shadow.pending_updates(), before);
    }

    #[test]
    fn wait_list_overflow() {
        let transport = MockTransport::new();
        let shadow =
            ShadowContext::construct(config().with_wait_list_capacity(2), transport.clone()).unwrap();

        // The initial GET occupies one slot.
        shadow
            .update_async(br#"{"clientToken":"a"}"#, Duration::from_secs(5), |_, _| {})
            .unwrap();
        let result = shadow.update_async(br#"{"clientToken":"b"}"#, Duration::from_secs(5), |_, _| {});
        assert_eq!(result, Err(ShadowError::WaitListOverflow { capacity: 2 }));
        assert_eq!(transport.published_count(), 2);
    }

    #[test]
    fn update_sync_maps_document_null_to_success() {
        let (shadow, transport) = construct();
        transport.set_responder(|_, payload| {
            let token = extract_client_token(payload).unwrap();
            vec![TransportEvent::Message {
                topic: reply_topic().into(),
                payload: reply_message(&token, AckCode::ShadowDocumentIsNull, None),
            }]
        });
        let patch = PatchBuilder::get("g-1", 64).unwrap().finalize(None).unwrap();
        assert_eq!(shadow.update_sync(patch.as_bytes(), Duration::from_secs(1)), Ok(()));
    }

    #[test]
    fn update_sync_reports_negative_ack() {
        let (shadow, transport) = construct();
        transport.set_responder(|_, payload| {
            let token = extract_client_token(payload).unwrap();
            vec![TransportEvent::Message {
                topic: reply_topic().into(),
                payload: reply_message(&token, AckCode::VersionIsInvalid, None),
            }]
        });
        let patch = PatchBuilder::get("g-2", 64).unwrap().finalize(None).unwrap();
        assert_eq!(
            shadow.update_sync(patch.as_bytes(), Duration::from_secs(1)),
            Err(ShadowError::UpdateNegativeAck(AckCode::VersionIsInvalid))
        );
    }

    #[test]
    fn callback_receives_reply_as_sent() {
        let (shadow, transport) = construct();
        let received = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&received);
        shadow
            .update_async(
                br#"{"method":"update","clientToken":"raw-1"}"#,
                Duration::from_secs(5),
                move |ack, reply| *sink.lock() = Some((ack, reply.map(<[u8]>::to_vec))),
            )
            .unwrap();

        let wire: &[u8] =
            br#"{"payload":{"version":1.50,"status":"success"},  "clientToken":"raw-1","method":"reply"}"#;
        transport.push_message(reply_topic(), wire.to_vec());
        shadow.yield_for(Duration::ZERO);

        assert_eq!(
            *received.lock(),
            Some((AckCode::Success, Some(wire.to_vec())))
        );
    }

    #[test]
    fn sentinel_error_code_is_a_negative_ack() {
        let (shadow, transport) = construct();
        transport.set_responder(|_, payload| {
            let token = extract_client_token(payload).unwrap();
            let reply = format!(
                r#"{{"method":"reply","clientToken":"{token}","payload":{{"status":"error","content":{{"errorcode":"-1"}}}}}}"#
            );
            vec![TransportEvent::Message {
                topic: reply_topic().into(),
                payload: reply.into_bytes(),
            }]
        });
        let patch = PatchBuilder::get("g-3", 64).unwrap().finalize(None).unwrap();
        assert_eq!(
            shadow.update_sync(patch.as_bytes(), Duration::from_secs(1)),
            Err(ShadowError::UpdateNegativeAck(AckCode::Unknown(-1)))
        );
    }

    #[test]
    fn huge_capacities_do_not_preallocate() {
        let transport = MockTransport::new();
        let shadow = ShadowContext::construct(
            config()
                .with_wait_list_capacity(usize::MAX)
                .with_request_buffer_size(usize::MAX),
            transport,
        )
        .unwrap();

        let temp = Attribute::new("temp", 21);
        let mut builder = shadow.update_format_init_with_capacity(usize::MAX).unwrap();
        shadow.update_format_add(&mut builder, &temp).unwrap();
        let patch = shadow.update_format_finalize(builder).unwrap();
        shadow
            .update_async(patch.as_bytes(), Duration::from_secs(5), |_, _| {})
            .unwrap();
        assert_eq!(shadow.pending_updates(), 2);
    }

    #[test]
    fn control_message_updates_metadata() {
        let (shadow, _transport) = construct();
        let applied = shadow
            .apply_control_message(br#"{"method":"control","version":9,"timestamp":1700000000}"#)
            .unwrap();
        assert_eq!(applied, 0);
        assert_eq!(
            shadow.metadata(),
            DocumentMetadata {
                version: Some(9),
                timestamp: Some(1_700_000_000)
            }
        );
    }

    #[test]
    fn messages_on_other_topics_are_ignored() {
        let (shadow, transport) = construct();
        shadow.register_attribute(Attribute::new("temp", 0)).unwrap();
        transport.push_message("/other/topic", br#"{"method":"control","temp":5}"#.to_vec());
        transport.push_message(reply_topic(), b"not json".to_vec());
        shadow.yield_for(Duration::ZERO);
        assert_eq!(shadow.document_version(), None);
    }

    #[test]
    fn format_helpers_compose_an_update() {
        let (shadow, _transport) = construct();
        let temp = Attribute::new("temp", 21);
        let mut builder = shadow.update_format_init().unwrap();
        shadow.update_format_add(&mut builder, &temp).unwrap();
        let patch = shadow.update_format_finalize(builder).unwrap();

        assert!(patch.token().starts_with("pk-dev-"));
        let doc: Value = serde_json::from_str(patch.as_str()).unwrap();
        assert_eq!(doc["state"]["reported"]["temp"], 21);
    }

    #[test]
    fn format_add_reports_no_space() {
        let (shadow, _transport) = construct();
        let mut builder = shadow.update_format_init_with_capacity(70).unwrap();
        let long = Attribute::new("long", "x".repeat(64));
        let offset = builder.offset();
        assert!(matches!(
            shadow.update_format_add(&mut builder, &long),
            Err(ShadowError::NoEnoughSpace { .. })
        ));
        assert_eq!(builder.offset(), offset);
    }

    #[test]
    fn deconstruct_resolves_leftovers_and_disconnects() {
        let (shadow, transport) = construct();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        shadow
            .update_async(
                br#"{"clientToken":"late"}"#,
                Duration::from_secs(60),
                move |ack, _| sink.lock().push(ack),
            )
            .unwrap();

        shadow.deconstruct().unwrap();
        assert_eq!(*seen.lock(), vec![AckCode::Timeout]);
        assert_eq!(transport.unsubscribed(), vec![reply_topic()]);
        assert_eq!(transport.disconnect_count(), 1);
    }

    #[test]
    fn deconstruct_drains_pending_replies() {
        let transport = MockTransport::new();
        let shadow = ShadowContext::construct(
            config().with_teardown_grace(Duration::from_secs(1)),
            transport.clone(),
        )
        .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        shadow
            .update_async(
                br#"{"clientToken":"in-flight"}"#,
                Duration::from_secs(60),
                move |ack, _| sink.lock().push(ack),
            )
            .unwrap();
        for token in ["pk-dev-1", "in-flight"] {
            transport.push_message(reply_topic(), reply_message(token, AckCode::Success, None));
        }

        shadow.deconstruct().unwrap();
        assert_eq!(*seen.lock(), vec![AckCode::Success]);
    }

    #[test]
    fn drop_tears_down_once() {
        let (shadow, transport) = construct();
        drop(shadow);
        assert_eq!(transport.disconnect_count(), 1);
        assert!(!transport.is_connected());
    }
}
