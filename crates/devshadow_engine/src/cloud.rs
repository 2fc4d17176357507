//! In-process stand-in for the cloud shadow service.
//!
//! `SimulatedCloud` keeps a reported/desired document and answers requests
//! published through a [`MockTransport`]. It is used by the integration
//! tests and the CLI.

use crate::transport::{MockTransport, TransportEvent};
use devshadow_protocol::{AckCode, Method, ShadowTopics};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Default)]
struct CloudDocument {
    reported: Map<String, Value>,
    desired: Map<String, Value>,
    version: u64,
    requests: usize,
    silent: bool,
    reject_with: Option<AckCode>,
}

/// A simulated shadow service for one device.
#[derive(Debug, Clone)]
pub struct SimulatedCloud {
    document: Arc<Mutex<CloudDocument>>,
    reply_topic: String,
}

impl SimulatedCloud {
    /// Creates an empty document for the device owning `topics`.
    pub fn new(topics: &ShadowTopics) -> Self {
        Self {
            document: Arc::new(Mutex::new(CloudDocument::default())),
            reply_topic: topics.get().to_string(),
        }
    }

    /// Routes every publish on `transport` through this cloud.
    pub fn attach(&self, transport: &MockTransport) {
        let cloud = self.clone();
        transport.set_responder(move |topic, payload| cloud.handle_request(topic, payload));
    }

    /// Stops answering requests without forgetting them.
    pub fn set_silent(&self, silent: bool) {
        self.document.lock().silent = silent;
    }

    /// Answers every request with this error code.
    pub fn reject_with(&self, ack: Option<AckCode>) {
        self.document.lock().reject_with = ack;
    }

    /// Sets a desired value.
    pub fn set_desired(&self, name: impl Into<String>, value: Value) {
        let mut doc = self.document.lock();
        doc.desired.insert(name.into(), value);
        doc.version += 1;
    }

    /// Returns the reported state.
    pub fn reported(&self) -> Map<String, Value> {
        self.document.lock().reported.clone()
    }

    /// Returns the desired state.
    pub fn desired(&self) -> Map<String, Value> {
        self.document.lock().desired.clone()
    }

    /// Returns the document version.
    pub fn version(&self) -> u64 {
        self.document.lock().version
    }

    /// Returns the number of requests received.
    pub fn requests(&self) -> usize {
        self.document.lock().requests
    }

    /// Builds a control message carrying the desired state.
    pub fn control_message(&self) -> Vec<u8> {
        let doc = self.document.lock();
        json!({
            "method": Method::Control.as_str(),
            "payload": {
                "status": "success",
                "state": { "desired": Value::Object(doc.desired.clone()) },
            },
            "version": doc.version,
            "timestamp": unix_now(),
        })
        .to_string()
        .into_bytes()
    }

    /// Queues a control message on `transport`.
    pub fn push_control(&self, transport: &MockTransport) {
        transport.push_message(self.reply_topic.clone(), self.control_message());
    }

    /// Processes one request and returns the events it produces.
    pub fn handle_request(&self, _topic: &str, payload: &[u8]) -> Vec<TransportEvent> {
        let Ok(Value::Object(request)) = serde_json::from_slice::<Value>(payload) else {
            return Vec::new();
        };
        let Some(token) = request.get("clientToken").and_then(Value::as_str) else {
            return Vec::new();
        };

        let mut doc = self.document.lock();
        doc.requests += 1;
        if doc.silent {
            return Vec::new();
        }
        if let Some(ack) = doc.reject_with {
            return vec![self.reply(reply_message(token, ack, None))];
        }

        let method = request
            .get("method")
            .and_then(Value::as_str)
            .and_then(Method::from_name);
        let reported = request
            .get("state")
            .and_then(|s| s.get("reported"))
            .and_then(Value::as_object);

        let message = match (method, reported) {
            (Some(Method::Update), Some(reported)) => {
                for (name, value) in reported {
                    doc.reported.insert(name.clone(), value.clone());
                }
                doc.version += 1;
                reply_message(token, AckCode::Success, Some(doc.version))
            }
            (Some(Method::Update | Method::Delete), None) => {
                reply_message(token, AckCode::StateIsNull, None)
            }
            (Some(Method::Delete), Some(reported)) => {
                for (name, value) in reported {
                    if value.is_null() {
                        doc.reported.remove(name);
                        doc.desired.remove(name);
                    }
                }
                doc.version += 1;
                reply_message(token, AckCode::Success, Some(doc.version))
            }
            (Some(Method::Get), _) if doc.reported.is_empty() && doc.desired.is_empty() => {
                reply_message(token, AckCode::ShadowDocumentIsNull, None)
            }
            (Some(Method::Get), _) => json!({
                "method": Method::Reply.as_str(),
                "clientToken": token,
                "payload": {
                    "status": "success",
                    "state": {
                        "reported": Value::Object(doc.reported.clone()),
                        "desired": Value::Object(doc.desired.clone()),
                    },
                },
                "version": doc.version,
                "timestamp": unix_now(),
            })
            .to_string()
            .into_bytes(),
            (None, _) => reply_message(token, AckCode::MethodIsNull, None),
            (Some(_), _) => reply_message(token, AckCode::MethodIsError, None),
        };

        vec![self.reply(message)]
    }

    fn reply(&self, payload: Vec<u8>) -> TransportEvent {
        TransportEvent::Message {
            topic: self.reply_topic.clone(),
            payload,
        }
    }
}

/// Builds a reply message for `token` carrying `ack`.
pub fn reply_message(token: &str, ack: AckCode, version: Option<u64>) -> Vec<u8> {
    let payload = if ack == AckCode::Success {
        json!({ "status": "success" })
    } else {
        json!({
            "status": "error",
            "content": {
                "errorcode": ack.code().to_string(),
                "errormessage": format!("{ack}"),
            },
        })
    };

    let mut message = json!({
        "method": Method::Reply.as_str(),
        "clientToken": token,
        "payload": payload,
        "timestamp": unix_now(),
    });
    if let Some(version) = version {
        message["version"] = json!(version);
    }
    message.to_string().into_bytes()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use devshadow_protocol::InboundMessage;

    fn cloud() -> SimulatedCloud {
        SimulatedCloud::new(&ShadowTopics::for_device("pk", "dev"))
    }

    fn single_reply(events: Vec<TransportEvent>) -> InboundMessage {
        assert_eq!(events.len(), 1);
        match &events[0] {
            TransportEvent::Message { topic, payload } => {
                assert_eq!(topic, "/shadow/get/pk/dev");
                InboundMessage::parse(payload).unwrap()
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn update_merges_reported_state() {
        let cloud = cloud();
        let reply = single_reply(cloud.handle_request(
            "/shadow/update/pk/dev",
            br#"{"method":"update","clientToken":"t1","state":{"reported":{"temp":21}}}"#,
        ));
        assert_eq!(reply.client_token(), Some("t1"));
        assert_eq!(reply.ack_code(), AckCode::Success);
        assert_eq!(reply.version(), Some(1));
        assert_eq!(cloud.reported()["temp"], 21);
    }

    #[test]
    fn get_on_empty_document() {
        let cloud = cloud();
        let reply = single_reply(
            cloud.handle_request("/shadow/update/pk/dev", br#"{"method":"get","clientToken":"t"}"#),
        );
        assert_eq!(reply.ack_code(), AckCode::ShadowDocumentIsNull);
    }

    #[test]
    fn get_returns_desired_state() {
        let cloud = cloud();
        cloud.set_desired("temp", json!(18));
        let reply = single_reply(
            cloud.handle_request("/shadow/update/pk/dev", br#"{"method":"get","clientToken":"t"}"#),
        );
        assert_eq!(reply.ack_code(), AckCode::Success);
        assert_eq!(reply.desired_entries().len(), 1);
    }

    #[test]
    fn delete_removes_nulls() {
        let cloud = cloud();
        cloud.handle_request(
            "/shadow/update/pk/dev",
            br#"{"method":"update","clientToken":"a","state":{"reported":{"temp":21,"on":true}}}"#,
        );
        cloud.handle_request(
            "/shadow/update/pk/dev",
            br#"{"method":"delete","clientToken":"b","state":{"reported":{"temp":null}}}"#,
        );
        let reported = cloud.reported();
        assert!(!reported.contains_key("temp"));
        assert!(reported.contains_key("on"));
    }

    #[test]
    fn silent_and_rejecting_modes() {
        let cloud = cloud();
        cloud.set_silent(true);
        assert!(cloud
            .handle_request("/shadow/update/pk/dev", br#"{"method":"get","clientToken":"t"}"#)
            .is_empty());
        assert_eq!(cloud.requests(), 1);

        cloud.set_silent(false);
        cloud.reject_with(Some(AckCode::ServerFailed));
        let reply = single_reply(
            cloud.handle_request("/shadow/update/pk/dev", br#"{"method":"get","clientToken":"t"}"#),
        );
        assert_eq!(reply.ack_code(), AckCode::ServerFailed);
    }

    #[test]
    fn control_message_shape() {
        let cloud = cloud();
        cloud.set_desired("temp", json!(18));
        let msg = InboundMessage::parse(&cloud.control_message()).unwrap();
        assert_eq!(msg.method(), Some(Method::Control));
        assert_eq!(msg.version(), Some(1));
        let entries = msg.desired_entries();
        assert_eq!(entries, vec![("temp", &json!(18))]);
    }
}
