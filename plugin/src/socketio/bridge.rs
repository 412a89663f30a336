//! Per-VU Socket.IO bridge
//!
//! Holds at most one connection. The lock guards the client slot only; it is
//! never held while waiting for an ack, so a slow server cannot stall a
//! concurrent `disconnect`.

use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::socketio::ack::{self, AckResult};
use crate::socketio::client::{ConnectOptions, Connector, SocketClient};
use crate::socketio::error::BridgeError;

/// Ack deadline used when the script does not pass one.
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(2000);

pub struct SocketIoBridge {
    module_name: String,
    connector: Connector,
    default_timeout: Duration,
    client: Mutex<Option<Box<dyn SocketClient>>>,
}

impl SocketIoBridge {
    pub fn new(module_name: impl Into<String>, connector: Connector) -> Self {
        Self {
            module_name: module_name.into(),
            connector,
            default_timeout: DEFAULT_ACK_TIMEOUT,
            client: Mutex::new(None),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.slot().is_some()
    }

    /// Connects with default options.
    pub fn connect(&self, url: &str) -> Result<(), BridgeError> {
        self.connect_with(url, &ConnectOptions::default())
    }

    /// Connects and stores the client, closing any client it replaces.
    ///
    /// On failure the current client, if any, is left untouched.
    pub fn connect_with(&self, url: &str, options: &ConnectOptions) -> Result<(), BridgeError> {
        log::debug!("[{}] Connect: url={}", self.module_name, url);
        let client = (self.connector)(url, options).map_err(|source| BridgeError::Connect {
            url: url.to_string(),
            source,
        })?;

        let previous = self.slot().replace(client);
        if let Some(previous) = previous {
            log::debug!("[{}] Closing replaced client", self.module_name);
            previous.close();
        }
        Ok(())
    }

    /// Sends an event without waiting for the server.
    ///
    /// Transport errors are logged and dropped.
    pub fn emit(&self, event: &str, data: Value) -> Result<(), BridgeError> {
        log::debug!(
            "[{}] Emit: event={}, data={}",
            self.module_name,
            event,
            data
        );

        let slot = self.slot();
        let client = slot.as_ref().ok_or(BridgeError::NotConnected)?;
        if let Err(e) = client.emit(event, data) {
            log::debug!("[{}] Emit failed for {}: {}", self.module_name, event, e);
        }
        Ok(())
    }

    /// Sends an event and blocks until it is acknowledged or `timeout`
    /// (default [`DEFAULT_ACK_TIMEOUT`]) elapses.
    pub fn emit_with_ack(
        &self,
        event: &str,
        data: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, BridgeError> {
        Ok(self.request(event, data, timeout)?.into_value())
    }

    /// Like [`SocketIoBridge::emit_with_ack`] but returns the raw outcome.
    pub fn request(
        &self,
        event: &str,
        data: Value,
        timeout: Option<Duration>,
    ) -> Result<AckResult, BridgeError> {
        let timeout = timeout.unwrap_or(self.default_timeout);
        log::debug!(
            "[{}] EmitWithAck: event={}, data={}, timeout={}",
            self.module_name,
            event,
            data,
            timeout.as_millis()
        );

        let timed = {
            let slot = self.slot();
            let client = slot.as_ref().ok_or(BridgeError::NotConnected)?;
            client.timeout(timeout)
        };

        Ok(ack::request(
            timed.as_ref(),
            &self.module_name,
            event,
            data,
            timeout,
        ))
    }

    /// Closes the connection if there is one. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let mut slot = self.slot();
        if let Some(client) = slot.take() {
            log::debug!("[{}] Disconnect", self.module_name);
            client.close();
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Box<dyn SocketClient>>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::socketio::fake::{AckBehavior, FakeClient, failing_connector};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Instant;

    fn connected(behavior: AckBehavior) -> (SocketIoBridge, FakeClient) {
        let fake = FakeClient::new(behavior);
        let bridge = SocketIoBridge::new("testmod", fake.connector());
        bridge.connect("ws://fake").unwrap();
        (bridge, fake)
    }

    #[test]
    fn connect_then_emit_reaches_transport() {
        let (bridge, fake) = connected(AckBehavior::Silent);

        bridge.emit("foo", json!(123)).unwrap();

        assert_eq!(fake.connects().len(), 1);
        assert_eq!(fake.connects()[0].0, "ws://fake");
        assert_eq!(fake.emitted(), vec![("foo".to_string(), json!(123))]);
    }

    #[test]
    fn connect_passes_options_to_connector() {
        let fake = FakeClient::new(AckBehavior::Silent);
        let bridge = SocketIoBridge::new("testmod", fake.connector());
        let options = ConnectOptions {
            namespace: Some("/chat".into()),
            auth: Some(json!({ "token": "t" })),
        };

        bridge.connect_with("ws://fake", &options).unwrap();

        assert_eq!(fake.connects(), vec![("ws://fake".to_string(), options)]);
    }

    #[test]
    fn connect_failure_leaves_bridge_disconnected() {
        let bridge = SocketIoBridge::new("testmod", failing_connector("fail"));

        let err = bridge.connect("ws://fail").unwrap_err();

        assert!(matches!(err, BridgeError::Connect { ref url, .. } if url == "ws://fail"));
        assert!(err.to_string().contains("fail"));
        assert!(!bridge.is_connected());
    }

    #[test]
    fn reconnect_closes_previous_client() {
        let (bridge, fake) = connected(AckBehavior::Silent);

        bridge.connect("ws://fake").unwrap();

        assert_eq!(fake.closed(), 1);
        assert!(bridge.is_connected());
    }

    #[test]
    fn emit_without_client_fails() {
        let fake = FakeClient::new(AckBehavior::Silent);
        let bridge = SocketIoBridge::new("testmod", fake.connector());

        assert!(matches!(
            bridge.emit("foo", json!(123)),
            Err(BridgeError::NotConnected)
        ));
        assert!(fake.emitted().is_empty());
    }

    #[test]
    fn emit_transport_error_is_swallowed() {
        let fake = FakeClient::new(AckBehavior::Silent).failing_emits("broken pipe");
        let bridge = SocketIoBridge::new("testmod", fake.connector());
        bridge.connect("ws://fake").unwrap();

        bridge.emit("foo", json!("bar")).unwrap();

        assert_eq!(fake.emitted().len(), 1);
        assert!(bridge.is_connected());
    }

    #[test]
    fn ack_with_single_value_is_unwrapped() {
        let (bridge, _fake) = connected(AckBehavior::Reply(vec![json!(42)]));
        let value = bridge.emit_with_ack("ack", json!({ "foo": "bar" }), None).unwrap();
        assert_eq!(value, json!(42));
    }

    #[test]
    fn ack_with_many_values_is_a_list() {
        let (bridge, _fake) = connected(AckBehavior::Reply(vec![json!(1), json!(2), json!(3)]));
        let value = bridge.emit_with_ack("ack", json!({ "foo": "bar" }), None).unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn ack_transport_error_is_an_envelope() {
        let (bridge, _fake) = connected(AckBehavior::Fail("ack error".into()));
        let value = bridge.emit_with_ack("ack", json!({ "foo": "bar" }), None).unwrap();
        assert_eq!(value, json!({ "success": false, "error": "ack error" }));
    }

    #[test]
    fn silent_server_times_out() {
        let (bridge, fake) = connected(AckBehavior::Silent);
        let started = Instant::now();

        let value = bridge
            .emit_with_ack("ack", json!(null), Some(Duration::from_millis(10)))
            .unwrap();

        assert_eq!(value, json!({ "success": false, "error": "ack timeout" }));
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(fake.timeouts(), vec![Duration::from_millis(10)]);

        // The ack arriving afterwards goes nowhere.
        assert_eq!(fake.fire_pending(Ok(vec![json!("late")])), 1);
    }

    #[test]
    fn default_timeout_is_two_seconds() {
        let (bridge, fake) = connected(AckBehavior::Silent);
        let started = Instant::now();

        let value = bridge.emit_with_ack("ack", json!(null), None).unwrap();

        let elapsed = started.elapsed();
        assert_eq!(value, json!({ "success": false, "error": "ack timeout" }));
        assert!(elapsed >= Duration::from_millis(2000));
        assert!(elapsed < Duration::from_millis(3000));
        assert_eq!(fake.timeouts(), vec![DEFAULT_ACK_TIMEOUT]);
    }

    #[test]
    fn configured_default_timeout_is_used() {
        let fake = FakeClient::new(AckBehavior::Reply(vec![json!(true)]));
        let bridge = SocketIoBridge::new("testmod", fake.connector())
            .with_default_timeout(Duration::from_millis(250));
        bridge.connect("ws://fake").unwrap();

        bridge.emit_with_ack("ack", json!(null), None).unwrap();

        assert_eq!(fake.timeouts(), vec![Duration::from_millis(250)]);
    }

    #[test]
    fn emit_with_ack_without_client_fails() {
        let fake = FakeClient::new(AckBehavior::Reply(vec![json!(1)]));
        let bridge = SocketIoBridge::new("testmod", fake.connector());

        assert!(matches!(
            bridge.emit_with_ack("ack", json!(null), None),
            Err(BridgeError::NotConnected)
        ));
        assert!(fake.acked().is_empty());
    }

    #[test]
    fn disconnect_after_emit_closes_and_clears() {
        let (bridge, fake) = connected(AckBehavior::Silent);
        bridge.emit("foo", json!(1)).unwrap();

        bridge.disconnect();

        assert_eq!(fake.closed(), 1);
        assert!(!bridge.is_connected());
        assert!(matches!(
            bridge.emit("foo", json!(2)),
            Err(BridgeError::NotConnected)
        ));
    }

    #[test]
    fn disconnect_is_idempotent() {
        let (bridge, fake) = connected(AckBehavior::Silent);

        bridge.disconnect();
        bridge.disconnect();

        assert_eq!(fake.closed(), 1);
    }

    #[test]
    fn disconnect_without_client_is_noop() {
        let fake = FakeClient::new(AckBehavior::Silent);
        let bridge = SocketIoBridge::new("testmod", fake.connector());

        bridge.disconnect();

        assert_eq!(fake.closed(), 0);
    }

    #[test]
    fn disconnect_does_not_wait_for_pending_ack() {
        let (bridge, fake) = connected(AckBehavior::Silent);
        let bridge = Arc::new(bridge);

        let waiter = {
            let bridge = bridge.clone();
            std::thread::spawn(move || {
                bridge.emit_with_ack("slow", json!(null), Some(Duration::from_millis(300)))
            })
        };

        // Let the waiter register its ack before tearing down.
        while fake.acked().is_empty() {
            std::thread::sleep(Duration::from_millis(1));
        }
        let started = Instant::now();
        bridge.disconnect();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(fake.closed(), 1);

        let value = waiter.join().unwrap().unwrap();
        assert_eq!(value, json!({ "success": false, "error": "ack timeout" }));
    }

    #[test]
    fn ack_after_behavior_change() {
        let (bridge, fake) = connected(AckBehavior::Fail("nope".into()));
        assert_eq!(
            bridge.emit_with_ack("ack", json!(1), None).unwrap(),
            json!({ "success": false, "error": "nope" })
        );

        fake.set_behavior(AckBehavior::Reply(vec![json!("ok")]));
        assert_eq!(bridge.emit_with_ack("ack", json!(1), None).unwrap(), json!("ok"));
    }
}
