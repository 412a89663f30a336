//! `rust_socketio` backed [`SocketClient`].
//!
//! Blocking entry points run on the shared tokio runtime, so they must be
//! called from plain threads (the JS engine thread), never from inside the
//! runtime itself.

use futures_util::FutureExt;
use rust_socketio::Payload;
use rust_socketio::asynchronous::{Client, ClientBuilder};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::js::TOKIO;
use crate::socketio::client::{AckCallback, ConnectOptions, Connector, SocketClient};
use crate::socketio::error::ClientError;

/// Ack deadline used until [`SocketClient::timeout`] derives a view.
const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_millis(2000);

/// The connector used unless one is injected.
pub fn default_connector() -> Connector {
    Arc::new(connect)
}

fn connect(url: &str, options: &ConnectOptions) -> Result<Box<dyn SocketClient>, ClientError> {
    let parsed = url::Url::parse(url).map_err(|source| ClientError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    match parsed.scheme() {
        "ws" | "wss" | "http" | "https" => {}
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    }

    let mut builder = ClientBuilder::new(url);
    if let Some(namespace) = &options.namespace {
        builder = builder.namespace(namespace.clone());
    }
    if let Some(auth) = &options.auth {
        builder = builder.auth(auth.clone());
    }

    log::info!("[Socket.IO] Connecting to {}", url);
    let client = TOKIO.block_on(builder.connect())?;
    log::info!("[Socket.IO] Connected to {}", url);

    Ok(Box::new(RustSocketIoClient {
        client,
        ack_timeout: DEFAULT_ACK_TIMEOUT,
    }))
}

/// Adapts an async `rust_socketio` client to the blocking capability set.
pub(crate) struct RustSocketIoClient {
    client: Client,
    ack_timeout: Duration,
}

impl SocketClient for RustSocketIoClient {
    fn emit(&self, event: &str, data: Value) -> Result<(), ClientError> {
        TOKIO.block_on(self.client.emit(event, Payload::Text(vec![data])))?;
        Ok(())
    }

    fn timeout(&self, timeout: Duration) -> Box<dyn SocketClient> {
        Box::new(RustSocketIoClient {
            client: self.client.clone(),
            ack_timeout: timeout,
        })
    }

    fn emit_with_ack(&self, event: &str, data: Value, on_ack: AckCallback) {
        // Shared between the ack handler and the send-failure path; the first
        // complete outcome is the only one reported.
        let slot = Arc::new(AckSlot::new(on_ack));
        let client = self.client.clone();
        let event = event.to_string();
        let timeout = self.ack_timeout;

        TOKIO.spawn(async move {
            let ack_slot = slot.clone();
            let handler = move |payload: Payload, _socket: Client| {
                ack_slot.receive(payload);
                async {}.boxed()
            };

            if let Err(e) = client
                .emit_with_ack(event, Payload::Text(vec![data]), timeout, handler)
                .await
            {
                slot.deliver(Err(e.into()));
            }
        });
    }

    fn close(&self) {
        if let Err(e) = TOKIO.block_on(self.client.disconnect()) {
            log::warn!("[Socket.IO] Disconnect failed: {}", e);
        }
    }
}

/// Collects the ack for one request and hands it to the callback once.
///
/// A binary ack reaches the handler twice: first the text args with a
/// placeholder where the attachment goes, then the attachment itself.
struct AckSlot {
    state: Mutex<AckState>,
}

struct AckState {
    callback: Option<AckCallback>,
    held: Option<Vec<Value>>,
}

impl AckSlot {
    fn new(callback: AckCallback) -> Self {
        Self {
            state: Mutex::new(AckState {
                callback: Some(callback),
                held: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, AckState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Feeds one handler call. Text args that reference an attachment are
    /// held until the binary part arrives.
    fn receive(&self, payload: Payload) {
        let values = match payload {
            Payload::Binary(bytes) => {
                let attachment = Value::from(bytes.to_vec());
                let held = self.state().held.take();
                match held {
                    Some(mut values) => {
                        values.iter_mut().for_each(|v| fill_placeholder(v, &attachment));
                        values
                    }
                    None => vec![attachment],
                }
            }
            other => {
                let values = payload_values(other);
                if values.iter().any(has_placeholder) {
                    let mut state = self.state();
                    if state.callback.is_some() {
                        state.held = Some(values);
                        return;
                    }
                }
                values
            }
        };
        self.deliver(Ok(values));
    }

    fn deliver(&self, outcome: Result<Vec<Value>, ClientError>) {
        let callback = self.state().callback.take();
        match callback {
            Some(callback) => callback(outcome),
            None => log::debug!("[Socket.IO] Discarding ack delivered after the first"),
        }
    }
}

/// Flattens a text ack into its argument list.
///
/// `rust_socketio` hands over the packet's JSON array as a single value.
fn payload_values(payload: Payload) -> Vec<Value> {
    match payload {
        Payload::Text(mut values) if values.len() == 1 && values[0].is_array() => {
            match values.pop() {
                Some(Value::Array(args)) => args,
                _ => Vec::new(),
            }
        }
        Payload::Text(values) => values,
        Payload::Binary(bytes) => vec![Value::from(bytes.to_vec())],
        other => {
            log::warn!("[Socket.IO] Unsupported ack payload: {:?}", other);
            Vec::new()
        }
    }
}

fn is_placeholder(value: &Value) -> bool {
    value.get("_placeholder").and_then(Value::as_bool) == Some(true)
}

fn has_placeholder(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().any(has_placeholder),
        Value::Object(map) => is_placeholder(value) || map.values().any(has_placeholder),
        _ => false,
    }
}

fn fill_placeholder(value: &mut Value, attachment: &Value) {
    if is_placeholder(value) {
        *value = attachment.clone();
        return;
    }
    match value {
        Value::Array(items) => items.iter_mut().for_each(|v| fill_placeholder(v, attachment)),
        Value::Object(map) => map.values_mut().for_each(|v| fill_placeholder(v, attachment)),
        _ => {}
    }
}
