//! In-memory [`SocketClient`] for tests.

use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::socketio::client::{AckCallback, ConnectOptions, Connector, SocketClient};
use crate::socketio::error::ClientError;

/// How the fake answers `emit_with_ack`.
#[derive(Clone)]
pub(crate) enum AckBehavior {
    /// Ack immediately with these values.
    Reply(Vec<Value>),
    /// Ack from another thread after a delay.
    Delayed(Duration, Vec<Value>),
    /// Report a transport error.
    Fail(String),
    /// Hold on to the callback and never call it.
    Silent,
    /// Drop the callback without calling it.
    Drop,
}

#[derive(Default)]
struct FakeState {
    emitted: Vec<(String, Value)>,
    acked: Vec<(String, Value)>,
    timeouts: Vec<Duration>,
    closed: usize,
    connects: Vec<(String, ConnectOptions)>,
    pending: Vec<AckCallback>,
}

/// Clones share state, so a test keeps one handle while the bridge owns another.
#[derive(Clone)]
pub(crate) struct FakeClient {
    state: Arc<Mutex<FakeState>>,
    behavior: Arc<Mutex<AckBehavior>>,
    emit_error: Option<String>,
}

impl FakeClient {
    pub(crate) fn new(behavior: AckBehavior) -> Self {
        Self {
            state: Arc::default(),
            behavior: Arc::new(Mutex::new(behavior)),
            emit_error: None,
        }
    }

    pub(crate) fn failing_emits(mut self, message: &str) -> Self {
        self.emit_error = Some(message.to_string());
        self
    }

    pub(crate) fn set_behavior(&self, behavior: AckBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub(crate) fn emitted(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().emitted.clone()
    }

    pub(crate) fn acked(&self) -> Vec<(String, Value)> {
        self.state.lock().unwrap().acked.clone()
    }

    pub(crate) fn timeouts(&self) -> Vec<Duration> {
        self.state.lock().unwrap().timeouts.clone()
    }

    pub(crate) fn closed(&self) -> usize {
        self.state.lock().unwrap().closed
    }

    pub(crate) fn connects(&self) -> Vec<(String, ConnectOptions)> {
        self.state.lock().unwrap().connects.clone()
    }

    /// Calls every held callback with `outcome`, returning how many fired.
    pub(crate) fn fire_pending(&self, outcome: Result<Vec<Value>, String>) -> usize {
        let pending = std::mem::take(&mut self.state.lock().unwrap().pending);
        let count = pending.len();
        for callback in pending {
            callback(outcome.clone().map_err(ClientError::Transport));
        }
        count
    }

    /// A connector that hands out this client and records each connect.
    pub(crate) fn connector(&self) -> Connector {
        let fake = self.clone();
        Arc::new(
            move |url: &str, options: &ConnectOptions| -> Result<Box<dyn SocketClient>, ClientError> {
                fake.state
                    .lock()
                    .unwrap()
                    .connects
                    .push((url.to_string(), options.clone()));
                Ok(Box::new(fake.clone()))
            },
        )
    }
}

/// A connector that always fails with `message`.
pub(crate) fn failing_connector(message: &str) -> Connector {
    let message = message.to_string();
    Arc::new(
        move |_url: &str, _options: &ConnectOptions| -> Result<Box<dyn SocketClient>, ClientError> {
            Err(ClientError::Transport(message.clone()))
        },
    )
}

impl SocketClient for FakeClient {
    fn emit(&self, event: &str, data: Value) -> Result<(), ClientError> {
        self.state
            .lock()
            .unwrap()
            .emitted
            .push((event.to_string(), data));
        match &self.emit_error {
            Some(message) => Err(ClientError::Transport(message.clone())),
            None => Ok(()),
        }
    }

    fn timeout(&self, timeout: Duration) -> Box<dyn SocketClient> {
        self.state.lock().unwrap().timeouts.push(timeout);
        Box::new(self.clone())
    }

    fn emit_with_ack(&self, event: &str, data: Value, on_ack: AckCallback) {
        self.state
            .lock()
            .unwrap()
            .acked
            .push((event.to_string(), data));

        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            AckBehavior::Reply(values) => on_ack(Ok(values)),
            AckBehavior::Delayed(delay, values) => {
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    on_ack(Ok(values));
                });
            }
            AckBehavior::Fail(message) => on_ack(Err(ClientError::Transport(message))),
            AckBehavior::Silent => self.state.lock().unwrap().pending.push(on_ack),
            AckBehavior::Drop => drop(on_ack),
        }
    }

    fn close(&self) {
        self.state.lock().unwrap().closed += 1;
    }
}
