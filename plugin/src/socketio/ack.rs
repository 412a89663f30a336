//! Acknowledgement coordination
//!
//! Races the transport's ack callback against an outer deadline and
//! produces exactly one [`AckResult`] per request. The callback writes into
//! a single-slot channel, so an ack that shows up after the deadline is
//! absorbed without blocking the transport.

use serde_json::{Map, Value};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

use crate::socketio::client::SocketClient;

/// Reason carried by the envelope returned when the outer deadline elapses.
pub const ACK_TIMEOUT_REASON: &str = "ack timeout";

/// Outcome of one acknowledged emit.
#[derive(Debug, Clone, PartialEq)]
pub enum AckResult {
    /// The server acknowledged with this value list.
    Value(Vec<Value>),
    /// The transport reported an error instead of an ack.
    Error(String),
    /// No ack before the outer deadline.
    Timeout,
}

impl AckResult {
    /// Converts into the value handed back to the script.
    ///
    /// A single-element ack list is unwrapped; any other length is returned
    /// as a list. Failures become `{ success: false, error }` envelopes.
    pub fn into_value(self) -> Value {
        match self {
            AckResult::Value(mut values) if values.len() == 1 => values.remove(0),
            AckResult::Value(values) => Value::Array(values),
            AckResult::Error(reason) => envelope(reason),
            AckResult::Timeout => envelope(ACK_TIMEOUT_REASON.to_string()),
        }
    }
}

fn envelope(reason: String) -> Value {
    let mut map = Map::new();
    map.insert("success".to_string(), Value::Bool(false));
    map.insert("error".to_string(), Value::String(reason));
    Value::Object(map)
}

/// Sends `event` through `client` and waits up to `deadline` for its ack.
///
/// `client` is expected to be a view already derived with
/// [`SocketClient::timeout`]; no lock may be held across this call.
pub fn request(
    client: &dyn SocketClient,
    module_name: &str,
    event: &str,
    data: Value,
    deadline: Duration,
) -> AckResult {
    let (tx, rx) = mpsc::sync_channel(1);

    let tag = format!("[{}] Ack callback for {}", module_name, event);
    client.emit_with_ack(
        event,
        data,
        Box::new(move |outcome| {
            let result = match outcome {
                Ok(values) => {
                    log::debug!("{}: {:?}", tag, values);
                    AckResult::Value(values)
                }
                Err(e) => {
                    log::debug!("{}: error: {}", tag, e);
                    AckResult::Error(e.to_string())
                }
            };
            // Fails only once the waiter has given up; the late ack is dropped.
            let _ = tx.send(result);
        }),
    );

    match rx.recv_timeout(deadline) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => AckResult::Timeout,
        Err(RecvTimeoutError::Disconnected) => {
            log::debug!(
                "[{}] Ack callback for {} dropped by transport",
                module_name,
                event
            );
            AckResult::Timeout
        }
    }
}
