//! Socket.IO client capability set
//!
//! The bridge only ever talks to a connection through [`SocketClient`].
//! The default implementation wraps `rust_socketio`; tests plug in fakes
//! through a [`Connector`].

use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::socketio::error::ClientError;

/// Receives the outcome of an acknowledged emit.
///
/// On success the transport passes the raw value list sent back by the
/// server. Being `FnOnce`, a callback can fire at most once.
pub type AckCallback = Box<dyn FnOnce(Result<Vec<Value>, ClientError>) + Send + 'static>;

/// Produces a connected client for a URL.
pub type Connector = Arc<
    dyn Fn(&str, &ConnectOptions) -> Result<Box<dyn SocketClient>, ClientError> + Send + Sync,
>;

/// A live Socket.IO connection.
pub trait SocketClient: Send + Sync {
    /// Fire-and-forget send. A failure does not invalidate the client.
    fn emit(&self, event: &str, data: Value) -> Result<(), ClientError>;

    /// Returns a view of this connection whose next [`SocketClient::emit_with_ack`]
    /// uses `timeout` as its ack deadline.
    fn timeout(&self, timeout: Duration) -> Box<dyn SocketClient>;

    /// Sends `event` and registers `on_ack` for the server's acknowledgement.
    ///
    /// Must not block waiting for the ack. If the request cannot be sent,
    /// the failure is delivered through `on_ack`.
    fn emit_with_ack(&self, event: &str, data: Value, on_ack: AckCallback);

    /// Closes the underlying connection.
    fn close(&self);
}

/// Options accepted by `connect`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectOptions {
    /// Namespace to join, `/` when unset.
    pub namespace: Option<String>,
    /// Auth payload sent with the namespace connect packet.
    pub auth: Option<Value>,
}
