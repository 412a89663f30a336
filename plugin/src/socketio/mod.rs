//! Socket.IO module for scripts
//!
//! Lets a script connect to a Socket.IO server, fire events, send events
//! that wait for an acknowledgement, and disconnect. Each engine (virtual
//! user) owns one [`SocketIoBridge`] holding at most one connection.
//!
//! ```js
//! import socketio from 'socketio';
//!
//! export default function () {
//!     socketio.connect('ws://localhost:4000');
//!     socketio.emit('ping', { at: Date.now() });
//!     const ack = socketio.emitWithAck('ackevent', { foo: 'bar' }, 500);
//!     socketio.disconnect();
//! }
//! ```

mod ack;
mod adapter;
mod bridge;
mod client;
mod error;
mod extension;

#[cfg(test)]
pub(crate) mod fake;

pub use ack::{ACK_TIMEOUT_REASON, AckResult};
pub use adapter::default_connector;
pub use bridge::{DEFAULT_ACK_TIMEOUT, SocketIoBridge};
pub use client::{AckCallback, ConnectOptions, Connector, SocketClient};
pub use error::{BridgeError, ClientError};
pub use extension::SocketIoExtension;
