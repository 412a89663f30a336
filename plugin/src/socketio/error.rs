use boa_engine::{JsError, JsNativeError};
use thiserror::Error;

/// Errors raised by a Socket.IO transport.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    SocketIo(#[from] rust_socketio::Error),

    #[error("invalid url {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported url scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("{0}")]
    Transport(String),
}

/// Errors surfaced to the script by the bridge.
///
/// Ack failures are not represented here: they come back to the script
/// as envelope values, see [`crate::socketio::AckResult`].
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to connect to {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: ClientError,
    },

    #[error("Socket.IO client not connected")]
    NotConnected,
}

impl From<BridgeError> for JsError {
    fn from(err: BridgeError) -> Self {
        JsError::from_native(JsNativeError::error().with_message(err.to_string()))
    }
}
