//! # Socket.IO for Boa-scripted virtual users
//!
//! Runs load-test scripts on [Boa](https://boajs.dev) engines, one engine
//! thread per virtual user, and gives them a small synchronous Socket.IO
//! API: `connect`, `emit`, `emitWithAck` and `disconnect`.
//!
//! ## Example
//!
//! ```no_run
//! use boa_socketio::{JsEngineBuilder, SocketIoExtension};
//!
//! let engine = JsEngineBuilder::new()
//!     .with_name("vu-1")
//!     .with_extension(SocketIoExtension::new())
//!     .build()
//!     .unwrap()
//!     .start()
//!     .unwrap();
//!
//! engine.client().load_esm_module(
//!     "main.js",
//!     "import socketio from 'socketio';
//!      socketio.connect('ws://localhost:4000');
//!      console.log(JSON.stringify(socketio.emitWithAck('ackevent', { foo: 'bar' })));
//!      socketio.disconnect();",
//! );
//! engine.join();
//! ```

pub mod js;
pub mod socketio;

pub use js::{JsCommand, JsEngine, JsEngineBuilder, JsEngineClient, JsEngineExtension, JsEngineHandle};
pub use socketio::{SocketIoBridge, SocketIoExtension};
