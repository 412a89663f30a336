//! JavaScript Engine Module
//!
//! A Boa JS engine running on its own thread, driven over a command channel.
//! Native APIs are added through [`JsEngineExtension`]s.

mod engine;
mod client;
mod esm;
mod builder;

pub use engine::{JsCommand, JsEngine, JsEngineHandle};
pub(crate) use engine::TOKIO;
pub use client::JsEngineClient;
pub use builder::{EsmModule, JsEngineBuilder, JsEngineExtension};
