use std::sync::mpsc;

use crate::js::JsCommand;

/// Client handle for communicating with the JS engine thread.
#[derive(Clone)]
pub struct JsEngineClient {
    pub sender: mpsc::Sender<JsCommand>,
}

impl JsEngineClient {
    /// Load and evaluate an ES module, caching it under `name`.
    pub fn load_esm_module(&self, name: impl Into<String>, source: impl Into<String>) {
        if let Err(e) = self.sender.send(JsCommand::LoadEsmModule {
            name: name.into(),
            source: source.into(),
        }) {
            log::error!("Failed to send load ESM module command: {}", e);
        }
    }

    /// Execute a script.
    pub fn execute(&self, source: impl Into<String>) {
        if let Err(e) = self.sender.send(JsCommand::Execute {
            source: source.into(),
        }) {
            log::error!("Failed to send execute command: {}", e);
        }
    }

    /// Shutdown the JS engine.
    pub fn shutdown(&self) {
        let _ = self.sender.send(JsCommand::Shutdown);
    }
}
