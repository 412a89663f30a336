//! JavaScript Engine
//!
//! Runs a Boa context on a dedicated thread and feeds it commands over a
//! channel. One engine hosts one virtual user.

use boa_engine::builtins::promise::PromiseState;
use boa_engine::{Context, JsError, Module, Source};
use std::path::Path;
use std::rc::Rc;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};

use crate::js::JsEngineClient;
use crate::js::esm::FetchModuleLoader;

/// Commands that can be sent to the JS engine thread.
#[derive(Debug)]
pub enum JsCommand {
    /// Load and evaluate an ESM module with the given name and source.
    LoadEsmModule { name: String, source: String },
    /// Execute a JS script (non-module).
    Execute { source: String },
    /// Shutdown the JS engine.
    Shutdown,
}

/// Static Tokio runtime for async operations (module loading, Socket.IO).
pub(crate) static TOKIO: once_cell::sync::Lazy<tokio::runtime::Runtime> =
    once_cell::sync::Lazy::new(|| {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("js-io")
            .build()
            .expect("Failed to build Tokio runtime")
    });

type ContextBuilder =
    Box<dyn FnOnce() -> Result<(Context, Rc<FetchModuleLoader>), JsError> + Send>;

/// A configured engine that has not been started yet.
///
/// The context itself is built on the engine thread, since Boa contexts
/// cannot move between threads.
pub struct JsEngine {
    pub(crate) name: String,
    pub(crate) client: JsEngineClient,
    pub(crate) context_builder: ContextBuilder,
    pub(crate) receiver: Receiver<JsCommand>,
}

impl JsEngine {
    /// Get a client handle for communicating with the engine.
    ///
    /// Commands sent before [`JsEngine::start`] are queued.
    pub fn client(&self) -> JsEngineClient {
        self.client.clone()
    }

    /// Spawn the engine thread.
    pub fn start(self) -> std::io::Result<JsEngineHandle> {
        let JsEngine {
            name,
            client,
            context_builder,
            receiver,
        } = self;

        let thread_name = name.clone();
        let handle = thread::Builder::new().name(name).spawn(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                run_js_loop(context_builder, receiver);
            }));

            if let Err(e) = result {
                log::error!("JS engine {} panicked: {:?}", thread_name, e);
            }
        })?;

        Ok(JsEngineHandle { client, handle })
    }
}

/// A running engine.
pub struct JsEngineHandle {
    client: JsEngineClient,
    handle: JoinHandle<()>,
}

impl JsEngineHandle {
    pub fn client(&self) -> JsEngineClient {
        self.client.clone()
    }

    /// Ask the engine to stop once queued commands are done, and wait for it.
    pub fn join(self) {
        self.client.shutdown();
        if self.handle.join().is_err() {
            log::error!("JS engine thread terminated abnormally");
        }
    }
}

/// Main loop for the JS engine thread.
fn run_js_loop(context_builder: ContextBuilder, receiver: Receiver<JsCommand>) {
    log::info!("JS engine thread started");

    let (mut context, loader) = match context_builder() {
        Ok(built) => built,
        Err(e) => {
            log::error!("Failed to build JS context: {:?}", e);
            return;
        }
    };

    log::info!("JS runtime initialized");

    // Process commands
    loop {
        match receiver.recv() {
            Ok(JsCommand::Execute { source }) => {
                log::debug!("Executing script ({} bytes)...", source.len());

                let source = Source::from_bytes(source.as_bytes());

                if let Err(e) = context.eval(source) {
                    log::error!("Failed to execute script: {:?}", e);
                }

                flush_event_loop(&mut context);
            }
            Ok(JsCommand::LoadEsmModule { name, source }) => {
                log::info!("Loading ES module {} ({} bytes)...", name, source.len());

                let source = Source::from_bytes(source.as_bytes()).with_path(Path::new(&name));
                let module = match Module::parse(source, None, &mut context) {
                    Ok(module) => module,
                    Err(e) => {
                        log::error!("Failed to parse ES module {}: {:?}", name, e);
                        continue;
                    }
                };

                // Cached first so scripts can import it while it evaluates.
                loader.insert(name.clone(), module.clone());
                let promise = module.load_link_evaluate(&mut context);

                flush_event_loop(&mut context);

                if let PromiseState::Rejected(err) = promise.state() {
                    let msg = err.to_json(&mut context).unwrap_or_default();
                    log::error!("ES module {} failed: {:?}", name, msg);
                }
            }
            Ok(JsCommand::Shutdown) => {
                log::info!("JS engine shutting down");
                break;
            }
            Err(e) => {
                log::error!("JS engine channel error: {}", e);
                break;
            }
        }
    }

    log::info!("JS engine thread stopped");
}

/// Flush the event loop: run microtasks (Jobs) and pending macrotasks (timers).
fn flush_event_loop(context: &mut Context) {
    if let Err(e) = context.run_jobs() {
        if let Some(e) = e.as_opaque() {
            let msg = e.to_json(context).unwrap_or_default();
            log::error!("Error running Boa jobs: {:?}", msg);
        } else {
            log::error!("Error running Boa jobs: {:?}", e);
        }
    }
}
