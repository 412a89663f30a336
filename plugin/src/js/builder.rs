use std::{
    rc::Rc,
    sync::mpsc::{self, Receiver},
};

use boa_engine::{Context, JsError, Module, Source};
use boa_runtime::extensions::{ConsoleExtension, MicrotaskExtension, TimeoutExtension};

use crate::js::{JsCommand, JsEngine, JsEngineClient, esm::FetchModuleLoader};

/// An ES module an extension makes importable by specifier.
#[derive(Debug, Clone)]
pub struct EsmModule {
    pub specifier: String,
    pub source: String,
}

pub struct JsEngineBuilder {
    name: String,
    extensions: Vec<Box<dyn JsEngineExtension>>,
    client: JsEngineClient,
    receiver: Receiver<JsCommand>,
}

impl Default for JsEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl JsEngineBuilder {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        JsEngineBuilder {
            name: "js-engine".to_string(),
            extensions: vec![],
            client: JsEngineClient { sender },
            receiver,
        }
    }

    /// Name given to the engine thread.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_extension(mut self, extension: impl JsEngineExtension) -> Self {
        self.extensions.push(Box::new(extension));
        self
    }

    pub fn build(self) -> Result<JsEngine, JsError> {
        let client = self.client.clone();
        let extensions = self.extensions;

        Ok(JsEngine {
            name: self.name,
            client: self.client,
            context_builder: Box::new(move || build_context(&extensions, client.clone())),
            receiver: self.receiver,
        })
    }
}

pub trait JsEngineExtension: Send + Sync + 'static {
    fn register(&self, context: &mut Context, client: JsEngineClient) -> Result<(), JsError>;

    /// Modules to place in the loader cache once registration is done.
    fn esm_modules(&self) -> Vec<EsmModule> {
        Vec::new()
    }
}

pub(crate) fn build_context(
    extensions: &[Box<dyn JsEngineExtension>],
    client: JsEngineClient,
) -> Result<(Context, Rc<FetchModuleLoader>), JsError> {
    let loader = Rc::new(FetchModuleLoader::new());
    let mut context = Context::builder().module_loader(loader.clone()).build()?;

    // Register Boa runtime extensions
    boa_runtime::register(
        (
            ConsoleExtension::default(),
            TimeoutExtension {},
            MicrotaskExtension {},
        ),
        None,
        &mut context,
    )?;

    for extension in extensions {
        extension.register(&mut context, client.clone())?;

        for module in extension.esm_modules() {
            let source = Source::from_bytes(module.source.as_bytes());
            let parsed = Module::parse(source, None, &mut context)?;
            loader.insert(module.specifier, parsed);
        }
    }

    Ok((context, loader))
}
