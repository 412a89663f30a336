use boa_engine::module::ModuleLoader;
use boa_engine::{Context, JsError, JsNativeError, JsObject, JsResult, JsString, Module, Source};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::js::TOKIO;

/// Loads modules from the cache, over HTTP(S), or from disk.
pub(crate) struct FetchModuleLoader {
    local_modules: RefCell<HashMap<String, Module>>,
}

impl FetchModuleLoader {
    pub(crate) fn new() -> Self {
        Self {
            local_modules: RefCell::new(HashMap::new()),
        }
    }

    pub fn insert(&self, specifier: impl Into<String>, module: Module) {
        let specifier = specifier.into();
        self.local_modules
            .borrow_mut()
            .insert(specifier.clone(), module);
        log::debug!("Cached local module: {}", specifier);
    }

    fn cached(&self, specifier: &str) -> Option<Module> {
        self.local_modules.borrow().get(specifier).cloned()
    }
}

impl ModuleLoader for FetchModuleLoader {
    fn init_import_meta(
        self: Rc<Self>,
        import_meta: &JsObject,
        module: &Module,
        context: &mut Context,
    ) {
        let Some(module_path) = module.path().map(|path| path.to_string_lossy().to_string()) else {
            log::warn!("Module path is None while initializing import_meta");
            return;
        };

        // Set import_meta.url = module.path
        if let Err(e) = import_meta.set(JsString::from("url"), JsString::from(module_path), false, context) {
            log::warn!("Failed to set 'url' in import_meta: {:?}", e);
        }
    }

    async fn load_imported_module(
        self: Rc<Self>,
        referrer: boa_engine::module::Referrer,
        specifier: JsString,
        context: &RefCell<&mut Context>,
    ) -> JsResult<Module> {
        let spec_str = specifier.to_std_string_lossy();
        log::debug!(
            "Loading imported module: {}, referrer={:?}",
            spec_str,
            referrer.path()
        );

        // Extension modules are registered under bare specifiers and resolve
        // the same from every referrer.
        if let Some(module) = self.cached(&spec_str) {
            return Ok(module);
        }

        let resolved_specifier = resolve(referrer.path(), &spec_str);
        log::debug!("Resolved specifier: {}", resolved_specifier);

        // Check cache with resolved specifier to avoid duplicate loading.
        if let Some(module) = self.cached(&resolved_specifier) {
            log::debug!("Cache hit for module: {}", resolved_specifier);
            return Ok(module);
        }

        let body = if is_remote(&resolved_specifier) {
            fetch(&resolved_specifier)?
        } else {
            std::fs::read_to_string(&resolved_specifier).map_err(|e| {
                JsError::from_native(
                    JsNativeError::typ()
                        .with_message(format!("Cannot read module {}: {}", resolved_specifier, e)),
                )
            })?
        };

        let src = Source::from_bytes(body.as_bytes()).with_path(Path::new(&resolved_specifier));
        let module = Module::parse(src, None, &mut context.borrow_mut())?;

        self.insert(resolved_specifier, module.clone());
        Ok(module)
    }
}

/// Resolve `specifier` against the importing module's location.
fn resolve(referrer: Option<&Path>, specifier: &str) -> String {
    let Some(path) = referrer else {
        return specifier.to_string();
    };

    // Try to resolve as absolute URL, otherwise resolve as relative URL with base.
    if let Ok(base_url) = url::Url::parse(&path.to_string_lossy()) {
        return match url::Url::options().base_url(Some(&base_url)).parse(specifier) {
            Ok(new_url) => new_url.to_string(),
            Err(_) => specifier.to_string(),
        };
    }

    // Local file path logic.
    let joined = if specifier.starts_with('/') {
        PathBuf::from(specifier)
    } else {
        path.parent().unwrap_or(path).join(specifier)
    };
    joined.to_string_lossy().to_string()
}

fn is_remote(specifier: &str) -> bool {
    url::Url::parse(specifier)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Fetch a module body on the shared runtime; the engine thread has no runtime of its own.
fn fetch(url: &str) -> JsResult<String> {
    TOKIO.block_on(async {
        let response = reqwest::get(url).await.map_err(|e| {
            JsError::from_native(JsNativeError::typ().with_message(format!("Fetch error: {}", e)))
        })?;

        response.text().await.map_err(|e| {
            JsError::from_native(
                JsNativeError::typ().with_message(format!("Fetch response error: {}", e)),
            )
        })
    })
}
