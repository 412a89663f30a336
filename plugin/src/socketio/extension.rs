use boa_engine::object::ObjectInitializer;
use boa_engine::property::Attribute;
use boa_engine::{Context, JsError, JsNativeError, JsResult, JsString, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace, empty_trace};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::js::{EsmModule, JsEngineClient, JsEngineExtension};
use crate::socketio::adapter::default_connector;
use crate::socketio::bridge::{DEFAULT_ACK_TIMEOUT, SocketIoBridge};
use crate::socketio::client::{ConnectOptions, Connector};

/// Publishes `connect`, `emit`, `emitWithAck` and `disconnect` to scripts.
///
/// Every engine the extension is registered with gets its own bridge, so
/// one extension value can be shared by all virtual users.
pub struct SocketIoExtension {
    module_name: String,
    import_specifier: String,
    default_timeout: Duration,
    connector: Connector,
}

impl Default for SocketIoExtension {
    fn default() -> Self {
        Self {
            module_name: "socketio".to_string(),
            import_specifier: "socketio".to_string(),
            default_timeout: DEFAULT_ACK_TIMEOUT,
            connector: default_connector(),
        }
    }
}

impl SocketIoExtension {
    pub fn new() -> Self {
        Self::default()
    }

    /// Name of the global object and prefix of every log line.
    pub fn with_module_name(mut self, module_name: impl Into<String>) -> Self {
        self.module_name = module_name.into();
        self
    }

    /// Specifier scripts use to import the module.
    pub fn with_import_specifier(mut self, import_specifier: impl Into<String>) -> Self {
        self.import_specifier = import_specifier.into();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Replaces the connection factory, e.g. with a fake in tests.
    pub fn with_connector(mut self, connector: Connector) -> Self {
        self.connector = connector;
        self
    }
}

impl JsEngineExtension for SocketIoExtension {
    fn register(&self, context: &mut Context, _client: JsEngineClient) -> Result<(), JsError> {
        log::info!("Registering {} native functions", self.module_name);
        let bridge = SocketIoBridge::new(self.module_name.clone(), self.connector.clone())
            .with_default_timeout(self.default_timeout);
        register_socketio_object(context, &self.module_name, Arc::new(bridge))
    }

    fn esm_modules(&self) -> Vec<EsmModule> {
        let global = Value::String(self.module_name.clone());
        vec![EsmModule {
            specifier: self.import_specifier.clone(),
            source: format!(
                r#"
const mod = globalThis[{global}];
export default mod;
export const connect = mod.connect;
export const emit = mod.emit;
export const emitWithAck = mod.emitWithAck;
export const disconnect = mod.disconnect;
"#
            ),
        }]
    }
}

/// Bridge handle captured by the native functions.
#[derive(Clone, Finalize)]
struct BridgeHandle(Arc<SocketIoBridge>);

unsafe impl Trace for BridgeHandle {
    empty_trace!();
}

/// Builds the module object and installs it as a global.
fn register_socketio_object(
    context: &mut Context,
    name: &str,
    bridge: Arc<SocketIoBridge>,
) -> JsResult<()> {
    let handle = BridgeHandle(bridge);

    // connect(url: string, options?: object) -> void
    let connect = NativeFunction::from_copy_closure_with_captures(
        |_this: &JsValue, args: &[JsValue], bridge: &BridgeHandle, ctx: &mut Context| {
            connect_fn(args, bridge, ctx)
        },
        handle.clone(),
    );

    // emit(event: string, data: any) -> void
    let emit = NativeFunction::from_copy_closure_with_captures(
        |_this: &JsValue, args: &[JsValue], bridge: &BridgeHandle, ctx: &mut Context| {
            emit_fn(args, bridge, ctx)
        },
        handle.clone(),
    );

    // emitWithAck(event: string, data: any, timeoutMs?: number) -> any
    let emit_with_ack = NativeFunction::from_copy_closure_with_captures(
        |_this: &JsValue, args: &[JsValue], bridge: &BridgeHandle, ctx: &mut Context| {
            emit_with_ack_fn(args, bridge, ctx)
        },
        handle.clone(),
    );

    // disconnect() -> void
    let disconnect = NativeFunction::from_copy_closure_with_captures(
        |_this: &JsValue, _args: &[JsValue], bridge: &BridgeHandle, _ctx: &mut Context| {
            bridge.0.disconnect();
            Ok(JsValue::undefined())
        },
        handle,
    );

    let object = ObjectInitializer::new(context)
        .function(connect, JsString::from("connect"), 2)
        .function(emit, JsString::from("emit"), 2)
        .function(emit_with_ack, JsString::from("emitWithAck"), 3)
        .function(disconnect, JsString::from("disconnect"), 0)
        .build();

    context.register_global_property(JsString::from(name), object, Attribute::all())?;

    log::debug!("Registered {} module object", name);
    Ok(())
}

fn connect_fn(args: &[JsValue], bridge: &BridgeHandle, ctx: &mut Context) -> JsResult<JsValue> {
    let url = string_arg(args, 0, "url", ctx)?;

    let options = match args.get(1) {
        Some(value) if value.is_object() => {
            serde_json::from_value::<ConnectOptions>(to_json(value, ctx)?).map_err(|e| {
                JsError::from_native(
                    JsNativeError::typ().with_message(format!("connect: invalid options: {}", e)),
                )
            })?
        }
        _ => ConnectOptions::default(),
    };

    bridge.0.connect_with(&url, &options)?;
    Ok(JsValue::undefined())
}

fn emit_fn(args: &[JsValue], bridge: &BridgeHandle, ctx: &mut Context) -> JsResult<JsValue> {
    let event = string_arg(args, 0, "event", ctx)?;
    let data = data_arg(args, 1, ctx)?;

    bridge.0.emit(&event, data)?;
    Ok(JsValue::undefined())
}

fn emit_with_ack_fn(
    args: &[JsValue],
    bridge: &BridgeHandle,
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let event = string_arg(args, 0, "event", ctx)?;
    let data = data_arg(args, 1, ctx)?;
    let timeout = args.get(2).and_then(timeout_millis).map(Duration::from_millis);

    let result = bridge.0.emit_with_ack(&event, data, timeout)?;
    JsValue::from_json(&result, ctx)
}

/// Accepts only non-negative integral numbers; anything else means "use the default".
fn timeout_millis(value: &JsValue) -> Option<u64> {
    value
        .as_number()
        .filter(|n| n.is_finite() && n.fract() == 0.0 && *n >= 0.0)
        .map(|n| n as u64)
}

fn string_arg(args: &[JsValue], index: usize, name: &str, ctx: &mut Context) -> JsResult<String> {
    match args.get(index) {
        Some(value) if !value.is_undefined() => Ok(value.to_string(ctx)?.to_std_string_escaped()),
        _ => Err(JsError::from_native(
            JsNativeError::typ().with_message(format!("missing required argument '{}'", name)),
        )),
    }
}

fn data_arg(args: &[JsValue], index: usize, ctx: &mut Context) -> JsResult<Value> {
    match args.get(index) {
        Some(value) => to_json(value, ctx),
        None => Ok(Value::Null),
    }
}

fn to_json(value: &JsValue, ctx: &mut Context) -> JsResult<Value> {
    Ok(value.to_json(ctx)?.unwrap_or(Value::Null))
}
