use anyhow::{Context, anyhow};
use boa_socketio::{JsEngineBuilder, SocketIoExtension};
use clap::Parser;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Run a Socket.IO test script in one or more virtual users.
#[derive(Debug, Parser)]
#[command(name = "vu-runner")]
struct Args {
    /// ES module script; its default export runs once per iteration.
    script: PathBuf,

    /// Number of virtual users, each on its own engine thread.
    #[arg(long, default_value_t = 1)]
    vus: usize,

    /// Iterations per virtual user.
    #[arg(long, default_value_t = 1)]
    iterations: u64,

    /// Global object name and log prefix of the Socket.IO module.
    #[arg(long, default_value = "socketio")]
    module_name: String,

    /// Specifier scripts import the module from.
    #[arg(long, default_value = "socketio")]
    import_specifier: String,

    /// Ack timeout used when a script does not pass one.
    #[arg(long, default_value_t = 2000)]
    ack_timeout_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let source = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading {}", args.script.display()))?;
    let module = args.script.to_string_lossy().to_string();

    info!(script = %module, vus = args.vus, iterations = args.iterations, "starting");
    let started = Instant::now();

    let mut engines = Vec::with_capacity(args.vus);
    for vu in 1..=args.vus {
        let extension = SocketIoExtension::new()
            .with_module_name(args.module_name.clone())
            .with_import_specifier(args.import_specifier.clone())
            .with_default_timeout(Duration::from_millis(args.ack_timeout_ms));

        let engine = JsEngineBuilder::new()
            .with_name(format!("vu-{vu}"))
            .with_extension(extension)
            .build()
            .map_err(|e| anyhow!("building VU {vu}: {e}"))?
            .start()
            .with_context(|| format!("starting VU {vu}"))?;

        let client = engine.client();
        client.load_esm_module(module.clone(), source.clone());
        client.execute(iteration_script(&module, &args.module_name, args.iterations)?);
        engines.push(engine);
    }

    for engine in engines {
        engine.join();
    }

    info!(elapsed_ms = started.elapsed().as_millis() as u64, "all VUs finished");
    Ok(())
}

/// Calls the script's default export `iterations` times, then disconnects.
fn iteration_script(module: &str, global: &str, iterations: u64) -> anyhow::Result<String> {
    let module = serde_json::to_string(module)?;
    let global = serde_json::to_string(global)?;

    Ok(format!(
        r#"
(async () => {{
    const mod = await import({module});
    if (typeof mod.default !== 'function') {{
        console.error('script has no default export function');
        return;
    }}
    for (let i = 0; i < {iterations}; i++) {{
        try {{
            mod.default();
        }} catch (err) {{
            console.error('iteration ' + i + ' failed:', err);
        }}
    }}
}})().finally(() => {{
    const sio = globalThis[{global}];
    if (sio) sio.disconnect();
}});
"#
    ))
}
