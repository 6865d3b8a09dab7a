use anyhow::Context;
use commskit::dump::hex_string;
use commskit::Engine;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let mut raw_args: Vec<String> = std::env::args().skip(1).collect();
    let verbose = match raw_args.iter().position(|a| a == "--verbose" || a == "-v") {
        Some(pos) => {
            raw_args.remove(pos);
            true
        }
        None => false,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "warn" }));
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    let mut args = raw_args.into_iter();
    let Some(dsl_path) = args.next().map(PathBuf::from) else {
        anyhow::bail!("usage: comms_encode <protocol.dsl> [<message-id|name> [index]] [--verbose]");
    };
    let key = args.next();
    let index: usize = match args.next() {
        Some(s) => s.parse().context("index must be a number")?,
        None => 0,
    };

    let src = std::fs::read_to_string(&dsl_path)
        .with_context(|| format!("reading {}", dsl_path.display()))?;
    let engine = Engine::from_dsl(&src).map_err(|e| anyhow::anyhow!(e))?;

    let messages = match key {
        Some(key) => vec![engine
            .create_message(&key, index)
            .with_context(|| format!("no message `{}` (index {})", key, index))?],
        None => engine.create_all_messages(),
    };
    for msg in &messages {
        let bytes = engine
            .write(msg)
            .with_context(|| format!("encoding {}", msg.name()))?;
        println!("{} ({}): {}", msg.name(), msg.id_as_string(), hex_string(&bytes));
    }
    Ok(())
}
