//! sluice: call a JSON endpoint once per input line.
//!
//! Reads JSON documents (one per line) from a file or stdin, POSTs each to
//! the configured endpoint through a bounded window, and prints one JSON
//! line per result in input order.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use clap::Parser;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tracing::{error, info, warn};

use sluice::config::{Config, api_key_from_env};
use sluice::{HttpInvoker, Output, map_remote};

/// Stream JSON documents through a remote endpoint.
#[derive(Parser)]
#[command(name = "sluice")]
#[command(version = sluice::PKG_VERSION)]
#[command(about = "Bounded, order-preserving remote calls over JSON lines")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Endpoint URL (overrides the config file).
    #[arg(short, long)]
    url: Option<String>,

    /// User API key.
    #[arg(short, long, env = "SLUICE_API_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Number of concurrent calls.
    #[arg(short = 't', long = "threads")]
    threads: Option<usize>,

    /// Maximum calls in flight (default: twice the thread count).
    #[arg(long)]
    capacity: Option<usize>,

    /// Overall deadline in seconds.
    #[arg(long)]
    deadline_secs: Option<f64>,

    /// Print failed calls as `{"error": ...}` instead of stopping.
    #[arg(long)]
    no_fail_fast: bool,

    /// Print `{"input": ..., "output": ...}` pairs.
    #[arg(long)]
    with_inputs: bool,

    /// Input file with one JSON document per line (default: stdin).
    input: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load(args.config.as_deref())?;

    // Command-line flags take precedence over the file
    if let Some(threads) = args.threads {
        config.dispatch.workers = threads;
    }
    if args.capacity.is_some() {
        config.dispatch.capacity = args.capacity;
    }
    if args.deadline_secs.is_some() {
        config.dispatch.deadline_secs = args.deadline_secs;
    }
    if args.no_fail_fast {
        config.dispatch.fail_fast = false;
    }
    if args.with_inputs {
        config.dispatch.with_inputs = true;
    }

    let options = config.dispatch.to_options()?;
    let api_key = args.key.or_else(api_key_from_env);
    let http = config.http.to_http_config(args.url.as_deref(), api_key)?;
    info!(url = %http.url, workers = options.workers, capacity = options.effective_capacity(), "starting");

    let invoker: HttpInvoker<Value, Value> = HttpInvoker::new(http)?;

    let reader: Box<dyn BufRead + Send> = match &args.input {
        Some(path) => Box::new(BufReader::new(File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let read_error = Arc::new(OnceLock::new());
    let inputs = off_runtime(documents(reader, Arc::clone(&read_error)));
    let mut results = map_remote(inputs, Arc::new(invoker), &options)?;
    let mut out = BufWriter::new(io::stdout().lock());

    while let Some(item) = results.next().await {
        let line = render(item?);
        writeln!(out, "{line}")?;
    }
    out.flush()?;

    if let Some(err) = read_error.get() {
        return Err(format!("failed to read input: {err}").into());
    }
    Ok(())
}

/// Lazily parse one JSON document per non-blank line.
///
/// Lines that are not valid JSON, invalid UTF-8 included, are skipped with a
/// warning. A read error ends the input and is stored in `failed`.
fn documents(
    reader: impl BufRead,
    failed: Arc<OnceLock<io::Error>>,
) -> impl Iterator<Item = Value> {
    reader
        .split(b'\n')
        .enumerate()
        .map_while(move |(n, line)| match line {
            Ok(line) => Some((n, line)),
            Err(e) => {
                error!(line = n + 1, error = %e, "stopped reading input");
                let _ = failed.set(e);
                None
            }
        })
        .filter(|(_, line)| !line.trim_ascii().is_empty())
        .filter_map(|(n, line)| match serde_json::from_slice(&line) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(line = n + 1, error = %e, "skipping malformed input line");
                None
            }
        })
}

/// Pull from a blocking iterator without stalling the runtime worker that
/// drives the calls.
fn off_runtime<I: Iterator>(mut inner: I) -> impl Iterator<Item = I::Item> {
    std::iter::from_fn(move || tokio::task::block_in_place(|| inner.next()))
}

fn render(item: Output<Value, Value>) -> Value {
    let output = |result: sluice::CallResult<Value>| match result {
        Ok(value) => value,
        Err(e) => json!({ "error": e.to_string() }),
    };
    match item.into_parts() {
        (Some(input), result) => json!({ "input": input, "output": output(result) }),
        (None, result) => output(result),
    }
}
