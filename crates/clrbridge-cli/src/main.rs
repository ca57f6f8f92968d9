//! clr-probe: inspect and call into a running CLR bridge server.

use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use clrbridge::{RetryPolicy, ServerSpec, Session, SessionConfig, Value, WireInfo};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "clr-probe", version, about = "Probe a CLR bridge server")]
struct Cli {
    /// Bridge server host [default: $CLRBRIDGE_HOST or localhost]
    #[arg(long)]
    host: Option<String>,

    /// Bridge server port [default: $CLRBRIDGE_PORT or 56789]
    #[arg(long)]
    port: Option<u16>,

    /// Server executable to launch if nothing is listening
    #[arg(long)]
    server: Option<PathBuf>,

    /// Host program for the server (e.g. mono)
    #[arg(long, requires = "server")]
    runtime: Option<String>,

    /// Assembly for a launched server to preload
    #[arg(long, requires = "server")]
    dll: Option<PathBuf>,

    /// Connection attempts before giving up
    #[arg(long)]
    retries: Option<u32>,

    /// Milliseconds between connection attempts
    #[arg(long)]
    retry_gap_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the member template of a class
    Template { class: String },
    /// Call a static method; arguments are literals (null, true, 42, 1.5, text, s:42)
    Call {
        class: String,
        method: String,
        args: Vec<String>,
    },
    /// Evaluate a constructor expression such as "Point(3, 4)"
    Ctor { expr: String },
    /// Print wire-contract information for the connected server
    Info,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match std::env::var("CLRBRIDGE_LOG").as_deref() {
            Ok("trace") => "trace",
            Ok("debug") => "debug",
            Ok("info") => "info",
            Ok("error") => "error",
            _ => "warn",
        };
        EnvFilter::new(format!("clrbridge={level},clr_probe={level}"))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

fn config_from(cli: &Cli) -> Result<SessionConfig> {
    let mut config = SessionConfig::from_env().context("reading CLRBRIDGE_* environment")?;
    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(retries) = cli.retries {
        config.retry.retries = retries;
    }
    if let Some(gap) = cli.retry_gap_ms {
        config.retry = RetryPolicy::new(config.retry.retries, Duration::from_millis(gap));
    }
    if let Some(server) = &cli.server {
        let mut spec = ServerSpec::new(server);
        spec.runtime = cli.runtime.clone();
        spec.dll = cli.dll.clone();
        config = config.with_server(spec);
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = config_from(&cli)?;
    let target = format!("{}:{}", config.host, config.port);
    let session = Session::connect(config).with_context(|| format!("connecting to {target}"))?;
    tracing::debug!(peer = ?session.peer(), pid = ?session.server_pid(), "Session established");

    let output = match &cli.command {
        Command::Template { class } => {
            let template = session
                .template(class)
                .with_context(|| format!("fetching template for {class}"))?;
            serde_json::to_string_pretty(&template)?
        }
        Command::Call {
            class,
            method,
            args,
        } => {
            let args: Vec<Value> = args.iter().map(|a| parse_literal(a)).collect();
            let result = session
                .call_static(class, method, &args)
                .with_context(|| format!("calling {class}.{method}"))?;
            serde_json::to_string_pretty(&result)?
        }
        Command::Ctor { expr } => {
            let result = session
                .ctor(expr)
                .with_context(|| format!("evaluating {expr}"))?;
            serde_json::to_string_pretty(&result)?
        }
        Command::Info => {
            let mut info = WireInfo::new();
            if let Some(peer) = session.peer() {
                info = info.with_peer(peer.to_string());
            }
            serde_json::to_string_pretty(&info)?
        }
    };

    println!("{output}");
    session.close();
    Ok(())
}

/// Parse a command-line literal. `s:` forces the rest to be a string.
fn parse_literal(raw: &str) -> Value {
    if let Some(text) = raw.strip_prefix("s:") {
        return Value::from(text);
    }
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(i) = raw.parse::<i64>() {
                Value::Int(i)
            } else if let Ok(f) = raw.parse::<f64>() {
                Value::Float(f)
            } else {
                Value::from(raw)
            }
        }
    }
}
