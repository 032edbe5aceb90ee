//! # thriftrs CLI Entry Point
//!
//! Main binary for the thriftrs RPC stack. Serves the address book demo
//! service and makes calls against it.
//!
//! ## Usage
//!
//! ```bash
//! # Start the address book server
//! thriftrs serve -b 127.0.0.1:9090
//!
//! # Make an RPC call (outputs raw JSON)
//! thriftrs call 127.0.0.1:9090 hello -a '{"name": "jane"}'
//! thriftrs call 127.0.0.1:9090 add -a '{"person": {"name": "alice", "phones": []}}'
//! ```
//!
//! Tracker labels default to `thriftrs` and can be overridden with
//! `THRIFTRS_SERVER_NAME` and `THRIFTRS_CLIENT_NAME`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use thriftrs_cli::demo::{self, AddressBook};
use thriftrs_cli::{label_from_env, CLIENT_NAME_ENV, SERVER_NAME_ENV};
use thriftrs_client::{connect_framed, ClientConfig, TrackedClient};
use thriftrs_server::{Processor, ServerConfig, TcpServer};
use thriftrs_trace::{LogSink, Tracker};

/// Main CLI structure parsed from command-line arguments.
#[derive(FromArgs)]
/// thriftrs - JSON RPC with call tracing
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

/// Available CLI subcommands.
///
/// - **Serve**: Start the address book server
/// - **Call**: Make a single RPC call (unix-friendly JSON output)
#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Serve(ServeArgs),
    Call(CallArgs),
}

/// Arguments for starting the address book server.
#[derive(FromArgs)]
#[argh(subcommand, name = "serve")]
/// start the address book server
struct ServeArgs {
    /// address to bind the server to
    ///
    /// Defaults to "127.0.0.1:9090".
    #[argh(option, short = 'b', default = "\"127.0.0.1:9090\".into()")]
    bind: String,

    /// idle connection timeout in milliseconds
    ///
    /// Connections that send nothing for this long are closed. Zero (the
    /// default) keeps idle connections open.
    #[argh(option, long = "idle-timeout-ms", default = "0")]
    idle_timeout_ms: u64,
}

/// Arguments for making a single RPC call.
///
/// Outputs the raw JSON result to stdout for piping to tools like jq.
///
/// # Example
///
/// ```bash
/// thriftrs call 127.0.0.1:9090 get -a '{"name": "alice"}'
/// ```
#[derive(FromArgs)]
#[argh(subcommand, name = "call")]
/// make an RPC call to the address book
struct CallArgs {
    /// server address (host:port)
    #[argh(positional)]
    server_address: String,

    /// method name to call
    #[argh(positional)]
    method: String,

    /// JSON object with the call arguments
    #[argh(option, short = 'a', long = "args", default = "\"{}\".into()")]
    args: String,

    /// call timeout in milliseconds
    #[argh(option, short = 't', long = "timeout-ms", default = "20000")]
    timeout_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Keep `call` output clean for piping to jq
    if !matches!(cli.command, Commands::Call(_)) {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Call(args) => run_call(args).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let schema = demo::schema()?;
    let tracker = Tracker::new(
        label_from_env(CLIENT_NAME_ENV, "thriftrs"),
        label_from_env(SERVER_NAME_ENV, "thriftrs"),
        Arc::new(LogSink),
    );
    tracing::info!(tracker = ?tracker, "starting address book server");

    let processor = Arc::new(
        Processor::new(schema.service.clone(), Arc::new(AddressBook::new()))
            .with_tracker(Arc::new(tracker)),
    );

    let config = ServerConfig {
        read_timeout: (args.idle_timeout_ms > 0).then(|| Duration::from_millis(args.idle_timeout_ms)),
        ..ServerConfig::default()
    };
    let server = TcpServer::new(&args.bind).await?.with_config(config);

    server
        .run_until(processor, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    Ok(())
}

async fn run_call(args: CallArgs) -> Result<()> {
    let call_args: serde_json::Value = serde_json::from_str(&args.args)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in args: {}", e))?;

    let config = ClientConfig {
        timeout: Duration::from_millis(args.timeout_ms),
    };
    let client = connect_framed(&args.server_address, demo::schema()?.service.clone(), &config).await?;

    let tracker = Tracker::new(
        label_from_env(CLIENT_NAME_ENV, "thriftrs"),
        label_from_env(SERVER_NAME_ENV, "thriftrs"),
        Arc::new(LogSink),
    );
    let mut client = TrackedClient::new(client, Arc::new(tracker));
    let result = demo::call_json(&mut client, &args.method, &call_args).await?;

    // Output raw JSON to stdout
    println!("{}", serde_json::to_string(&result)?);

    Ok(())
}
