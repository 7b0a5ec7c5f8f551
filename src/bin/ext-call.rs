//! `ext-call` – drive an extension from the command line.
//!
//! Connects to the shell as a frontend, dispatches one call through the
//! frontend shim and prints the result events that come back.

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::Value;
use shell_ext::FrontendShim;
use shell_ext::extension::envelope::events;
use shell_ext::frontend::{BrokerShell, DEFAULT_EXTENSION_ID};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "ext-call")]
#[command(about = "Call shell extension functions", long_about = None)]
struct Cli {
    /// Shell broker port
    #[arg(short, long)]
    port: u16,

    /// Access token issued by the shell
    #[arg(short, long)]
    token: String,

    /// Connect token for the frontend handshake
    #[arg(long)]
    connect_token: Option<String>,

    /// Extension to address
    #[arg(long, default_value = DEFAULT_EXTENSION_ID)]
    extension_id: String,

    /// Log each dispatched call
    #[arg(long)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an extension function
    Run {
        /// Function name
        function: String,

        /// Parameter (parsed as JSON, falls back to a plain string)
        parameter: Option<String>,

        /// Number of result events to wait for
        #[arg(short, long, default_value = "1")]
        results: usize,

        /// Give up waiting after this many seconds
        #[arg(long, default_value = "10")]
        timeout: u64,
    },

    /// Stop the extension and exit the app
    Stop,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    let url = BrokerShell::client_url(cli.port, cli.connect_token.as_deref());
    let (shell, mut shell_events) = BrokerShell::connect(&url, cli.token)
        .await
        .context("could not reach the shell")?;
    let shim = FrontendShim::with_extension_id(shell, cli.extension_id, cli.debug);

    match cli.command {
        Commands::Run {
            function,
            parameter,
            results,
            timeout,
        } => {
            let parameter = parameter
                .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
                .unwrap_or(Value::Null);
            shim.run(&function, parameter).await?;

            let wait = async {
                for _ in 0..results {
                    let Some(message) = shell_events.recv_event(events::PING_RESULT).await
                    else {
                        break;
                    };
                    match message.data() {
                        Some(Value::String(text)) => println!("{text}"),
                        Some(other) => println!("{other}"),
                        None => println!("{}", message.to_log_text()),
                    }
                }
            };
            if tokio::time::timeout(Duration::from_secs(timeout), wait)
                .await
                .is_err()
            {
                eprintln!("Timed out waiting for results");
            }
        }

        Commands::Stop => {
            shim.stop().await?;
            println!("Stop requested");
        }
    }

    shim.into_shell().close().await;
    Ok(())
}
