//! `ext-host` – extension process launched by the shell.
//!
//! Reads connection parameters from its arguments or stdin, connects to the
//! shell's broker and serves the example functions until the shell goes away.

use anyhow::Context;
use shell_ext::extension::{AppFunctions, ConnectionParams, ExtensionHost, HostOptions};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing; stdin/stdout belong to the shell handshake.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let params = ConnectionParams::from_process()
        .await
        .context("extension not initialized")?;
    let options = HostOptions::from_env();

    let host = ExtensionHost::new(params, options.clone());
    let functions = AppFunctions::new(host.sender(), options.long_run_interval);

    host.run(|message| functions.process_app_event(message))
        .await
        .context("extension connection failed")?;
    Ok(())
}
