//! JetStream Operator - manages NATS JetStream streams from Kubernetes

use clap::Parser;
use kube::Client;
use tokio_util::sync::CancellationToken;

use jetstream_common::telemetry::{init_telemetry, TelemetryConfig};
use jetstream_operator::config::{Cli, Commands};
use jetstream_operator::controller_runner::{build_stream_controller, cancel_on_signal};
use jetstream_operator::crds::{ensure_stream_crd, stream_crd_yaml};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        print!("{}", stream_crd_yaml()?);
        return Ok(());
    }

    let args = cli.controller;
    init_telemetry(TelemetryConfig {
        json: !args.log_text,
        ..TelemetryConfig::default()
    })?;

    match cli.command.unwrap_or(Commands::Controller) {
        Commands::Controller => {
            let client = Client::try_default()
                .await
                .map_err(|e| anyhow::anyhow!("failed to create kube client: {}", e))?;

            if args.install_crds {
                ensure_stream_crd(&client).await?;
            }

            let shutdown = CancellationToken::new();
            tokio::spawn(cancel_on_signal(shutdown.clone()));

            tracing::info!("Starting JetStream operator");
            build_stream_controller(client, &args, shutdown).await;
            tracing::info!("JetStream operator stopped");
        }
    }

    Ok(())
}
