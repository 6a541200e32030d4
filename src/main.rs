mod cli;
mod config;
mod error;
mod kubernetes;
mod lines;
mod locator;
mod mailbox;
mod streamer;
#[cfg(test)]
mod testing;
mod types;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cli::Cli;
use config::TailConfig;
use error::TailError;
use kubernetes::{KubePodSource, create_client};
use locator::Locator;
use streamer::Streamer;

/// How long to wait for both loops to wind down after cancellation.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries only pod log lines
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match TailConfig::try_from(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    let client = match create_client(config.kubeconfig.as_deref(), config.context.as_deref()).await
    {
        Ok(client) => client,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config, KubePodSource::new(client)).await {
        error!("run failed: {}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(config: TailConfig, source: KubePodSource) -> Result<(), TailError> {
    let source = Arc::new(source);
    let (mailbox, subscription) = mailbox::channel();
    let cancel = CancellationToken::new();

    info!(
        selector = %config.selector,
        container = config.streamer.container.as_deref().unwrap_or("<default>"),
        "Tailing latest pod"
    );

    let locator = Locator::new(
        source.clone(),
        config.selector.clone(),
        config.locator,
        mailbox,
    );
    let streamer = Streamer::new(source, config.selector.namespace, config.streamer);

    let mut locator_task = tokio::spawn(locator.run(cancel.clone()));
    let mut streamer_task = tokio::spawn(streamer.run(
        subscription,
        tokio::io::stdout(),
        cancel.clone(),
    ));

    let result = tokio::select! {
        res = &mut locator_task => flatten(res),
        res = &mut streamer_task => flatten(res),
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    cancel.cancel();
    for task in [locator_task, streamer_task] {
        if task.is_finished() {
            continue;
        }
        let abort = task.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
            warn!("Task did not stop in time, aborting");
            abort.abort();
        }
    }
    result
}

fn flatten(res: Result<Result<(), TailError>, tokio::task::JoinError>) -> Result<(), TailError> {
    res?
}
