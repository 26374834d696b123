//! Remote Sync Worker: binary entrypoint.
//! Loads config, wires the remote client into the poll loop and runs until
//! Ctrl-C, the cycle cap, or the first failing cycle.

use std::process::ExitCode;

use remote_sync_worker::{config, metrics, remote, shutdown, worker, SyncWorker};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_LOG_FILTER: &str =
    "remote_sync_worker=info,retry=info,batch=info,enumerate=info,poll=info,remote=info,warn";

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stdout))
            .init();
    } else {
        registry
            .with(fmt::layer().compact().with_writer(std::io::stdout))
            .init();
    }
}

async fn run() -> anyhow::Result<u64> {
    let cfg = config::load_default()?;
    init_tracing(cfg.telemetry.json_logs);
    info!(
        preset = ?cfg.preset,
        remote = ?cfg.remote.kind,
        base_url = %cfg.remote.base_url,
        "config loaded"
    );

    if let Some(addr) = cfg.telemetry.metrics_socket()? {
        metrics::install_exporter(addr)?;
    }

    let (handle, stop) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, stopping after current step");
            handle.stop();
        }
    });

    let client = remote::build_client(&cfg.remote)?;
    let worker = SyncWorker::from_config(&cfg, client, Some(stop.clone()))?;
    let poll = worker::poll_loop(&cfg, Some(stop));

    Ok(worker.run(&poll).await?)
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();

    match run().await {
        Ok(cycles) => {
            info!(cycles, "worker stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "worker failed");
            eprintln!("remote-sync-worker: {e:#}");
            ExitCode::FAILURE
        }
    }
}
