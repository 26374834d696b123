//! Local stub of the orders/users API for running the worker without a real backend.
//!
//! Env:
//!   STUB_API_ADDR       listen address (default 127.0.0.1:8089)
//!   STUB_FAILURE_RATE   fraction of requests answered with 429 (default 0.1)
//!   STUB_PAGE_SIZE      paginate list responses as {items, next} when set

use anyhow::Context;
use remote_sync_worker::stub_api::{router, Dataset, StubState};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_ADDR: &str = "127.0.0.1:8089";
const DEFAULT_FAILURE_RATE: f64 = 0.1;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{key}=`{v}` is not valid")),
        _ => Ok(default),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact())
        .init();

    let addr: String = env_or("STUB_API_ADDR", DEFAULT_ADDR.to_string())?;
    let failure_rate: f64 = env_or("STUB_FAILURE_RATE", DEFAULT_FAILURE_RATE)?;
    let page_size: Option<usize> = match std::env::var("STUB_PAGE_SIZE") {
        Ok(v) if !v.trim().is_empty() => Some(
            v.trim()
                .parse()
                .with_context(|| format!("STUB_PAGE_SIZE=`{v}` is not a number"))?,
        ),
        _ => None,
    };

    let state = StubState::new(Dataset::demo())
        .with_failure_rate(failure_rate)
        .with_page_size(page_size);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, failure_rate, ?page_size, "stub api listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
