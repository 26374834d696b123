// tests/common/mod.rs
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::io;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::json;
use tokio::net::TcpListener;

use remote_sync_worker::remote::mock::ScriptedRemote;

/// Collects formatted tracing output for the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    /// Install as the thread-local subscriber until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let cap = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || cap.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }

    /// Lines containing every needle.
    pub fn count(&self, needles: &[&str]) -> usize {
        self.text()
            .lines()
            .filter(|l| needles.iter().all(|n| l.contains(n)))
            .count()
    }
}

/// Orders 1..=n listed on one page with their summary, each with
/// `orders/{id}` detail; every third order has a total above 1000.
pub fn orders_remote(n: u32) -> ScriptedRemote {
    let ids: Vec<String> = (1..=n).map(|i| i.to_string()).collect();
    let mut remote = ScriptedRemote::new().with_pages([ids]);
    for i in 1..=n {
        let total = if i % 3 == 0 { 1500 } else { 200 };
        let order = json!({"id": i.to_string(), "total": total, "status": "paid"});
        remote = remote
            .with_summary(i.to_string(), order.clone())
            .with_record(format!("orders/{i}"), order);
    }
    remote
}

/// Serve `router` on an ephemeral port; returns `http://addr`.
pub async fn spawn_router(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn objects(keys: &[&str]) -> BTreeMap<String, Vec<u8>> {
    keys.iter()
        .map(|k| (k.to_string(), format!("body of {k}").into_bytes()))
        .collect()
}
