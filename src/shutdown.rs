// src/shutdown.rs
//! Stop signal threaded through retry delays and the poll interval.

use std::time::Duration;
use tokio::sync::watch;

/// Sending half; `stop()` is sticky.
#[derive(Debug, Clone)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

/// Receiving half, cheap to clone into tasks.
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

pub fn channel() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl StopHandle {
    pub fn stop(&self) {
        // send_replace never fails, even with no receivers left
        self.tx.send_replace(true);
    }
}

impl StopSignal {
    pub fn is_stopped(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once stop has been requested. Pends forever if the handle was
    /// dropped without stopping.
    pub async fn stopped(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|v| *v).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Sleep for `dur`, waking early if `stop` fires. Returns true when stopped.
pub async fn sleep_or_stop(dur: Duration, stop: Option<&StopSignal>) -> bool {
    match stop {
        None => {
            tokio::time::sleep(dur).await;
            false
        }
        Some(s) => {
            if s.is_stopped() {
                return true;
            }
            tokio::select! {
                _ = tokio::time::sleep(dur) => false,
                _ = s.stopped() => true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_stop() {
        let (_h, s) = channel();
        let t0 = tokio::time::Instant::now();
        assert!(!sleep_or_stop(Duration::from_millis(50), Some(&s)).await);
        assert!(t0.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_wakes_sleeper_early() {
        let (h, s) = channel();
        let t0 = tokio::time::Instant::now();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            h.stop();
        });
        assert!(sleep_or_stop(Duration::from_secs(60), Some(&s)).await);
        assert!(t0.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_does_not_count_as_stop() {
        let (h, s) = channel();
        drop(h);
        assert!(!sleep_or_stop(Duration::from_millis(5), Some(&s)).await);
        assert!(!s.is_stopped());
    }
}
