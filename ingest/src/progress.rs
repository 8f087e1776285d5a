use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

/// Counts decoded appearances and logs the rate once per second while alive.
pub struct Progress {
    done: Arc<AtomicU64>,
    stop: CancellationToken,
}

impl Progress {
    pub fn spawn() -> Self {
        let done = Arc::new(AtomicU64::new(0));
        let stop = CancellationToken::new();

        let counter = done.clone();
        let token = stop.clone();
        tokio::spawn(async move {
            let start = Instant::now();
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let done = counter.load(Ordering::Relaxed);
                        let secs = start.elapsed().as_secs().max(1);
                        log::info!("appearances done: {} ({} apps/sec)", done, done / secs);
                    }
                }
            }
        });

        Self { done, stop }
    }

    pub fn add(&self, n: u64) {
        self.done.fetch_add(n, Ordering::Relaxed);
    }

    pub fn done(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}
