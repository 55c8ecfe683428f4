//! Active expiry.
//!
//! `get` hides expired keys and drops the ones it touches, but a key that is
//! never read again would stay resident. A Tokio task sweeps the whole store
//! on an interval that halves while sweeps keep finding many expired keys
//! and doubles while they find none.

use crate::storage::StorageEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tracing::{debug, info, trace};

/// Tuning for the sweeper's adaptive interval.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Delay before the first sweep
    pub base_interval: Duration,
    pub min_interval: Duration,
    pub max_interval: Duration,
    /// Sweep sooner when more than this fraction of keys had expired
    pub speedup_threshold: f64,
    /// Sweep later when less than this fraction had expired
    pub slowdown_threshold: f64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            base_interval: Duration::from_millis(100),
            min_interval: Duration::from_millis(10),
            max_interval: Duration::from_secs(1),
            speedup_threshold: 0.25,
            slowdown_threshold: 0.01,
        }
    }
}

/// Owner handle for the sweeper task. Dropping it stops the task.
#[derive(Debug)]
pub struct ExpirySweeper {
    stop_tx: watch::Sender<bool>,
}

impl ExpirySweeper {
    /// Spawns the sweeper onto the current Tokio runtime.
    ///
    /// ```ignore
    /// let engine = Arc::new(StorageEngine::new());
    /// let sweeper = ExpirySweeper::start(Arc::clone(&engine), ExpiryConfig::default());
    /// // ...
    /// drop(sweeper);
    /// ```
    pub fn start(engine: Arc<StorageEngine>, config: ExpiryConfig) -> Self {
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(sweep(engine, config, stop_rx));
        info!("Expiry sweeper running");
        Self { stop_tx }
    }

    /// Signals the task to exit after its current sweep.
    pub fn stop(&self) {
        // send_replace never fails; only log the first stop
        if !self.stop_tx.send_replace(true) {
            info!("Expiry sweeper stopping");
        }
    }
}

impl Drop for ExpirySweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep(
    engine: Arc<StorageEngine>,
    config: ExpiryConfig,
    mut stop_rx: watch::Receiver<bool>,
) {
    let mut interval = config.base_interval;

    loop {
        tokio::select! {
            _ = time::sleep(interval) => {}
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    debug!("Expiry sweeper exiting");
                    return;
                }
            }
        }

        let resident = engine.len();
        let removed = engine.cleanup_expired();
        interval = next_interval(&config, interval, resident, removed);

        if removed == 0 {
            trace!(next_ms = interval.as_millis(), "Sweep found nothing");
        } else {
            debug!(
                removed,
                resident = resident.saturating_sub(removed),
                next_ms = interval.as_millis(),
                "Swept expired keys"
            );
        }
    }
}

/// Delay before the next sweep, given how many of `resident` keys the last
/// sweep removed.
fn next_interval(
    config: &ExpiryConfig,
    current: Duration,
    resident: u64,
    removed: u64,
) -> Duration {
    if resident == 0 {
        return current;
    }

    let ratio = removed as f64 / resident as f64;
    if ratio > config.speedup_threshold {
        (current / 2).max(config.min_interval)
    } else if removed == 0 && ratio < config.slowdown_threshold {
        (current * 2).min(config.max_interval)
    } else {
        current
    }
}

/// [`ExpirySweeper::start`] with [`ExpiryConfig::default`].
pub fn start_expiry_sweeper(engine: Arc<StorageEngine>) -> ExpirySweeper {
    ExpirySweeper::start(engine, ExpiryConfig::default())
}
