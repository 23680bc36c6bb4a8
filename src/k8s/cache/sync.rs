use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Create a connected notifier/barrier pair
#[must_use]
pub fn barrier() -> (SyncNotifier, SyncBarrier) {
    let (tx, rx) = watch::channel(false);
    (SyncNotifier { tx }, SyncBarrier { rx })
}

/// Reflector side of the barrier, opens it exactly once
#[derive(Debug)]
pub struct SyncNotifier {
    tx: watch::Sender<bool>,
}

impl SyncNotifier {
    /// Open the barrier; later calls are no-ops
    pub fn mark_synced(&self) {
        let opened = self.tx.send_if_modified(|synced| {
            if *synced {
                false
            } else {
                *synced = true;
                true
            }
        });
        if opened {
            info!("✅ Cache synced");
        }
    }
}

/// Consumer side of the barrier
#[derive(Debug, Clone)]
pub struct SyncBarrier {
    rx: watch::Receiver<bool>,
}

impl SyncBarrier {
    #[must_use]
    pub fn has_synced(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until the initial snapshot has been applied
    ///
    /// Returns `false` if `cancel` fires first or the reflector stops without
    /// ever syncing; the cache must not be used in that case.
    pub async fn wait_for_sync(&self, cancel: &CancellationToken) -> bool {
        let mut rx = self.rx.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("sync wait cancelled");
                self.has_synced()
            }
            synced = rx.wait_for(|synced| *synced) => {
                if synced.is_err() {
                    debug!("reflector stopped before cache sync");
                }
                synced.is_ok()
            }
        }
    }
}
