//! Chain-change notifications for wallets that can only be polled.

use crate::chain::ChainClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

/// Default interval between chain id polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(4);

/// Polls `chain.chain_id()` every `interval` and publishes each new value.
///
/// The channel starts at `None`; the first successful poll publishes the
/// current chain. The task ends once every receiver is dropped.
pub fn spawn_chain_watcher(
    chain: Arc<dyn ChainClient>,
    interval: Duration,
) -> (watch::Receiver<Option<u64>>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(None);
    let handle = tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = ticker.tick() => {}
            }
            match chain.chain_id().await {
                Ok(chain_id) => {
                    let changed = tx.send_if_modified(|current| {
                        if *current == Some(chain_id) {
                            return false;
                        }
                        *current = Some(chain_id);
                        true
                    });
                    if changed {
                        debug!(chain_id, "wallet chain changed");
                    }
                }
                Err(err) => warn!(error = %err, "chain id poll failed"),
            }
        }
    });
    (rx, handle)
}
