//! Expiration Sweep Task
//!
//! Background task that periodically applies the expiry check to every entry
//! of one cache.

use std::sync::Weak;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::Shared;

/// Spawns a background task that sweeps expired entries every `period`.
///
/// The task only holds a weak reference, so it never keeps the cache alive:
/// it exits on its own once the last handle is dropped. The runtime does not
/// wait for it on shutdown.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted by `Cache::close`.
pub(crate) fn spawn_sweeper(cache: Weak<Shared>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting expiration sweep with period of {:?}", period);

        loop {
            tokio::time::sleep(period).await;

            let Some(shared) = cache.upgrade() else {
                debug!("Cache dropped, expiration sweep exiting");
                break;
            };
            let expired = shared.sweep();
            drop(shared);

            if expired > 0 {
                debug!("Expiration sweep: {} expired entries", expired);
            }
        }
    })
}
