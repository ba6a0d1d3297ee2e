//! Per-asset advisory locks
//!
//! Every state-changing operation locks the assets it touches before it
//! re-reads its preconditions. Locks are always taken in [`AssetRef`] order
//! so two operations over overlapping asset sets cannot deadlock, and each
//! lock carries a random token so only its owner can release it.

use assets_common::{AssetRef, Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::store::Store;

#[derive(Clone)]
pub struct AssetLocks {
    store: Arc<dyn Store>,
    ttl: Duration,
    wait: Duration,
    retry: Duration,
}

/// Locks held by one operation. Must be released with [`Lease::release`].
#[must_use = "a lease holds asset locks until it is released"]
pub struct Lease {
    store: Arc<dyn Store>,
    token: String,
    assets: Vec<AssetRef>,
}

impl AssetLocks {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        Self {
            store,
            ttl: config.lock_ttl,
            wait: config.lock_wait,
            retry: config.lock_retry,
        }
    }

    /// Lock every asset in `assets`, waiting up to the configured time for
    /// busy ones. Gives `Conflict` if any stays busy.
    pub async fn acquire(&self, assets: &[AssetRef]) -> Result<Lease> {
        let mut wanted = assets.to_vec();
        wanted.sort();
        wanted.dedup();

        let mut lease = Lease {
            store: Arc::clone(&self.store),
            token: Uuid::new_v4().to_string(),
            assets: Vec::with_capacity(wanted.len()),
        };
        let deadline = Instant::now() + self.wait;

        for asset in wanted {
            loop {
                match self.store.try_lock(asset, &lease.token, self.ttl).await {
                    Ok(true) => {
                        lease.assets.push(asset);
                        break;
                    }
                    Ok(false) if Instant::now() < deadline => {
                        tokio::time::sleep(self.retry).await;
                    }
                    Ok(false) => {
                        debug!("Gave up waiting for {}", asset);
                        lease.release().await;
                        return Err(Error::Conflict(format!(
                            "{} is busy with another operation",
                            asset
                        )));
                    }
                    Err(e) => {
                        lease.release().await;
                        return Err(e);
                    }
                }
            }
        }

        Ok(lease)
    }
}

impl Lease {
    pub fn assets(&self) -> &[AssetRef] {
        &self.assets
    }

    pub fn covers(&self, asset: AssetRef) -> bool {
        self.assets.binary_search(&asset).is_ok()
    }

    /// Release every held lock. Failures are logged; the lock then expires
    /// on its own after the configured TTL.
    pub async fn release(self) {
        for asset in self.assets.iter().rev() {
            if let Err(e) = self.store.unlock(*asset, &self.token).await {
                warn!("Failed to release lock on {}: {}", asset, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use assets_common::{PhoneId, SimCardId};

    fn quick_config() -> Config {
        Config {
            lock_wait: Duration::from_millis(60),
            lock_retry: Duration::from_millis(10),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_acquire_sorts_and_dedups() {
        let locks = AssetLocks::new(Arc::new(MemoryStore::new()), &quick_config());
        let lease = locks
            .acquire(&[
                AssetRef::sim(SimCardId(1)),
                AssetRef::phone(PhoneId(4)),
                AssetRef::sim(SimCardId(1)),
            ])
            .await
            .unwrap();
        assert_eq!(
            lease.assets(),
            &[AssetRef::phone(PhoneId(4)), AssetRef::sim(SimCardId(1))]
        );
        assert!(lease.covers(AssetRef::sim(SimCardId(1))));
        lease.release().await;
    }

    #[tokio::test]
    async fn test_busy_asset_times_out_and_frees_partial_locks() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let locks = AssetLocks::new(Arc::clone(&store), &quick_config());
        let phone = AssetRef::phone(PhoneId(1));
        let sim = AssetRef::sim(SimCardId(1));

        let holder = locks.acquire(&[sim]).await.unwrap();

        let err = locks.acquire(&[phone, sim]).await.err().unwrap();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(err.to_string().contains("busy"));

        // the phone lock taken before the timeout was given back
        let phone_only = locks.acquire(&[phone]).await.unwrap();
        phone_only.release().await;

        holder.release().await;
        let both = locks.acquire(&[phone, sim]).await.unwrap();
        both.release().await;
    }
}
