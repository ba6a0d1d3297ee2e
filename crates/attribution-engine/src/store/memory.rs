//! In-process store for tests and local runs.
//!
//! All state sits behind one `RwLock`; a commit holds the write half for
//! the whole unit, which gives readers the same all-or-nothing view the
//! Redis backend gets from its commit script.

use assets_common::{AssetKind, AssetRef, AttributionId, Error, Result, UserId};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use super::{code_key, email_key, Sequence, Store, UnitOfWork};
use crate::models::{Asset, AssignmentHistory, Attribution, User};

#[derive(Default)]
struct State {
    users: BTreeMap<UserId, User>,
    emails: HashMap<String, UserId>,
    assets: BTreeMap<AssetRef, Asset>,
    codes: HashMap<(AssetKind, String), AssetRef>,
    attributions: BTreeMap<AttributionId, Attribution>,
    active: HashMap<AssetRef, AttributionId>,
    history: Vec<AssignmentHistory>,
}

/// Memory-backed [`Store`]
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    sequences: Mutex<HashMap<Sequence, u64>>,
    locks: Mutex<HashMap<AssetRef, (String, Instant)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Storage("memory store mutex poisoned".to_string())
}

#[async_trait]
impl Store for MemoryStore {
    async fn user(&self, id: UserId) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.read().await;
        Ok(state
            .emails
            .get(&email_key(email))
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn users(&self) -> Result<Vec<User>> {
        Ok(self.state.read().await.users.values().cloned().collect())
    }

    async fn insert_user(&self, user: &User) -> Result<bool> {
        let mut state = self.state.write().await;
        let key = email_key(&user.email);
        if state.emails.contains_key(&key) {
            return Ok(false);
        }
        state.emails.insert(key, user.id);
        state.users.insert(user.id, user.clone());
        Ok(true)
    }

    async fn asset(&self, asset: AssetRef) -> Result<Option<Asset>> {
        Ok(self.state.read().await.assets.get(&asset).cloned())
    }

    async fn asset_by_code(&self, kind: AssetKind, code: &str) -> Result<Option<Asset>> {
        let state = self.state.read().await;
        Ok(state
            .codes
            .get(&(kind, code_key(code)))
            .and_then(|asset_ref| state.assets.get(asset_ref))
            .cloned())
    }

    async fn assets(&self, kind: AssetKind) -> Result<Vec<Asset>> {
        let state = self.state.read().await;
        Ok(state
            .assets
            .iter()
            .filter(|(asset_ref, _)| asset_ref.kind == kind)
            .map(|(_, asset)| asset.clone())
            .collect())
    }

    async fn insert_asset(&self, asset: &Asset) -> Result<bool> {
        let mut state = self.state.write().await;
        let key = (asset.kind(), code_key(asset.code()));
        if state.codes.contains_key(&key) {
            return Ok(false);
        }
        state.codes.insert(key, asset.asset_ref());
        state.assets.insert(asset.asset_ref(), asset.clone());
        Ok(true)
    }

    async fn attribution(&self, id: AttributionId) -> Result<Option<Attribution>> {
        Ok(self.state.read().await.attributions.get(&id).cloned())
    }

    async fn attributions(&self) -> Result<Vec<Attribution>> {
        Ok(self
            .state
            .read()
            .await
            .attributions
            .values()
            .cloned()
            .collect())
    }

    async fn active_attribution(&self, asset: AssetRef) -> Result<Option<Attribution>> {
        let state = self.state.read().await;
        Ok(state
            .active
            .get(&asset)
            .and_then(|id| state.attributions.get(id))
            .cloned())
    }

    async fn count_active_attributions(&self, asset: AssetRef) -> Result<usize> {
        let state = self.state.read().await;
        Ok(state
            .attributions
            .values()
            .filter(|a| a.is_active() && a.holds(asset))
            .count())
    }

    async fn history_for_item(&self, asset: AssetRef) -> Result<Vec<AssignmentHistory>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.asset() == asset)
            .cloned()
            .collect())
    }

    async fn history_for_user(&self, user: UserId) -> Result<Vec<AssignmentHistory>> {
        let state = self.state.read().await;
        Ok(state
            .history
            .iter()
            .filter(|h| h.involves(user))
            .cloned()
            .collect())
    }

    async fn next_id(&self, sequence: Sequence) -> Result<u64> {
        let mut sequences = self.sequences.lock().map_err(poisoned)?;
        let next = sequences.entry(sequence).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn try_lock(&self, asset: AssetRef, token: &str, ttl: Duration) -> Result<bool> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        let now = Instant::now();
        match locks.get(&asset) {
            Some((holder, expires)) if *expires > now && holder != token => Ok(false),
            _ => {
                locks.insert(asset, (token.to_string(), now + ttl));
                Ok(true)
            }
        }
    }

    async fn unlock(&self, asset: AssetRef, token: &str) -> Result<()> {
        let mut locks = self.locks.lock().map_err(poisoned)?;
        if locks.get(&asset).is_some_and(|(holder, _)| holder == token) {
            locks.remove(&asset);
        }
        Ok(())
    }

    async fn commit(&self, unit: UnitOfWork) -> Result<()> {
        let mut state = self.state.write().await;

        for claim in unit.claims() {
            let current = state.active.get(&claim.asset).copied();
            if current != claim.expected {
                debug!(
                    "Rejecting {} commit: {} is held by {:?}, expected {:?}",
                    unit.operation(),
                    claim.asset,
                    current,
                    claim.expected
                );
                return Err(Error::Conflict(format!(
                    "{} was claimed by another attribution",
                    claim.asset
                )));
            }
        }

        for claim in unit.claims() {
            match claim.holder {
                Some(id) => state.active.insert(claim.asset, id),
                None => state.active.remove(&claim.asset),
            };
        }
        for attribution in unit.attributions() {
            state
                .attributions
                .insert(attribution.id(), attribution.clone());
        }
        for id in unit.removals() {
            state.attributions.remove(id);
        }
        for asset in unit.assets() {
            state.assets.insert(asset.asset_ref(), asset.clone());
        }
        state.history.extend(unit.history().iter().cloned());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Phone;
    use assets_common::{PhoneId, Role, UserStatus};

    fn user(id: u64, email: &str) -> User {
        User {
            id: UserId(id),
            name: format!("User {}", id),
            email: email.to_string(),
            role: Role::User,
            department: "Field".to_string(),
            status: UserStatus::Active,
        }
    }

    #[tokio::test]
    async fn test_email_is_unique_case_insensitively() {
        let store = MemoryStore::new();
        assert!(store.insert_user(&user(1, "ana@example.com")).await.unwrap());
        assert!(!store.insert_user(&user(2, "ANA@example.com")).await.unwrap());

        let found = store.user_by_email(" Ana@Example.com ").await.unwrap().unwrap();
        assert_eq!(found.id, UserId(1));
    }

    #[tokio::test]
    async fn test_claim_mismatch_rejects_whole_unit() {
        let store = MemoryStore::new();
        let phone = Asset::Phone(Phone::new(
            PhoneId(7),
            "Nokia".to_string(),
            "G21".to_string(),
            "490154203237518".to_string(),
        ));
        store.insert_asset(&phone).await.unwrap();
        let asset_ref = phone.asset_ref();

        let mut first = UnitOfWork::new("test");
        first.claim(asset_ref, None, Some(AttributionId(1)));
        store.commit(first).await.unwrap();

        let mut stale = UnitOfWork::new("test");
        let mut changed = phone.clone();
        changed.assign(UserId(9), chrono::Utc::now().date_naive());
        stale.save_asset(changed);
        stale.claim(asset_ref, None, Some(AttributionId(2)));
        let err = store.commit(stale).await.unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));

        // nothing from the rejected unit was applied
        let stored = store.asset(asset_ref).await.unwrap().unwrap();
        assert!(stored.is_available());
    }

    #[tokio::test]
    async fn test_locks_are_exclusive_until_released_or_expired() {
        let store = MemoryStore::new();
        let asset = AssetRef::phone(PhoneId(1));

        assert!(store.try_lock(asset, "a", Duration::from_secs(5)).await.unwrap());
        assert!(!store.try_lock(asset, "b", Duration::from_secs(5)).await.unwrap());

        // wrong token does not release
        store.unlock(asset, "b").await.unwrap();
        assert!(!store.try_lock(asset, "b", Duration::from_secs(5)).await.unwrap());

        store.unlock(asset, "a").await.unwrap();
        assert!(store.try_lock(asset, "b", Duration::from_millis(1)).await.unwrap());

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.try_lock(asset, "c", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test]
    async fn test_sequences_are_independent() {
        let store = MemoryStore::new();
        assert_eq!(store.next_id(Sequence::Attribution).await.unwrap(), 1);
        assert_eq!(store.next_id(Sequence::Attribution).await.unwrap(), 2);
        assert_eq!(store.next_id(Sequence::History).await.unwrap(), 1);
    }
}
