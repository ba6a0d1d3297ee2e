//! Direct asset operations: assign, unassign and transfer one phone or SIM
//! card by its own id.
//!
//! These go through attribution records like everything else. When the
//! asset shares an attribution with another asset, only the named asset
//! moves; the other one stays with its holder in a continuation record.
//! An asset still marked assigned without any active attribution (data
//! written before attributions tracked it) is repaired in place.

use assets_common::{AssetKind, AssetRef, AttributionId, Error, HistoryAction, Result, UserId};
use chrono::Utc;
use tracing::{info, warn};

use crate::engine::{ledger_note, today, AttributionEngine, Handover};
use crate::locks::Lease;
use crate::models::{Asset, Attribution};
use crate::requests::CreateAttribution;
use crate::store::{Sequence, UnitOfWork};

impl AttributionEngine {
    /// Assign an available asset to a user
    pub async fn assign_asset(
        &self,
        asset: AssetRef,
        user: UserId,
        actor: UserId,
        notes: Option<String>,
    ) -> Result<Asset> {
        let mut request = CreateAttribution::new(user);
        request.notes = notes;
        match asset.kind {
            AssetKind::Phone => request.phone_id = Some(asset.id.into()),
            AssetKind::Sim => request.sim_card_id = Some(asset.id.into()),
        }

        let lease = self.locks.acquire(&[asset]).await?;
        let result = self.create_locked(request, actor, "assigned").await;
        lease.release().await;

        result?;
        self.require_asset(asset).await
    }

    /// Take an asset away from its holder and make it available again
    pub async fn unassign_asset(
        &self,
        asset: AssetRef,
        actor: Option<UserId>,
        notes: Option<String>,
    ) -> Result<Asset> {
        let lease = self.lock_with_holding(asset).await?;
        let result = self.unassign_locked(asset, actor, notes, &lease).await;
        lease.release().await;

        result?;
        self.require_asset(asset).await
    }

    /// Hand an assigned asset straight to another user
    pub async fn transfer_asset(
        &self,
        asset: AssetRef,
        to_user: UserId,
        actor: UserId,
        notes: Option<String>,
    ) -> Result<Asset> {
        let lease = self.lock_with_holding(asset).await?;
        let result = self
            .transfer_asset_locked(asset, to_user, actor, notes, &lease)
            .await;
        lease.release().await;

        result?;
        self.require_asset(asset).await
    }

    /// Lock the asset together with every asset of the attribution holding it
    async fn lock_with_holding(&self, asset: AssetRef) -> Result<Lease> {
        let mut wanted = vec![asset];
        if let Some(current) = self.store.active_attribution(asset).await? {
            wanted.extend(current.assets());
        }
        self.locks.acquire(&wanted).await
    }

    /// Active attribution holding `asset`, re-read under `lease`
    async fn holding(&self, asset: AssetRef, lease: &Lease) -> Result<Option<Attribution>> {
        let current = self
            .store
            .active_attribution(asset)
            .await?
            .filter(|a| a.is_active() && a.holds(asset));

        if let Some(current) = &current {
            if !current.assets().iter().all(|a| lease.covers(*a)) {
                return Err(Error::Conflict(format!(
                    "{} changed hands while waiting for its lock",
                    asset
                )));
            }
        }
        Ok(current)
    }

    async fn unassign_locked(
        &self,
        asset_ref: AssetRef,
        actor: Option<UserId>,
        notes: Option<String>,
        lease: &Lease,
    ) -> Result<()> {
        if let Some(actor) = actor {
            self.require_user(actor).await?;
        }
        let mut asset = self.require_asset(asset_ref).await?;
        let mut unit = UnitOfWork::new("unassign_asset");

        match self.holding(asset_ref, lease).await? {
            Some(current) => {
                let id = current.id();
                let from = current.user_id();
                self.settle(
                    &mut unit,
                    current,
                    &[asset_ref],
                    Handover::Release,
                    actor,
                    notes.as_deref(),
                    "unassigned",
                )
                .await?;
                self.store.commit(unit).await?;
                info!(
                    "Unassigned {} from user {} (attribution {})",
                    asset_ref, from, id
                );
            }
            None => {
                let Some(from) = asset.holder() else {
                    return Err(Error::Conflict(format!(
                        "{} is not assigned to any user",
                        asset_ref
                    )));
                };
                warn!("{} is assigned to user {} without an attribution", asset_ref, from);

                asset.release();
                unit.save_asset(asset);
                // nobody may open an attribution for it meanwhile
                unit.claim(asset_ref, None, None);
                self.ledger
                    .record(
                        &mut unit,
                        asset_ref,
                        Some(from),
                        None,
                        HistoryAction::Unassign,
                        Some(ledger_note(asset_ref, notes.as_deref(), "unassigned")),
                    )
                    .await?;
                self.store.commit(unit).await?;
                info!("Unassigned {} from user {}", asset_ref, from);
            }
        }
        Ok(())
    }

    async fn transfer_asset_locked(
        &self,
        asset_ref: AssetRef,
        to_user: UserId,
        actor: UserId,
        notes: Option<String>,
        lease: &Lease,
    ) -> Result<()> {
        self.require_user(to_user).await?;
        self.require_user(actor).await?;
        let mut asset = self.require_asset(asset_ref).await?;
        let mut unit = UnitOfWork::new("transfer_asset");

        let current = self.holding(asset_ref, lease).await?;
        let from = match (&current, asset.holder()) {
            (Some(current), _) => current.user_id(),
            (None, Some(holder)) => holder,
            (None, None) => {
                return Err(Error::Conflict(format!(
                    "{} is not assigned to any user",
                    asset_ref
                )))
            }
        };
        if from == to_user {
            return Err(Error::Conflict(format!(
                "{} is already held by user {}",
                asset_ref, to_user
            )));
        }

        let opened = match current {
            Some(current) => {
                let settled = self
                    .settle(
                        &mut unit,
                        current,
                        &[asset_ref],
                        Handover::To { user: to_user, by: actor },
                        Some(actor),
                        notes.as_deref(),
                        "transferred",
                    )
                    .await?;
                settled.successor.map(|next| next.id()).ok_or_else(|| {
                    Error::Other(anyhow::anyhow!("transfer of {} opened no record", asset_ref))
                })?
            }
            None => {
                warn!("{} is assigned to user {} without an attribution", asset_ref, from);
                let on = today();
                let id = AttributionId(self.store.next_id(Sequence::Attribution).await?);
                let (phone_id, sim_card_id) = match asset_ref.kind {
                    AssetKind::Phone => (Some(asset_ref.id.into()), None),
                    AssetKind::Sim => (None, Some(asset_ref.id.into())),
                };

                asset.assign(to_user, on);
                unit.save_asset(asset);
                unit.claim(asset_ref, None, Some(id));
                self.ledger
                    .record(
                        &mut unit,
                        asset_ref,
                        Some(from),
                        Some(to_user),
                        HistoryAction::Transfer,
                        Some(ledger_note(asset_ref, notes.as_deref(), "transferred")),
                    )
                    .await?;
                unit.save_attribution(Attribution::open(
                    id,
                    to_user,
                    phone_id,
                    sim_card_id,
                    actor,
                    on,
                    notes.clone(),
                    Utc::now(),
                ));
                id
            }
        };
        self.store.commit(unit).await?;

        info!(
            "Transferred {} from user {} to user {} (attribution {})",
            asset_ref,
            from,
            to_user,
            opened
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::{Phone, User};
    use crate::store::{MemoryStore, Store};
    use assets_common::{PhoneId, Role, UserStatus};
    use std::sync::Arc;

    fn user(id: u64) -> User {
        User {
            id: UserId(id),
            name: format!("User {}", id),
            email: format!("user{}@example.com", id),
            role: Role::User,
            department: "Field".to_string(),
            status: UserStatus::Active,
        }
    }

    /// Phone 1 marked as held by user 2, with no attribution behind it
    async fn legacy_setup() -> (Arc<MemoryStore>, AttributionEngine, AssetRef) {
        let store = Arc::new(MemoryStore::new());
        for id in 1..=3 {
            store.insert_user(&user(id)).await.unwrap();
        }
        let mut phone = Asset::Phone(Phone::new(
            PhoneId(1),
            "Nokia".to_string(),
            "105".to_string(),
            "351234567890123".to_string(),
        ));
        phone.assign(UserId(2), today());
        store.insert_asset(&phone).await.unwrap();

        let shared: Arc<dyn Store> = store.clone();
        let engine = AttributionEngine::new(shared, &Config::default());
        (store, engine, phone.asset_ref())
    }

    #[tokio::test]
    async fn test_unassign_repairs_asset_without_attribution() {
        let (store, engine, phone) = legacy_setup().await;

        let released = engine
            .unassign_asset(phone, Some(UserId(1)), None)
            .await
            .unwrap();
        assert!(released.is_available());
        assert_eq!(released.holder(), None);

        let history = store.history_for_item(phone).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Unassign);
        assert_eq!(history[0].from_user_id, Some(UserId(2)));
    }

    #[tokio::test]
    async fn test_transfer_opens_attribution_for_untracked_asset() {
        let (store, engine, phone) = legacy_setup().await;

        let moved = engine
            .transfer_asset(phone, UserId(3), UserId(1), None)
            .await
            .unwrap();
        assert_eq!(moved.holder(), Some(UserId(3)));

        let active = store.active_attribution(phone).await.unwrap().unwrap();
        assert_eq!(active.user_id(), UserId(3));
        assert_eq!(active.assigned_by(), UserId(1));
        assert_eq!(store.count_active_attributions(phone).await.unwrap(), 1);

        let history = store.history_for_item(phone).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Transfer);
        assert_eq!(history[0].from_user_id, Some(UserId(2)));
        assert_eq!(history[0].to_user_id, Some(UserId(3)));
    }
}
