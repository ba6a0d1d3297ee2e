//! Attribution engine
//!
//! Owns every write to attributions, to the assignment fields of assets and
//! to the history ledger. Each operation follows the same shape:
//!
//! 1. read the record to learn which assets it touches
//! 2. lock those assets ([`AssetLocks`])
//! 3. re-read and check preconditions under the lock
//! 4. stage every change into one [`UnitOfWork`], with a claim per asset
//! 5. commit, release the locks
//!
//! Status changes go through [`AttributionState`], so there is a single
//! place that decides which transitions are legal.

use assets_common::{
    AssetKind, AssetRef, AttributionId, AttributionState, Error, HistoryAction, PhoneId, Result,
    SimCardId, UserId,
};
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::ledger::HistoryLedger;
use crate::locks::AssetLocks;
use crate::models::{Asset, Attribution, User};
use crate::requests::{CreateAttribution, UpdateAttribution};
use crate::store::{Sequence, Store, UnitOfWork};
use crate::views::AttributionView;

#[derive(Clone)]
pub struct AttributionEngine {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) ledger: HistoryLedger,
    pub(crate) locks: AssetLocks,
    pub(crate) default_page_size: u32,
    pub(crate) max_page_size: u32,
}

/// What happens to the assets leaving an attribution
#[derive(Debug, Clone, Copy)]
pub(crate) enum Handover {
    /// Back to the inventory
    Release,
    /// Straight to another user, in a new record opened by `by`
    To { user: UserId, by: UserId },
}

/// Records produced when an active attribution is closed
pub(crate) struct Settled {
    pub closed: Attribution,
    pub successor: Option<Attribution>,
}

pub(crate) fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub(crate) fn describe(assets: &[AssetRef]) -> String {
    assets
        .iter()
        .map(AssetRef::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn phone_of(assets: &[AssetRef]) -> Option<PhoneId> {
    assets
        .iter()
        .find(|a| a.kind == AssetKind::Phone)
        .map(|a| PhoneId(a.id))
}

fn sim_of(assets: &[AssetRef]) -> Option<SimCardId> {
    assets
        .iter()
        .find(|a| a.kind == AssetKind::Sim)
        .map(|a| SimCardId(a.id))
}

/// Ledger note: the caller's, or "<Kind label> <phrase>"
pub(crate) fn ledger_note(asset: AssetRef, notes: Option<&str>, phrase: &str) -> String {
    match notes {
        Some(notes) => notes.to_string(),
        None => format!("{} {}", asset.kind.label(), phrase),
    }
}

impl AttributionEngine {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        Self {
            ledger: HistoryLedger::new(Arc::clone(&store)),
            locks: AssetLocks::new(Arc::clone(&store), config),
            store,
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
        }
    }

    pub fn ledger(&self) -> &HistoryLedger {
        &self.ledger
    }

    pub(crate) async fn require_user(&self, id: UserId) -> Result<User> {
        self.store
            .user(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("User {}", id)))
    }

    pub(crate) async fn require_asset(&self, asset: AssetRef) -> Result<Asset> {
        self.store
            .asset(asset)
            .await?
            .ok_or_else(|| Error::not_found(asset))
    }

    pub(crate) async fn require_attribution(&self, id: AttributionId) -> Result<Attribution> {
        self.store
            .attribution(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Attribution {}", id)))
    }

    /// Assign a phone and/or SIM card to a user
    pub async fn create_attribution(
        &self,
        request: CreateAttribution,
        assigned_by: UserId,
    ) -> Result<AttributionView> {
        let assets = request.assets();
        if assets.is_empty() {
            return Err(Error::Validation(
                "An attribution needs a phone or a SIM card".to_string(),
            ));
        }

        let lease = self.locks.acquire(&assets).await?;
        let result = self
            .create_locked(request, assigned_by, "assigned via attribution")
            .await;
        lease.release().await;

        let attribution = result?;
        self.view(&attribution).await
    }

    /// Caller holds the locks of every requested asset
    pub(crate) async fn create_locked(
        &self,
        request: CreateAttribution,
        assigned_by: UserId,
        phrase: &str,
    ) -> Result<Attribution> {
        let holder = self.require_user(request.user_id).await?;
        self.require_user(assigned_by).await?;

        let asset_refs = request.assets();
        let mut assets = Vec::with_capacity(asset_refs.len());
        for asset_ref in &asset_refs {
            let asset = self.require_asset(*asset_ref).await?;
            if self.store.count_active_attributions(*asset_ref).await? > 0 {
                debug!("Refusing to assign {}: it has an active attribution", asset_ref);
                return Err(Error::Conflict(format!(
                    "{} is already assigned to another user",
                    asset_ref
                )));
            }
            if !asset.is_available() {
                debug!("Refusing to assign {}: status {}", asset_ref, asset.status_name());
                return Err(Error::Conflict(format!(
                    "{} is not available for assignment",
                    asset_ref
                )));
            }
            assets.push(asset);
        }

        let on = request.assignment_date.unwrap_or_else(today);
        let id = AttributionId(self.store.next_id(Sequence::Attribution).await?);
        let mut unit = UnitOfWork::new("create_attribution");

        for mut asset in assets {
            let asset_ref = asset.asset_ref();
            asset.assign(holder.id, on);
            unit.save_asset(asset);
            unit.claim(asset_ref, None, Some(id));
            self.ledger
                .record(
                    &mut unit,
                    asset_ref,
                    None,
                    Some(holder.id),
                    HistoryAction::Assign,
                    Some(ledger_note(asset_ref, request.notes.as_deref(), phrase)),
                )
                .await?;
        }

        let attribution = Attribution::open(
            id,
            holder.id,
            request.phone_id,
            request.sim_card_id,
            assigned_by,
            on,
            request.notes,
            Utc::now(),
        );
        unit.save_attribution(attribution.clone());
        self.store.commit(unit).await?;

        info!(
            "Created attribution {} for user {} ({})",
            id,
            holder.id,
            describe(&asset_refs)
        );
        Ok(attribution)
    }

    /// Edit notes and/or status.
    ///
    /// The only status change accepted is ACTIVE -> RETURNED, which runs the
    /// full return. Asking for the current status changes nothing.
    pub async fn update_attribution(
        &self,
        id: AttributionId,
        changes: UpdateAttribution,
        actor: Option<UserId>,
    ) -> Result<AttributionView> {
        let current = self.require_attribution(id).await?;

        let lease = self.locks.acquire(&current.assets()).await?;
        let result = self.update_locked(id, changes, actor).await;
        lease.release().await;

        self.view(&result?).await
    }

    async fn update_locked(
        &self,
        id: AttributionId,
        changes: UpdateAttribution,
        actor: Option<UserId>,
    ) -> Result<Attribution> {
        let mut current = self.require_attribution(id).await?;

        if let Some(to) = changes.status {
            let next = current
                .state()
                .advance(to, today(), actor)
                .map_err(|e| Error::Conflict(format!("Attribution {}: {}", id, e)))?;
            if next.status() != current.status() {
                return self.return_locked(id, changes.notes, actor, "returned via attribution").await;
            }
        }

        let Some(notes) = changes.notes else {
            return Ok(current);
        };

        current.set_notes(Some(notes), Utc::now());
        let mut unit = UnitOfWork::new("update_attribution");
        if current.is_active() {
            // still the holder of every asset it references
            for asset in current.assets() {
                unit.claim(asset, Some(id), Some(id));
            }
        }
        unit.save_attribution(current.clone());
        self.store.commit(unit).await?;

        info!("Updated notes of attribution {}", id);
        Ok(current)
    }

    /// Close an active attribution and give its assets back to the inventory
    pub async fn return_attribution(
        &self,
        id: AttributionId,
        notes: Option<String>,
        actor: Option<UserId>,
    ) -> Result<AttributionView> {
        let current = self.require_attribution(id).await?;

        let lease = self.locks.acquire(&current.assets()).await?;
        let result = self
            .return_locked(id, notes, actor, "returned via attribution")
            .await;
        lease.release().await;

        self.view(&result?).await
    }

    async fn return_locked(
        &self,
        id: AttributionId,
        notes: Option<String>,
        actor: Option<UserId>,
        phrase: &str,
    ) -> Result<Attribution> {
        if let Some(actor) = actor {
            self.require_user(actor).await?;
        }
        let mut current = self.require_attribution(id).await?;
        if !current.is_active() {
            return Err(Error::Conflict(format!(
                "Attribution {} is not active and cannot be returned",
                id
            )));
        }
        if let Some(notes) = &notes {
            current.set_notes(Some(notes.clone()), Utc::now());
        }

        let moving = current.assets();
        let mut unit = UnitOfWork::new("return_attribution");
        let settled = self
            .settle(
                &mut unit,
                current,
                &moving,
                Handover::Release,
                actor,
                notes.as_deref(),
                phrase,
            )
            .await?;
        self.store.commit(unit).await?;

        info!("Returned attribution {} ({})", id, describe(&moving));
        Ok(settled.closed)
    }

    /// Move every asset of an active attribution to another user.
    ///
    /// The current record is closed as RETURNED and a new ACTIVE record is
    /// opened for `to_user`; that new record is returned.
    pub async fn transfer_attribution(
        &self,
        id: AttributionId,
        to_user: UserId,
        actor: UserId,
        notes: Option<String>,
    ) -> Result<AttributionView> {
        let current = self.require_attribution(id).await?;

        let lease = self.locks.acquire(&current.assets()).await?;
        let result = self.transfer_locked(id, to_user, actor, notes).await;
        lease.release().await;

        self.view(&result?).await
    }

    async fn transfer_locked(
        &self,
        id: AttributionId,
        to_user: UserId,
        actor: UserId,
        notes: Option<String>,
    ) -> Result<Attribution> {
        self.require_user(to_user).await?;
        self.require_user(actor).await?;

        let current = self.require_attribution(id).await?;
        if !current.is_active() {
            return Err(Error::Conflict(format!(
                "Attribution {} is not active and cannot be transferred",
                id
            )));
        }
        if current.user_id() == to_user {
            return Err(Error::Conflict(format!(
                "Attribution {} is already held by user {}",
                id, to_user
            )));
        }

        let from_user = current.user_id();
        let moving = current.assets();
        let mut unit = UnitOfWork::new("transfer_attribution");
        let settled = self
            .settle(
                &mut unit,
                current,
                &moving,
                Handover::To { user: to_user, by: actor },
                Some(actor),
                notes.as_deref(),
                "transferred via attribution",
            )
            .await?;
        let successor = settled.successor.ok_or_else(|| {
            Error::Other(anyhow::anyhow!("transfer of attribution {} opened no record", id))
        })?;
        self.store.commit(unit).await?;

        info!(
            "Transferred attribution {} from user {} to user {} as attribution {}",
            id,
            from_user,
            to_user,
            successor.id()
        );
        Ok(successor)
    }

    /// Remove an attribution, returning it first when it is still active
    pub async fn delete_attribution(&self, id: AttributionId, actor: Option<UserId>) -> Result<()> {
        let current = self.require_attribution(id).await?;

        let lease = self.locks.acquire(&current.assets()).await?;
        let result = self.delete_locked(id, actor).await;
        lease.release().await;

        result
    }

    async fn delete_locked(&self, id: AttributionId, actor: Option<UserId>) -> Result<()> {
        if let Some(actor) = actor {
            self.require_user(actor).await?;
        }
        let current = self.require_attribution(id).await?;
        let was_active = current.is_active();

        let mut unit = UnitOfWork::new("delete_attribution");
        if was_active {
            let moving = current.assets();
            self.settle(
                &mut unit,
                current,
                &moving,
                Handover::Release,
                actor,
                None,
                "returned on attribution delete",
            )
            .await?;
        }
        unit.remove_attribution(id);
        self.store.commit(unit).await?;

        if was_active {
            info!("Returned and deleted attribution {}", id);
        } else {
            info!("Deleted attribution {}", id);
        }
        Ok(())
    }

    /// Stage the close of an active attribution.
    ///
    /// Assets in `moving` are released or handed over and get one ledger
    /// entry each. Any other asset of the record stays with its holder in a
    /// continuation record carrying the original dates, without a ledger
    /// entry. Caller holds the locks of every asset of `current`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn settle(
        &self,
        unit: &mut UnitOfWork,
        current: Attribution,
        moving: &[AssetRef],
        handover: Handover,
        actor: Option<UserId>,
        notes: Option<&str>,
        phrase: &str,
    ) -> Result<Settled> {
        let now = Utc::now();
        let on = today();

        let state: AttributionState = current
            .state()
            .close(on, actor)
            .map_err(|e| Error::Conflict(format!("Attribution {}: {}", current.id(), e)))?;
        let mut closed = current.clone();
        closed.set_state(state, now);

        let successor = match handover {
            Handover::Release => None,
            Handover::To { user, by } => {
                let id = AttributionId(self.store.next_id(Sequence::Attribution).await?);
                Some(Attribution::open(
                    id,
                    user,
                    phone_of(moving),
                    sim_of(moving),
                    by,
                    on,
                    notes.map(str::to_string),
                    now,
                ))
            }
        };

        let remaining: Vec<AssetRef> = current
            .assets()
            .into_iter()
            .filter(|asset| !moving.contains(asset))
            .collect();
        let continuation = if remaining.is_empty() {
            None
        } else {
            let id = AttributionId(self.store.next_id(Sequence::Attribution).await?);
            Some(Attribution::open(
                id,
                current.user_id(),
                phone_of(&remaining),
                sim_of(&remaining),
                current.assigned_by(),
                current.assignment_date(),
                current.notes().map(str::to_string),
                now,
            ))
        };

        for asset_ref in current.assets() {
            if !moving.contains(&asset_ref) {
                if let Some(rest) = &continuation {
                    unit.claim(asset_ref, Some(current.id()), Some(rest.id()));
                }
                continue;
            }

            let mut asset = self.require_asset(asset_ref).await?;
            let (to_user, action, holder) = match &successor {
                None => {
                    asset.release();
                    (None, HistoryAction::Unassign, None)
                }
                Some(next) => {
                    asset.assign(next.user_id(), on);
                    (Some(next.user_id()), HistoryAction::Transfer, Some(next.id()))
                }
            };
            unit.save_asset(asset);
            unit.claim(asset_ref, Some(current.id()), holder);
            self.ledger
                .record(
                    unit,
                    asset_ref,
                    Some(current.user_id()),
                    to_user,
                    action,
                    Some(ledger_note(asset_ref, notes, phrase)),
                )
                .await?;
        }

        unit.save_attribution(closed.clone());
        if let Some(next) = &successor {
            unit.save_attribution(next.clone());
        }
        if let Some(rest) = &continuation {
            debug!(
                "Attribution {} continues as {} for {}",
                current.id(),
                rest.id(),
                describe(&remaining)
            );
            unit.save_attribution(rest.clone());
        }

        Ok(Settled { closed, successor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_note_prefers_caller_text() {
        let phone = AssetRef::phone(PhoneId(7));
        assert_eq!(
            ledger_note(phone, None, "returned via attribution"),
            "Phone returned via attribution"
        );
        assert_eq!(
            ledger_note(AssetRef::sim(SimCardId(1)), None, "assigned"),
            "SIM card assigned"
        );
        assert_eq!(
            ledger_note(phone, Some("device returned"), "ignored"),
            "device returned"
        );
    }

    #[test]
    fn test_split_helpers_pick_by_kind() {
        let refs = [AssetRef::sim(SimCardId(3)), AssetRef::phone(PhoneId(7))];
        assert_eq!(phone_of(&refs), Some(PhoneId(7)));
        assert_eq!(sim_of(&refs), Some(SimCardId(3)));
        assert_eq!(phone_of(&refs[..1]), None);
        assert_eq!(describe(&refs), "SIM card 3, Phone 7");
    }
}
