//! History ledger
//!
//! Append-only. Entries are staged into the caller's [`UnitOfWork`] so they
//! land in the same commit as the change they describe; the ledger itself
//! checks no business rules.

use assets_common::{AssetKind, AssetRef, HistoryAction, HistoryId, Result, UserId};
use chrono::Utc;
use std::sync::Arc;

use crate::models::AssignmentHistory;
use crate::store::{Sequence, Store, UnitOfWork};

#[derive(Clone)]
pub struct HistoryLedger {
    store: Arc<dyn Store>,
}

impl HistoryLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Stage one entry
    pub async fn record(
        &self,
        unit: &mut UnitOfWork,
        asset: AssetRef,
        from_user_id: Option<UserId>,
        to_user_id: Option<UserId>,
        action: HistoryAction,
        notes: Option<String>,
    ) -> Result<HistoryId> {
        let id = HistoryId(self.store.next_id(Sequence::History).await?);
        unit.append_history(AssignmentHistory {
            id,
            kind: asset.kind,
            item_id: asset.id,
            from_user_id,
            to_user_id,
            action,
            date: Utc::now(),
            notes,
        });
        Ok(id)
    }

    /// Entries for one asset, newest first
    pub async fn find_by_type_and_item(
        &self,
        kind: AssetKind,
        item_id: u64,
    ) -> Result<Vec<AssignmentHistory>> {
        let entries = self
            .store
            .history_for_item(AssetRef { kind, id: item_id })
            .await?;
        Ok(newest_first(entries))
    }

    /// Entries where the user is either side of the move, newest first
    pub async fn find_by_user(&self, user: UserId) -> Result<Vec<AssignmentHistory>> {
        let entries = self.store.history_for_user(user).await?;
        Ok(newest_first(entries))
    }
}

fn newest_first(mut entries: Vec<AssignmentHistory>) -> Vec<AssignmentHistory> {
    entries.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
    entries
}
