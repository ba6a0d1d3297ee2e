//! Storage abstraction for the directory, asset registry, attributions and ledger.
//!
//! Reads go straight to the backend. Every write made by the engine is
//! staged in a [`UnitOfWork`] and applied by [`Store::commit`] as a single
//! atomic step, so readers observe either the state before the operation or
//! the state after it.
//!
//! Data model (shared by both backends):
//! - users, keyed by id, unique by lower-cased email
//! - assets, keyed by [`AssetRef`], unique by (kind, code)
//! - attributions, keyed by id
//! - active index: [`AssetRef`] -> id of the ACTIVE attribution holding it
//! - history entries, appended only
//! - advisory locks: [`AssetRef`] -> (token, expiry)

pub mod memory;
pub mod redis_store;

use assets_common::{AssetKind, AssetRef, AttributionId, Result, UserId};
use async_trait::async_trait;
use std::time::Duration;

use crate::models::{Asset, AssignmentHistory, Attribution, User};

pub use self::memory::MemoryStore;
pub use self::redis_store::RedisStore;

/// Id sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    User,
    Phone,
    SimCard,
    Attribution,
    History,
}

impl Sequence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sequence::User => "user",
            Sequence::Phone => "phone",
            Sequence::SimCard => "sim_card",
            Sequence::Attribution => "attribution",
            Sequence::History => "history",
        }
    }
}

/// Compare-and-set on the active index of one asset.
///
/// The commit is rejected unless the asset's current holder equals
/// `expected`; on success the holder becomes `holder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Claim {
    pub asset: AssetRef,
    pub expected: Option<AttributionId>,
    pub holder: Option<AttributionId>,
}

/// Writes staged by one engine operation
#[derive(Debug, Default)]
pub struct UnitOfWork {
    operation: &'static str,
    attributions: Vec<Attribution>,
    removals: Vec<AttributionId>,
    assets: Vec<Asset>,
    claims: Vec<Claim>,
    history: Vec<AssignmentHistory>,
}

impl UnitOfWork {
    pub(crate) fn new(operation: &'static str) -> Self {
        Self {
            operation,
            ..Self::default()
        }
    }

    pub(crate) fn save_attribution(&mut self, attribution: Attribution) {
        self.attributions.retain(|a| a.id() != attribution.id());
        self.attributions.push(attribution);
    }

    pub(crate) fn remove_attribution(&mut self, id: AttributionId) {
        self.removals.push(id);
    }

    pub(crate) fn save_asset(&mut self, asset: Asset) {
        let asset_ref = asset.asset_ref();
        self.assets.retain(|a| a.asset_ref() != asset_ref);
        self.assets.push(asset);
    }

    pub(crate) fn claim(
        &mut self,
        asset: AssetRef,
        expected: Option<AttributionId>,
        holder: Option<AttributionId>,
    ) {
        self.claims.push(Claim {
            asset,
            expected,
            holder,
        });
    }

    pub(crate) fn append_history(&mut self, entry: AssignmentHistory) {
        self.history.push(entry);
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Records to insert or overwrite, applied before removals
    pub fn attributions(&self) -> &[Attribution] {
        &self.attributions
    }

    pub fn removals(&self) -> &[AttributionId] {
        &self.removals
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn claims(&self) -> &[Claim] {
        &self.claims
    }

    pub fn history(&self) -> &[AssignmentHistory] {
        &self.history
    }

    pub fn is_empty(&self) -> bool {
        self.attributions.is_empty()
            && self.removals.is_empty()
            && self.assets.is_empty()
            && self.claims.is_empty()
            && self.history.is_empty()
    }
}

/// Backend for all persisted state
#[async_trait]
pub trait Store: Send + Sync {
    // User directory
    async fn user(&self, id: UserId) -> Result<Option<User>>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn users(&self) -> Result<Vec<User>>;
    /// Returns `Ok(false)` when the email is already registered
    async fn insert_user(&self, user: &User) -> Result<bool>;

    // Asset registry
    async fn asset(&self, asset: AssetRef) -> Result<Option<Asset>>;
    async fn asset_by_code(&self, kind: AssetKind, code: &str) -> Result<Option<Asset>>;
    async fn assets(&self, kind: AssetKind) -> Result<Vec<Asset>>;
    /// Returns `Ok(false)` when the IMEI / ICCID is already registered
    async fn insert_asset(&self, asset: &Asset) -> Result<bool>;

    // Attributions
    async fn attribution(&self, id: AttributionId) -> Result<Option<Attribution>>;
    /// All records, ascending id
    async fn attributions(&self) -> Result<Vec<Attribution>>;
    async fn active_attribution(&self, asset: AssetRef) -> Result<Option<Attribution>>;
    async fn count_active_attributions(&self, asset: AssetRef) -> Result<usize>;

    // History ledger, oldest first
    async fn history_for_item(&self, asset: AssetRef) -> Result<Vec<AssignmentHistory>>;
    async fn history_for_user(&self, user: UserId) -> Result<Vec<AssignmentHistory>>;

    async fn next_id(&self, sequence: Sequence) -> Result<u64>;

    // Advisory locks
    async fn try_lock(&self, asset: AssetRef, token: &str, ttl: Duration) -> Result<bool>;
    async fn unlock(&self, asset: AssetRef, token: &str) -> Result<()>;

    /// Apply a unit of work atomically; `Conflict` if any claim fails
    async fn commit(&self, unit: UnitOfWork) -> Result<()>;
}

/// Normalized form used for unique email lookups
pub(crate) fn email_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Normalized form used for unique IMEI / ICCID lookups
pub(crate) fn code_key(code: &str) -> String {
    code.trim().to_uppercase()
}
