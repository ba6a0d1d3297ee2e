//! Read paths over attributions, assets and the ledger

use assets_common::{AssetRef, AttributionId, Error, Result, UserId};
use std::collections::HashMap;

use crate::engine::AttributionEngine;
use crate::models::{Asset, AssignmentHistory, Attribution, User};
use crate::requests::{AttributionFilter, PageRequest};
use crate::store::Store;
use crate::views::{AttributionView, Page};

/// Builds views, loading each related user and asset once
struct ViewBuilder<'a> {
    store: &'a dyn Store,
    users: HashMap<UserId, Option<User>>,
    assets: HashMap<AssetRef, Option<Asset>>,
}

impl<'a> ViewBuilder<'a> {
    fn new(store: &'a dyn Store) -> Self {
        Self {
            store,
            users: HashMap::new(),
            assets: HashMap::new(),
        }
    }

    async fn user(&mut self, id: UserId) -> Result<Option<User>> {
        if let Some(cached) = self.users.get(&id) {
            return Ok(cached.clone());
        }
        let user = self.store.user(id).await?;
        self.users.insert(id, user.clone());
        Ok(user)
    }

    async fn asset(&mut self, asset: AssetRef) -> Result<Option<Asset>> {
        if let Some(cached) = self.assets.get(&asset) {
            return Ok(cached.clone());
        }
        let found = self.store.asset(asset).await?;
        self.assets.insert(asset, found.clone());
        Ok(found)
    }

    async fn build(&mut self, attribution: &Attribution) -> Result<AttributionView> {
        let user = self.user(attribution.user_id()).await?;
        let assigned_by = self.user(attribution.assigned_by()).await?;
        let returned_by = match attribution.state().returned_by() {
            Some(id) => self.user(id).await?,
            None => None,
        };
        let phone = match attribution.phone_id() {
            Some(id) => self.asset(AssetRef::phone(id)).await?,
            None => None,
        };
        let sim = match attribution.sim_card_id() {
            Some(id) => self.asset(AssetRef::sim(id)).await?,
            None => None,
        };

        Ok(AttributionView::assemble(
            attribution,
            user.as_ref(),
            assigned_by.as_ref(),
            returned_by.as_ref(),
            phone.as_ref(),
            sim.as_ref(),
        ))
    }

    async fn build_all(&mut self, attributions: &[Attribution]) -> Result<Vec<AttributionView>> {
        let mut views = Vec::with_capacity(attributions.len());
        for attribution in attributions {
            views.push(self.build(attribution).await?);
        }
        Ok(views)
    }
}

impl AttributionEngine {
    pub(crate) async fn view(&self, attribution: &Attribution) -> Result<AttributionView> {
        ViewBuilder::new(self.store.as_ref())
            .build(attribution)
            .await
    }

    pub async fn get_attribution(&self, id: AttributionId) -> Result<AttributionView> {
        let attribution = self.require_attribution(id).await?;
        self.view(&attribution).await
    }

    /// Filtered listing, newest record first
    pub async fn list_attributions(
        &self,
        filter: &AttributionFilter,
        page: Option<PageRequest>,
    ) -> Result<Page<AttributionView>> {
        let page = page.unwrap_or(PageRequest::new(1, self.default_page_size));
        if page.page == 0 {
            return Err(Error::Validation("page must be at least 1".to_string()));
        }
        if page.limit == 0 || page.limit > self.max_page_size {
            return Err(Error::Validation(format!(
                "limit must be between 1 and {}",
                self.max_page_size
            )));
        }

        let mut matching: Vec<Attribution> = self
            .store
            .attributions()
            .await?
            .into_iter()
            .filter(|a| filter.status.map_or(true, |status| a.status() == status))
            .filter(|a| filter.user_id.map_or(true, |user| a.user_id() == user))
            .filter(|a| filter.assigned_by_id.map_or(true, |by| a.assigned_by() == by))
            .collect();
        matching.sort_by(|a, b| b.id().cmp(&a.id()));

        let mut views = ViewBuilder::new(self.store.as_ref())
            .build_all(&matching)
            .await?;
        if let Some(needle) = filter.search.as_deref().map(str::trim) {
            if !needle.is_empty() {
                views.retain(|view| view.matches(needle));
            }
        }

        Ok(Page::slice(views, page.page, page.limit))
    }

    /// Every record that ever referenced the asset, latest assignment first
    pub async fn attribution_history(&self, asset: AssetRef) -> Result<Vec<AttributionView>> {
        self.require_asset(asset).await?;

        let mut records: Vec<Attribution> = self
            .store
            .attributions()
            .await?
            .into_iter()
            .filter(|a| a.holds(asset))
            .collect();
        records.sort_by(|a, b| {
            b.assignment_date()
                .cmp(&a.assignment_date())
                .then(b.id().cmp(&a.id()))
        });

        ViewBuilder::new(self.store.as_ref())
            .build_all(&records)
            .await
    }

    /// What a user currently holds
    pub async fn active_attributions_by_user(&self, user: UserId) -> Result<Vec<AttributionView>> {
        self.require_user(user).await?;

        let mut records: Vec<Attribution> = self
            .store
            .attributions()
            .await?
            .into_iter()
            .filter(|a| a.is_active() && a.user_id() == user)
            .collect();
        records.sort_by(|a, b| b.id().cmp(&a.id()));

        ViewBuilder::new(self.store.as_ref())
            .build_all(&records)
            .await
    }

    /// Ledger entries for one asset, newest first
    pub async fn asset_history(&self, asset: AssetRef) -> Result<Vec<AssignmentHistory>> {
        self.require_asset(asset).await?;
        self.ledger.find_by_type_and_item(asset.kind, asset.id).await
    }

    /// Ledger entries where the user gave or received an asset, newest first
    pub async fn user_history(&self, user: UserId) -> Result<Vec<AssignmentHistory>> {
        self.require_user(user).await?;
        self.ledger.find_by_user(user).await
    }

    pub async fn get_asset(&self, asset: AssetRef) -> Result<Asset> {
        self.require_asset(asset).await
    }

    /// Directory lookup for the acting user
    pub async fn resolve_actor(&self, email: &str) -> Result<User> {
        self.store
            .user_by_email(email)
            .await?
            .ok_or_else(|| Error::not_found(format!("User with email {}", email.trim())))
    }
}
