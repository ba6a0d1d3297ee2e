//! View models returned to callers, with holder and asset names denormalized

use assets_common::{AttributionId, AttributionStatus, PhoneId, SimCardId, UserId};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::models::{Asset, Attribution, User};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributionView {
    pub id: AttributionId,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub phone_id: Option<PhoneId>,
    pub phone_brand: Option<String>,
    pub phone_model: Option<String>,
    pub sim_card_id: Option<SimCardId>,
    pub sim_card_number: Option<String>,
    pub assigned_by_id: UserId,
    pub assigned_by_name: Option<String>,
    pub returned_by_id: Option<UserId>,
    pub returned_by_name: Option<String>,
    pub assignment_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub status: AttributionStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttributionView {
    /// Assemble a view from the record and whatever related rows were found
    pub fn assemble(
        attribution: &Attribution,
        user: Option<&User>,
        assigned_by: Option<&User>,
        returned_by: Option<&User>,
        phone: Option<&Asset>,
        sim: Option<&Asset>,
    ) -> Self {
        let phone = phone.and_then(Asset::as_phone);
        let sim = sim.and_then(Asset::as_sim);

        Self {
            id: attribution.id(),
            user_id: attribution.user_id(),
            user_name: user.map(|u| u.name.clone()),
            user_email: user.map(|u| u.email.clone()),
            phone_id: attribution.phone_id(),
            phone_brand: phone.map(|p| p.brand.clone()),
            phone_model: phone.map(|p| p.model.clone()),
            sim_card_id: attribution.sim_card_id(),
            sim_card_number: sim.map(|s| s.number.clone()),
            assigned_by_id: attribution.assigned_by(),
            assigned_by_name: assigned_by.map(|u| u.name.clone()),
            returned_by_id: attribution.state().returned_by(),
            returned_by_name: returned_by.map(|u| u.name.clone()),
            assignment_date: attribution.assignment_date(),
            return_date: attribution.state().return_date(),
            status: attribution.status(),
            notes: attribution.notes().map(str::to_string),
            created_at: attribution.created_at(),
            updated_at: attribution.updated_at(),
        }
    }

    /// Free-text match used by the listing search filter
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        [&self.user_name, &self.user_email, &self.notes]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&needle))
    }
}

/// One page of a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}

impl<T> Page<T> {
    /// Slice `all` down to the requested page. `page` is 1-based.
    pub fn slice(all: Vec<T>, page: u32, limit: u32) -> Self {
        let total = all.len();
        let limit_usize = limit.max(1) as usize;
        let total_pages = total.div_ceil(limit_usize) as u32;
        let skip = (page.saturating_sub(1) as usize).saturating_mul(limit_usize);
        let items = all.into_iter().skip(skip).take(limit_usize).collect();

        Self {
            items,
            total,
            page,
            limit,
            total_pages,
        }
    }
}
