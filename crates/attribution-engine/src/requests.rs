//! Inputs accepted by the engine's caller-facing operations

use assets_common::{AssetRef, AttributionStatus, PhoneId, Role, SimCardId, UserId};
use chrono::NaiveDate;
use serde::Deserialize;

/// Assign a phone and/or SIM card to a user
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateAttribution {
    pub user_id: UserId,
    #[serde(default)]
    pub phone_id: Option<PhoneId>,
    #[serde(default)]
    pub sim_card_id: Option<SimCardId>,
    /// Defaults to today
    #[serde(default)]
    pub assignment_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl CreateAttribution {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            phone_id: None,
            sim_card_id: None,
            assignment_date: None,
            notes: None,
        }
    }

    pub fn phone(mut self, phone_id: PhoneId) -> Self {
        self.phone_id = Some(phone_id);
        self
    }

    pub fn sim_card(mut self, sim_card_id: SimCardId) -> Self {
        self.sim_card_id = Some(sim_card_id);
        self
    }

    pub fn dated(mut self, date: NaiveDate) -> Self {
        self.assignment_date = Some(date);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn assets(&self) -> Vec<AssetRef> {
        self.phone_id
            .map(AssetRef::phone)
            .into_iter()
            .chain(self.sim_card_id.map(AssetRef::sim))
            .collect()
    }
}

/// Post-creation edit. Holder and asset linkage are not part of this type;
/// payloads carrying them are rejected at deserialization.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateAttribution {
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: Option<AttributionStatus>,
}

/// Listing filters; `None` means "any"
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttributionFilter {
    #[serde(default)]
    pub status: Option<AttributionStatus>,
    #[serde(default)]
    pub user_id: Option<UserId>,
    #[serde(default)]
    pub assigned_by_id: Option<UserId>,
    /// Case-insensitive match on holder name, holder email or notes
    #[serde(default)]
    pub search: Option<String>,
}

/// 1-based page selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self { page, limit }
    }
}

/// Directory entry to register
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: String,
}

/// Phone to add to the inventory; starts `AVAILABLE`
#[derive(Debug, Clone, Deserialize)]
pub struct NewPhone {
    pub brand: String,
    pub model: String,
    pub imei: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// SIM card to add to the inventory; starts `AVAILABLE`
#[derive(Debug, Clone, Deserialize)]
pub struct NewSimCard {
    pub number: String,
    pub iccid: String,
    #[serde(default)]
    pub carrier: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}
