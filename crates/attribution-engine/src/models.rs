//! Data models for users, assets, attributions and the history ledger

use assets_common::{
    AssetKind, AssetRef, AttributionId, AttributionState, AttributionStatus, HistoryAction,
    HistoryId, PhoneId, PhoneStatus, Role, SimCardId, SimStatus, UserId, UserStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Directory user. Read-only from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: String,
    pub status: UserStatus,
}

/// Phone in the inventory.
///
/// The assignment fields (`status == ASSIGNED`, `assigned_to`,
/// `assigned_date`) are a projection of the active attribution and can only
/// be changed from inside this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phone {
    pub id: PhoneId,
    pub brand: String,
    pub model: String,
    pub imei: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    status: PhoneStatus,
    #[serde(default)]
    assigned_to: Option<UserId>,
    #[serde(default)]
    assigned_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Phone {
    pub fn new(id: PhoneId, brand: String, model: String, imei: String) -> Self {
        Self {
            id,
            brand,
            model,
            imei,
            serial_number: None,
            status: PhoneStatus::Available,
            assigned_to: None,
            assigned_date: None,
            notes: None,
        }
    }

    pub fn status(&self) -> PhoneStatus {
        self.status
    }

    pub fn assigned_to(&self) -> Option<UserId> {
        self.assigned_to
    }

    pub fn assigned_date(&self) -> Option<NaiveDate> {
        self.assigned_date
    }

    pub(crate) fn set_status(&mut self, status: PhoneStatus) {
        self.status = status;
    }
}

/// SIM card in the inventory. Same ownership rules as [`Phone`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimCard {
    pub id: SimCardId,
    pub number: String,
    pub iccid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    status: SimStatus,
    #[serde(default)]
    assigned_to: Option<UserId>,
    #[serde(default)]
    assigned_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SimCard {
    pub fn new(id: SimCardId, number: String, iccid: String) -> Self {
        Self {
            id,
            number,
            iccid,
            carrier: None,
            status: SimStatus::Available,
            assigned_to: None,
            assigned_date: None,
            notes: None,
        }
    }

    pub fn status(&self) -> SimStatus {
        self.status
    }

    pub fn assigned_to(&self) -> Option<UserId> {
        self.assigned_to
    }

    pub fn assigned_date(&self) -> Option<NaiveDate> {
        self.assigned_date
    }

    pub(crate) fn set_status(&mut self, status: SimStatus) {
        self.status = status;
    }
}

/// Any asset tracked by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Asset {
    Phone(Phone),
    Sim(SimCard),
}

impl Asset {
    pub fn asset_ref(&self) -> AssetRef {
        match self {
            Asset::Phone(phone) => AssetRef::phone(phone.id),
            Asset::Sim(sim) => AssetRef::sim(sim.id),
        }
    }

    pub fn kind(&self) -> AssetKind {
        self.asset_ref().kind
    }

    /// Unique inventory code: IMEI for phones, ICCID for SIM cards
    pub fn code(&self) -> &str {
        match self {
            Asset::Phone(phone) => &phone.imei,
            Asset::Sim(sim) => &sim.iccid,
        }
    }

    pub fn holder(&self) -> Option<UserId> {
        match self {
            Asset::Phone(phone) => phone.assigned_to,
            Asset::Sim(sim) => sim.assigned_to,
        }
    }

    pub fn assigned_date(&self) -> Option<NaiveDate> {
        match self {
            Asset::Phone(phone) => phone.assigned_date,
            Asset::Sim(sim) => sim.assigned_date,
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            Asset::Phone(phone) => phone.status == PhoneStatus::Available,
            Asset::Sim(sim) => sim.status == SimStatus::Available,
        }
    }

    pub fn is_assigned(&self) -> bool {
        match self {
            Asset::Phone(phone) => phone.status == PhoneStatus::Assigned,
            Asset::Sim(sim) => sim.status == SimStatus::Assigned,
        }
    }

    pub fn status_name(&self) -> &'static str {
        match self {
            Asset::Phone(phone) => phone.status.as_str(),
            Asset::Sim(sim) => sim.status.as_str(),
        }
    }

    /// `ASSIGNED` exactly when a holder is recorded
    pub fn is_consistent(&self) -> bool {
        self.is_assigned() == self.holder().is_some()
    }

    pub(crate) fn assign(&mut self, user: UserId, on: NaiveDate) {
        match self {
            Asset::Phone(phone) => {
                phone.status = PhoneStatus::Assigned;
                phone.assigned_to = Some(user);
                phone.assigned_date = Some(on);
            }
            Asset::Sim(sim) => {
                sim.status = SimStatus::Assigned;
                sim.assigned_to = Some(user);
                sim.assigned_date = Some(on);
            }
        }
    }

    pub(crate) fn release(&mut self) {
        match self {
            Asset::Phone(phone) => {
                phone.status = PhoneStatus::Available;
                phone.assigned_to = None;
                phone.assigned_date = None;
            }
            Asset::Sim(sim) => {
                sim.status = SimStatus::Available;
                sim.assigned_to = None;
                sim.assigned_date = None;
            }
        }
    }

    pub fn as_phone(&self) -> Option<&Phone> {
        match self {
            Asset::Phone(phone) => Some(phone),
            Asset::Sim(_) => None,
        }
    }

    pub fn as_sim(&self) -> Option<&SimCard> {
        match self {
            Asset::Sim(sim) => Some(sim),
            Asset::Phone(_) => None,
        }
    }
}

/// Assignment of a phone and/or SIM card to a user.
///
/// Holder and asset linkage are fixed when the record is opened; only the
/// notes and the lifecycle state change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    id: AttributionId,
    user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone_id: Option<PhoneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sim_card_id: Option<SimCardId>,
    assigned_by: UserId,
    assignment_date: NaiveDate,
    #[serde(flatten)]
    state: AttributionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Attribution {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn open(
        id: AttributionId,
        user_id: UserId,
        phone_id: Option<PhoneId>,
        sim_card_id: Option<SimCardId>,
        assigned_by: UserId,
        assignment_date: NaiveDate,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            phone_id,
            sim_card_id,
            assigned_by,
            assignment_date,
            state: AttributionState::Active,
            notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> AttributionId {
        self.id
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn phone_id(&self) -> Option<PhoneId> {
        self.phone_id
    }

    pub fn sim_card_id(&self) -> Option<SimCardId> {
        self.sim_card_id
    }

    pub fn assigned_by(&self) -> UserId {
        self.assigned_by
    }

    pub fn assignment_date(&self) -> NaiveDate {
        self.assignment_date
    }

    pub fn state(&self) -> &AttributionState {
        &self.state
    }

    pub fn status(&self) -> AttributionStatus {
        self.state.status()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Assets referenced by this record, phone first
    pub fn assets(&self) -> Vec<AssetRef> {
        self.phone_id
            .map(AssetRef::phone)
            .into_iter()
            .chain(self.sim_card_id.map(AssetRef::sim))
            .collect()
    }

    pub fn holds(&self, asset: AssetRef) -> bool {
        self.assets().contains(&asset)
    }

    pub(crate) fn set_state(&mut self, state: AttributionState, now: DateTime<Utc>) {
        self.state = state;
        self.updated_at = now;
    }

    pub(crate) fn set_notes(&mut self, notes: Option<String>, now: DateTime<Utc>) {
        self.notes = notes;
        self.updated_at = now;
    }
}

/// Append-only ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentHistory {
    pub id: HistoryId,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub item_id: u64,
    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
    pub action: HistoryAction,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl AssignmentHistory {
    pub fn asset(&self) -> AssetRef {
        AssetRef {
            kind: self.kind,
            id: self.item_id,
        }
    }

    pub fn involves(&self, user: UserId) -> bool {
        self.from_user_id == Some(user) || self.to_user_id == Some(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    #[test]
    fn test_assign_and_release_keep_asset_consistent() {
        let mut asset = Asset::Phone(Phone::new(
            PhoneId(7),
            "Samsung".to_string(),
            "Galaxy S23".to_string(),
            "356938035643809".to_string(),
        ));
        assert!(asset.is_available());
        assert!(asset.is_consistent());

        asset.assign(UserId(42), today());
        assert!(asset.is_assigned());
        assert_eq!(asset.holder(), Some(UserId(42)));
        assert_eq!(asset.assigned_date(), Some(today()));
        assert!(asset.is_consistent());

        asset.release();
        assert!(asset.is_available());
        assert_eq!(asset.holder(), None);
        assert_eq!(asset.assigned_date(), None);
        assert!(asset.is_consistent());
    }

    #[test]
    fn test_attribution_lists_phone_before_sim() {
        let attribution = Attribution::open(
            AttributionId(1),
            UserId(42),
            Some(PhoneId(7)),
            Some(SimCardId(3)),
            UserId(1),
            today(),
            None,
            Utc::now(),
        );
        assert_eq!(
            attribution.assets(),
            vec![AssetRef::phone(PhoneId(7)), AssetRef::sim(SimCardId(3))]
        );
        assert!(attribution.holds(AssetRef::sim(SimCardId(3))));
        assert!(!attribution.holds(AssetRef::sim(SimCardId(4))));
    }

    #[test]
    fn test_attribution_json_shape() {
        let mut attribution = Attribution::open(
            AttributionId(5),
            UserId(42),
            Some(PhoneId(7)),
            None,
            UserId(1),
            today(),
            Some("spare".to_string()),
            Utc::now(),
        );
        let json = serde_json::to_value(&attribution).unwrap();
        assert_eq!(json["status"], "ACTIVE");
        assert_eq!(json["phone_id"], 7);
        assert!(json.get("sim_card_id").is_none());
        assert!(json.get("return_date").is_none());

        attribution.set_state(
            AttributionState::Returned {
                return_date: today(),
                returned_by: Some(UserId(1)),
            },
            Utc::now(),
        );
        let raw = serde_json::to_string(&attribution).unwrap();
        let back: Attribution = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.status(), AttributionStatus::Returned);
        assert_eq!(back.state().return_date(), Some(today()));
        assert_eq!(back, attribution);
    }

    #[test]
    fn test_asset_is_tagged_by_kind() {
        let asset = Asset::Sim(SimCard::new(
            SimCardId(3),
            "+33600000000".to_string(),
            "8933150319012345678".to_string(),
        ));
        let json = serde_json::to_value(&asset).unwrap();
        assert_eq!(json["kind"], "SIM");
        assert_eq!(json["status"], "AVAILABLE");
        assert_eq!(asset.code(), "8933150319012345678");
    }
}
