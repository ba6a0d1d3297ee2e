//! Directory and inventory registration
//!
//! Adds users, phones and SIM cards, and edits the inventory status of an
//! asset (lost, damaged, blocked, available again). The assignment status
//! is never set from here.

use assets_common::{
    AssetKind, AssetRef, Error, PhoneId, PhoneStatus, Result, SimCardId, SimStatus, UserId,
    UserStatus,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::locks::AssetLocks;
use crate::models::{Asset, Phone, SimCard, User};
use crate::requests::{NewPhone, NewSimCard, NewUser};
use crate::store::{Sequence, Store, UnitOfWork};

#[derive(Clone)]
pub struct Inventory {
    store: Arc<dyn Store>,
    locks: AssetLocks,
}

fn required(field: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::Validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

impl Inventory {
    pub fn new(store: Arc<dyn Store>, config: &Config) -> Self {
        Self {
            locks: AssetLocks::new(Arc::clone(&store), config),
            store,
        }
    }

    pub async fn register_user(&self, new: NewUser) -> Result<User> {
        let name = required("name", &new.name)?;
        let email = required("email", &new.email)?;
        if !email.contains('@') {
            return Err(Error::Validation(format!("Invalid email '{}'", email)));
        }

        let user = User {
            id: UserId(self.store.next_id(Sequence::User).await?),
            name,
            email,
            role: new.role,
            department: new.department.trim().to_string(),
            status: UserStatus::Active,
        };
        if !self.store.insert_user(&user).await? {
            debug!("Email already registered: {}", user.email);
            return Err(Error::Conflict(format!(
                "User with email {} already exists",
                user.email
            )));
        }

        info!("Registered user {} <{}>", user.id, user.email);
        Ok(user)
    }

    pub async fn register_phone(&self, new: NewPhone) -> Result<Phone> {
        let mut phone = Phone::new(
            PhoneId(self.store.next_id(Sequence::Phone).await?),
            required("brand", &new.brand)?,
            required("model", &new.model)?,
            required("IMEI", &new.imei)?,
        );
        phone.serial_number = new.serial_number;
        phone.notes = new.notes;

        let asset = Asset::Phone(phone.clone());
        if !self.store.insert_asset(&asset).await? {
            return Err(Error::Conflict(format!(
                "Phone with IMEI {} already exists",
                phone.imei
            )));
        }

        info!("Registered {} ({} {})", asset.asset_ref(), phone.brand, phone.model);
        Ok(phone)
    }

    pub async fn register_sim_card(&self, new: NewSimCard) -> Result<SimCard> {
        let mut sim = SimCard::new(
            SimCardId(self.store.next_id(Sequence::SimCard).await?),
            required("number", &new.number)?,
            required("ICCID", &new.iccid)?,
        );
        sim.carrier = new.carrier;
        sim.notes = new.notes;

        let asset = Asset::Sim(sim.clone());
        if !self.store.insert_asset(&asset).await? {
            return Err(Error::Conflict(format!(
                "SIM card with ICCID {} already exists",
                sim.iccid
            )));
        }

        info!("Registered {} ({})", asset.asset_ref(), sim.number);
        Ok(sim)
    }

    pub async fn set_phone_status(&self, id: PhoneId, status: PhoneStatus) -> Result<Asset> {
        if status == PhoneStatus::Assigned {
            return Err(Error::Validation(
                "ASSIGNED is set by assigning the phone".to_string(),
            ));
        }
        self.set_status(AssetRef::phone(id), status.as_str(), |asset| {
            if let Asset::Phone(phone) = asset {
                phone.set_status(status);
            }
        })
        .await
    }

    pub async fn set_sim_card_status(&self, id: SimCardId, status: SimStatus) -> Result<Asset> {
        if status == SimStatus::Assigned {
            return Err(Error::Validation(
                "ASSIGNED is set by assigning the SIM card".to_string(),
            ));
        }
        self.set_status(AssetRef::sim(id), status.as_str(), |asset| {
            if let Asset::Sim(sim) = asset {
                sim.set_status(status);
            }
        })
        .await
    }

    async fn set_status(
        &self,
        asset_ref: AssetRef,
        status: &str,
        apply: impl FnOnce(&mut Asset) + Send,
    ) -> Result<Asset> {
        let lease = self.locks.acquire(&[asset_ref]).await?;
        let result = self.set_status_locked(asset_ref, status, apply).await;
        lease.release().await;
        result
    }

    async fn set_status_locked(
        &self,
        asset_ref: AssetRef,
        status: &str,
        apply: impl FnOnce(&mut Asset) + Send,
    ) -> Result<Asset> {
        let mut asset = self
            .store
            .asset(asset_ref)
            .await?
            .ok_or_else(|| Error::not_found(asset_ref))?;

        if asset.is_assigned()
            || asset.holder().is_some()
            || self.store.count_active_attributions(asset_ref).await? > 0
        {
            return Err(Error::Conflict(format!(
                "{} is assigned; return it before changing its status",
                asset_ref
            )));
        }

        apply(&mut asset);
        let mut unit = UnitOfWork::new("set_asset_status");
        unit.save_asset(asset.clone());
        // still unheld at commit time
        unit.claim(asset_ref, None, None);
        self.store.commit(unit).await?;

        info!("{} is now {}", asset_ref, status);
        Ok(asset)
    }

    pub async fn users(&self) -> Result<Vec<User>> {
        self.store.users().await
    }

    pub async fn assets(&self, kind: AssetKind) -> Result<Vec<Asset>> {
        self.store.assets(kind).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use assets_common::Role;

    fn inventory() -> Inventory {
        Inventory::new(Arc::new(MemoryStore::new()), &Config::default())
    }

    fn phone(imei: &str) -> NewPhone {
        NewPhone {
            brand: "Samsung".to_string(),
            model: "Galaxy A54".to_string(),
            imei: imei.to_string(),
            serial_number: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_imei_is_a_conflict() {
        let inventory = inventory();
        let first = inventory.register_phone(phone("356938035643809")).await.unwrap();
        assert_eq!(first.status(), PhoneStatus::Available);

        let err = inventory
            .register_phone(phone(" 356938035643809 "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(inventory.assets(AssetKind::Phone).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_user_registration_validates_input() {
        let inventory = inventory();
        let err = inventory
            .register_user(NewUser {
                name: "  ".to_string(),
                email: "x@example.com".to_string(),
                role: Role::User,
                department: "Sales".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let user = inventory
            .register_user(NewUser {
                name: "Lina".to_string(),
                email: "lina@example.com".to_string(),
                role: Role::Assigner,
                department: "IT".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(user.status, UserStatus::Active);
        assert_eq!(inventory.users().await.unwrap(), vec![user]);
    }

    #[tokio::test]
    async fn test_status_edit_refuses_assigned() {
        let inventory = inventory();
        let sim = inventory
            .register_sim_card(NewSimCard {
                number: "+212600000001".to_string(),
                iccid: "8921200000000000001".to_string(),
                carrier: Some("Orange".to_string()),
                notes: None,
            })
            .await
            .unwrap();

        let err = inventory
            .set_sim_card_status(sim.id, SimStatus::Assigned)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        let blocked = inventory
            .set_sim_card_status(sim.id, SimStatus::Blocked)
            .await
            .unwrap();
        assert_eq!(blocked.status_name(), "BLOCKED");
        assert!(!blocked.is_available());
    }
}
