//! Shared fixture for the engine integration tests

#![allow(dead_code)]

use assets_common::{AssetKind, AssetRef, Role};
use attribution_engine::{
    AttributionEngine, Config, Inventory, MemoryStore, NewPhone, NewSimCard, NewUser, Phone,
    SimCard, Store, User,
};
use std::sync::Arc;

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub engine: AttributionEngine,
    pub inventory: Inventory,
    pub admin: User,
    pub alice: User,
    pub bob: User,
    pub phone: Phone,
    pub sim: SimCard,
}

impl Fixture {
    pub fn phone_ref(&self) -> AssetRef {
        AssetRef::phone(self.phone.id)
    }

    pub fn sim_ref(&self) -> AssetRef {
        AssetRef::sim(self.sim.id)
    }
}

pub async fn user(inventory: &Inventory, name: &str, email: &str, role: Role) -> User {
    inventory
        .register_user(NewUser {
            name: name.to_string(),
            email: email.to_string(),
            role,
            department: "Operations".to_string(),
        })
        .await
        .unwrap()
}

pub async fn phone(inventory: &Inventory, imei: &str) -> Phone {
    inventory
        .register_phone(NewPhone {
            brand: "Samsung".to_string(),
            model: "Galaxy S23".to_string(),
            imei: imei.to_string(),
            serial_number: Some("R58T123".to_string()),
            notes: None,
        })
        .await
        .unwrap()
}

pub async fn sim(inventory: &Inventory, iccid: &str) -> SimCard {
    inventory
        .register_sim_card(NewSimCard {
            number: "+212600112233".to_string(),
            iccid: iccid.to_string(),
            carrier: Some("Maroc Telecom".to_string()),
            notes: None,
        })
        .await
        .unwrap()
}

pub async fn fixture_with(config: Config) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let shared: Arc<dyn Store> = store.clone();
    let engine = AttributionEngine::new(Arc::clone(&shared), &config);
    let inventory = Inventory::new(shared, &config);

    let admin = user(&inventory, "Admin", "admin@example.com", Role::Admin).await;
    let alice = user(&inventory, "Alice Martin", "alice@example.com", Role::User).await;
    let bob = user(&inventory, "Bob Durand", "bob@example.com", Role::User).await;
    let phone = phone(&inventory, "356938035643809").await;
    let sim = sim(&inventory, "8921200000000000001").await;

    Fixture {
        store,
        engine,
        inventory,
        admin,
        alice,
        bob,
        phone,
        sim,
    }
}

pub async fn fixture() -> Fixture {
    fixture_with(Config::default()).await
}

/// Exclusivity and status/asset consistency over the whole inventory
pub async fn assert_consistent(store: &MemoryStore) {
    let attributions = store.attributions().await.unwrap();
    for kind in [AssetKind::Phone, AssetKind::Sim] {
        for asset in store.assets(kind).await.unwrap() {
            let asset_ref = asset.asset_ref();
            let active: Vec<_> = attributions
                .iter()
                .filter(|a| a.is_active() && a.holds(asset_ref))
                .collect();
            assert!(active.len() <= 1, "{} has {} active attributions", asset_ref, active.len());
            assert!(asset.is_consistent(), "{} status and holder disagree", asset_ref);
            assert_eq!(
                asset.is_assigned(),
                active.len() == 1,
                "{} is {} with {} active attributions",
                asset_ref,
                asset.status_name(),
                active.len()
            );
            if let Some(record) = active.first() {
                assert_eq!(asset.holder(), Some(record.user_id()));
            }
        }
    }
}
