//! Attribution Engine
//!
//! Tracks which user holds which phone and SIM card. Every assignment,
//! return and transfer goes through [`AttributionEngine`], which keeps the
//! asset's own status in step with the attribution record and writes one
//! ledger entry per asset moved. At most one active attribution exists per
//! asset, enforced by per-asset locks and by a compare-and-set claim in the
//! storage commit.

pub mod assets;
pub mod config;
pub mod engine;
pub mod inventory;
pub mod ledger;
pub mod locks;
pub mod models;
pub mod query;
pub mod requests;
pub mod store;
pub mod views;

pub use config::Config;
pub use engine::AttributionEngine;
pub use inventory::Inventory;
pub use ledger::HistoryLedger;
pub use models::{Asset, AssignmentHistory, Attribution, Phone, SimCard, User};
pub use requests::{
    AttributionFilter, CreateAttribution, NewPhone, NewSimCard, NewUser, PageRequest,
    UpdateAttribution,
};
pub use store::{MemoryStore, RedisStore, Store};
pub use views::{AttributionView, Page};
