//! Shared vocabulary for the asset assignment backend.
//!
//! Identifiers, status enums, the attribution lifecycle and the error type
//! used by every crate in the workspace.

pub mod dates;
pub mod error;
pub mod ids;
pub mod lifecycle;
pub mod status;

pub use dates::parse_date;
pub use error::{Error, ErrorKind, Result};
pub use ids::{AssetKind, AssetRef, AttributionId, HistoryId, PhoneId, SimCardId, UserId};
pub use lifecycle::{AttributionState, AttributionStatus, IllegalTransition};
pub use status::{HistoryAction, PhoneStatus, Role, SimStatus, UserStatus};
