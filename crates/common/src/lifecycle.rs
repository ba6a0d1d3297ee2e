//! Attribution lifecycle.
//!
//! An attribution is `Active` from the moment it is opened until it is
//! returned. `Returned` is terminal for that record: a later assignment of
//! the same asset opens a new record. `Pending` exists in stored data but
//! no operation moves a record into or out of it.
//!
//! The return date and returning actor live inside the `Returned` variant,
//! so "return date set iff returned" cannot be violated by construction.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::UserId;

/// Flat status, used for filtering and in views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributionStatus {
    Active,
    Pending,
    Returned,
}

impl AttributionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionStatus::Active => "ACTIVE",
            AttributionStatus::Pending => "PENDING",
            AttributionStatus::Returned => "RETURNED",
        }
    }
}

impl fmt::Display for AttributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(AttributionStatus::Active),
            "PENDING" => Ok(AttributionStatus::Pending),
            "RETURNED" => Ok(AttributionStatus::Returned),
            other => Err(format!("unknown attribution status '{}'", other)),
        }
    }
}

/// Lifecycle state of one attribution record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributionState {
    Active,
    Pending,
    Returned {
        return_date: NaiveDate,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        returned_by: Option<UserId>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("attribution cannot move from {from} to {to}")]
pub struct IllegalTransition {
    pub from: AttributionStatus,
    pub to: AttributionStatus,
}

impl AttributionState {
    pub fn status(&self) -> AttributionStatus {
        match self {
            AttributionState::Active => AttributionStatus::Active,
            AttributionState::Pending => AttributionStatus::Pending,
            AttributionState::Returned { .. } => AttributionStatus::Returned,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, AttributionState::Active)
    }

    pub fn return_date(&self) -> Option<NaiveDate> {
        match self {
            AttributionState::Returned { return_date, .. } => Some(*return_date),
            _ => None,
        }
    }

    pub fn returned_by(&self) -> Option<UserId> {
        match self {
            AttributionState::Returned { returned_by, .. } => *returned_by,
            _ => None,
        }
    }

    /// Whether the table permits moving from `from` to `to`.
    ///
    /// Staying in the same state is always permitted and changes nothing.
    pub fn permits(from: AttributionStatus, to: AttributionStatus) -> bool {
        use AttributionStatus::*;
        from == to || matches!((from, to), (Active, Returned))
    }

    /// Apply a requested status change.
    ///
    /// `on` and `by` are only consulted when the record is being returned.
    pub fn advance(
        &self,
        to: AttributionStatus,
        on: NaiveDate,
        by: Option<UserId>,
    ) -> Result<AttributionState, IllegalTransition> {
        let from = self.status();
        if !Self::permits(from, to) {
            return Err(IllegalTransition { from, to });
        }
        if from == to {
            return Ok(self.clone());
        }

        Ok(match to {
            AttributionStatus::Returned => AttributionState::Returned {
                return_date: on,
                returned_by: by,
            },
            // Only Active -> Returned passes `permits` with from != to.
            AttributionStatus::Active | AttributionStatus::Pending => {
                return Err(IllegalTransition { from, to })
            }
        })
    }

    /// Close an active record. Anything but `Active` is rejected.
    pub fn close(&self, on: NaiveDate, by: Option<UserId>) -> Result<AttributionState, IllegalTransition> {
        if !self.is_active() {
            return Err(IllegalTransition {
                from: self.status(),
                to: AttributionStatus::Returned,
            });
        }
        self.advance(AttributionStatus::Returned, on, by)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn test_active_closes_to_returned() {
        let state = AttributionState::Active.close(day(3), Some(UserId(1))).unwrap();
        assert_eq!(state.status(), AttributionStatus::Returned);
        assert_eq!(state.return_date(), Some(day(3)));
        assert_eq!(state.returned_by(), Some(UserId(1)));
    }

    #[test]
    fn test_returned_is_terminal() {
        let returned = AttributionState::Returned {
            return_date: day(1),
            returned_by: None,
        };
        let err = returned
            .advance(AttributionStatus::Active, day(2), None)
            .unwrap_err();
        assert_eq!(err.from, AttributionStatus::Returned);
        assert_eq!(err.to, AttributionStatus::Active);

        // closing twice is not a no-op
        assert!(returned.close(day(2), None).is_err());
    }

    #[test]
    fn test_pending_has_no_exits() {
        let pending = AttributionState::Pending;
        assert!(pending.advance(AttributionStatus::Active, day(1), None).is_err());
        assert!(pending.advance(AttributionStatus::Returned, day(1), None).is_err());
        assert!(AttributionState::Active
            .advance(AttributionStatus::Pending, day(1), None)
            .is_err());
    }

    #[test]
    fn test_same_status_is_unchanged() {
        let returned = AttributionState::Returned {
            return_date: day(1),
            returned_by: Some(UserId(4)),
        };
        let same = returned
            .advance(AttributionStatus::Returned, day(9), None)
            .unwrap();
        assert_eq!(same, returned);
    }

    #[test]
    fn test_state_wire_shape() {
        let json = serde_json::to_value(AttributionState::Returned {
            return_date: day(7),
            returned_by: None,
        })
        .unwrap();
        assert_eq!(json["status"], "RETURNED");
        assert_eq!(json["return_date"], "2024-05-07");
        assert!(json.get("returned_by").is_none());

        let active: AttributionState = serde_json::from_str(r#"{"status":"ACTIVE"}"#).unwrap();
        assert!(active.is_active());
    }
}
