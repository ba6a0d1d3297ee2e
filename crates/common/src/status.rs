//! Status vocabularies for directory users, assets and ledger actions.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Implements case-insensitive `FromStr` over the SCREAMING_SNAKE_CASE wire names.
macro_rules! parse_by_name {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Assigner,
    User,
}

parse_by_name!(Role {
    Admin => "ADMIN",
    Assigner => "ASSIGNER",
    User => "USER",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    Active,
    Inactive,
}

parse_by_name!(UserStatus {
    Active => "ACTIVE",
    Inactive => "INACTIVE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhoneStatus {
    Available,
    Assigned,
    Lost,
    Damaged,
}

parse_by_name!(PhoneStatus {
    Available => "AVAILABLE",
    Assigned => "ASSIGNED",
    Lost => "LOST",
    Damaged => "DAMAGED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimStatus {
    Available,
    Assigned,
    Lost,
    Blocked,
}

parse_by_name!(SimStatus {
    Available => "AVAILABLE",
    Assigned => "ASSIGNED",
    Lost => "LOST",
    Blocked => "BLOCKED",
});

/// What a ledger entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Assign,
    Unassign,
    Transfer,
    /// Accepted when reading older ledgers; the engine writes `Unassign` for returns.
    Return,
}

parse_by_name!(HistoryAction {
    Assign => "ASSIGN",
    Unassign => "UNASSIGN",
    Transfer => "TRANSFER",
    Return => "RETURN",
});
