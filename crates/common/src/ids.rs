use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::num::ParseIntError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse().map($name)
            }
        }

        impl From<u64> for $name {
            fn from(raw: u64) -> Self {
                $name(raw)
            }
        }
    };
}

numeric_id!(
    /// Directory user (holder, assigner or returner)
    UserId
);
numeric_id!(PhoneId);
numeric_id!(SimCardId);
numeric_id!(
    /// Assignment record
    AttributionId
);
numeric_id!(
    /// Ledger entry
    HistoryId
);

/// Kind of physical asset, as recorded in the history ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetKind {
    Phone,
    Sim,
}

impl AssetKind {
    /// Storage key segment
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Phone => "phone",
            AssetKind::Sim => "sim",
        }
    }

    /// Human readable label used in messages and ledger notes
    pub fn label(&self) -> &'static str {
        match self {
            AssetKind::Phone => "Phone",
            AssetKind::Sim => "SIM card",
        }
    }
}

impl FromStr for AssetKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "phone" => Ok(AssetKind::Phone),
            "sim" | "sim_card" | "simcard" => Ok(AssetKind::Sim),
            other => Err(format!("unknown asset kind '{}'", other)),
        }
    }
}

/// Reference to one asset in the registry: kind plus numeric id.
///
/// Ordering is (kind, id), which is also the order advisory locks are taken in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub id: u64,
}

impl AssetRef {
    pub fn phone(id: PhoneId) -> Self {
        Self {
            kind: AssetKind::Phone,
            id: id.0,
        }
    }

    pub fn sim(id: SimCardId) -> Self {
        Self {
            kind: AssetKind::Sim,
            id: id.0,
        }
    }

    /// Storage key fragment, e.g. `phone:7`
    pub fn key(&self) -> String {
        format!("{}:{}", self.kind.as_str(), self.id)
    }
}

impl fmt::Display for AssetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_ref_display_and_key() {
        let phone = AssetRef::phone(PhoneId(7));
        assert_eq!(phone.to_string(), "Phone 7");
        assert_eq!(phone.key(), "phone:7");

        let sim = AssetRef::sim(SimCardId(3));
        assert_eq!(sim.to_string(), "SIM card 3");
        assert_eq!(sim.key(), "sim:3");
    }

    #[test]
    fn test_lock_order_puts_phones_first() {
        let mut refs = vec![
            AssetRef::sim(SimCardId(1)),
            AssetRef::phone(PhoneId(9)),
            AssetRef::phone(PhoneId(2)),
        ];
        refs.sort();
        assert_eq!(
            refs,
            vec![
                AssetRef::phone(PhoneId(2)),
                AssetRef::phone(PhoneId(9)),
                AssetRef::sim(SimCardId(1)),
            ]
        );
    }

    #[test]
    fn test_ids_serialize_as_plain_numbers() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");
        assert_eq!("42".parse::<UserId>().unwrap(), UserId(42));
        assert_eq!(serde_json::to_string(&AssetKind::Sim).unwrap(), "\"SIM\"");
    }
}
