// Path: crates/access/src/config.rs

//! JSON deserialization for the access-control configuration file
//! (`userIDs: [{ userID, restrictions: [{ slotNumber, operation }] }]`).

use serde::{Deserialize, Serialize};

use crypto_daemon_types::ids::{SlotNumber, UserId};

use crate::operation::Operation;

impl Serialize for Operation {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let name = match self {
            Operation::None => "None",
            Operation::Read => "Read",
            Operation::Write => "Write",
            Operation::ReadWrite => "ReadWrite",
        };
        serializer.serialize_str(name)
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "None" => Ok(Operation::None),
            "Read" => Ok(Operation::Read),
            "Write" => Ok(Operation::Write),
            "ReadWrite" => Ok(Operation::ReadWrite),
            other => Err(serde::de::Error::custom(format!(
                "unknown access-control operation {other:?}, expected one of \
                 None/Read/Write/ReadWrite"
            ))),
        }
    }
}

/// One `(slotNumber, operation)` restriction entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestrictionEntry {
    /// The restricted slot.
    #[serde(rename = "slotNumber")]
    pub slot_number: SlotNumber,
    /// The permitted operation for this user on this slot.
    pub operation: Operation,
}

/// One user's full set of restrictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRestrictions {
    /// The restricted user.
    #[serde(rename = "userID")]
    pub user_id: UserId,
    /// The user's per-slot restrictions.
    pub restrictions: Vec<RestrictionEntry>,
}

/// The top-level access-control configuration file shape:
/// `{ "userIDs": [...] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessControlConfig {
    /// Every user's restrictions.
    #[serde(rename = "userIDs")]
    pub user_ids: Vec<UserRestrictions>,
}

/// Parses an access-control configuration document from its JSON text.
pub fn load_from_json(json: &str) -> Result<AccessControlConfig, serde_json::Error> {
    serde_json::from_str(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_shape() {
        let json = r#"{
            "userIDs": [
                { "userID": 1, "restrictions": [
                    { "slotNumber": 10, "operation": "Read" },
                    { "slotNumber": 20, "operation": "ReadWrite" }
                ] }
            ]
        }"#;
        let config = load_from_json(json).unwrap();
        assert_eq!(config.user_ids.len(), 1);
        assert_eq!(config.user_ids[0].restrictions.len(), 2);
        assert_eq!(config.user_ids[0].restrictions[0].operation, Operation::Read);
    }

    #[test]
    fn rejects_unknown_operation_names() {
        let json = r#"{"userIDs":[{"userID":1,"restrictions":[{"slotNumber":1,"operation":"Delete"}]}]}"#;
        assert!(load_from_json(json).is_err());
    }
}
