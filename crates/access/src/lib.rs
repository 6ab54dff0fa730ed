// Path: crates/access/src/lib.rs
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! # Access-control matrix
//!
//! Compiles the access-control configuration file into an efficient
//! `(UserId, SlotNumber) -> Operation` lookup. The matrix is read-only
//! after load (per the concurrency model's "no locking needed" rule for
//! this component), so it is a sorted `Vec` searched with binary search
//! rather than a `HashMap` — matches the insertion-sort-then-binary-search
//! idiom the key-storage indexes use for the same reason: predictable,
//! testable ordering with no hashing dependency.

mod config;
mod operation;

pub use config::{load_from_json, AccessControlConfig, RestrictionEntry, UserRestrictions};
pub use operation::Operation;

use crypto_daemon_types::ids::{SlotNumber, UserId};

/// A compiled `(UserId, SlotNumber) -> Operation` lookup table.
///
/// `enabled = false` (driven by the daemon config's `server.keyAccessControl`
/// flag) makes [`AccessControlMatrix::get_allowed_operation`] report
/// [`Operation::ReadWrite`] unconditionally, i.e. the engine behaves as if
/// every operation were permitted.
#[derive(Debug, Clone)]
pub struct AccessControlMatrix {
    enabled: bool,
    // Sorted by (UserId, SlotNumber) ascending; built once at load time via
    // insertion sort over the config's declaration order, then searched
    // with `binary_search_by_key`.
    entries: Vec<((UserId, SlotNumber), Operation)>,
}

impl AccessControlMatrix {
    /// Builds a matrix from parsed configuration. `enabled` should come
    /// from `server.keyAccessControl` in the daemon config.
    pub fn from_config(config: &AccessControlConfig, enabled: bool) -> Self {
        let mut entries: Vec<((UserId, SlotNumber), Operation)> = Vec::new();
        for user in &config.user_ids {
            for restriction in &user.restrictions {
                let key = (user.user_id, restriction.slot_number);
                // Insertion sort: find the sorted position and shift,
                // rather than collecting then calling `sort`, so the
                // resulting order is a direct, testable function of
                // insertion order for any ties (there should be none —
                // duplicate (user, slot) entries overwrite, last wins,
                // matching a config file naming the same pair twice).
                match entries.binary_search_by_key(&key, |(k, _)| *k) {
                    Ok(existing) => entries[existing].1 = restriction.operation,
                    Err(pos) => entries.insert(pos, (key, restriction.operation)),
                }
            }
        }
        Self { enabled, entries }
    }

    /// An empty, disabled matrix — every operation permitted. Used before
    /// the access-control config file has been loaded, or when it is
    /// absent entirely.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            entries: Vec::new(),
        }
    }

    /// Returns the permitted [`Operation`] for `(user, slot)`.
    ///
    /// [`Operation::None`] if either key is absent from the table, unless
    /// the matrix is globally disabled, in which case every lookup
    /// returns [`Operation::ReadWrite`].
    pub fn get_allowed_operation(&self, user: UserId, slot: SlotNumber) -> Operation {
        if !self.enabled {
            return Operation::ReadWrite;
        }
        self.entries
            .binary_search_by_key(&(user, slot), |(k, _)| *k)
            .map(|idx| self.entries[idx].1)
            .unwrap_or(Operation::None)
    }

    /// Whether the matrix is actively enforcing restrictions.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> AccessControlMatrix {
        let config = AccessControlConfig {
            user_ids: vec![UserRestrictions {
                user_id: UserId(1),
                restrictions: vec![
                    RestrictionEntry {
                        slot_number: SlotNumber(10),
                        operation: Operation::Read,
                    },
                    RestrictionEntry {
                        slot_number: SlotNumber(20),
                        operation: Operation::ReadWrite,
                    },
                ],
            }],
        };
        AccessControlMatrix::from_config(&config, true)
    }

    #[test]
    fn absent_key_returns_none() {
        let m = matrix();
        assert_eq!(m.get_allowed_operation(UserId(1), SlotNumber(99)), Operation::None);
        assert_eq!(m.get_allowed_operation(UserId(2), SlotNumber(10)), Operation::None);
    }

    #[test]
    fn present_key_returns_configured_operation() {
        let m = matrix();
        assert_eq!(m.get_allowed_operation(UserId(1), SlotNumber(10)), Operation::Read);
        assert_eq!(m.get_allowed_operation(UserId(1), SlotNumber(20)), Operation::ReadWrite);
    }

    #[test]
    fn disabled_matrix_permits_everything() {
        let m = AccessControlMatrix::disabled();
        assert_eq!(m.get_allowed_operation(UserId(1), SlotNumber(10)), Operation::ReadWrite);
    }
}
