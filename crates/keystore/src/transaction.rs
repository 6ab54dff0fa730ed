//! Atomic multi-slot transactions: a scope of [`SlotNumber`]s and a
//! per-slot shadow buffer staged until commit or rollback.

use std::collections::HashMap;

use crypto_daemon_types::ids::{SlotNumber, UserId};

use crate::slot::SlotContent;

/// A monotonic (within process) transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

/// A staged write: either new content (`save_copy`) or a clear
/// (`Clear` stages `None`).
pub type StagedWrite = Option<SlotContent>;

/// A set of target slots and their staged writes. The scope is fixed at
/// `begin_transaction` and never changes.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    owner: UserId,
    scope: Vec<SlotNumber>,
    staged: HashMap<SlotNumber, StagedWrite>,
}

impl Transaction {
    /// Begins a new transaction over `scope`, owned by `owner`. `scope`
    /// must already be validated (non-empty, no duplicates, all owned by
    /// `owner`, none in another pending transaction) by the caller.
    pub fn new(id: TransactionId, owner: UserId, scope: Vec<SlotNumber>) -> Self {
        Self {
            id,
            owner,
            scope,
            staged: HashMap::new(),
        }
    }

    /// This transaction's id.
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// The user that began this transaction; only this user's calls may
    /// stage writes into it.
    pub fn owner(&self) -> UserId {
        self.owner
    }

    /// The fixed scope of slots this transaction may write.
    pub fn scope(&self) -> &[SlotNumber] {
        &self.scope
    }

    /// Whether `slot` is within this transaction's scope.
    pub fn contains(&self, slot: SlotNumber) -> bool {
        self.scope.contains(&slot)
    }

    /// Stages a write (`Some(content)` for `save_copy`, `None` for
    /// `clear`) for `slot`. Overwrites any previously staged write for the
    /// same slot within this transaction.
    pub fn stage(&mut self, slot: SlotNumber, write: StagedWrite) {
        self.staged.insert(slot, write);
    }

    /// All staged writes, for use by `commit_transaction`.
    pub fn staged_writes(&self) -> impl Iterator<Item = (SlotNumber, &StagedWrite)> {
        self.staged.iter().map(|(k, v)| (*k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_tracks_scope_membership() {
        let txn = Transaction::new(TransactionId(1), UserId(1), vec![SlotNumber(1), SlotNumber(2)]);
        assert!(txn.contains(SlotNumber(1)));
        assert!(!txn.contains(SlotNumber(3)));
    }

    #[test]
    fn staged_write_overwrites_within_same_transaction() {
        let mut txn = Transaction::new(TransactionId(1), UserId(1), vec![SlotNumber(1)]);
        txn.stage(SlotNumber(1), None);
        assert!(txn.staged_writes().next().unwrap().1.is_none());
    }
}
