//! The three index structures the engine maintains over the slot table,
//! plus the slot-number → buffer-index lookup. Every index is a sorted
//! `Vec` maintained by insertion sort (binary-search for position, then
//! `Vec::insert`/`Vec::remove`) — never a `BTreeMap` — so the "every
//! index resolves back to its slot" ordering invariant stays directly
//! inspectable in this module rather than hidden inside a tree
//! implementation.

use crypto_daemon_types::error::KeyStoreError;
use crypto_daemon_types::ids::{CryptoObjectUid, SlotNumber, Uuid};

use crate::slot::ObjectType;

/// `slot_number -> buffer_index`, sorted by `slot_number`.
#[derive(Debug, Default)]
pub struct SlotNumberIndex {
    entries: Vec<(SlotNumber, usize)>,
}

impl SlotNumberIndex {
    /// Inserts a new `(slot_number, buffer_index)` pair.
    pub fn insert(&mut self, slot_number: SlotNumber, buffer_index: usize) {
        match self.entries.binary_search_by_key(&slot_number, |(n, _)| *n) {
            Ok(pos) => self.entries[pos] = (slot_number, buffer_index),
            Err(pos) => self.entries.insert(pos, (slot_number, buffer_index)),
        }
    }

    /// Looks up the buffer index for a slot number.
    pub fn get(&self, slot_number: SlotNumber) -> Option<usize> {
        self.entries
            .binary_search_by_key(&slot_number, |(n, _)| *n)
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    /// Iterates all known slot numbers in ascending order.
    pub fn slot_numbers(&self) -> impl Iterator<Item = SlotNumber> + '_ {
        self.entries.iter().map(|(n, _)| *n)
    }
}

/// `(uuid, slot_number) -> buffer_index`, sorted by `(uuid, slot_number)`.
/// Duplicate `uuid` insertion (a second slot claiming a `slot_uid` already
/// present) is rejected with [`KeyStoreError::ContentDuplication`] — slot
/// uids are globally unique.
#[derive(Debug, Default)]
pub struct UuidIndex {
    entries: Vec<(Uuid, SlotNumber, usize)>,
}

impl UuidIndex {
    /// Inserts `(uuid, slot_number, buffer_index)`. Errors if `uuid` is
    /// already indexed under a *different* slot number.
    pub fn insert(
        &mut self,
        uuid: Uuid,
        slot_number: SlotNumber,
        buffer_index: usize,
    ) -> Result<(), KeyStoreError> {
        let key = (uuid, slot_number);
        match self
            .entries
            .binary_search_by_key(&key, |(u, n, _)| (*u, *n))
        {
            Ok(pos) => {
                self.entries[pos].2 = buffer_index;
                Ok(())
            }
            Err(_) => {
                if self.entries.iter().any(|(u, n, _)| *u == uuid && *n != slot_number) {
                    return Err(KeyStoreError::ContentDuplication);
                }
                let pos = self
                    .entries
                    .partition_point(|(u, n, _)| (*u, *n) < key);
                self.entries.insert(pos, (uuid, slot_number, buffer_index));
                Ok(())
            }
        }
    }

    /// Removes the entry for `(uuid, slot_number)`, if present.
    pub fn remove(&mut self, uuid: Uuid, slot_number: SlotNumber) {
        if let Ok(pos) = self
            .entries
            .binary_search_by_key(&(uuid, slot_number), |(u, n, _)| (*u, *n))
        {
            self.entries.remove(pos);
        }
    }

    /// Finds the slot number + buffer index for `uuid`, if indexed.
    pub fn find(&self, uuid: Uuid) -> Option<(SlotNumber, usize)> {
        let start = self.entries.partition_point(|(u, _, _)| *u < uuid);
        self.entries
            .get(start)
            .filter(|(u, _, _)| *u == uuid)
            .map(|(_, n, idx)| (*n, *idx))
    }
}

/// `(provider_uuid, slot_number) -> buffer_index`, sorted by
/// `(provider_uuid, slot_number)`. Enumerates slots a given crypto
/// provider may load.
#[derive(Debug, Default)]
pub struct ProviderIndex {
    entries: Vec<(Uuid, SlotNumber, usize)>,
}

impl ProviderIndex {
    /// Inserts `(provider_uuid, slot_number, buffer_index)`.
    pub fn insert(&mut self, provider_uuid: Uuid, slot_number: SlotNumber, buffer_index: usize) {
        let key = (provider_uuid, slot_number);
        match self
            .entries
            .binary_search_by_key(&key, |(p, n, _)| (*p, *n))
        {
            Ok(pos) => self.entries[pos].2 = buffer_index,
            Err(_) => {
                let pos = self.entries.partition_point(|(p, n, _)| (*p, *n) < key);
                self.entries
                    .insert(pos, (provider_uuid, slot_number, buffer_index));
            }
        }
    }

    /// Removes the entry for `(provider_uuid, slot_number)`, if present.
    pub fn remove(&mut self, provider_uuid: Uuid, slot_number: SlotNumber) {
        if let Ok(pos) = self
            .entries
            .binary_search_by_key(&(provider_uuid, slot_number), |(p, n, _)| (*p, *n))
        {
            self.entries.remove(pos);
        }
    }

    /// Iterates all slot numbers registered for `provider_uuid`, in
    /// ascending order.
    pub fn slots_for_provider(&self, provider_uuid: Uuid) -> impl Iterator<Item = SlotNumber> + '_ {
        let start = self.entries.partition_point(|(p, _, _)| *p < provider_uuid);
        self.entries[start..]
            .iter()
            .take_while(move |(p, _, _)| *p == provider_uuid)
            .map(|(_, n, _)| *n)
    }
}

/// `(couid, type, slot_number) -> buffer_index`, sorted by
/// `(couid, type, slot_number)`. Drives [`find_object`] resumption and
/// duplicate-COUID detection for `save_copy`.
///
/// [`find_object`]: crate::engine::KeyStoreEngine::find_object
#[derive(Debug, Default)]
pub struct CouidIndex {
    entries: Vec<(CryptoObjectUid, ObjectType, SlotNumber, usize)>,
}

fn couid_key(couid: CryptoObjectUid) -> (u64, [u8; 16]) {
    // Sort on (generator bytes, version) to give the "(couid, type,
    // slot_number)" index ordering a total order over COUID values;
    // `Uuid`/`CryptoObjectUid` carry no `Ord` impl by design (equality
    // only), so the index supplies its own total order purely for
    // insertion-sort bookkeeping — it is never exposed.
    (couid.version, couid.generator.0)
}

impl CouidIndex {
    /// Inserts `(couid, type, slot_number, buffer_index)`.
    pub fn insert(
        &mut self,
        couid: CryptoObjectUid,
        object_type: ObjectType,
        slot_number: SlotNumber,
        buffer_index: usize,
    ) {
        let pos = self.position_for(couid, object_type, slot_number);
        match pos {
            Ok(existing) => self.entries[existing].3 = buffer_index,
            Err(insert_at) => self
                .entries
                .insert(insert_at, (couid, object_type, slot_number, buffer_index)),
        }
    }

    fn position_for(
        &self,
        couid: CryptoObjectUid,
        object_type: ObjectType,
        slot_number: SlotNumber,
    ) -> Result<usize, usize> {
        self.entries.binary_search_by(|(c, t, n, _)| {
            (couid_key(*c), *t as u8, *n).cmp(&(couid_key(couid), object_type as u8, slot_number))
        })
    }

    /// Removes the entry for `(couid, type, slot_number)`, if present.
    pub fn remove(&mut self, couid: CryptoObjectUid, object_type: ObjectType, slot_number: SlotNumber) {
        if let Ok(pos) = self.position_for(couid, object_type, slot_number) {
            self.entries.remove(pos);
        }
    }

    /// Returns true if `couid` is already indexed for `object_type` under
    /// any slot number other than `excluding`.
    pub fn has_duplicate(
        &self,
        couid: CryptoObjectUid,
        object_type: ObjectType,
        excluding: SlotNumber,
    ) -> bool {
        self.entries
            .iter()
            .any(|(c, t, n, _)| *c == couid && *t == object_type && *n != excluding)
    }

    /// Finds the slot number matching `couid`/`object_type`, resuming
    /// after `previous`. `SlotNumber::INVALID` as `previous` starts from
    /// the beginning.
    pub fn find(
        &self,
        couid: CryptoObjectUid,
        object_type: ObjectType,
        previous: SlotNumber,
    ) -> SlotNumber {
        let mut seen_previous = previous.is_invalid();
        for (c, t, n, _) in &self.entries {
            if *c != couid || *t != object_type {
                continue;
            }
            if !seen_previous {
                if *n == previous {
                    seen_previous = true;
                }
                continue;
            }
            return *n;
        }
        SlotNumber::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uuid(b: u8) -> Uuid {
        Uuid::from_bytes([b; 16])
    }

    #[test]
    fn uuid_index_rejects_duplicate_uuid_under_different_slot() {
        let mut idx = UuidIndex::default();
        idx.insert(uuid(1), SlotNumber(1), 0).unwrap();
        let err = idx.insert(uuid(1), SlotNumber(2), 1).unwrap_err();
        assert_eq!(err, KeyStoreError::ContentDuplication);
    }

    #[test]
    fn uuid_index_find_resolves_back_to_slot() {
        let mut idx = UuidIndex::default();
        idx.insert(uuid(3), SlotNumber(7), 2).unwrap();
        assert_eq!(idx.find(uuid(3)), Some((SlotNumber(7), 2)));
        assert_eq!(idx.find(uuid(4)), None);
    }

    #[test]
    fn provider_index_enumerates_in_ascending_slot_order() {
        let mut idx = ProviderIndex::default();
        let p = uuid(9);
        idx.insert(p, SlotNumber(5), 0);
        idx.insert(p, SlotNumber(2), 1);
        idx.insert(p, SlotNumber(8), 2);
        let got: Vec<_> = idx.slots_for_provider(p).collect();
        assert_eq!(got, vec![SlotNumber(2), SlotNumber(5), SlotNumber(8)]);
    }

    #[test]
    fn couid_index_find_object_resumes_after_previous() {
        let mut idx = CouidIndex::default();
        let couid = CryptoObjectUid::new(uuid(1));
        idx.insert(couid, ObjectType::PublicKey, SlotNumber(1), 0);
        idx.insert(couid, ObjectType::PublicKey, SlotNumber(2), 1);
        idx.insert(couid, ObjectType::PublicKey, SlotNumber(3), 2);

        let first = idx.find(couid, ObjectType::PublicKey, SlotNumber::INVALID);
        assert_eq!(first, SlotNumber(1));
        let second = idx.find(couid, ObjectType::PublicKey, first);
        assert_eq!(second, SlotNumber(2));
        let third = idx.find(couid, ObjectType::PublicKey, second);
        assert_eq!(third, SlotNumber(3));
        let exhausted = idx.find(couid, ObjectType::PublicKey, third);
        assert_eq!(exhausted, SlotNumber::INVALID);
    }

    #[test]
    fn couid_index_detects_duplicates_excluding_self() {
        let mut idx = CouidIndex::default();
        let couid = CryptoObjectUid::new(uuid(5));
        idx.insert(couid, ObjectType::PublicKey, SlotNumber(4), 0);
        assert!(idx.has_duplicate(couid, ObjectType::PublicKey, SlotNumber(99)));
        assert!(!idx.has_duplicate(couid, ObjectType::PublicKey, SlotNumber(4)));
    }
}
