//! The on-disk key database: a JSON index file naming each slot's uuid,
//! provider, and document path, plus one JSON slot document per slot.
//! Transaction commits stage a combined bincode shadow file under
//! `.shadow/`, fsync it, then `rename()` each affected slot document over
//! its live counterpart — recoverable because the combined shadow file
//! carries every entry needed to finish a commit interrupted mid-loop.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crypto_daemon_types::error::KeyStoreError;
use crypto_daemon_types::ids::{SlotNumber, Uuid};

use crate::slot::{KeySlot, SlotDocument};
use crate::transaction::TransactionId;

/// One entry in the JSON index/config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    /// The slot number.
    pub number: SlotNumber,
    /// The slot's logical uuid, cross-checked against the document's
    /// `meta.uuid` at load time.
    pub uuid: Uuid,
    /// The crypto provider permitted to load this slot.
    pub provider: IndexProvider,
    /// Path to the slot's JSON document, relative to the database root.
    pub path: String,
}

/// `IndexEntry.provider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexProvider {
    /// The provider's uuid.
    pub uuid: Uuid,
}

/// The top-level JSON index/config document: `{ "slots": [...] }`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyDatabaseIndex {
    /// Every slot known to this database.
    pub slots: Vec<IndexEntry>,
}

fn shadow_dir(root: &Path) -> PathBuf {
    root.join(".shadow")
}

fn index_path(root: &Path) -> PathBuf {
    root.join("index.json")
}

fn fsync_file(file: &File) -> Result<(), KeyStoreError> {
    file.sync_all()
        .map_err(|e| KeyStoreError::ResourceFault(format!("fsync failed: {e}")))
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), KeyStoreError> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut tmp = File::create(&tmp_path)
            .map_err(|e| KeyStoreError::ResourceFault(format!("create {tmp_path:?}: {e}")))?;
        tmp.write_all(bytes)
            .map_err(|e| KeyStoreError::ResourceFault(format!("write {tmp_path:?}: {e}")))?;
        fsync_file(&tmp)?;
    }
    fs::rename(&tmp_path, path)
        .map_err(|e| KeyStoreError::ResourceFault(format!("rename {tmp_path:?} -> {path:?}: {e}")))
}

/// A combined, bincode-encoded shadow record for one transaction commit:
/// every `(SlotNumber, SlotDocument)` pair the commit will write.
#[derive(Debug, Serialize, Deserialize)]
struct ShadowRecord {
    txn_id: u64,
    entries: Vec<(u64, SlotDocument)>,
}

/// The open, file-locked key database.
pub struct KeyDatabase {
    root: PathBuf,
    /// Held for the life of the database to guarantee single-writer
    /// access to its on-disk files.
    _lock: File,
}

impl KeyDatabase {
    /// Opens (and exclusively locks) the database at `root`, replaying any
    /// incomplete transaction shadow files left from a prior crash, then
    /// loads every slot. Any malformed slot document, or one whose
    /// `meta.uuid` disagrees with the index, aborts with
    /// [`KeyStoreError::Corrupted`] rather than starting with a partial
    /// database.
    pub fn open(root: impl Into<PathBuf>) -> Result<(Self, Vec<KeySlot>), KeyStoreError> {
        let root = root.into();
        fs::create_dir_all(&root)
            .map_err(|e| KeyStoreError::ResourceFault(format!("create {root:?}: {e}")))?;
        fs::create_dir_all(shadow_dir(&root))
            .map_err(|e| KeyStoreError::ResourceFault(format!("create shadow dir: {e}")))?;

        let lock_path = root.join(".lock");
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&lock_path)
            .map_err(|e| KeyStoreError::ResourceFault(format!("open lock file: {e}")))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| KeyStoreError::ResourceFault("database already locked by another process".into()))?;

        let db = Self {
            root: root.clone(),
            _lock: lock_file,
        };
        db.recover()?;
        let slots = db.load_all()?;
        Ok((db, slots))
    }

    /// Replays any combined shadow files left by an interrupted commit:
    /// re-applies every entry (idempotent — re-renaming the same content
    /// is harmless) then removes the shadow file.
    fn recover(&self) -> Result<(), KeyStoreError> {
        let dir = shadow_dir(&self.root);
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(_) => return Ok(()),
        };
        for entry in read_dir {
            let entry = entry.map_err(|e| KeyStoreError::ResourceFault(e.to_string()))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("shadow") {
                continue;
            }
            let bytes = fs::read(&path)
                .map_err(|e| KeyStoreError::ResourceFault(format!("read shadow {path:?}: {e}")))?;
            let record: ShadowRecord = bincode::deserialize(&bytes).map_err(|e| {
                KeyStoreError::Corrupted(format!("unreadable shadow file {path:?}: {e}"))
            })?;
            self.apply_shadow_entries(&record.entries)?;
            fs::remove_file(&path).ok();
        }
        Ok(())
    }

    fn index(&self) -> Result<KeyDatabaseIndex, KeyStoreError> {
        let path = index_path(&self.root);
        if !path.exists() {
            return Ok(KeyDatabaseIndex::default());
        }
        let bytes = fs::read(&path)
            .map_err(|e| KeyStoreError::ResourceFault(format!("read index: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| KeyStoreError::Corrupted(format!("malformed index.json: {e}")))
    }

    fn write_index(&self, index: &KeyDatabaseIndex) -> Result<(), KeyStoreError> {
        let bytes = serde_json::to_vec_pretty(index)
            .map_err(|e| KeyStoreError::ResourceFault(format!("encode index: {e}")))?;
        write_atomically(&index_path(&self.root), &bytes)
    }

    fn slot_path(&self, entry: &IndexEntry) -> PathBuf {
        self.root.join(&entry.path)
    }

    /// Loads every slot named in the index, validating each document's
    /// `meta.uuid` against the index entry.
    fn load_all(&self) -> Result<Vec<KeySlot>, KeyStoreError> {
        let index = self.index()?;
        let mut slots = Vec::with_capacity(index.slots.len());
        for entry in &index.slots {
            let path = self.slot_path(entry);
            let bytes = fs::read(&path).map_err(|e| {
                KeyStoreError::Corrupted(format!("missing slot document {path:?}: {e}"))
            })?;
            let doc: SlotDocument = serde_json::from_slice(&bytes).map_err(|e| {
                KeyStoreError::Corrupted(format!("malformed slot document {path:?}: {e}"))
            })?;
            if doc.meta.uuid != entry.uuid {
                return Err(KeyStoreError::Corrupted(format!(
                    "slot {:?} document uuid {} disagrees with index uuid {}",
                    entry.number, doc.meta.uuid, entry.uuid
                )));
            }
            slots.push(KeySlot::from_document(entry.number, doc));
        }
        Ok(slots)
    }

    /// Registers a brand-new slot in the index (used when a slot is
    /// created for the first time, not merely rewritten) and writes its
    /// initial document.
    pub fn create_slot(&self, slot: &KeySlot) -> Result<(), KeyStoreError> {
        let mut index = self.index()?;
        let rel_path = format!("slots/{}.json", slot.slot_number.0);
        index.slots.push(IndexEntry {
            number: slot.slot_number,
            uuid: slot.slot_uid,
            provider: IndexProvider {
                uuid: slot.provider_uuid,
            },
            path: rel_path.clone(),
        });
        fs::create_dir_all(self.root.join("slots"))
            .map_err(|e| KeyStoreError::ResourceFault(format!("create slots dir: {e}")))?;
        let doc = SlotDocument::from(slot);
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| KeyStoreError::ResourceFault(format!("encode slot doc: {e}")))?;
        write_atomically(&self.root.join(&rel_path), &bytes)?;
        self.write_index(&index)
    }

    fn entry_for(&self, index: &KeyDatabaseIndex, slot_number: SlotNumber) -> Option<IndexEntry> {
        index.slots.iter().find(|e| e.number == slot_number).cloned()
    }

    /// Writes a single slot's document immediately (used for
    /// non-transactional `save_copy`/`clear`), via the same
    /// write-temp-then-rename discipline as a transaction commit.
    pub fn write_slot_immediate(&self, slot: &KeySlot) -> Result<(), KeyStoreError> {
        let index = self.index()?;
        let entry = self.entry_for(&index, slot.slot_number).ok_or_else(|| {
            KeyStoreError::UnreservedResource(slot.slot_number)
        })?;
        let doc = SlotDocument::from(slot);
        let bytes = serde_json::to_vec_pretty(&doc)
            .map_err(|e| KeyStoreError::ResourceFault(format!("encode slot doc: {e}")))?;
        write_atomically(&self.slot_path(&entry), &bytes)
    }

    /// Commits a transaction's staged writes atomically: writes a combined
    /// shadow record, fsyncs it, then renames each affected slot document
    /// over its live file in ascending `SlotNumber` order, finally
    /// removing the shadow record.
    pub fn commit_transaction(
        &self,
        txn_id: TransactionId,
        slots: &[KeySlot],
    ) -> Result<(), KeyStoreError> {
        let mut entries: Vec<(u64, SlotDocument)> = slots
            .iter()
            .map(|s| (s.slot_number.0, SlotDocument::from(s)))
            .collect();
        entries.sort_by_key(|(n, _)| *n);

        let record = ShadowRecord {
            txn_id: txn_id.0,
            entries: entries.clone(),
        };
        let shadow_path = shadow_dir(&self.root).join(format!("{}.shadow", txn_id.0));
        let encoded = bincode::serialize(&record)
            .map_err(|e| KeyStoreError::ResourceFault(format!("encode shadow record: {e}")))?;
        {
            let mut f = File::create(&shadow_path)
                .map_err(|e| KeyStoreError::ResourceFault(format!("create shadow file: {e}")))?;
            f.write_all(&encoded)
                .map_err(|e| KeyStoreError::ResourceFault(format!("write shadow file: {e}")))?;
            fsync_file(&f)?;
        }

        self.apply_shadow_entries(&entries)?;

        fs::remove_file(&shadow_path).ok();
        Ok(())
    }

    fn apply_shadow_entries(&self, entries: &[(u64, SlotDocument)]) -> Result<(), KeyStoreError> {
        let index = self.index()?;
        let by_number: HashMap<u64, &IndexEntry> =
            index.slots.iter().map(|e| (e.number.0, e)).collect();
        for (number, doc) in entries {
            let entry = by_number.get(number).ok_or_else(|| {
                KeyStoreError::Corrupted(format!("shadow entry for unknown slot {number}"))
            })?;
            let bytes = serde_json::to_vec_pretty(doc)
                .map_err(|e| KeyStoreError::ResourceFault(format!("encode slot doc: {e}")))?;
            write_atomically(&self.slot_path(entry), &bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slot::{ContentProps, ObjectType, PrototypeProps, SlotContent};
    use crypto_daemon_types::ids::{CryptoObjectUid, UserId};

    fn uuid(b: u8) -> Uuid {
        Uuid::from_bytes([b; 16])
    }

    fn sample_slot(n: u64) -> KeySlot {
        KeySlot::new_empty(
            SlotNumber(n),
            uuid(n as u8),
            UserId(1),
            Uuid::NIL,
            PrototypeProps::permissive(ObjectType::PublicKey, 4096),
        )
    }

    #[test]
    fn create_load_and_rewrite_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let (db, slots) = KeyDatabase::open(dir.path()).unwrap();
        assert!(slots.is_empty());

        let slot = sample_slot(1);
        db.create_slot(&slot).unwrap();

        let (_db2, slots) = KeyDatabase::open(dir.path()).unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].slot_number, SlotNumber(1));
        assert!(slots[0].is_empty());
    }

    #[test]
    fn commit_transaction_persists_all_scope_members() {
        let dir = tempfile::tempdir().unwrap();
        let (db, _slots) = KeyDatabase::open(dir.path()).unwrap();
        let mut s1 = sample_slot(1);
        let mut s2 = sample_slot(2);
        db.create_slot(&s1).unwrap();
        db.create_slot(&s2).unwrap();

        s1.content = Some(SlotContent {
            props: ContentProps {
                object_type: ObjectType::PublicKey,
                couid: CryptoObjectUid::new(uuid(9)),
                dependency_couid: None,
                allowed_usage: 0,
                bit_size: 2048,
                algorithm_id: 1,
                exportable: true,
            },
            payload: vec![1, 2, 3],
        });
        s2.content = s1.content.clone();

        db.commit_transaction(TransactionId(42), &[s1, s2]).unwrap();

        let (_db2, slots) = KeyDatabase::open(dir.path()).unwrap();
        assert!(slots.iter().all(|s| !s.is_empty()));
        assert!(!shadow_dir(dir.path()).join("42.shadow").exists());
    }

    #[test]
    fn rejects_document_whose_meta_uuid_disagrees_with_index() {
        let dir = tempfile::tempdir().unwrap();
        let (db, _slots) = KeyDatabase::open(dir.path()).unwrap();
        let slot = sample_slot(1);
        db.create_slot(&slot).unwrap();

        let doc_path = dir.path().join("slots/1.json");
        let mut doc: SlotDocument =
            serde_json::from_slice(&fs::read(&doc_path).unwrap()).unwrap();
        doc.meta.uuid = uuid(99);
        fs::write(&doc_path, serde_json::to_vec(&doc).unwrap()).unwrap();

        let err = KeyDatabase::open(dir.path()).unwrap_err();
        assert!(matches!(err, KeyStoreError::Corrupted(_)));
    }
}
