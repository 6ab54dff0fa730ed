//! The key storage engine: owns all persistent key slots, enforces
//! per-call authorization, hands out [`OwnerContainer`]/[`UserContainer`]
//! handles, and orchestrates atomic multi-slot transactions.
#![allow(clippy::indexing_slicing)] // buffer indices come only from the index maps, never user input

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crypto_daemon_access::{AccessControlMatrix, Operation};
use crypto_daemon_types::error::KeyStoreError;
use crypto_daemon_types::ids::{CryptoObjectUid, ProcessId, SlotNumber, UserId, Uuid};

use crate::container::{ContentSource, OwnerContainer, UserContainer, VolatileContainer};
use crate::db::KeyDatabase;
use crate::index::{CouidIndex, ProviderIndex, SlotNumberIndex, UuidIndex};
use crate::observer::{
    run_guarded, Observer, OnClearCallback, ReportedOperation, ReportedOutcome, SecurityEvent,
    SecurityEventReporter,
};
use crate::slot::{ContentProps, KeySlot, ObjectType, PrototypeProps, SlotContent};
use crate::transaction::{Transaction, TransactionId};

/// The caller's identity for a single engine call, supplied by the
/// transport's peer-credential query and threaded through as this
/// connection's per-call context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext {
    /// The caller's user id.
    pub user: UserId,
    /// The caller's process id.
    pub process: ProcessId,
}

/// Identifies a connection for the purposes of observer registration. The
/// daemon runtime assigns these; the engine never interprets the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

struct SlotRuntime {
    slot: KeySlot,
    owner_tc_exists: Arc<AtomicBool>,
}

struct EngineState {
    buffer: Vec<SlotRuntime>,
    slot_number_index: SlotNumberIndex,
    uuid_index: UuidIndex,
    provider_index: ProviderIndex,
    couid_index: CouidIndex,
    transactions: HashMap<TransactionId, Transaction>,
    locked_scope: std::collections::HashSet<SlotNumber>,
    observers: HashMap<ConnectionId, Arc<dyn Observer>>,
    clear_callbacks: HashMap<Uuid, Arc<dyn OnClearCallback>>,
    reporter: Option<Arc<dyn SecurityEventReporter>>,
}

struct EngineInner {
    state: RwLock<EngineState>,
    access: AccessControlMatrix,
    db: KeyDatabase,
    next_txn_id: AtomicU64,
    idsm_reporting: AtomicBool,
}

/// A shared, `Clone`-able handle to the key storage engine. Cloning shares
/// the same underlying state (an `Arc`); every container holds a clone so
/// it can validate itself against the live engine on every access.
#[derive(Clone)]
pub struct KeyStoreEngine(Arc<EngineInner>);

fn buffer_index_for(state: &EngineState, slot_number: SlotNumber) -> Result<usize, KeyStoreError> {
    state
        .slot_number_index
        .get(slot_number)
        .ok_or(KeyStoreError::UnreservedResource(slot_number))
}

impl KeyStoreEngine {
    /// Opens the on-disk database at `root`, replaying any interrupted
    /// transaction and loading every slot, then builds all three indexes.
    pub fn open(
        root: impl Into<std::path::PathBuf>,
        access: AccessControlMatrix,
        idsm_reporting: bool,
    ) -> Result<Self, KeyStoreError> {
        let (db, slots) = KeyDatabase::open(root)?;

        let mut state = EngineState {
            buffer: Vec::with_capacity(slots.len()),
            slot_number_index: SlotNumberIndex::default(),
            uuid_index: UuidIndex::default(),
            provider_index: ProviderIndex::default(),
            couid_index: CouidIndex::default(),
            transactions: HashMap::new(),
            locked_scope: std::collections::HashSet::new(),
            observers: HashMap::new(),
            clear_callbacks: HashMap::new(),
            reporter: None,
        };

        for slot in slots {
            let buffer_index = state.buffer.len();
            state.slot_number_index.insert(slot.slot_number, buffer_index);
            state
                .uuid_index
                .insert(slot.slot_uid, slot.slot_number, buffer_index)?;
            state
                .provider_index
                .insert(slot.provider_uuid, slot.slot_number, buffer_index);
            if let Some(content) = &slot.content {
                state.couid_index.insert(
                    content.props.couid,
                    content.props.object_type,
                    slot.slot_number,
                    buffer_index,
                );
            }
            state.buffer.push(SlotRuntime {
                slot,
                owner_tc_exists: Arc::new(AtomicBool::new(false)),
            });
        }

        Ok(Self(Arc::new(EngineInner {
            state: RwLock::new(state),
            access,
            db,
            next_txn_id: AtomicU64::new(1),
            idsm_reporting: AtomicBool::new(idsm_reporting),
        })))
    }

    fn check_access(
        &self,
        ctx: CallContext,
        slot_number: SlotNumber,
        required: Operation,
    ) -> Result<(), KeyStoreError> {
        let allowed = self.0.access.get_allowed_operation(ctx.user, slot_number);
        if allowed.permits(required) {
            Ok(())
        } else {
            Err(KeyStoreError::AccessViolation)
        }
    }

    fn report(&self, user: UserId, slot: SlotNumber, operation: ReportedOperation, outcome: ReportedOutcome) {
        if !self.0.idsm_reporting.load(Ordering::Relaxed) {
            return;
        }
        let state = self.0.state.read();
        if let Some(reporter) = &state.reporter {
            let reporter = reporter.clone();
            drop(state);
            run_guarded(|| {
                reporter.report(SecurityEvent {
                    user,
                    slot,
                    operation,
                    outcome,
                })
            });
        }
    }

    /// Registers (or deregisters, passing `None`) the security-event
    /// reporter. There is one reporter for the whole daemon, set once at
    /// startup.
    pub fn set_security_event_reporter(&self, reporter: Option<Arc<dyn SecurityEventReporter>>) {
        self.0.state.write().reporter = reporter;
    }

    /// Registers (or deregisters, passing `None`) the clear-veto callback
    /// for `provider_uuid`.
    pub fn register_clear_callback(
        &self,
        provider_uuid: Uuid,
        callback: Option<Arc<dyn OnClearCallback>>,
    ) {
        let mut state = self.0.state.write();
        match callback {
            Some(cb) => {
                state.clear_callbacks.insert(provider_uuid, cb);
            }
            None => {
                state.clear_callbacks.remove(&provider_uuid);
            }
        }
    }

    /// Registers `observer` for `connection`, returning whichever observer
    /// was previously registered for that connection (at most one per
    /// connection).
    pub fn register_observer(
        &self,
        connection: ConnectionId,
        observer: Option<Arc<dyn Observer>>,
    ) -> Option<Arc<dyn Observer>> {
        let mut state = self.0.state.write();
        match observer {
            Some(obs) => state.observers.insert(connection, obs),
            None => state.observers.remove(&connection),
        }
    }

    /// Looks up a slot by its logical uuid.
    pub fn find_slot_by_uuid(&self, slot_uid: Uuid) -> Option<(SlotNumber, Uuid)> {
        let state = self.0.state.read();
        state.uuid_index.find(slot_uid).map(|(slot_number, idx)| {
            (slot_number, state.buffer[idx].slot.provider_uuid)
        })
    }

    /// Looks up a slot by a textual specifier. The only specifier shape
    /// this implementation recognizes is a hex-encoded `slot_uid` (32 hex
    /// digits); any other shape is `InvalidArgument`.
    pub fn find_slot_by_specifier(&self, name: &str) -> Result<(SlotNumber, Uuid), KeyStoreError> {
        if name.len() != 32 || !name.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(KeyStoreError::InvalidArgument(format!(
                "slot specifier {name:?} is not a 32-hex-digit slot uuid"
            )));
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&name[i * 2..i * 2 + 2], 16)
                .map_err(|e| KeyStoreError::InvalidArgument(e.to_string()))?;
        }
        self.find_slot_by_uuid(Uuid::from_bytes(bytes))
            .ok_or_else(|| KeyStoreError::InvalidArgument(format!("no slot with uuid {name}")))
    }

    /// Iterator-style lookup over slots whose content matches
    /// `(couid, object_type)`, optionally restricted to `provider_filter`
    /// (pass `Uuid::NIL` for any provider). Pass the previously returned
    /// slot number to resume; `SlotNumber::INVALID` starts from the
    /// beginning. Returns `SlotNumber::INVALID` once exhausted.
    pub fn find_object(
        &self,
        couid: CryptoObjectUid,
        object_type: ObjectType,
        provider_filter: Uuid,
        previous_found: SlotNumber,
    ) -> SlotNumber {
        let state = self.0.state.read();
        let mut cursor = previous_found;
        loop {
            let candidate = state.couid_index.find(couid, object_type, cursor);
            if candidate.is_invalid() {
                return SlotNumber::INVALID;
            }
            if provider_filter.is_nil() {
                return candidate;
            }
            let idx = match state.slot_number_index.get(candidate) {
                Some(i) => i,
                None => return SlotNumber::INVALID,
            };
            if state.buffer[idx].slot.provider_uuid == provider_filter {
                return candidate;
            }
            cursor = candidate;
        }
    }

    /// Iterates slots whose content depends on `target_slot`'s current
    /// content COUID. Resumes after `previous_found`.
    pub fn find_referring_slot(
        &self,
        target_slot: SlotNumber,
        previous_found: SlotNumber,
    ) -> Result<SlotNumber, KeyStoreError> {
        let state = self.0.state.read();
        let idx = buffer_index_for(&state, target_slot)?;
        let target_couid = state.buffer[idx]
            .slot
            .content
            .as_ref()
            .map(|c| c.props.couid)
            .ok_or(KeyStoreError::EmptyContainer)?;

        let mut seen_previous = previous_found.is_invalid();
        for slot_number in state.slot_number_index.slot_numbers() {
            if !seen_previous {
                if slot_number == previous_found {
                    seen_previous = true;
                }
                continue;
            }
            let idx = buffer_index_for(&state, slot_number)?;
            if let Some(content) = &state.buffer[idx].slot.content {
                if content.props.dependency_couid == Some(target_couid) {
                    return Ok(slot_number);
                }
            }
        }
        Ok(SlotNumber::INVALID)
    }

    /// Whether `slot` currently holds content.
    pub fn is_empty(&self, slot: SlotNumber) -> Result<bool, KeyStoreError> {
        let state = self.0.state.read();
        let idx = buffer_index_for(&state, slot)?;
        Ok(state.buffer[idx].slot.is_empty())
    }

    /// Reads a slot's live (pre-transaction) content. Internal helper used
    /// by [`UserContainer::read`] / [`OwnerContainer::read`].
    pub(crate) fn read_live_content(
        &self,
        slot: SlotNumber,
    ) -> Result<(ContentProps, Vec<u8>), KeyStoreError> {
        let state = self.0.state.read();
        let idx = buffer_index_for(&state, slot)?;
        state
            .buffer[idx]
            .slot
            .content
            .as_ref()
            .map(|c| (c.props.clone(), c.payload.clone()))
            .ok_or(KeyStoreError::EmptyContainer)
    }

    /// Opens a read-only container over `slot`. Fails if the slot is
    /// empty. `subscribe` registers durable interest in future updates
    /// (delivered via the connection's registered [`Observer`]).
    pub fn open_as_user(
        &self,
        ctx: CallContext,
        slot: SlotNumber,
        subscribe: bool,
    ) -> Result<UserContainer, KeyStoreError> {
        self.check_access(ctx, slot, Operation::Read)?;
        let result = {
            let state = self.0.state.read();
            let idx = buffer_index_for(&state, slot)?;
            if state.buffer[idx].slot.is_empty() {
                Err(KeyStoreError::EmptyContainer)
            } else {
                Ok(())
            }
        };
        self.report(
            ctx.user,
            slot,
            ReportedOperation::OpenAsUser,
            match &result {
                Ok(()) => ReportedOutcome::Allowed,
                Err(e) => ReportedOutcome::Denied(crypto_daemon_types::error::ErrorCode::code(e)),
            },
        );
        result?;
        Ok(UserContainer {
            engine: self.clone(),
            slot_number: slot,
            subscribed: subscribe,
        })
    }

    /// Opens an exclusive read/write container over `slot`. Fails with
    /// [`KeyStoreError::BusyResource`] if another `OwnerContainer` is
    /// already open for this slot.
    pub fn open_as_owner(
        &self,
        ctx: CallContext,
        slot: SlotNumber,
    ) -> Result<OwnerContainer, KeyStoreError> {
        self.check_access(ctx, slot, Operation::ReadWrite)?;
        let flag = {
            let state = self.0.state.read();
            let idx = buffer_index_for(&state, slot)?;
            state.buffer[idx].owner_tc_exists.clone()
        };
        let result = if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            Ok(())
        } else {
            Err(KeyStoreError::BusyResource)
        };
        self.report(
            ctx.user,
            slot,
            ReportedOperation::OpenAsOwner,
            match &result {
                Ok(()) => ReportedOutcome::Allowed,
                Err(e) => ReportedOutcome::Denied(crypto_daemon_types::error::ErrorCode::code(e)),
            },
        );
        result?;
        Ok(OwnerContainer {
            engine: self.clone(),
            slot_number: slot,
        })
    }

    pub(crate) fn release_owner(&self, slot: SlotNumber) {
        let state = self.0.state.read();
        if let Some(idx) = state.slot_number_index.get(slot) {
            state.buffer[idx].owner_tc_exists.store(false, Ordering::Release);
        }
    }

    fn bump_couid(&self, prev: Option<CryptoObjectUid>, generator: Uuid, supplied_version: u64) -> u64 {
        match prev {
            Some(p) if p.generator == generator => {
                let now_ns = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_nanos() as u64)
                    .unwrap_or(0);
                now_ns.max(p.version.wrapping_add(1))
            }
            _ => supplied_version,
        }
    }

    /// Persists `source`'s content into `target_slot`, outside of any
    /// transaction scope — or, if `target_slot` is in an active
    /// transaction's scope, stages the write instead of touching live
    /// state.
    pub fn save_copy(
        &self,
        ctx: CallContext,
        target_slot: SlotNumber,
        source: &dyn ContentSource,
    ) -> Result<(), KeyStoreError> {
        self.check_access(ctx, target_slot, Operation::Write)?;
        let (mut props, payload) = source.content()?;

        let mut state = self.0.state.write();
        let idx = buffer_index_for(&state, target_slot)?;

        {
            let target = &state.buffer[idx].slot;
            if target.owner != ctx.user {
                return Err(KeyStoreError::AccessViolation);
            }
            if props.object_type != target.prototype.object_type {
                return Err(KeyStoreError::ContentRestrictions(format!(
                    "slot accepts {:?}, got {:?}",
                    target.prototype.object_type, props.object_type
                )));
            }
            if let Some(allowed_alg) = target.prototype.allowed_algorithm_id {
                if allowed_alg != props.algorithm_id {
                    return Err(KeyStoreError::ContentRestrictions(format!(
                        "slot only accepts algorithm {allowed_alg}, got {}",
                        props.algorithm_id
                    )));
                }
            }
            if payload.len() as u64 > target.prototype.capacity as u64 {
                return Err(KeyStoreError::ContentRestrictions(format!(
                    "payload of {} bytes exceeds slot capacity of {} bytes",
                    payload.len(),
                    target.prototype.capacity
                )));
            }
            if let Some((dep_uuid, dep_type)) = target.prototype.dependency {
                let resolved = state
                    .uuid_index
                    .find(dep_uuid)
                    .map(|(n, i)| (n, &state.buffer[i].slot));
                match resolved {
                    Some((_, dep_slot)) if dep_slot.prototype.object_type == dep_type => {}
                    _ => return Err(KeyStoreError::BadObjectReference),
                }
            }
        }

        if state
            .couid_index
            .has_duplicate(props.couid, props.object_type, target_slot)
        {
            return Err(KeyStoreError::ContentDuplication);
        }

        let prev_couid = state.buffer[idx].slot.content.as_ref().map(|c| c.props.couid);
        props.version_bumped_into(self.bump_couid(prev_couid, props.couid.generator, props.couid.version));

        let new_content = SlotContent { props, payload };

        if let Some(txn) = state.transactions.values_mut().find(|t| t.contains(target_slot)) {
            txn.stage(target_slot, Some(new_content));
            drop(state);
            self.report(ctx.user, target_slot, ReportedOperation::SaveCopy, ReportedOutcome::Allowed);
            return Ok(());
        }

        let old_couid = state.buffer[idx].slot.content.as_ref().map(|c| (c.props.couid, c.props.object_type));
        state.buffer[idx].slot.content = Some(new_content.clone());
        state
            .couid_index
            .insert(new_content.props.couid, new_content.props.object_type, target_slot, idx);
        if let Some((old_c, old_t)) = old_couid {
            if old_c != new_content.props.couid {
                state.couid_index.remove(old_c, old_t, target_slot);
            }
        }
        let slot_snapshot = state.buffer[idx].slot.clone();
        let observers: Vec<_> = state.observers.values().cloned().collect();
        drop(state);

        self.0.db.write_slot_immediate(&slot_snapshot)?;
        self.report(ctx.user, target_slot, ReportedOperation::SaveCopy, ReportedOutcome::Allowed);
        for observer in observers {
            run_guarded(|| observer.on_slot_updated(target_slot));
        }
        Ok(())
    }

    /// Lower-level save path used by a provider's own save flow: equivalent
    /// to `save_copy` but takes already-assembled content directly instead
    /// of a [`ContentSource`].
    pub fn update_key_slot(
        &self,
        ctx: CallContext,
        slot: SlotNumber,
        props: ContentProps,
        payload: Vec<u8>,
    ) -> Result<(), KeyStoreError> {
        let source = VolatileContainer::new(props, payload);
        self.save_copy(ctx, slot, &source)
    }

    /// Securely erases a slot's content. A registered
    /// [`OnClearCallback`] for the owning provider may veto the clear.
    pub fn clear(&self, ctx: CallContext, slot: SlotNumber) -> Result<(), KeyStoreError> {
        self.check_access(ctx, slot, Operation::Write)?;
        let mut state = self.0.state.write();
        let idx = buffer_index_for(&state, slot)?;

        if state.buffer[idx].slot.owner != ctx.user {
            return Err(KeyStoreError::AccessViolation);
        }
        if state.buffer[idx].owner_tc_exists.load(Ordering::Acquire) {
            return Err(KeyStoreError::BusyResource);
        }

        let provider_uuid = state.buffer[idx].slot.provider_uuid;
        if let Some(callback) = state.clear_callbacks.get(&provider_uuid).cloned() {
            drop(state);
            let allowed = run_guarded(|| callback.on_clear(slot, provider_uuid));
            if !allowed {
                self.report(ctx.user, slot, ReportedOperation::Clear, ReportedOutcome::Denied("RUNTIME_FAULT"));
                return Err(KeyStoreError::RuntimeFault("clear vetoed by provider callback".into()));
            }
            state = self.0.state.write();
        }

        if let Some(txn) = state.transactions.values_mut().find(|t| t.contains(slot)) {
            txn.stage(slot, None);
            drop(state);
            self.report(ctx.user, slot, ReportedOperation::Clear, ReportedOutcome::Allowed);
            return Ok(());
        }

        let old_couid = state.buffer[idx]
            .slot
            .content
            .as_ref()
            .map(|c| (c.props.couid, c.props.object_type));
        state.buffer[idx].slot.content = None;
        if let Some((c, t)) = old_couid {
            state.couid_index.remove(c, t, slot);
        }
        let slot_snapshot = state.buffer[idx].slot.clone();
        let observers: Vec<_> = state.observers.values().cloned().collect();
        drop(state);

        self.0.db.write_slot_immediate(&slot_snapshot)?;
        self.report(ctx.user, slot, ReportedOperation::Clear, ReportedOutcome::Allowed);
        for observer in observers {
            run_guarded(|| observer.on_slot_updated(slot));
        }
        Ok(())
    }

    /// Returns a slot's fixed prototype restrictions.
    pub fn get_prototyped_props(&self, slot: SlotNumber) -> Result<PrototypeProps, KeyStoreError> {
        let state = self.0.state.read();
        let idx = buffer_index_for(&state, slot)?;
        Ok(state.buffer[idx].slot.prototype.clone())
    }

    /// Returns a slot's content metadata. `exportability` is masked to
    /// `false` for callers other than the slot's owner.
    pub fn get_content_props(
        &self,
        ctx: CallContext,
        slot: SlotNumber,
    ) -> Result<ContentProps, KeyStoreError> {
        self.check_access(ctx, slot, Operation::Read)?;
        let state = self.0.state.read();
        let idx = buffer_index_for(&state, slot)?;
        let runtime = &state.buffer[idx];
        let mut props = runtime
            .slot
            .content
            .as_ref()
            .map(|c| c.props.clone())
            .ok_or(KeyStoreError::EmptyContainer)?;
        if runtime.slot.owner != ctx.user {
            props.exportable = false;
        }
        Ok(props)
    }

    /// Begins a transaction over `scope`. `scope` must be non-empty,
    /// contain no duplicates, every member owned by `ctx.user`, and none
    /// already involved in another pending transaction.
    pub fn begin_transaction(
        &self,
        ctx: CallContext,
        scope: Vec<SlotNumber>,
    ) -> Result<TransactionId, KeyStoreError> {
        if scope.is_empty() {
            return Err(KeyStoreError::InvalidArgument("transaction scope must be non-empty".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for s in &scope {
            if !seen.insert(*s) {
                return Err(KeyStoreError::InvalidArgument(format!(
                    "duplicate slot {s:?} in transaction scope"
                )));
            }
        }

        let mut state = self.0.state.write();
        for s in &scope {
            let idx = buffer_index_for(&state, *s)?;
            if state.buffer[idx].slot.owner != ctx.user {
                return Err(KeyStoreError::AccessViolation);
            }
            if state.locked_scope.contains(s) {
                return Err(KeyStoreError::BusyResource);
            }
        }

        for s in &scope {
            state.locked_scope.insert(*s);
        }
        let id = TransactionId(self.0.next_txn_id.fetch_add(1, Ordering::Relaxed));
        state.transactions.insert(id, Transaction::new(id, ctx.user, scope));
        Ok(id)
    }

    /// Atomically publishes a transaction's staged writes: all scope
    /// members show their staged content, or (on an I/O failure before any
    /// rename) none do.
    pub fn commit_transaction(&self, id: TransactionId) -> Result<(), KeyStoreError> {
        let mut state = self.0.state.write();
        let txn = state
            .transactions
            .remove(&id)
            .ok_or_else(|| KeyStoreError::InvalidArgument(format!("no such transaction {id:?}")))?;

        let mut updated_slots = Vec::new();
        let mut couid_updates: Vec<(usize, Option<(CryptoObjectUid, ObjectType)>, Option<(CryptoObjectUid, ObjectType)>)> =
            Vec::new();
        for (slot_number, write) in txn.staged_writes() {
            let idx = buffer_index_for(&state, slot_number)?;
            let old_couid = state.buffer[idx]
                .slot
                .content
                .as_ref()
                .map(|c| (c.props.couid, c.props.object_type));
            state.buffer[idx].slot.content = write.clone();
            let new_couid = write.as_ref().map(|c| (c.props.couid, c.props.object_type));
            couid_updates.push((idx, old_couid, new_couid));
            updated_slots.push(state.buffer[idx].slot.clone());
        }

        for s in txn.scope() {
            state.locked_scope.remove(s);
        }

        for (idx, old, new) in couid_updates {
            if let Some((c, t)) = old {
                if Some((c, t)) != new {
                    state.couid_index.remove(c, t, state.buffer[idx].slot.slot_number);
                }
            }
            if let Some((c, t)) = new {
                state
                    .couid_index
                    .insert(c, t, state.buffer[idx].slot.slot_number, idx);
            }
        }

        let observers: Vec<_> = state.observers.values().cloned().collect();
        drop(state);

        self.0.db.commit_transaction(id, &updated_slots)?;
        crypto_daemon_telemetry::keystore_metrics().inc_transactions_committed();
        for slot in &updated_slots {
            for observer in &observers {
                run_guarded(|| observer.on_slot_updated(slot.slot_number));
            }
        }
        Ok(())
    }

    /// Discards a transaction's staged writes; live state is left
    /// untouched.
    pub fn rollback_transaction(&self, id: TransactionId) -> Result<(), KeyStoreError> {
        let mut state = self.0.state.write();
        let txn = state
            .transactions
            .remove(&id)
            .ok_or_else(|| KeyStoreError::InvalidArgument(format!("no such transaction {id:?}")))?;
        for s in txn.scope() {
            state.locked_scope.remove(s);
        }
        drop(state);
        crypto_daemon_telemetry::keystore_metrics().inc_transactions_rolled_back();
        Ok(())
    }

    /// Clears a referrer slot's dependency reference. Caller must own both
    /// slots.
    pub fn reset_reference(
        &self,
        ctx: CallContext,
        referrer_slot: SlotNumber,
        referenced_slot: SlotNumber,
    ) -> Result<(), KeyStoreError> {
        let mut state = self.0.state.write();
        let referrer_idx = buffer_index_for(&state, referrer_slot)?;
        let referenced_idx = buffer_index_for(&state, referenced_slot)?;

        if state.buffer[referrer_idx].slot.owner != ctx.user
            || state.buffer[referenced_idx].slot.owner != ctx.user
        {
            return Err(KeyStoreError::AccessViolation);
        }

        let referenced_uid = state.buffer[referenced_idx].slot.slot_uid;
        let dep_matches = state.buffer[referrer_idx]
            .slot
            .prototype
            .dependency
            .map(|(uuid, _)| uuid == referenced_uid)
            .unwrap_or(false);
        if !dep_matches {
            return Err(KeyStoreError::BadObjectReference);
        }

        state.buffer[referrer_idx].slot.prototype.dependency = None;
        if let Some(content) = &mut state.buffer[referrer_idx].slot.content {
            content.props.dependency_couid = None;
        }
        let slot_snapshot = state.buffer[referrer_idx].slot.clone();
        drop(state);
        self.0.db.write_slot_immediate(&slot_snapshot)
    }

    /// Answers whether `provider_uuid` is trusted to load `slot`'s
    /// concrete content: the slot must be non-empty, and either carry no
    /// provider restriction (`Uuid::NIL`) or name `provider_uuid` exactly.
    pub fn can_load_to_crypto_provider(
        &self,
        slot: SlotNumber,
        provider_uuid: Uuid,
    ) -> Result<bool, KeyStoreError> {
        let state = self.0.state.read();
        let idx = buffer_index_for(&state, slot)?;
        let runtime = &state.buffer[idx];
        if runtime.slot.is_empty() {
            return Err(KeyStoreError::EmptyContainer);
        }
        Ok(runtime.slot.provider_uuid.is_nil() || runtime.slot.provider_uuid == provider_uuid)
    }

    /// Creates a brand-new empty slot and persists it. Not part of the
    /// client-facing RPC operation surface, but required for the JSON
    /// index/config to ever gain a slot in the first place; the daemon's
    /// provisioning path calls this directly.
    pub fn create_slot(
        &self,
        slot_number: SlotNumber,
        slot_uid: Uuid,
        owner: UserId,
        provider_uuid: Uuid,
        prototype: PrototypeProps,
    ) -> Result<(), KeyStoreError> {
        let slot = KeySlot::new_empty(slot_number, slot_uid, owner, provider_uuid, prototype);
        self.0.db.create_slot(&slot)?;
        let mut state = self.0.state.write();
        let buffer_index = state.buffer.len();
        state.slot_number_index.insert(slot_number, buffer_index);
        state.uuid_index.insert(slot_uid, slot_number, buffer_index)?;
        state.provider_index.insert(provider_uuid, slot_number, buffer_index);
        state.buffer.push(SlotRuntime {
            slot,
            owner_tc_exists: Arc::new(AtomicBool::new(false)),
        });
        crypto_daemon_telemetry::keystore_metrics().set_slots_occupied(
            state.buffer.iter().filter(|r| !r.slot.is_empty()).count() as f64,
        );
        Ok(())
    }
}

trait ContentPropsExt {
    fn version_bumped_into(&mut self, version: u64);
}

impl ContentPropsExt for ContentProps {
    fn version_bumped_into(&mut self, version: u64) {
        self.couid.version = version;
    }
}
