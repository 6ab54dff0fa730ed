//! The unit of persistent key storage: [`KeySlot`] and its prototype/content
//! metadata, plus the on-disk document shape they serialize to/from.

use serde::{Deserialize, Serialize};

use crypto_daemon_types::ids::{CryptoObjectUid, SlotNumber, UserId, Uuid};

/// The concrete kind of crypto object a slot may hold. Concrete algorithms
/// are out of scope (the crypto provider is opaque); this enum only
/// distinguishes the shapes the key-storage engine must reason about
/// (exportability, dependency resolution, duplicate detection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    /// An asymmetric public key.
    PublicKey,
    /// An asymmetric private key.
    PrivateKey,
    /// A symmetric key.
    SymmetricKey,
    /// An X.509 certificate.
    Certificate,
    /// Any other provider-defined object shape.
    Opaque,
}

/// How a slot's version-control policy treats superseded content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum VersionControlPolicy {
    /// No history is retained; each `save_copy` simply replaces the content.
    #[default]
    None,
    /// The previous content's COUID is retained in `prev_content` for
    /// COUID-versioning continuity checks on the next write.
    TrackPrevious,
}

/// Fixed-at-creation metadata describing what a slot is allowed to hold.
/// Present for every slot, empty or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrototypeProps {
    /// The object type this slot accepts.
    pub object_type: ObjectType,
    /// Maximum payload size in bytes the slot will accept.
    pub capacity: u32,
    /// The only algorithm id `save_copy` will accept, or `None` for any.
    pub allowed_algorithm_id: Option<u32>,
    /// Whether content in this slot may be exported (read by non-owners
    /// with `exportable` surfaced truthfully; see [`ContentProps`]).
    pub exportable: bool,
    /// A slot this slot's content depends on, identified by the
    /// dependency's `slot_uid` and expected `ObjectType`.
    pub dependency: Option<(Uuid, ObjectType)>,
    /// The version-control policy applied on write.
    pub version_control: VersionControlPolicy,
    /// The previous content's COUID + type, tracked only when
    /// `version_control` is [`VersionControlPolicy::TrackPrevious`].
    pub prev_content: Option<(CryptoObjectUid, ObjectType)>,
}

impl PrototypeProps {
    /// A permissive prototype: any object type, no algorithm restriction,
    /// exportable, no dependency. Convenient for tests and for slots
    /// created without an explicit prototype in the JSON index.
    pub fn permissive(object_type: ObjectType, capacity: u32) -> Self {
        Self {
            object_type,
            capacity,
            allowed_algorithm_id: None,
            exportable: true,
            dependency: None,
            version_control: VersionControlPolicy::None,
            prev_content: None,
        }
    }
}

/// Metadata describing a slot's current content. Present iff the slot is
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentProps {
    /// The concrete type of the stored object.
    pub object_type: ObjectType,
    /// The crypto-object unique identifier of the stored object.
    pub couid: CryptoObjectUid,
    /// The COUID of a slot this content depends on, if any.
    pub dependency_couid: Option<CryptoObjectUid>,
    /// Bitmask of permitted usages (encrypt/decrypt/sign/verify/derive —
    /// concrete bit meanings are a crypto-provider concern).
    pub allowed_usage: u32,
    /// Key/object size in bits.
    pub bit_size: u32,
    /// The algorithm id under which this content was generated.
    pub algorithm_id: u32,
    /// Whether this content may be exported. Masked to `false` by
    /// [`crate::engine::KeyStoreEngine::get_content_props`] for callers
    /// other than the slot's owner.
    pub exportable: bool,
}

/// The unit of persistent key storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySlot {
    /// Identity: position in the slot table.
    pub slot_number: SlotNumber,
    /// Logical identity: globally unique, stable across slot-table
    /// reorganizations (there are none in this implementation, but the
    /// field is authoritative for lookups regardless).
    pub slot_uid: Uuid,
    /// Fixed at creation; only the owner may mutate this slot.
    pub owner: UserId,
    /// The crypto provider allowed to load this slot. `Uuid::NIL` means
    /// any provider may load it.
    pub provider_uuid: Uuid,
    /// Type/capacity/algorithm/exportability/dependency/version-control
    /// constraints, fixed at slot creation.
    pub prototype: PrototypeProps,
    /// Content metadata plus opaque payload, present iff the slot is
    /// non-empty.
    pub content: Option<SlotContent>,
}

/// A slot's content: metadata plus the opaque DER-encoded payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotContent {
    /// Content metadata.
    pub props: ContentProps,
    /// The opaque payload (an ASN.1/DER-encoded serialization of a crypto
    /// object, per spec; this crate never interprets it).
    pub payload: Vec<u8>,
}

impl KeySlot {
    /// Creates an empty slot at the given number/uid/owner/provider, with
    /// the given prototype restrictions.
    pub fn new_empty(
        slot_number: SlotNumber,
        slot_uid: Uuid,
        owner: UserId,
        provider_uuid: Uuid,
        prototype: PrototypeProps,
    ) -> Self {
        Self {
            slot_number,
            slot_uid,
            owner,
            provider_uuid,
            prototype,
            content: None,
        }
    }

    /// Whether the slot currently holds content.
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
    }
}

/// The three-section on-disk document for one slot: `meta`/`content`/
/// `access`. `access` is not separately
/// modeled here: per-slot access control lives entirely in
/// `crypto-daemon-access`'s config file, not duplicated into each slot
/// document, so this struct's `access` field is reserved for forward
/// compatibility with a future per-slot override and is always `null`
/// today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDocument {
    /// Prototype + identity metadata.
    pub meta: SlotDocumentMeta,
    /// Content metadata + payload, absent for an empty slot.
    pub content: Option<SlotDocumentContent>,
    /// Reserved for a future per-slot access override; always `null`.
    #[serde(default)]
    pub access: Option<serde_json::Value>,
}

/// The `meta` section of a slot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDocumentMeta {
    /// The slot's logical uuid; must match the uuid the JSON index names
    /// for this slot number, or startup fails.
    pub uuid: Uuid,
    /// The object type this slot accepts.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// The crypto provider allowed to load this slot.
    pub provider: Uuid,
    /// A dependency slot, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<SlotDependencyMeta>,
    /// Type/algorithm/exportability prototype restrictions.
    #[serde(rename = "contentRestriction")]
    pub content_restriction: ContentRestrictionMeta,
    /// Maximum payload size in bytes.
    pub capacity: u32,
    /// Version-control policy plus retained previous-content COUID.
    #[serde(rename = "versionControl")]
    pub version_control: VersionControlMeta,
    /// The slot's owner.
    pub owner: OwnerMeta,
}

/// `meta.dependency`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDependencyMeta {
    /// The depended-upon slot's logical uuid.
    pub uuid: Uuid,
    /// The expected object type of the dependency.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

/// `meta.contentRestriction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRestrictionMeta {
    /// Whether exported reads are permitted.
    #[serde(rename = "isExportable")]
    pub is_exportable: bool,
    /// The only algorithm id accepted, or `None` for any.
    #[serde(rename = "algId", skip_serializing_if = "Option::is_none")]
    pub alg_id: Option<u32>,
    /// The only object type accepted.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

/// `meta.versionControl`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionControlMeta {
    /// The policy in effect.
    #[serde(rename = "type")]
    pub policy: VersionControlPolicy,
    /// The previously-written content's COUID + type, if tracked.
    #[serde(rename = "prevContent", skip_serializing_if = "Option::is_none")]
    pub prev_content: Option<PrevContentMeta>,
}

/// `meta.versionControl.prevContent`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrevContentMeta {
    /// The previous content's COUID.
    pub couid: CryptoObjectUid,
    /// The previous content's object type.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

/// `meta.owner`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerMeta {
    /// The owning user's uuid-shaped identifier. The wire `UserId` is a
    /// plain 32-bit id; the on-disk document nonetheless calls this field
    /// `uuid` to match the document's own naming convention.
    pub uuid: UserId,
}

/// The `content` section of a slot document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDocumentContent {
    /// Content metadata.
    pub meta: SlotDocumentContentMeta,
    /// The DER-encoded payload.
    pub content: Vec<u8>,
}

/// `content.meta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotDocumentContentMeta {
    /// The content's COUID.
    pub couid: CryptoObjectUid,
    /// The COUID this content depends on, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency: Option<DependencyCouidMeta>,
    /// Bitmask of permitted usages.
    #[serde(rename = "allowedUsage")]
    pub allowed_usage: u32,
    /// The content's object type.
    #[serde(rename = "type")]
    pub object_type: ObjectType,
    /// Key/object size in bits.
    #[serde(rename = "bitSize")]
    pub bit_size: u32,
    /// The algorithm id under which this content was generated.
    #[serde(rename = "algId")]
    pub algorithm_id: u32,
}

/// `content.meta.dependency`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyCouidMeta {
    /// The depended-upon content's COUID.
    pub couid: CryptoObjectUid,
}

impl From<&KeySlot> for SlotDocument {
    fn from(slot: &KeySlot) -> Self {
        SlotDocument {
            meta: SlotDocumentMeta {
                uuid: slot.slot_uid,
                object_type: slot.prototype.object_type,
                provider: slot.provider_uuid,
                dependency: slot.prototype.dependency.map(|(uuid, object_type)| {
                    SlotDependencyMeta { uuid, object_type }
                }),
                content_restriction: ContentRestrictionMeta {
                    is_exportable: slot.prototype.exportable,
                    alg_id: slot.prototype.allowed_algorithm_id,
                    object_type: slot.prototype.object_type,
                },
                capacity: slot.prototype.capacity,
                version_control: VersionControlMeta {
                    policy: slot.prototype.version_control,
                    prev_content: slot.prototype.prev_content.map(|(couid, object_type)| {
                        PrevContentMeta { couid, object_type }
                    }),
                },
                owner: OwnerMeta { uuid: slot.owner },
            },
            content: slot.content.as_ref().map(|c| SlotDocumentContent {
                meta: SlotDocumentContentMeta {
                    couid: c.props.couid,
                    dependency: c.props.dependency_couid.map(|couid| DependencyCouidMeta { couid }),
                    allowed_usage: c.props.allowed_usage,
                    object_type: c.props.object_type,
                    bit_size: c.props.bit_size,
                    algorithm_id: c.props.algorithm_id,
                },
                content: c.payload.clone(),
            }),
            access: None,
        }
    }
}

impl KeySlot {
    /// Reconstructs a [`KeySlot`] from its on-disk document, at the given
    /// slot number.
    pub fn from_document(slot_number: SlotNumber, doc: SlotDocument) -> Self {
        let prototype = PrototypeProps {
            object_type: doc.meta.object_type,
            capacity: doc.meta.capacity,
            allowed_algorithm_id: doc.meta.content_restriction.alg_id,
            exportable: doc.meta.content_restriction.is_exportable,
            dependency: doc.meta.dependency.map(|d| (d.uuid, d.object_type)),
            version_control: doc.meta.version_control.policy,
            prev_content: doc
                .meta
                .version_control
                .prev_content
                .map(|p| (p.couid, p.object_type)),
        };
        let content = doc.content.map(|c| SlotContent {
            props: ContentProps {
                object_type: c.meta.object_type,
                couid: c.meta.couid,
                dependency_couid: c.meta.dependency.map(|d| d.couid),
                allowed_usage: c.meta.allowed_usage,
                bit_size: c.meta.bit_size,
                algorithm_id: c.meta.algorithm_id,
                exportable: prototype.exportable,
            },
            payload: c.content,
        });
        Self {
            slot_number,
            slot_uid: doc.meta.uuid,
            owner: doc.meta.owner.uuid,
            provider_uuid: doc.meta.provider,
            prototype,
            content,
        }
    }
}
