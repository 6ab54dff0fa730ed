// Path: crates/types/src/error.rs

//! The error taxonomy for the crypto service daemon.
//!
//! Each component defines its own `thiserror`-derived enum (`DerError`,
//! `SchemaError`, `KeyStoreError`, `RpcError`). Every variant maps onto
//! exactly one member of [`SecurityErrc`], the wire-level taxonomy
//! serialized as a `u64` in every RPC response (see the wire framing in
//! `crypto-daemon-rpc`). `RuntimeFault` is the catch-all and must only be
//! constructed when no more specific variant applies.

use thiserror::Error;

/// Assigns a stable, machine-readable string code to an error, for use in
/// structured log events.
pub trait ErrorCode {
    /// Returns the unique, stable string identifier for this error variant.
    fn code(&self) -> &'static str;
}

/// The full wire error taxonomy, serialized as a `u64` in every RPC
/// response's `Result<T, E>` envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u64)]
pub enum SecurityErrc {
    /// Unspecified internal failure; only used when no more specific kind applies.
    RuntimeFault = 0,
    /// The `(basic_task, detail_task)` pair has no registered dispatcher.
    RpcUnknownTask = 1,
    /// A pre-sized response buffer was too small for the result.
    RpcInsufficientCapacity = 2,
    /// The payload could not be decoded per the wire format.
    UnsupportedFormat = 3,
    /// A DER length or tag number exceeds the representable range.
    UnsupportedNumeric = 4,
    /// A DER tag did not match the expected schema context.
    UnknownTag = 5,
    /// A recognized but unsupported DER tag (e.g. REAL in a minimal build).
    UnsupportedTag = 6,
    /// DER content violates the encoding rules (indefinite length, bad SET OF order, ...).
    InvalidContent = 7,
    /// The buffer ended before a complete TLV could be read.
    IncompleteInput = 8,
    /// A decoded value failed a schema well-formedness check.
    InvalidInput = 9,
    /// A caller-supplied argument was invalid (bad slot specifier, empty scope, ...).
    InvalidArgument = 10,
    /// An operation was requested against a slot in the wrong lifecycle state.
    InvalidUsageOrder = 11,
    /// The referenced slot number does not exist.
    UnreservedResource = 12,
    /// The referenced slot exists but has no content.
    EmptyContainer = 13,
    /// The resource is exclusively held by another caller.
    BusyResource = 14,
    /// The COUID already exists for this crypto provider.
    ContentDuplication = 15,
    /// The content violates the slot's prototype restrictions.
    ContentRestrictions = 16,
    /// A slot's `dependency_uid` does not resolve to an existing slot.
    BadObjectReference = 17,
    /// The caller lacks the required `Operation` permission on the slot.
    AccessViolation = 18,
    /// The object's type is incompatible with the requested crypto provider.
    IncompatibleObject = 19,
    /// The feature is not compiled in or configured (e.g. X.509).
    Unsupported = 20,
    /// The referenced crypto provider `Uuid` is not registered.
    UnknownIdentifier = 21,
    /// A semantic validity constraint failed (size/range bound).
    ConstraintCheckFail = 22,
    /// A storage I/O error occurred; writes are atomic end-to-end.
    ResourceFault = 23,
    /// An internal invariant was violated; the caller should treat this as fatal.
    LogicFault = 24,
    /// A requested capacity exceeds the configured limit.
    InsufficientCapacity = 25,
    /// A required system resource (fd, memory) could not be obtained.
    InsufficientResource = 26,
}

impl SecurityErrc {
    /// Recovers a `SecurityErrc` from its wire-encoded numeric value.
    pub fn from_u64(v: u64) -> Option<Self> {
        use SecurityErrc::*;
        let all = [
            RuntimeFault,
            RpcUnknownTask,
            RpcInsufficientCapacity,
            UnsupportedFormat,
            UnsupportedNumeric,
            UnknownTag,
            UnsupportedTag,
            InvalidContent,
            IncompleteInput,
            InvalidInput,
            InvalidArgument,
            InvalidUsageOrder,
            UnreservedResource,
            EmptyContainer,
            BusyResource,
            ContentDuplication,
            ContentRestrictions,
            BadObjectReference,
            AccessViolation,
            IncompatibleObject,
            Unsupported,
            UnknownIdentifier,
            ConstraintCheckFail,
            ResourceFault,
            LogicFault,
            InsufficientCapacity,
            InsufficientResource,
        ];
        all.into_iter().find(|e| *e as u64 == v)
    }
}

impl ErrorCode for SecurityErrc {
    fn code(&self) -> &'static str {
        match self {
            Self::RuntimeFault => "RUNTIME_FAULT",
            Self::RpcUnknownTask => "RPC_UNKNOWN_TASK",
            Self::RpcInsufficientCapacity => "RPC_INSUFFICIENT_CAPACITY",
            Self::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            Self::UnsupportedNumeric => "UNSUPPORTED_NUMERIC",
            Self::UnknownTag => "UNKNOWN_TAG",
            Self::UnsupportedTag => "UNSUPPORTED_TAG",
            Self::InvalidContent => "INVALID_CONTENT",
            Self::IncompleteInput => "INCOMPLETE_INPUT",
            Self::InvalidInput => "INVALID_INPUT",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidUsageOrder => "INVALID_USAGE_ORDER",
            Self::UnreservedResource => "UNRESERVED_RESOURCE",
            Self::EmptyContainer => "EMPTY_CONTAINER",
            Self::BusyResource => "BUSY_RESOURCE",
            Self::ContentDuplication => "CONTENT_DUPLICATION",
            Self::ContentRestrictions => "CONTENT_RESTRICTIONS",
            Self::BadObjectReference => "BAD_OBJECT_REFERENCE",
            Self::AccessViolation => "ACCESS_VIOLATION",
            Self::IncompatibleObject => "INCOMPATIBLE_OBJECT",
            Self::Unsupported => "UNSUPPORTED",
            Self::UnknownIdentifier => "UNKNOWN_IDENTIFIER",
            Self::ConstraintCheckFail => "CONSTRAINT_CHECK_FAIL",
            Self::ResourceFault => "RESOURCE_FAULT",
            Self::LogicFault => "LOGIC_FAULT",
            Self::InsufficientCapacity => "INSUFFICIENT_CAPACITY",
            Self::InsufficientResource => "INSUFFICIENT_RESOURCE",
        }
    }
}

/// Errors produced by the DER parser (`crypto-daemon-der`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DerError {
    /// A read extended past the end of the buffer.
    #[error("incomplete DER input: {0}")]
    IncompleteInput(String),
    /// A tag did not match what the caller expected.
    #[error("unknown DER tag: {0}")]
    UnknownTag(String),
    /// A tag was recognized but is not supported by this decoder.
    #[error("unsupported DER tag: {0}")]
    UnsupportedTag(String),
    /// Content violates DER's encoding rules.
    #[error("invalid DER content: {0}")]
    InvalidContent(String),
    /// A length-of-length or long-form tag number exceeds representable range.
    #[error("unsupported numeric value: {0}")]
    UnsupportedNumeric(String),
}

impl ErrorCode for DerError {
    fn code(&self) -> &'static str {
        match self {
            Self::IncompleteInput(_) => "DER_INCOMPLETE_INPUT",
            Self::UnknownTag(_) => "DER_UNKNOWN_TAG",
            Self::UnsupportedTag(_) => "DER_UNSUPPORTED_TAG",
            Self::InvalidContent(_) => "DER_INVALID_CONTENT",
            Self::UnsupportedNumeric(_) => "DER_UNSUPPORTED_NUMERIC",
        }
    }
}

impl From<&DerError> for SecurityErrc {
    fn from(e: &DerError) -> Self {
        match e {
            DerError::IncompleteInput(_) => SecurityErrc::IncompleteInput,
            DerError::UnknownTag(_) => SecurityErrc::UnknownTag,
            DerError::UnsupportedTag(_) => SecurityErrc::UnsupportedTag,
            DerError::InvalidContent(_) => SecurityErrc::InvalidContent,
            DerError::UnsupportedNumeric(_) => SecurityErrc::UnsupportedNumeric,
        }
    }
}

/// Errors produced by the schema/validator layer (`crypto-daemon-schema`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The underlying DER decode failed.
    #[error("DER decode failed: {0}")]
    Der(#[from] DerError),
    /// A value failed a well-formedness check against its schema context.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A semantic validity constraint failed (size/range bound).
    #[error("constraint check failed: {0}")]
    ConstraintCheckFail(String),
    /// An unspecified internal fault; only used when nothing more specific applies.
    #[error("runtime fault: {0}")]
    RuntimeFault(String),
}

impl ErrorCode for SchemaError {
    fn code(&self) -> &'static str {
        match self {
            Self::Der(e) => e.code(),
            Self::InvalidInput(_) => "SCHEMA_INVALID_INPUT",
            Self::ConstraintCheckFail(_) => "SCHEMA_CONSTRAINT_CHECK_FAIL",
            Self::RuntimeFault(_) => "SCHEMA_RUNTIME_FAULT",
        }
    }
}

impl From<&SchemaError> for SecurityErrc {
    fn from(e: &SchemaError) -> Self {
        match e {
            SchemaError::Der(inner) => inner.into(),
            SchemaError::InvalidInput(_) => SecurityErrc::InvalidInput,
            SchemaError::ConstraintCheckFail(_) => SecurityErrc::ConstraintCheckFail,
            SchemaError::RuntimeFault(_) => SecurityErrc::RuntimeFault,
        }
    }
}

/// Errors produced by the key storage engine (`crypto-daemon-keystore`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// A caller-supplied argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The slot is not in the lifecycle state the operation requires.
    #[error("invalid usage order: {0}")]
    InvalidUsageOrder(String),
    /// The referenced `SlotNumber` does not exist.
    #[error("unreserved resource: slot {0:?}")]
    UnreservedResource(crate::ids::SlotNumber),
    /// The slot exists but has no content.
    #[error("empty container")]
    EmptyContainer,
    /// The resource is exclusively held (an `OwnerContainer` already exists).
    #[error("busy resource")]
    BusyResource,
    /// The object's COUID already exists for this crypto provider.
    #[error("content duplication")]
    ContentDuplication,
    /// The content violates the slot's prototype restrictions.
    #[error("content restrictions violated: {0}")]
    ContentRestrictions(String),
    /// A `dependency_uid` does not resolve to an existing slot.
    #[error("bad object reference")]
    BadObjectReference,
    /// The caller lacks the required permission on the slot.
    #[error("access violation")]
    AccessViolation,
    /// The object's type is incompatible with the requested crypto provider.
    #[error("incompatible object: {0}")]
    IncompatibleObject(String),
    /// Underlying storage I/O failed. Writes are atomic end-to-end: either
    /// fully applied or rolled back.
    #[error("storage I/O error: {0}")]
    ResourceFault(String),
    /// The persistent database is internally inconsistent. The daemon must
    /// abort rather than continue serving requests.
    #[error("key database corrupted: {0}")]
    Corrupted(String),
    /// An unspecified internal fault; only used when nothing more specific applies.
    #[error("runtime fault: {0}")]
    RuntimeFault(String),
}

impl ErrorCode for KeyStoreError {
    fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "KEYSTORE_INVALID_ARGUMENT",
            Self::InvalidUsageOrder(_) => "KEYSTORE_INVALID_USAGE_ORDER",
            Self::UnreservedResource(_) => "KEYSTORE_UNRESERVED_RESOURCE",
            Self::EmptyContainer => "KEYSTORE_EMPTY_CONTAINER",
            Self::BusyResource => "KEYSTORE_BUSY_RESOURCE",
            Self::ContentDuplication => "KEYSTORE_CONTENT_DUPLICATION",
            Self::ContentRestrictions(_) => "KEYSTORE_CONTENT_RESTRICTIONS",
            Self::BadObjectReference => "KEYSTORE_BAD_OBJECT_REFERENCE",
            Self::AccessViolation => "KEYSTORE_ACCESS_VIOLATION",
            Self::IncompatibleObject(_) => "KEYSTORE_INCOMPATIBLE_OBJECT",
            Self::ResourceFault(_) => "KEYSTORE_RESOURCE_FAULT",
            Self::Corrupted(_) => "KEYSTORE_CORRUPTED",
            Self::RuntimeFault(_) => "KEYSTORE_RUNTIME_FAULT",
        }
    }
}

impl From<&KeyStoreError> for SecurityErrc {
    fn from(e: &KeyStoreError) -> Self {
        match e {
            KeyStoreError::InvalidArgument(_) => SecurityErrc::InvalidArgument,
            KeyStoreError::InvalidUsageOrder(_) => SecurityErrc::InvalidUsageOrder,
            KeyStoreError::UnreservedResource(_) => SecurityErrc::UnreservedResource,
            KeyStoreError::EmptyContainer => SecurityErrc::EmptyContainer,
            KeyStoreError::BusyResource => SecurityErrc::BusyResource,
            KeyStoreError::ContentDuplication => SecurityErrc::ContentDuplication,
            KeyStoreError::ContentRestrictions(_) => SecurityErrc::ContentRestrictions,
            KeyStoreError::BadObjectReference => SecurityErrc::BadObjectReference,
            KeyStoreError::AccessViolation => SecurityErrc::AccessViolation,
            KeyStoreError::IncompatibleObject(_) => SecurityErrc::IncompatibleObject,
            KeyStoreError::ResourceFault(_) => SecurityErrc::ResourceFault,
            // Corrupted never reaches the wire: the daemon aborts on this variant.
            KeyStoreError::Corrupted(_) => SecurityErrc::LogicFault,
            KeyStoreError::RuntimeFault(_) => SecurityErrc::RuntimeFault,
        }
    }
}

/// Errors produced by the RPC broker (`crypto-daemon-rpc`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// No dispatcher is registered for `(basic_task, detail_task)`.
    #[error("unknown task: basic={0} detail={1}")]
    UnknownTask(u32, u32),
    /// The pre-sized response buffer was too small.
    #[error("insufficient response capacity")]
    InsufficientCapacity,
    /// The payload could not be decoded per the wire format.
    #[error("unsupported wire format: {0}")]
    UnsupportedFormat(String),
    /// The requested feature is not compiled/configured.
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// The referenced crypto provider is not registered.
    #[error("unknown identifier")]
    UnknownIdentifier,
    /// The decoded payload referenced a `ProxyId` with no registered object.
    #[error("dangling proxy id {0:?}")]
    UnreservedResource(crate::ids::ProxyId),
    /// An unspecified internal fault; only used when nothing more specific applies.
    #[error("runtime fault: {0}")]
    RuntimeFault(String),
}

impl ErrorCode for RpcError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownTask(..) => "RPC_UNKNOWN_TASK",
            Self::InsufficientCapacity => "RPC_INSUFFICIENT_CAPACITY",
            Self::UnsupportedFormat(_) => "RPC_UNSUPPORTED_FORMAT",
            Self::Unsupported(_) => "RPC_UNSUPPORTED",
            Self::UnknownIdentifier => "RPC_UNKNOWN_IDENTIFIER",
            Self::UnreservedResource(_) => "RPC_UNRESERVED_RESOURCE",
            Self::RuntimeFault(_) => "RPC_RUNTIME_FAULT",
        }
    }
}

impl From<&RpcError> for SecurityErrc {
    fn from(e: &RpcError) -> Self {
        match e {
            RpcError::UnknownTask(..) => SecurityErrc::RpcUnknownTask,
            RpcError::InsufficientCapacity => SecurityErrc::RpcInsufficientCapacity,
            RpcError::UnsupportedFormat(_) => SecurityErrc::UnsupportedFormat,
            RpcError::Unsupported(_) => SecurityErrc::Unsupported,
            RpcError::UnknownIdentifier => SecurityErrc::UnknownIdentifier,
            RpcError::UnreservedResource(_) => SecurityErrc::UnreservedResource,
            RpcError::RuntimeFault(_) => SecurityErrc::RuntimeFault,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn security_errc_round_trips_through_u64() {
        for code in 0u64..=26 {
            let e = SecurityErrc::from_u64(code).expect("every code in range decodes");
            assert_eq!(e as u64, code);
        }
        assert!(SecurityErrc::from_u64(27).is_none());
    }

    #[test]
    fn der_errors_map_to_expected_wire_codes() {
        let e = DerError::IncompleteInput("x".into());
        assert_eq!(SecurityErrc::from(&e), SecurityErrc::IncompleteInput);
    }

    #[test]
    fn keystore_corrupted_maps_to_logic_fault_and_never_reaches_wire() {
        let e = KeyStoreError::Corrupted("bad slot file".into());
        assert_eq!(SecurityErrc::from(&e), SecurityErrc::LogicFault);
    }
}
