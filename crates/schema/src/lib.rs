// Path: crates/schema/src/lib.rs
#![forbid(unsafe_code)]

//! # ASN.1 schema/validator layer
//!
//! Builds a type-level schema system over `crypto-daemon-der`'s raw TLV
//! decoder: [`SchemaContext`] describes one position in a structure (tag
//! identity plus content rule), and the wrapper types in this crate
//! compose it the way ASN.1 itself composes type definitions —
//! `OPTIONAL`, `[N] EXPLICIT`, `[N] IMPLICIT`, `SEQUENCE OF`, `SET OF`,
//! `CHOICE`.
//!
//! The disallowed nestings from the C++ original (double-wrapped
//! contexts, re-tagging into `UNIVERSAL`, doubly-`IMPLICIT` positions,
//! `EXPLICIT` around `OPTIONAL`) are compile-time trait bounds here
//! ([`Taggable`], [`ImplicitRetaggable`]) rather than template-instantiation
//! failures, so a disallowed composition is a missing-bound error at the
//! type alias that tries to build it.
//!
//! Two protocols, two methods: [`SchemaContext::well_formed`] is the
//! *well-formedness* protocol (structural: right tag, right length, right
//! DER encoding rules). Semantic *validity* (size bounds, cross-field
//! constraints) is the caller's concern once a value is known
//! well-formed — this crate only guarantees the shape is safe to
//! interpret, not that the interpreted value is acceptable to a crypto
//! provider.

pub mod choice;
pub mod context;
pub mod explicit;
pub mod optional;
pub mod primitives;
pub mod repetition;
pub mod tagged;

pub use choice::{Choice2, Choice3, Choice4};
pub use context::{
    ApplicationClass, ContextSpecificClass, ImplicitRetaggable, PrivateClass, SchemaContext,
    Taggable, TagClassMarker, UniversalClass,
};
pub use explicit::Explicit;
pub use optional::Optional;
pub use primitives::{
    Boolean, Context, Integer, ObjectIdentifier, ObjectIdentifierShape, OctetString, Sequence,
    Shape,
};
pub use repetition::{SequenceOf, SetOf};
pub use tagged::Tagged;

#[cfg(test)]
mod integration_tests {
    use super::*;

    // A minimal record shape exercising OPTIONAL + EXPLICIT + SEQUENCE OF
    // together, the way a real crypto-provider attribute list would:
    //   SEQUENCE {
    //     id       [0] EXPLICIT INTEGER,
    //     comment  [1] EXPLICIT OCTET STRING OPTIONAL,
    //     aliases  SEQUENCE OF INTEGER
    //   }
    // This crate doesn't generate record types from such a shape (that's
    // left to the crypto-provider layer); it just confirms the field-level
    // contexts compose and validate independently, since that's all a
    // hand-assembled SEQUENCE OF / Choice schema needs.
    type Id = Explicit<Integer, 0, ContextSpecificClass>;
    type Comment = Optional<Explicit<OctetString, 1, ContextSpecificClass>>;
    type Aliases = SequenceOf<Integer>;

    #[test]
    fn record_fields_validate_independently() {
        assert!(Id::well_formed(&[0xA0, 0x03, 0x02, 0x01, 0x2A]).is_ok());
        assert!(Comment::well_formed(&[]).is_ok());
        assert!(Comment::well_formed(&[0xA1, 0x03, 0x04, 0x01, b'!']).is_ok());
        assert!(Aliases::well_formed(&[0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02]).is_ok());
    }

    #[test]
    fn explicit_around_optional_does_not_exist_as_a_type() {
        // `Explicit<Optional<Integer>, 0>` would fail to compile here: `Optional`
        // does not implement `Taggable`, so there is no way to even name the
        // type. Nothing to assert at run time; the absence of a
        // `type BadId = Explicit<Optional<Integer>, 0>;` line above *is* the
        // test.
    }
}
