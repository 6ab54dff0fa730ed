// Path: crates/schema/src/context.rs

//! The `SchemaContext` trait: one schema position in an ASN.1 structure.
//!
//! A "context" pins down everything needed to recognize and validate a
//! value occupying one position in a structure: its expected tag class,
//! tag number, constructedness, and the rules for what the content octets
//! must look like. Every schema type in this crate (`Context<T>`,
//! `Optional`, `Explicit`, `Tagged`, `SequenceOf`, `SetOf`, the `Choice*`
//! family) implements it.
//!
//! The nesting restrictions from the C++ original (no doubly-wrapped
//! contexts, no re-tagging as `UNIVERSAL`, no doubly-`Tagged` positions, no
//! `Explicit<Optional<_>>`) are now compile-time bounds rather than
//! template-specialization failures: `Taggable` and `ImplicitRetaggable`
//! are marker traits implemented only for the types allowed in each
//! position, so a disallowed nesting is a missing-trait-bound error at the
//! call site, not a runtime surprise.

use crypto_daemon_der::{get_object, universal_tag, TagClass};
use crypto_daemon_types::error::SchemaError;

/// One position in an ASN.1 schema: a tag identity plus content rules.
pub trait SchemaContext {
    /// The expected tag class. Meaningless (and never checked) when
    /// [`SchemaContext::TAG_NUMBER`] is [`universal_tag::UNDEFINED`].
    const TAG_CLASS: TagClass;
    /// The expected tag number, or [`universal_tag::UNDEFINED`] for an
    /// untagged `CHOICE`, which has no single tag of its own.
    const TAG_NUMBER: i64;
    /// Whether the constructed bit must be set.
    const IS_CONSTRUCTED: bool;
    /// Whether an absent (zero-length) encoding is valid at this position.
    const IS_OPTIONAL: bool = false;
    /// Whether this context is an untagged `CHOICE` (dispatches by trying
    /// alternatives rather than comparing against one fixed tag).
    const IS_CHOICE: bool = false;

    /// Validates the content octets (everything after the TLV header).
    /// Used directly by IMPLICIT tagging (`Tagged`), which replaces the
    /// header but reuses the inner context's content rules verbatim.
    fn check_content(content: &[u8]) -> Result<(), SchemaError>;

    /// Validates a complete encoding: header tag/class/constructedness,
    /// no trailing bytes, and [`SchemaContext::check_content`] on what's
    /// left. `Choice` and `Optional` override this default entirely,
    /// since neither compares against one fixed tag.
    fn well_formed(buf: &[u8]) -> Result<(), SchemaError> {
        if Self::TAG_NUMBER == universal_tag::UNDEFINED {
            return Err(SchemaError::RuntimeFault(
                "context with TAG_NUMBER=UNDEFINED must override well_formed instead of using \
                 the generic tag check (this is the untagged-CHOICE sentinel)"
                    .into(),
            ));
        }
        let (info, rest) = get_object(buf)?;
        if info.class != Self::TAG_CLASS
            || info.tag_number as i64 != Self::TAG_NUMBER
            || info.is_constructed != Self::IS_CONSTRUCTED
        {
            return Err(SchemaError::InvalidInput(format!(
                "tag mismatch: expected class={:?} tag={} constructed={}, got class={:?} tag={} \
                 constructed={}",
                Self::TAG_CLASS,
                Self::TAG_NUMBER,
                Self::IS_CONSTRUCTED,
                info.class,
                info.tag_number,
                info.is_constructed
            )));
        }
        if info.total_len() != buf.len() {
            return Err(SchemaError::InvalidInput(
                "trailing bytes after a complete object".into(),
            ));
        }
        let content = &rest[..info.content_length];
        Self::check_content(content)
    }
}

/// Marker for contexts that may be wrapped in [`crate::Explicit`].
///
/// Implemented for `Context<T>`, `SequenceOf`, `SetOf`, `Choice*`, and
/// `Tagged` and `Explicit` themselves. Deliberately *not* implemented for
/// `Optional`: `Explicit<Optional<C>>` is malformed ASN.1 (OPTIONAL
/// describes a field's presence, not a taggable value) — the correct
/// nesting is `Optional<Explicit<C>>`.
pub trait Taggable: SchemaContext {}

/// Marker for contexts that may be wrapped in [`crate::Tagged`] (IMPLICIT
/// re-tagging).
///
/// Implemented for everything [`Taggable`] is, except `Tagged` itself:
/// IMPLICIT tagging replaces a context's tag, so re-tagging an
/// already-implicit-tagged context a second time is meaningless (there is
/// no original tag left to observe) and is rejected at the type level
/// rather than at run time.
pub trait ImplicitRetaggable: SchemaContext {}

/// A tag class usable as the `Cl` parameter of [`crate::Explicit`] and
/// [`crate::Tagged`].
pub trait TagClassMarker {
    /// The runtime [`TagClass`] this marker denotes.
    const CLASS: TagClass;
    /// `true` for [`Universal`]. `Tagged` rejects this at the type level:
    /// IMPLICIT tagging exists precisely to move a value *out* of the
    /// universal class.
    const IS_UNIVERSAL: bool;
}

/// Marker for [`TagClass::ContextSpecific`] (the default, by far the most
/// common explicit/implicit tagging class).
pub struct ContextSpecificClass;
impl TagClassMarker for ContextSpecificClass {
    const CLASS: TagClass = TagClass::ContextSpecific;
    const IS_UNIVERSAL: bool = false;
}

/// Marker for [`TagClass::Application`].
pub struct ApplicationClass;
impl TagClassMarker for ApplicationClass {
    const CLASS: TagClass = TagClass::Application;
    const IS_UNIVERSAL: bool = false;
}

/// Marker for [`TagClass::Private`].
pub struct PrivateClass;
impl TagClassMarker for PrivateClass {
    const CLASS: TagClass = TagClass::Private;
    const IS_UNIVERSAL: bool = false;
}

/// Marker for [`TagClass::Universal`]. Only usable where the type system
/// allows it — [`crate::Tagged`] rejects it via [`TagClassMarker::IS_UNIVERSAL`].
pub struct UniversalClass;
impl TagClassMarker for UniversalClass {
    const CLASS: TagClass = TagClass::Universal;
    const IS_UNIVERSAL: bool = true;
}
