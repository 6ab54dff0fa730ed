// Path: crates/schema/src/explicit.rs

//! `Explicit<C, TAG, Cl>`: EXPLICIT tagging. Wraps `C`'s complete
//! encoding, header included, inside a new constructed TLV.

use std::marker::PhantomData;

use crypto_daemon_der::TagClass;
use crypto_daemon_types::error::SchemaError;

use crate::context::{ImplicitRetaggable, SchemaContext, Taggable, TagClassMarker};

/// EXPLICIT-tags `C`: the wire encoding is `(Cl::CLASS, TAG, constructed)`
/// wrapping exactly one complete `C` object (its own header included).
///
/// `C` must be [`Taggable`]. `Optional` is not `Taggable`, so
/// `Explicit<Optional<C>, ..>` fails to compile for lacking the bound —
/// the correct nesting is `Optional<Explicit<C, ..>>`, which this
/// restriction steers callers toward.
pub struct Explicit<C, const TAG: i64, Cl: TagClassMarker = crate::context::ContextSpecificClass>(
    PhantomData<(C, Cl)>,
);

impl<C: Taggable, const TAG: i64, Cl: TagClassMarker> SchemaContext for Explicit<C, TAG, Cl> {
    const TAG_CLASS: TagClass = Cl::CLASS;
    const TAG_NUMBER: i64 = TAG;
    const IS_CONSTRUCTED: bool = true;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        // `well_formed` (not `check_content`) because the wrapped value
        // keeps its own header inside the EXPLICIT wrapper; it also
        // confirms `content` holds exactly one complete object, since it
        // checks total_len() against the slice it was handed.
        C::well_formed(content)
    }
}

impl<C: Taggable, const TAG: i64, Cl: TagClassMarker> Taggable for Explicit<C, TAG, Cl> {}
impl<C: Taggable, const TAG: i64, Cl: TagClassMarker> ImplicitRetaggable for Explicit<C, TAG, Cl> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextSpecificClass;
    use crate::primitives::Integer;

    #[test]
    fn explicit_tag_wraps_the_inner_objects_own_header() {
        type T0 = Explicit<Integer, 0, ContextSpecificClass>;
        // [0] EXPLICIT INTEGER 5: a0 03 02 01 05
        assert!(T0::well_formed(&[0xA0, 0x03, 0x02, 0x01, 0x05]).is_ok());
    }

    #[test]
    fn explicit_tag_rejects_trailing_bytes_after_the_inner_object() {
        type T0 = Explicit<Integer, 0, ContextSpecificClass>;
        // Outer length claims 4 bytes of content but only one INTEGER (3
        // bytes) is present, with one stray trailing byte.
        assert!(T0::well_formed(&[0xA0, 0x04, 0x02, 0x01, 0x05, 0xFF]).is_err());
    }

    #[test]
    fn explicit_tag_requires_constructed_bit() {
        type T0 = Explicit<Integer, 0, ContextSpecificClass>;
        assert!(T0::well_formed(&[0x80, 0x03, 0x02, 0x01, 0x05]).is_err());
    }
}
