// Path: crates/schema/src/tagged.rs

//! `Tagged<C, TAG, Cl>`: IMPLICIT tagging. Replaces `C`'s tag/class
//! outright; the content rule (and constructedness) carry over unchanged.

use std::marker::PhantomData;

use crypto_daemon_der::TagClass;
use crypto_daemon_types::error::SchemaError;

use crate::context::{ImplicitRetaggable, SchemaContext, Taggable, TagClassMarker};

/// IMPLICIT-tags `C` as `(Cl::CLASS, TAG)`, keeping `C`'s constructedness
/// and content rule.
///
/// `Cl` must not be [`crate::context::UniversalClass`] — re-tagging a
/// value back into the universal class defeats the point of IMPLICIT
/// tagging and is rejected by [`assert_not_universal`]. `C` must be
/// [`ImplicitRetaggable`], which `Tagged` itself does not implement: a
/// doubly-`Tagged` position (`Tagged<Tagged<C, ..>, ..>`) has no
/// observable original tag left to re-tag, so it fails to compile for
/// lacking the bound rather than producing a meaningless runtime result.
pub struct Tagged<C, const TAG: i64, Cl: TagClassMarker = crate::context::ContextSpecificClass>(
    PhantomData<(C, Cl)>,
);

impl<C: ImplicitRetaggable, const TAG: i64, Cl: TagClassMarker> Tagged<C, TAG, Cl> {
    /// Forces the `Cl != Universal` check to be evaluated. Referenced from
    /// [`SchemaContext::check_content`] below so every use of this type is
    /// checked, not just ones that happen to call this directly.
    const ASSERT_NOT_UNIVERSAL: () = assert!(
        !Cl::IS_UNIVERSAL,
        "Tagged<_, _, UniversalClass> is not allowed: IMPLICIT tagging must move a value out of \
         the universal class, not back into it"
    );
}

impl<C: ImplicitRetaggable, const TAG: i64, Cl: TagClassMarker> SchemaContext for Tagged<C, TAG, Cl> {
    const TAG_CLASS: TagClass = Cl::CLASS;
    const TAG_NUMBER: i64 = TAG;
    const IS_CONSTRUCTED: bool = C::IS_CONSTRUCTED;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        let () = Self::ASSERT_NOT_UNIVERSAL;
        C::check_content(content)
    }
}

impl<C: ImplicitRetaggable, const TAG: i64, Cl: TagClassMarker> Taggable for Tagged<C, TAG, Cl> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextSpecificClass;
    use crate::primitives::{Integer, OctetString};

    #[test]
    fn implicit_tag_replaces_header_but_keeps_content_rule() {
        type T0 = Tagged<Integer, 0, ContextSpecificClass>;
        // [0] IMPLICIT INTEGER, tag 0x80, content "5".
        assert!(T0::well_formed(&[0x80, 0x01, 0x05]).is_ok());
        // Wrong tag number (context tag 1 instead of 0).
        assert!(T0::well_formed(&[0x81, 0x01, 0x05]).is_err());
    }

    #[test]
    fn implicit_tag_on_octet_string_keeps_primitive_bit() {
        type T1 = Tagged<OctetString, 1, ContextSpecificClass>;
        assert!(T1::well_formed(&[0x81, 0x02, 0xAA, 0xBB]).is_ok());
        // Constructed bit incorrectly set for what must stay primitive.
        assert!(T1::well_formed(&[0xA1, 0x02, 0xAA, 0xBB]).is_err());
    }
}
