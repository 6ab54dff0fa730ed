// Path: crates/schema/src/choice.rs

//! `Choice<...>`: an untagged alternation between two or more contexts.
//!
//! ASN.1's `CHOICE` has no tag of its own; dispatch happens by peeking the
//! candidate's tag and matching it against each alternative in the order
//! declared, taking the first match. Rust has no variadic generics, so
//! each arity gets its own type (`Choice2`, `Choice3`, `Choice4`),
//! generated by [`choice_impl`] to keep the dispatch logic in one place.

use std::marker::PhantomData;

use crypto_daemon_der::{get_object, universal_tag, ObjectInfo, TagClass};
use crypto_daemon_types::error::SchemaError;

use crate::context::{ImplicitRetaggable, SchemaContext, Taggable};

fn tag_matches<V: SchemaContext>(info: &ObjectInfo) -> bool {
    V::TAG_NUMBER != universal_tag::UNDEFINED
        && info.class == V::TAG_CLASS
        && info.tag_number as i64 == V::TAG_NUMBER
        && info.is_constructed == V::IS_CONSTRUCTED
}

macro_rules! choice_impl {
    ($name:ident, $( $var:ident ),+) => {
        #[doc = concat!(
            "An untagged `CHOICE` between ", stringify!($($var),+), " alternatives, ",
            "matched in declaration order by their leading tag."
        )]
        pub struct $name<$($var),+>(PhantomData<($($var),+)>);

        impl<$($var: SchemaContext),+> SchemaContext for $name<$($var),+> {
            const TAG_CLASS: TagClass = TagClass::Universal;
            const TAG_NUMBER: i64 = universal_tag::UNDEFINED;
            const IS_CONSTRUCTED: bool = false;
            const IS_CHOICE: bool = true;

            fn check_content(_content: &[u8]) -> Result<(), SchemaError> {
                Err(SchemaError::RuntimeFault(
                    "CHOICE has no content rule of its own; well_formed dispatches by tag \
                     instead of calling check_content"
                        .into(),
                ))
            }

            fn well_formed(buf: &[u8]) -> Result<(), SchemaError> {
                let (info, _) = get_object(buf)?;
                $(
                    if tag_matches::<$var>(&info) {
                        return $var::well_formed(buf);
                    }
                )+
                Err(SchemaError::InvalidInput(format!(
                    "no CHOICE alternative matches tag class={:?} number={}",
                    info.class, info.tag_number
                )))
            }
        }

        impl<$($var: SchemaContext),+> Taggable for $name<$($var),+> {}
        impl<$($var: SchemaContext),+> ImplicitRetaggable for $name<$($var),+> {}
    };
}

choice_impl!(Choice2, A, B);
choice_impl!(Choice3, A, B, C);
choice_impl!(Choice4, A, B, C, D);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextSpecificClass;
    use crate::explicit::Explicit;
    use crate::primitives::{Integer, OctetString};

    type Id = Explicit<Integer, 0, ContextSpecificClass>;
    type Name = Explicit<OctetString, 1, ContextSpecificClass>;

    #[test]
    fn dispatches_to_the_alternative_whose_tag_matches() {
        let as_id = [0xA0, 0x03, 0x02, 0x01, 0x07];
        let as_name = [0xA1, 0x03, 0x04, 0x01, b'x'];
        assert!(Choice2::<Id, Name>::well_formed(&as_id).is_ok());
        assert!(Choice2::<Id, Name>::well_formed(&as_name).is_ok());
    }

    #[test]
    fn unmatched_tag_is_rejected() {
        let neither = [0xA2, 0x03, 0x02, 0x01, 0x07];
        assert!(Choice2::<Id, Name>::well_formed(&neither).is_err());
    }

    #[test]
    fn matching_tag_but_malformed_content_reports_that_variants_own_error() {
        // Tag matches `Id` ([0] EXPLICIT INTEGER) but content is not a
        // well-formed INTEGER (empty content).
        let bad_id = [0xA0, 0x02, 0x02, 0x00];
        assert!(Choice2::<Id, Name>::well_formed(&bad_id).is_err());
    }
}
