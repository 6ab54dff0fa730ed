// Path: crates/schema/src/repetition.rs

//! `SequenceOf<C>` and `SetOf<C>`: homogeneous repetition.

use std::marker::PhantomData;

use crypto_daemon_der::{get_object, universal_tag, TagClass};
use crypto_daemon_types::error::SchemaError;

use crate::context::{ImplicitRetaggable, SchemaContext, Taggable};

fn each_child_span(mut content: &[u8]) -> Result<Vec<&[u8]>, SchemaError> {
    let mut spans = Vec::new();
    while !content.is_empty() {
        let (info, _) = get_object(content)?;
        let span = &content[..info.total_len()];
        spans.push(span);
        content = &content[info.total_len()..];
    }
    Ok(spans)
}

/// `SEQUENCE OF C`: zero or more `C` elements in encoded order, no
/// ordering constraint.
pub struct SequenceOf<C>(PhantomData<C>);

impl<C: SchemaContext> SchemaContext for SequenceOf<C> {
    const TAG_CLASS: TagClass = TagClass::Universal;
    const TAG_NUMBER: i64 = universal_tag::SEQUENCE as i64;
    const IS_CONSTRUCTED: bool = true;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        for span in each_child_span(content)? {
            C::well_formed(span)?;
        }
        Ok(())
    }
}

impl<C: SchemaContext> Taggable for SequenceOf<C> {}
impl<C: SchemaContext> ImplicitRetaggable for SequenceOf<C> {}

/// `SET OF C`: zero or more `C` elements whose DER encodings must appear
/// in non-decreasing lexicographic order (the canonical sort DER requires
/// for `SET OF`, unlike the order-preserving `SEQUENCE OF`).
pub struct SetOf<C>(PhantomData<C>);

impl<C: SchemaContext> SchemaContext for SetOf<C> {
    const TAG_CLASS: TagClass = TagClass::Universal;
    const TAG_NUMBER: i64 = universal_tag::SET as i64;
    const IS_CONSTRUCTED: bool = true;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        let spans = each_child_span(content)?;
        for span in &spans {
            C::well_formed(span)?;
        }
        for pair in spans.windows(2) {
            if pair[0] > pair[1] {
                return Err(SchemaError::InvalidInput(
                    "SET OF elements are not in non-decreasing lexicographic order".into(),
                ));
            }
        }
        Ok(())
    }
}

impl<C: SchemaContext> Taggable for SetOf<C> {}
impl<C: SchemaContext> ImplicitRetaggable for SetOf<C> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Integer;

    #[test]
    fn sequence_of_allows_any_order() {
        // SEQUENCE { INTEGER 2, INTEGER 1 }
        let buf = [0x30, 0x06, 0x02, 0x01, 0x02, 0x02, 0x01, 0x01];
        assert!(SequenceOf::<Integer>::well_formed(&buf).is_ok());
    }

    #[test]
    fn set_of_rejects_out_of_order_elements() {
        // SET { INTEGER 2, INTEGER 1 } -- 02 01 02 sorts after 02 01 01.
        let buf = [0x31, 0x06, 0x02, 0x01, 0x02, 0x02, 0x01, 0x01];
        assert!(SetOf::<Integer>::well_formed(&buf).is_err());
    }

    #[test]
    fn set_of_accepts_sorted_elements() {
        let buf = [0x31, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
        assert!(SetOf::<Integer>::well_formed(&buf).is_ok());
    }

    #[test]
    fn empty_repetition_is_well_formed() {
        assert!(SequenceOf::<Integer>::well_formed(&[0x30, 0x00]).is_ok());
        assert!(SetOf::<Integer>::well_formed(&[0x31, 0x00]).is_ok());
    }
}
