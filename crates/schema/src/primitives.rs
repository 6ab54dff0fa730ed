// Path: crates/schema/src/primitives.rs

//! `Context<T>`: the default schema position, and its primitive
//! specializations.
//!
//! `Context` alone (`T` defaults to [`SequenceShape`]) means "a `SEQUENCE`,
//! universal class, constructed" — the shape of a record. The type
//! aliases [`Boolean`], [`Integer`], and [`OctetString`] specialize it to
//! the three primitive DER checks this daemon actually needs to enforce at
//! the schema layer (the rest — `OBJECT IDENTIFIER`, `UTF8String`, time
//! types — pass through [`OctetString`]'s no-op content check, since their
//! validity constraints are the crypto provider's business, not the
//! schema's).

use std::marker::PhantomData;

use crypto_daemon_der::{universal_tag, TagClass};
use crypto_daemon_types::error::SchemaError;

use crate::context::{ImplicitRetaggable, SchemaContext, Taggable};

/// The static shape (tag identity + content rule) backing a [`Context<T>`].
pub trait Shape {
    /// The expected tag class.
    const TAG_CLASS: TagClass;
    /// The expected tag number.
    const TAG_NUMBER: i64;
    /// Whether the constructed bit must be set.
    const IS_CONSTRUCTED: bool;

    /// Type-specific content validation, beyond the generic tag/length check.
    fn check_content(content: &[u8]) -> Result<(), SchemaError>;
}

/// `SEQUENCE` shape: universal class, tag 16, constructed. The default
/// shape for bare [`Context`] — field-level structure is validated by the
/// container (`SequenceOf`) or by the generated record type, not here.
pub struct SequenceShape;
impl Shape for SequenceShape {
    const TAG_CLASS: TagClass = TagClass::Universal;
    const TAG_NUMBER: i64 = universal_tag::SEQUENCE as i64;
    const IS_CONSTRUCTED: bool = true;

    fn check_content(_content: &[u8]) -> Result<(), SchemaError> {
        Ok(())
    }
}

/// `BOOLEAN` shape: DER requires the single content octet to be exactly
/// `0x00` (false) or `0xFF` (true) — BER's "any nonzero octet is true" is
/// not permitted.
pub struct BooleanShape;
impl Shape for BooleanShape {
    const TAG_CLASS: TagClass = TagClass::Universal;
    const TAG_NUMBER: i64 = universal_tag::BOOLEAN as i64;
    const IS_CONSTRUCTED: bool = false;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        match content {
            [0x00] | [0xFF] => Ok(()),
            [_] => Err(SchemaError::InvalidInput(
                "DER BOOLEAN content must be exactly 0x00 or 0xFF".into(),
            )),
            _ => Err(SchemaError::InvalidInput(
                "BOOLEAN content must be exactly one octet".into(),
            )),
        }
    }
}

/// `INTEGER` shape: content must be non-empty, and (DER's minimal-encoding
/// rule) the first nine bits must not all be equal — a multi-byte
/// encoding with a redundant leading `0x00` or `0xFF` is not minimal.
pub struct IntegerShape;
impl Shape for IntegerShape {
    const TAG_CLASS: TagClass = TagClass::Universal;
    const TAG_NUMBER: i64 = universal_tag::INTEGER as i64;
    const IS_CONSTRUCTED: bool = false;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        if content.is_empty() {
            return Err(SchemaError::InvalidInput(
                "INTEGER content must not be empty".into(),
            ));
        }
        if content.len() > 1 {
            let first_bit = content[0] & 0x80;
            let second_byte_top_bit = content[1] & 0x80;
            let first_byte_all_match_second = if first_bit == 0 {
                content[0] == 0x00 && second_byte_top_bit == 0
            } else {
                content[0] == 0xFF && second_byte_top_bit != 0
            };
            if first_byte_all_match_second {
                return Err(SchemaError::InvalidInput(
                    "INTEGER content is not minimally encoded: first nine bits are all equal"
                        .into(),
                ));
            }
        }
        Ok(())
    }
}

/// `OCTET STRING` shape: any content octets are well-formed.
pub struct OctetStringShape;
impl Shape for OctetStringShape {
    const TAG_CLASS: TagClass = TagClass::Universal;
    const TAG_NUMBER: i64 = universal_tag::OCTET_STRING as i64;
    const IS_CONSTRUCTED: bool = false;

    fn check_content(_content: &[u8]) -> Result<(), SchemaError> {
        Ok(())
    }
}

/// `OBJECT IDENTIFIER` shape: non-empty content octets, decodability is
/// checked by [`crypto_daemon_der::oid_value_to_dotted`] rather than here
/// (the schema layer only confirms the TLV is well-formed; the broker
/// layer resolves the dotted string when it actually needs it).
pub struct ObjectIdentifierShape;
impl Shape for ObjectIdentifierShape {
    const TAG_CLASS: TagClass = TagClass::Universal;
    const TAG_NUMBER: i64 = universal_tag::OID as i64;
    const IS_CONSTRUCTED: bool = false;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        crypto_daemon_der::oid_value_to_dotted(content, false).map(|_| ())
    }
}

/// A schema position whose tag identity and content rule come from a
/// [`Shape`]. `Context` alone (`T` defaulting to [`SequenceShape`]) is
/// "a `SEQUENCE`"; [`Boolean`], [`Integer`], [`OctetString`], and
/// [`ObjectIdentifier`] specialize it to the corresponding primitive.
///
/// `Context<Context<T>>` does not implement `SchemaContext`: there is no
/// blanket impl over `T: SchemaContext`, only over `T: Shape`, and no
/// wrapper in this crate implements both — so a doubly-wrapped `Context`
/// is simply not expressible, matching the "no double-wrapped Context"
/// restriction.
pub struct Context<T: Shape = SequenceShape>(PhantomData<T>);

impl<T: Shape> SchemaContext for Context<T> {
    const TAG_CLASS: TagClass = T::TAG_CLASS;
    const TAG_NUMBER: i64 = T::TAG_NUMBER;
    const IS_CONSTRUCTED: bool = T::IS_CONSTRUCTED;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        T::check_content(content)
    }
}

impl<T: Shape> Taggable for Context<T> {}
impl<T: Shape> ImplicitRetaggable for Context<T> {}

/// `SEQUENCE`, universal class, constructed. The default instantiation of
/// [`Context`].
pub type Sequence = Context<SequenceShape>;
/// `BOOLEAN`, DER-strict (`0x00`/`0xFF` only).
pub type Boolean = Context<BooleanShape>;
/// `INTEGER`, DER-strict (minimal two's-complement encoding).
pub type Integer = Context<IntegerShape>;
/// `OCTET STRING`.
pub type OctetString = Context<OctetStringShape>;
/// `OBJECT IDENTIFIER`.
pub type ObjectIdentifier = Context<ObjectIdentifierShape>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_accepts_only_0x00_or_0xff() {
        assert!(Boolean::well_formed(&[0x01, 0x01, 0x00]).is_ok());
        assert!(Boolean::well_formed(&[0x01, 0x01, 0xFF]).is_ok());
        assert!(Boolean::well_formed(&[0x01, 0x01, 0x01]).is_err());
    }

    #[test]
    fn integer_rejects_non_minimal_encoding() {
        // 0x00 0x7F is fine (top bit of second byte is 0, so not "all equal").
        assert!(Integer::well_formed(&[0x02, 0x02, 0x00, 0x7F]).is_ok());
        // 0x00 0x00 is a redundant leading zero: both top 9 bits are 0.
        assert!(Integer::well_formed(&[0x02, 0x02, 0x00, 0x00]).is_err());
        // 0xFF 0x80 is a redundant leading 0xFF: both top 9 bits are 1.
        assert!(Integer::well_formed(&[0x02, 0x02, 0xFF, 0x80]).is_err());
    }

    #[test]
    fn sequence_tag_mismatch_is_rejected() {
        // An INTEGER TLV where a SEQUENCE was expected.
        assert!(Sequence::well_formed(&[0x02, 0x01, 0x01]).is_err());
    }

    #[test]
    fn object_identifier_validates_via_der_oid_decoder() {
        let rsa_encryption = [
            0x06, 0x09, 0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01,
        ];
        assert!(ObjectIdentifier::well_formed(&rsa_encryption).is_ok());
    }
}
