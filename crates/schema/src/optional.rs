// Path: crates/schema/src/optional.rs

//! `Optional<C>`: a position that may be entirely absent.

use std::marker::PhantomData;

use crypto_daemon_der::TagClass;
use crypto_daemon_types::error::SchemaError;

use crate::context::SchemaContext;

/// A context that is valid either absent (zero-length encoding) or present
/// as a complete `C`.
///
/// Deliberately does not implement [`crate::Taggable`] or
/// [`crate::ImplicitRetaggable`]: `OPTIONAL` describes whether a field is
/// present, not what to tag it as, so `Explicit<Optional<C>>` and
/// `Tagged<Optional<C>>` are both rejected at the call site for lacking
/// the required bound. The correct nesting wraps the other way:
/// `Optional<Explicit<C>>`.
pub struct Optional<C>(PhantomData<C>);

impl<C: SchemaContext> SchemaContext for Optional<C> {
    const TAG_CLASS: TagClass = C::TAG_CLASS;
    const TAG_NUMBER: i64 = C::TAG_NUMBER;
    const IS_CONSTRUCTED: bool = C::IS_CONSTRUCTED;
    const IS_OPTIONAL: bool = true;

    fn check_content(content: &[u8]) -> Result<(), SchemaError> {
        C::check_content(content)
    }

    fn well_formed(buf: &[u8]) -> Result<(), SchemaError> {
        if buf.is_empty() {
            return Ok(());
        }
        C::well_formed(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::Integer;

    #[test]
    fn empty_buffer_is_valid_when_optional() {
        assert!(Optional::<Integer>::well_formed(&[]).is_ok());
    }

    #[test]
    fn present_value_is_validated_normally() {
        assert!(Optional::<Integer>::well_formed(&[0x02, 0x01, 0x05]).is_ok());
        assert!(Optional::<Integer>::well_formed(&[0x02, 0x00]).is_err());
    }
}
