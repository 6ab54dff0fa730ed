// Path: crates/der/src/lib.rs
#![forbid(unsafe_code)]

//! # DER/BER tag-length-value decoder
//!
//! A pure, allocation-light decoder for Distinguished Encoding Rules (DER):
//! no I/O, no dependency beyond byte slices. [`get_object`] reads a single
//! TLV header; [`parse`] walks a whole buffer recursively, feeding a
//! [`DerBuilder`] sink. The schema/validator layer (`crypto-daemon-schema`)
//! is the only consumer that knows what a "well-formed" object looks like
//! for a given ASN.1 position — this crate only knows how to cut a buffer
//! into `(class, tag_number, is_constructed, header_size, content_length)`.

use crypto_daemon_types::error::DerError;

pub mod oid;

pub use oid::oid_value_to_dotted;

/// The four ASN.1 tag classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagClass {
    /// Tags defined by the ASN.1 standard itself (BOOLEAN, INTEGER, ...).
    Universal,
    /// Tags whose meaning is defined by the enclosing application.
    Application,
    /// Tags whose meaning is defined by the enclosing context (EXPLICIT/IMPLICIT).
    ContextSpecific,
    /// Tags private to a particular organization.
    Private,
}

impl TagClass {
    fn from_high_bits(byte: u8) -> Self {
        match byte >> 6 {
            0b00 => TagClass::Universal,
            0b01 => TagClass::Application,
            0b10 => TagClass::ContextSpecific,
            _ => TagClass::Private,
        }
    }
}

/// Well-known universal tag numbers.
pub mod universal_tag {
    /// `BOOLEAN`.
    pub const BOOLEAN: u64 = 1;
    /// `INTEGER`.
    pub const INTEGER: u64 = 2;
    /// `BIT STRING`.
    pub const BIT_STRING: u64 = 3;
    /// `OCTET STRING`.
    pub const OCTET_STRING: u64 = 4;
    /// `NULL`.
    pub const NULL: u64 = 5;
    /// `OBJECT IDENTIFIER`.
    pub const OID: u64 = 6;
    /// `REAL`.
    pub const REAL: u64 = 9;
    /// `ENUMERATED`.
    pub const ENUMERATED: u64 = 10;
    /// `UTF8String`.
    pub const UTF8_STRING: u64 = 12;
    /// `SEQUENCE` / `SEQUENCE OF`.
    pub const SEQUENCE: u64 = 16;
    /// `SET` / `SET OF`.
    pub const SET: u64 = 17;
    /// `PrintableString`.
    pub const PRINTABLE_STRING: u64 = 19;
    /// `UTCTime`.
    pub const UTC_TIME: u64 = 23;
    /// `GeneralizedTime`.
    pub const GENERALIZED_TIME: u64 = 24;
    /// Sentinel used by untagged `CHOICE` contexts: must be checked for
    /// *before* any tag comparison, never compared against directly
    /// (see `crypto-daemon-schema`'s `Choice` dispatch).
    pub const UNDEFINED: i64 = -1;
}

/// The decoded header of one DER TLV triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectInfo {
    /// The tag's class.
    pub class: TagClass,
    /// The tag number (unbounded in the wire format; rejected above `u64::MAX`).
    pub tag_number: u64,
    /// Whether the constructed bit (bit 6 of the first octet) is set.
    pub is_constructed: bool,
    /// The number of octets making up the tag+length header.
    pub header_size: usize,
    /// The number of content octets following the header.
    pub content_length: usize,
}

impl ObjectInfo {
    /// The total size of this object (header + content) in bytes.
    pub fn total_len(&self) -> usize {
        self.header_size + self.content_length
    }
}

/// Reads one DER header (tag + length) from the front of `buf`.
///
/// Returns the decoded [`ObjectInfo`] and the remainder of `buf` starting
/// right after the header (i.e. at the first content octet).
pub fn get_object(buf: &[u8]) -> Result<(ObjectInfo, &[u8]), DerError> {
    let mut pos = 0usize;
    let first = *buf
        .first()
        .ok_or_else(|| DerError::IncompleteInput("empty buffer reading tag".into()))?;
    pos += 1;

    let class = TagClass::from_high_bits(first);
    let is_constructed = first & 0x20 != 0;
    let short_tag = first & 0x1F;

    let tag_number: u64 = if short_tag != 0x1F {
        short_tag as u64
    } else {
        let mut value: u128 = 0;
        loop {
            let byte = *buf.get(pos).ok_or_else(|| {
                DerError::IncompleteInput("truncated long-form tag".into())
            })?;
            pos += 1;
            value = (value << 7) | u128::from(byte & 0x7F);
            if value > u128::from(u64::MAX) {
                return Err(DerError::UnsupportedNumeric(
                    "tag number exceeds 64 bits".into(),
                ));
            }
            if byte & 0x80 == 0 {
                break;
            }
        }
        value as u64
    };

    let len_octet = *buf
        .get(pos)
        .ok_or_else(|| DerError::IncompleteInput("truncated length".into()))?;
    pos += 1;

    let content_length: usize = if len_octet & 0x80 == 0 {
        len_octet as usize
    } else {
        let n = (len_octet & 0x7F) as usize;
        if n == 0 {
            return Err(DerError::InvalidContent(
                "indefinite length is not permitted in DER".into(),
            ));
        }
        if n > core::mem::size_of::<usize>() {
            return Err(DerError::UnsupportedNumeric(
                "length-of-length exceeds representable range".into(),
            ));
        }
        let mut value: usize = 0;
        for _ in 0..n {
            let byte = *buf
                .get(pos)
                .ok_or_else(|| DerError::IncompleteInput("truncated long-form length".into()))?;
            pos += 1;
            value = value
                .checked_shl(8)
                .and_then(|v| v.checked_add(byte as usize))
                .ok_or_else(|| {
                    DerError::UnsupportedNumeric("length value overflows usize".into())
                })?;
        }
        value
    };

    let header_size = pos;
    let total = header_size
        .checked_add(content_length)
        .ok_or_else(|| DerError::UnsupportedNumeric("header + content length overflows".into()))?;
    if total > buf.len() {
        return Err(DerError::IncompleteInput(format!(
            "object of {total} bytes exceeds buffer of {} bytes",
            buf.len()
        )));
    }

    Ok((
        ObjectInfo {
            class,
            tag_number,
            is_constructed,
            header_size,
            content_length,
        },
        &buf[header_size..],
    ))
}

/// Returns the sub-span of `buf` covering the first complete DER object
/// (header + content).
pub fn first_object(buf: &[u8]) -> Result<&[u8], DerError> {
    let (info, _) = get_object(buf)?;
    Ok(&buf[..info.total_len()])
}

/// Strips the TLV header from `buf`, returning only the content octets.
pub fn without_header(buf: &[u8]) -> Result<&[u8], DerError> {
    let (info, rest) = get_object(buf)?;
    Ok(&rest[..info.content_length])
}

/// A sink for [`parse`]'s recursive descent over a DER buffer.
pub trait DerBuilder {
    /// Called when entering a constructed object, before its content is parsed.
    fn begin_constructed(&mut self, info: &ObjectInfo);
    /// Called after a constructed object's content has been fully parsed.
    fn end_constructed(&mut self, info: &ObjectInfo);
    /// Called for each primitive object, with its raw content octets.
    fn primitive(&mut self, info: &ObjectInfo, content: &[u8]);
}

/// Recursively walks every DER object in `buf` in sequence, depth-first,
/// invoking `builder` for each one. Constructed objects recurse over their
/// content; primitives are reported directly.
pub fn parse<B: DerBuilder>(buf: &[u8], builder: &mut B) -> Result<(), DerError> {
    let mut remaining = buf;
    while !remaining.is_empty() {
        let (info, rest) = get_object(remaining)?;
        let content = &rest[..info.content_length];
        if info.is_constructed {
            builder.begin_constructed(&info);
            parse(content, builder)?;
            builder.end_constructed(&info);
        } else {
            builder.primitive(&info, content);
        }
        remaining = &rest[info.content_length..];
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_tag_and_length() {
        // INTEGER 1: 02 01 01
        let (info, rest) = get_object(&[0x02, 0x01, 0x01]).unwrap();
        assert_eq!(info.class, TagClass::Universal);
        assert_eq!(info.tag_number, universal_tag::INTEGER);
        assert!(!info.is_constructed);
        assert_eq!(info.header_size, 2);
        assert_eq!(info.content_length, 1);
        assert_eq!(rest, &[0x01]);
    }

    #[test]
    fn long_form_tag() {
        // Context-specific constructed tag 31 encoded long-form: 0xFF 0x1F, no content.
        let (info, _) = get_object(&[0b1111_1111, 0x1F, 0x00]).unwrap();
        assert_eq!(info.tag_number, 31);
        assert_eq!(info.class, TagClass::Private);
        assert!(info.is_constructed);
    }

    #[test]
    fn long_form_length() {
        // SEQUENCE with a 2-byte length-of-length encoding 300.
        let mut buf = vec![0x30, 0x82, 0x01, 0x2C];
        buf.extend(std::iter::repeat(0u8).take(300));
        let (info, rest) = get_object(&buf).unwrap();
        assert_eq!(info.content_length, 300);
        assert_eq!(rest.len(), 300);
    }

    #[test]
    fn indefinite_length_is_rejected() {
        let err = get_object(&[0x30, 0x80]).unwrap_err();
        assert!(matches!(err, DerError::InvalidContent(_)));
    }

    #[test]
    fn truncated_buffer_is_incomplete() {
        let err = get_object(&[0x30, 0x05, 0x01]).unwrap_err();
        assert!(matches!(err, DerError::IncompleteInput(_)));
    }

    #[test]
    fn der_round_trip_header_plus_content_equals_buffer_len() {
        let buf = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];
        let (info, _) = get_object(&buf).unwrap();
        assert_eq!(info.total_len(), buf.len());
    }

    #[test]
    fn parse_sequence_of_two_integers() {
        // SEQUENCE { INTEGER 1, INTEGER 2 }
        let buf = [0x30, 0x06, 0x02, 0x01, 0x01, 0x02, 0x01, 0x02];

        struct Events(Vec<String>);
        impl DerBuilder for Events {
            fn begin_constructed(&mut self, info: &ObjectInfo) {
                self.0.push(format!("begin_sequence(len={})", info.content_length));
            }
            fn end_constructed(&mut self, _info: &ObjectInfo) {
                self.0.push("end_sequence".into());
            }
            fn primitive(&mut self, info: &ObjectInfo, content: &[u8]) {
                if info.tag_number == universal_tag::INTEGER {
                    self.0.push(format!("integer({})", content[0]));
                }
            }
        }

        let mut events = Events(Vec::new());
        parse(&buf, &mut events).unwrap();
        assert_eq!(
            events.0,
            vec!["begin_sequence(len=6)", "integer(1)", "integer(2)", "end_sequence"]
        );
    }

    proptest::proptest! {
        #[test]
        fn tag_numbers_up_to_64_bits_round_trip(n in 0u64..=u64::MAX) {
            let mut encoded = Vec::new();
            // Build a long-form tag octet sequence for `n`.
            encoded.push(0x9Fu8); // context-specific, constructed? no: primitive, long-form marker (short_tag=31)
            let mut septets = Vec::new();
            let mut v = n;
            septets.push((v & 0x7F) as u8);
            v >>= 7;
            while v > 0 {
                septets.push((v & 0x7F) as u8 | 0x80);
                v >>= 7;
            }
            septets.reverse();
            encoded.extend_from_slice(&septets);
            encoded.push(0x00); // zero-length content
            let (info, _) = get_object(&encoded).unwrap();
            prop_assert_eq!(info.tag_number, n);
        }
    }
}
