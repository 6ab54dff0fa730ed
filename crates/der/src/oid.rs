// Path: crates/der/src/oid.rs

//! Decoding OBJECT IDENTIFIER content octets into dotted notation.

use crypto_daemon_types::error::DerError;
use std::fmt::Write as _;

/// Decodes the content octets of an `OBJECT IDENTIFIER` (or, if
/// `is_relative` is set, a `RELATIVE-OID`) into dotted-decimal notation.
///
/// Each arc is base-128 encoded (a septet stream with the continuation bit
/// set on every byte but the last). For absolute OIDs the first two arcs
/// are packed into the first arc's value: `arc0 = first_octet / 40`,
/// `arc1 = first_octet % 40`, except that `first_octet >= 80` denotes
/// `arc0 = 2, arc1 = first_octet - 80` (the only way to encode `arc1 >= 40`
/// when `arc0 == 2`). Relative OIDs skip this split entirely.
pub fn oid_value_to_dotted(bytes: &[u8], is_relative: bool) -> Result<String, DerError> {
    if bytes.is_empty() {
        return Err(DerError::InvalidContent("empty OID value".into()));
    }

    let arcs = decode_arcs(bytes)?;
    let mut out = String::new();

    if is_relative {
        for (i, arc) in arcs.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            write!(out, "{arc}").expect("writing to String cannot fail");
        }
        return Ok(out);
    }

    let first = arcs[0];
    let (arc0, arc1) = if first >= 80 {
        (2u64, first - 80)
    } else {
        (first / 40, first % 40)
    };

    write!(out, "{arc0}.{arc1}").expect("writing to String cannot fail");
    for arc in &arcs[1..] {
        write!(out, ".{arc}").expect("writing to String cannot fail");
    }
    Ok(out)
}

fn decode_arcs(bytes: &[u8]) -> Result<Vec<u64>, DerError> {
    let mut arcs = Vec::new();
    let mut value: u128 = 0;
    let mut have_byte = false;

    for &byte in bytes {
        have_byte = true;
        value = (value << 7) | u128::from(byte & 0x7F);
        if value > u128::from(u64::MAX) {
            return Err(DerError::UnsupportedNumeric(
                "OID arc exceeds 64 bits".into(),
            ));
        }
        if byte & 0x80 == 0 {
            arcs.push(value as u64);
            value = 0;
            have_byte = false;
        }
    }

    if have_byte {
        return Err(DerError::InvalidContent(
            "OID value ends mid-arc (truncated continuation)".into(),
        ));
    }
    if arcs.is_empty() {
        return Err(DerError::InvalidContent("OID value decoded to no arcs".into()));
    }
    Ok(arcs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_rsa_encryption_oid() {
        // 1.2.840.113549.1.1.1 (rsaEncryption)
        let bytes = [0x2A, 0x86, 0x48, 0x86, 0xF7, 0x0D, 0x01, 0x01, 0x01];
        assert_eq!(
            oid_value_to_dotted(&bytes, false).unwrap(),
            "1.2.840.113549.1.1.1"
        );
    }

    #[test]
    fn first_octet_above_eighty_denotes_arc0_two() {
        // first arc byte = 0x55 (85) => arc0=2, arc1=5
        let bytes = [0x55, 0x03];
        assert_eq!(oid_value_to_dotted(&bytes, false).unwrap(), "2.5.3");
    }

    #[test]
    fn relative_oid_skips_first_arc_split() {
        let bytes = [0x01, 0x02];
        assert_eq!(oid_value_to_dotted(&bytes, true).unwrap(), "1.2");
    }

    #[test]
    fn truncated_continuation_is_invalid_content() {
        let bytes = [0x86];
        assert!(matches!(
            oid_value_to_dotted(&bytes, false),
            Err(DerError::InvalidContent(_))
        ));
    }
}
