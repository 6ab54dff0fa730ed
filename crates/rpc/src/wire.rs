//! Positional binary wire codec.
//!
//! Every message field is written and read in request order with no
//! self-describing tags — the receiver already knows the shape from the
//! `(basic_task, detail_task)` pair that precedes the body.

use bytes::{Buf, BufMut};

use crypto_daemon_types::error::{RpcError, SecurityErrc};
use crypto_daemon_types::ids::{CryptoObjectUid, ProcessId, ProxyId, SlotNumber, UserId, Uuid};

/// Encodes a value into the positional wire format.
pub trait WireEncode {
    /// Appends this value's encoding to `buf`.
    fn encode(&self, buf: &mut impl BufMut);
}

/// Decodes a value from the positional wire format, consuming its bytes
/// from the front of `buf`.
pub trait WireDecode: Sized {
    /// Reads one value, or an `UnsupportedFormat`/truncation error.
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError>;
}

fn need(buf: &impl Buf, n: usize) -> Result<(), RpcError> {
    if buf.remaining() < n {
        Err(RpcError::UnsupportedFormat(format!(
            "expected {n} more bytes, {} remain",
            buf.remaining()
        )))
    } else {
        Ok(())
    }
}

macro_rules! impl_wire_int {
    ($t:ty, $get:ident, $put:ident) => {
        impl WireEncode for $t {
            fn encode(&self, buf: &mut impl BufMut) {
                buf.$put(*self);
            }
        }
        impl WireDecode for $t {
            fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
                need(buf, std::mem::size_of::<$t>())?;
                Ok(buf.$get())
            }
        }
    };
}

impl_wire_int!(u8, get_u8, put_u8);
impl_wire_int!(u16, get_u16_le, put_u16_le);
impl_wire_int!(u32, get_u32_le, put_u32_le);
impl_wire_int!(u64, get_u64_le, put_u64_le);
impl_wire_int!(i32, get_i32_le, put_i32_le);
impl_wire_int!(i64, get_i64_le, put_i64_le);

impl WireEncode for () {
    fn encode(&self, _buf: &mut impl BufMut) {}
}
impl WireDecode for () {
    fn decode(_buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok(())
    }
}

impl WireEncode for bool {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(u8::from(*self));
    }
}
impl WireDecode for bool {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok(u8::decode(buf)? != 0)
    }
}

impl WireEncode for Vec<u8> {
    fn encode(&self, buf: &mut impl BufMut) {
        (self.len() as u64).encode(buf);
        buf.put_slice(self);
    }
}
impl WireDecode for Vec<u8> {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        let len = u64::decode(buf)? as usize;
        need(buf, len)?;
        let mut out = vec![0u8; len];
        buf.copy_to_slice(&mut out);
        Ok(out)
    }
}

impl WireEncode for String {
    fn encode(&self, buf: &mut impl BufMut) {
        self.as_bytes().to_vec().encode(buf);
    }
}
impl WireDecode for String {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        let bytes = Vec::<u8>::decode(buf)?;
        String::from_utf8(bytes).map_err(|e| RpcError::UnsupportedFormat(e.to_string()))
    }
}

impl<T: WireEncode> WireEncode for Vec<T> {
    fn encode(&self, buf: &mut impl BufMut) {
        (self.len() as u64).encode(buf);
        for item in self {
            item.encode(buf);
        }
    }
}
impl<T: WireDecode> WireDecode for Vec<T> {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        let len = u64::decode(buf)? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            out.push(T::decode(buf)?);
        }
        Ok(out)
    }
}

impl<A: WireEncode, B: WireEncode> WireEncode for (A, B) {
    fn encode(&self, buf: &mut impl BufMut) {
        self.0.encode(buf);
        self.1.encode(buf);
    }
}
impl<A: WireDecode, B: WireDecode> WireDecode for (A, B) {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok((A::decode(buf)?, B::decode(buf)?))
    }
}

impl<T: WireEncode> WireEncode for Option<T> {
    fn encode(&self, buf: &mut impl BufMut) {
        match self {
            Some(v) => {
                true.encode(buf);
                v.encode(buf);
            }
            None => false.encode(buf),
        }
    }
}
impl<T: WireDecode> WireDecode for Option<T> {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        if bool::decode(buf)? {
            Ok(Some(T::decode(buf)?))
        } else {
            Ok(None)
        }
    }
}

/// The `Result<T, E>` wire shape: `bool is_ok`; if true, `T`; else a
/// `SecurityErrc`-numeric `u64`.
pub struct WireResult<T>(pub Result<T, SecurityErrc>);

impl<T: WireEncode> WireEncode for WireResult<T> {
    fn encode(&self, buf: &mut impl BufMut) {
        match &self.0 {
            Ok(v) => {
                true.encode(buf);
                v.encode(buf);
            }
            Err(e) => {
                false.encode(buf);
                (*e as u64).encode(buf);
            }
        }
    }
}
impl<T: WireDecode> WireDecode for WireResult<T> {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        if bool::decode(buf)? {
            Ok(WireResult(Ok(T::decode(buf)?)))
        } else {
            let code = u64::decode(buf)?;
            let errc = SecurityErrc::from_u64(code)
                .ok_or_else(|| RpcError::UnsupportedFormat(format!("unknown error code {code}")))?;
            Ok(WireResult(Err(errc)))
        }
    }
}

/// The nullable object-pointer wire shape: `u8 tag` (`tag_nullptr = 0`,
/// `tag_normal_pointer = 1`); if normal, a `ProxyId` follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireProxyPointer(pub Option<ProxyId>);

const TAG_NULLPTR: u8 = 0;
const TAG_NORMAL_POINTER: u8 = 1;

impl WireEncode for ProxyId {
    fn encode(&self, buf: &mut impl BufMut) {
        self.0.encode(buf);
    }
}
impl WireDecode for ProxyId {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok(ProxyId(u64::decode(buf)?))
    }
}

impl WireEncode for WireProxyPointer {
    fn encode(&self, buf: &mut impl BufMut) {
        match self.0 {
            Some(id) => {
                TAG_NORMAL_POINTER.encode(buf);
                id.encode(buf);
            }
            None => TAG_NULLPTR.encode(buf),
        }
    }
}
impl WireDecode for WireProxyPointer {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        match u8::decode(buf)? {
            TAG_NULLPTR => Ok(WireProxyPointer(None)),
            TAG_NORMAL_POINTER => Ok(WireProxyPointer(Some(ProxyId::decode(buf)?))),
            other => Err(RpcError::UnsupportedFormat(format!("unknown pointer tag {other}"))),
        }
    }
}

impl WireEncode for Uuid {
    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.as_bytes());
    }
}
impl WireDecode for Uuid {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        need(buf, 16)?;
        let mut bytes = [0u8; 16];
        buf.copy_to_slice(&mut bytes);
        Ok(Uuid::from_bytes(bytes))
    }
}

impl WireEncode for SlotNumber {
    fn encode(&self, buf: &mut impl BufMut) {
        self.0.encode(buf);
    }
}
impl WireDecode for SlotNumber {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok(SlotNumber(u64::decode(buf)?))
    }
}

impl WireEncode for UserId {
    fn encode(&self, buf: &mut impl BufMut) {
        self.0.encode(buf);
    }
}
impl WireDecode for UserId {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok(UserId(u32::decode(buf)?))
    }
}

impl WireEncode for ProcessId {
    fn encode(&self, buf: &mut impl BufMut) {
        self.0.encode(buf);
    }
}
impl WireDecode for ProcessId {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok(ProcessId(u32::decode(buf)?))
    }
}

/// `CryptoObjectUid` encodes as its `generator` `Uuid` followed by its
/// `version`, the same positional layout as any other pair of fields.
impl WireEncode for CryptoObjectUid {
    fn encode(&self, buf: &mut impl BufMut) {
        self.generator.encode(buf);
        self.version.encode(buf);
    }
}
impl WireDecode for CryptoObjectUid {
    fn decode(buf: &mut impl Buf) -> Result<Self, RpcError> {
        Ok(CryptoObjectUid {
            generator: Uuid::decode(buf)?,
            version: u64::decode(buf)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_and_couid_round_trip() {
        let mut buf = bytes::BytesMut::new();
        let uuid = Uuid::from_bytes([7u8; 16]);
        let couid = CryptoObjectUid { generator: uuid, version: 9 };
        uuid.encode(&mut buf);
        couid.encode(&mut buf);

        let mut cursor = &buf[..];
        assert_eq!(Uuid::decode(&mut cursor).unwrap(), uuid);
        assert_eq!(CryptoObjectUid::decode(&mut cursor).unwrap(), couid);
    }

    #[test]
    fn round_trips_primitives_and_containers() {
        let mut buf = bytes::BytesMut::new();
        42u32.encode(&mut buf);
        true.encode(&mut buf);
        "hello".to_string().encode(&mut buf);
        vec![1u8, 2, 3].encode(&mut buf);
        Some(ProxyId(7)).encode(&mut buf);

        let mut cursor = &buf[..];
        assert_eq!(u32::decode(&mut cursor).unwrap(), 42);
        assert!(bool::decode(&mut cursor).unwrap());
        assert_eq!(String::decode(&mut cursor).unwrap(), "hello");
        assert_eq!(Vec::<u8>::decode(&mut cursor).unwrap(), vec![1, 2, 3]);
        assert_eq!(Option::<ProxyId>::decode(&mut cursor).unwrap(), Some(ProxyId(7)));
    }

    #[test]
    fn wire_result_round_trips_both_variants() {
        let mut buf = bytes::BytesMut::new();
        WireResult(Ok(5u32)).encode(&mut buf);
        WireResult::<u32>(Err(SecurityErrc::AccessViolation)).encode(&mut buf);

        let mut cursor = &buf[..];
        assert_eq!(WireResult::<u32>::decode(&mut cursor).unwrap().0, Ok(5));
        assert_eq!(
            WireResult::<u32>::decode(&mut cursor).unwrap().0,
            Err(SecurityErrc::AccessViolation)
        );
    }

    #[test]
    fn proxy_pointer_distinguishes_null_from_normal() {
        let mut buf = bytes::BytesMut::new();
        WireProxyPointer(None).encode(&mut buf);
        WireProxyPointer(Some(ProxyId(99))).encode(&mut buf);

        let mut cursor = &buf[..];
        assert_eq!(WireProxyPointer::decode(&mut cursor).unwrap(), WireProxyPointer(None));
        assert_eq!(
            WireProxyPointer::decode(&mut cursor).unwrap(),
            WireProxyPointer(Some(ProxyId(99)))
        );
    }

    #[test]
    fn truncated_input_is_an_unsupported_format_error() {
        let mut cursor: &[u8] = &[1, 2];
        assert!(u32::decode(&mut cursor).is_err());
    }
}
