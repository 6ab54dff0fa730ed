// Path: crates/daemon/src/handlers/wire_adapters.rs

//! Hand-rolled positional encode/decode for the keystore/access types that
//! cross the RPC boundary but can't get a `WireEncode`/`WireDecode` impl in
//! `crypto-daemon-rpc` without giving that crate a dependency on
//! `crypto-daemon-keystore` (the orphan rule blocks implementing a foreign
//! trait for a foreign type, and SPEC_FULL.md keeps the codec crate
//! independent of the storage engine). These are plain functions, not
//! trait impls, local to the one crate that already depends on both.

use bytes::{Buf, BufMut, BytesMut};

use crypto_daemon_keystore::{ContentProps, ObjectType, PrototypeProps, VersionControlPolicy};
use crypto_daemon_types::error::RpcError;
use crypto_daemon_types::ids::{CryptoObjectUid, Uuid};

use crypto_daemon_rpc::wire::{WireDecode, WireEncode};

pub fn encode_object_type(buf: &mut impl BufMut, t: ObjectType) {
    let tag: u8 = match t {
        ObjectType::PublicKey => 0,
        ObjectType::PrivateKey => 1,
        ObjectType::SymmetricKey => 2,
        ObjectType::Certificate => 3,
        ObjectType::Opaque => 4,
    };
    tag.encode(buf);
}

pub fn decode_object_type(buf: &mut impl Buf) -> Result<ObjectType, RpcError> {
    match u8::decode(buf)? {
        0 => Ok(ObjectType::PublicKey),
        1 => Ok(ObjectType::PrivateKey),
        2 => Ok(ObjectType::SymmetricKey),
        3 => Ok(ObjectType::Certificate),
        4 => Ok(ObjectType::Opaque),
        other => Err(RpcError::UnsupportedFormat(format!("unknown object type tag {other}"))),
    }
}

fn encode_version_control_policy(buf: &mut impl BufMut, p: VersionControlPolicy) {
    let tag: u8 = match p {
        VersionControlPolicy::None => 0,
        VersionControlPolicy::TrackPrevious => 1,
    };
    tag.encode(buf);
}

fn decode_version_control_policy(buf: &mut impl Buf) -> Result<VersionControlPolicy, RpcError> {
    match u8::decode(buf)? {
        0 => Ok(VersionControlPolicy::None),
        1 => Ok(VersionControlPolicy::TrackPrevious),
        other => Err(RpcError::UnsupportedFormat(format!("unknown version control tag {other}"))),
    }
}

pub fn encode_prototype_props(buf: &mut BytesMut, props: &PrototypeProps) {
    encode_object_type(buf, props.object_type);
    props.capacity.encode(buf);
    props.allowed_algorithm_id.encode(buf);
    props.exportable.encode(buf);
    match props.dependency {
        Some((uuid, ty)) => {
            true.encode(buf);
            uuid.encode(buf);
            encode_object_type(buf, ty);
        }
        None => false.encode(buf),
    }
    encode_version_control_policy(buf, props.version_control);
    match props.prev_content {
        Some((couid, ty)) => {
            true.encode(buf);
            couid.encode(buf);
            encode_object_type(buf, ty);
        }
        None => false.encode(buf),
    }
}

pub fn decode_prototype_props(buf: &mut impl Buf) -> Result<PrototypeProps, RpcError> {
    let object_type = decode_object_type(buf)?;
    let capacity = u32::decode(buf)?;
    let allowed_algorithm_id = Option::<u32>::decode(buf)?;
    let exportable = bool::decode(buf)?;
    let dependency = if bool::decode(buf)? {
        let uuid = Uuid::decode(buf)?;
        let ty = decode_object_type(buf)?;
        Some((uuid, ty))
    } else {
        None
    };
    let version_control = decode_version_control_policy(buf)?;
    let prev_content = if bool::decode(buf)? {
        let couid = CryptoObjectUid::decode(buf)?;
        let ty = decode_object_type(buf)?;
        Some((couid, ty))
    } else {
        None
    };
    Ok(PrototypeProps {
        object_type,
        capacity,
        allowed_algorithm_id,
        exportable,
        dependency,
        version_control,
        prev_content,
    })
}

pub fn encode_content_props(buf: &mut BytesMut, props: &ContentProps) {
    encode_object_type(buf, props.object_type);
    props.couid.encode(buf);
    match props.dependency_couid {
        Some(couid) => {
            true.encode(buf);
            couid.encode(buf);
        }
        None => false.encode(buf),
    }
    props.allowed_usage.encode(buf);
    props.bit_size.encode(buf);
    props.algorithm_id.encode(buf);
    props.exportable.encode(buf);
}

pub fn decode_content_props(buf: &mut impl Buf) -> Result<ContentProps, RpcError> {
    let object_type = decode_object_type(buf)?;
    let couid = CryptoObjectUid::decode(buf)?;
    let dependency_couid = if bool::decode(buf)? {
        Some(CryptoObjectUid::decode(buf)?)
    } else {
        None
    };
    let allowed_usage = u32::decode(buf)?;
    let bit_size = u32::decode(buf)?;
    let algorithm_id = u32::decode(buf)?;
    let exportable = bool::decode(buf)?;
    Ok(ContentProps {
        object_type,
        couid,
        dependency_couid,
        allowed_usage,
        bit_size,
        algorithm_id,
        exportable,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_type_round_trips_every_variant() {
        for ty in [
            ObjectType::PublicKey,
            ObjectType::PrivateKey,
            ObjectType::SymmetricKey,
            ObjectType::Certificate,
            ObjectType::Opaque,
        ] {
            let mut buf = BytesMut::new();
            encode_object_type(&mut buf, ty);
            let mut cursor = &buf[..];
            assert_eq!(decode_object_type(&mut cursor).unwrap(), ty);
        }
    }

    #[test]
    fn prototype_props_round_trip_with_dependency_and_history() {
        let props = PrototypeProps {
            object_type: ObjectType::PrivateKey,
            capacity: 4096,
            allowed_algorithm_id: Some(7),
            exportable: false,
            dependency: Some((Uuid::from_bytes([3u8; 16]), ObjectType::PublicKey)),
            version_control: VersionControlPolicy::TrackPrevious,
            prev_content: Some((
                CryptoObjectUid {
                    generator: Uuid::from_bytes([4u8; 16]),
                    version: 2,
                },
                ObjectType::PrivateKey,
            )),
        };
        let mut buf = BytesMut::new();
        encode_prototype_props(&mut buf, &props);
        let mut cursor = &buf[..];
        assert_eq!(decode_prototype_props(&mut cursor).unwrap(), props);
    }

    #[test]
    fn content_props_round_trip_without_dependency() {
        let props = ContentProps {
            object_type: ObjectType::SymmetricKey,
            couid: CryptoObjectUid {
                generator: Uuid::from_bytes([1u8; 16]),
                version: 1,
            },
            dependency_couid: None,
            allowed_usage: 0b0011,
            bit_size: 256,
            algorithm_id: 42,
            exportable: true,
        };
        let mut buf = BytesMut::new();
        encode_content_props(&mut buf, &props);
        let mut cursor = &buf[..];
        assert_eq!(decode_content_props(&mut cursor).unwrap(), props);
    }
}
