//! Async length-prefixed frame I/O: a `u32` little-endian length prefix
//! then the payload.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crypto_daemon_types::error::RpcError;

/// Maximum accepted frame payload length — an engineering limit against a
/// misbehaving or malicious peer claiming an unbounded length prefix.
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

/// Reads one length-prefixed frame from `reader`. Returns `Ok(None)` on a
/// clean disconnect before any byte of a new frame arrives.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>, RpcError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(RpcError::RuntimeFault(format!("frame length read: {e}"))),
    }
    let len = u32::from_le_bytes(len_buf);
    if len > MAX_FRAME_LEN {
        return Err(RpcError::UnsupportedFormat(format!(
            "frame length {len} exceeds maximum {MAX_FRAME_LEN}"
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader
        .read_exact(&mut payload)
        .await
        .map_err(|e| RpcError::RuntimeFault(format!("frame payload read: {e}")))?;
    Ok(Some(payload))
}

/// Writes one length-prefixed frame to `writer`.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<(), RpcError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| RpcError::UnsupportedFormat("response payload exceeds u32 length".into()))?;
    writer
        .write_all(&len.to_le_bytes())
        .await
        .map_err(|e| RpcError::RuntimeFault(format!("frame length write: {e}")))?;
    writer
        .write_all(payload)
        .await
        .map_err(|e| RpcError::RuntimeFault(format!("frame payload write: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame_through_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello world").await.unwrap();
        let got = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(got, b"hello world");
    }

    #[tokio::test]
    async fn clean_eof_before_any_bytes_yields_none() {
        let (a, mut b) = tokio::io::duplex(1024);
        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        a.write_all(&(MAX_FRAME_LEN + 1).to_le_bytes()).await.unwrap();
        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, RpcError::UnsupportedFormat(_)));
    }
}
