//! Length-prefixed framing over a byte stream (SPEC_FULL §10.6).
//!
//! Each frame is a 4-byte big-endian `u32` length followed by that many
//! bytes of UTF-8 JSON. Payloads are `bytes::Bytes`/`BytesMut` rather than
//! plain `Vec<u8>`: a response frame is built once per request and handed
//! to every subscriber fan-out write without copying it again.

use bytes::{Bytes, BytesMut};
use tokio::io::{self, AsyncReadExt, AsyncWriteExt};

/// Reads one frame. Returns `Ok(None)` on a clean EOF before any bytes of
/// the length prefix arrive (the peer closed the connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> io::Result<Option<BytesMut>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = BytesMut::zeroed(len);
    reader.read_exact(&mut payload).await?;
    Ok(Some(payload))
}

pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &Bytes) -> io::Result<()> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_frame() {
        let (mut a, mut b) = tokio::io::duplex(64);
        write_frame(&mut a, &Bytes::from_static(b"hello")).await.unwrap();
        let frame = read_frame(&mut b).await.unwrap().unwrap();
        assert_eq!(&frame[..], b"hello");
    }

    #[tokio::test]
    async fn clean_eof_before_length_prefix_is_none() {
        let (a, mut b) = tokio::io::duplex(64);
        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }
}
