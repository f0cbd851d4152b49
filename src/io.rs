//! Fixed-length and network-order integer helpers shared by the frame
//! codec and the HTTP header codec. The WebSocket wire format is always
//! big-endian; the `Endianness` flag exists mainly so the test vectors in
//! `spec.md` §8 can exercise both orderings directly.

use crate::error::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// Reads exactly `buf.len()` bytes from `stream` into `buf`.
///
/// Fails with `UnexpectedEndOfStream` if the stream is closed before all
/// bytes arrive. Cancellation (e.g. the caller's future being dropped, or
/// an outer `tokio::select!` losing the race) propagates unchanged since
/// this is a thin wrapper over `AsyncReadExt::read_exact`.
pub async fn read_fixed<S: AsyncRead + Unpin>(stream: &mut S, buf: &mut [u8]) -> Result<(), Error> {
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::UnexpectedEndOfStream),
        Err(e) => Err(e.into()),
    }
}

pub async fn read_u16<S: AsyncRead + Unpin>(stream: &mut S, endianness: Endianness) -> Result<u16, Error> {
    let mut buf = [0u8; 2];
    read_fixed(stream, &mut buf).await?;
    Ok(match endianness {
        Endianness::Big => u16::from_be_bytes(buf),
        Endianness::Little => u16::from_le_bytes(buf),
    })
}

pub async fn read_u64<S: AsyncRead + Unpin>(stream: &mut S, endianness: Endianness) -> Result<u64, Error> {
    let mut buf = [0u8; 8];
    read_fixed(stream, &mut buf).await?;
    Ok(match endianness {
        Endianness::Big => u64::from_be_bytes(buf),
        Endianness::Little => u64::from_le_bytes(buf),
    })
}

pub async fn write_u16<S: AsyncWrite + Unpin>(
    stream: &mut S,
    value: u16,
    endianness: Endianness,
) -> Result<(), Error> {
    let bytes = match endianness {
        Endianness::Big => value.to_be_bytes(),
        Endianness::Little => value.to_le_bytes(),
    };
    stream.write_all(&bytes).await?;
    Ok(())
}

pub async fn write_u64<S: AsyncWrite + Unpin>(
    stream: &mut S,
    value: u64,
    endianness: Endianness,
) -> Result<(), Error> {
    let bytes = match endianness {
        Endianness::Big => value.to_be_bytes(),
        Endianness::Little => value.to_le_bytes(),
    };
    stream.write_all(&bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn read_fixed_fills_buffer_exactly() {
        let mut cursor = Cursor::new(vec![1u8, 2, 3, 4]);
        let mut buf = [0u8; 4];
        read_fixed(&mut cursor, &mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn read_fixed_reports_unexpected_eof() {
        let mut cursor = Cursor::new(vec![1u8, 2]);
        let mut buf = [0u8; 4];
        let err = read_fixed(&mut cursor, &mut buf).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedEndOfStream));
    }

    #[tokio::test]
    async fn u16_roundtrips_big_and_little_endian() {
        for endianness in [Endianness::Big, Endianness::Little] {
            let mut out = Vec::new();
            write_u16(&mut out, 0xBEEF, endianness).await.unwrap();
            let mut cursor = Cursor::new(out);
            let value = read_u16(&mut cursor, endianness).await.unwrap();
            assert_eq!(value, 0xBEEF);
        }
    }

    #[tokio::test]
    async fn u64_roundtrips_big_and_little_endian() {
        for endianness in [Endianness::Big, Endianness::Little] {
            let mut out = Vec::new();
            write_u64(&mut out, 0x0123_4567_89AB_CDEF, endianness).await.unwrap();
            let mut cursor = Cursor::new(out);
            let value = read_u64(&mut cursor, endianness).await.unwrap();
            assert_eq!(value, 0x0123_4567_89AB_CDEF);
        }
    }

    #[tokio::test]
    async fn wire_length_is_always_big_endian() {
        let mut out = Vec::new();
        write_u16(&mut out, 300, Endianness::Big).await.unwrap();
        assert_eq!(out, [0x01, 0x2C]);
    }
}
