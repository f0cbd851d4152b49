//! Frame assembly and the single contiguous write described in §4.7.

use crate::buffer::PooledBuffer;
use crate::error::Error;
use crate::frame::{mask_bytes, OpCode};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writes one frame to `stream`.
///
/// `is_compressed` sets `rsv1`, but only when `is_first_fragment` is also
/// true: continuation frames never carry rsv1 even for a compressed
/// message, since RFC 7692 §6.1 makes rsv1 a property of the first frame
/// of the message only. `is_client` controls both the mask bit and
/// whether a mask key is generated; masking happens in a scratch buffer
/// rented from the pool so the caller's `payload` is never mutated.
pub async fn write<S: AsyncWrite + Unpin>(
    stream: &mut S,
    opcode: OpCode,
    payload: &[u8],
    fin: bool,
    is_client: bool,
    is_compressed: bool,
    is_first_fragment: bool,
) -> Result<(), Error> {
    let mut first_byte = opcode.as_nibble();
    if fin {
        first_byte |= 0b1000_0000;
    }
    if is_compressed && is_first_fragment {
        first_byte |= 0b0100_0000;
    }

    let payload_len = payload.len();
    let mask_key = if is_client {
        let mut rng = StdRng::from_rng(rand::thread_rng());
        Some([
            rng.random::<u8>(),
            rng.random::<u8>(),
            rng.random::<u8>(),
            rng.random::<u8>(),
        ])
    } else {
        None
    };

    // header(1) + length(1..9) + mask(0 or 4) + payload, assembled in one
    // scratch buffer so the whole frame goes out in a single write.
    let header_budget = 1 + 9 + 4;
    let mut scratch = PooledBuffer::new(header_budget + payload_len.max(1))?;

    scratch.write(&[first_byte])?;

    let mask_bit = if mask_key.is_some() { 0b1000_0000 } else { 0 };
    if payload_len <= 125 {
        scratch.write(&[mask_bit | payload_len as u8])?;
    } else if payload_len <= u16::MAX as usize {
        scratch.write(&[mask_bit | 126])?;
        scratch.write(&(payload_len as u16).to_be_bytes())?;
    } else {
        scratch.write(&[mask_bit | 127])?;
        scratch.write(&(payload_len as u64).to_be_bytes())?;
    }

    if let Some(mask_key) = mask_key {
        scratch.write(&mask_key)?;
        let region = scratch.get_free_region(payload_len.max(1))?;
        region[..payload_len].copy_from_slice(payload);
        mask_bytes(&mut region[..payload_len], mask_key, 0);
        let new_len = scratch.len() + payload_len;
        scratch.set_length(new_len)?;
    } else {
        scratch.write(payload)?;
    }

    stream.write_all(scratch.used()?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame;
    use std::io::Cursor;

    #[tokio::test]
    async fn server_text_frame_is_unmasked() {
        let mut out = Vec::new();
        write(&mut out, OpCode::Text, b"hi", true, false, false, true)
            .await
            .unwrap();
        assert_eq!(out[0], 0b1000_0001);
        assert_eq!(out[1], 2);
        assert_eq!(&out[2..], b"hi");
    }

    #[tokio::test]
    async fn client_frame_sets_mask_bit_and_does_not_mutate_payload() {
        let payload = b"unchanged".to_vec();
        let mut out = Vec::new();
        write(&mut out, OpCode::Binary, &payload, true, true, false, true)
            .await
            .unwrap();
        assert_eq!(payload, b"unchanged");
        assert_eq!(out[1] & 0b1000_0000, 0b1000_0000);
    }

    #[tokio::test]
    async fn client_frame_round_trips_through_frame_reader() {
        let payload = b"round trip me".to_vec();
        let mut out = Vec::new();
        write(&mut out, OpCode::Text, &payload, true, true, false, true)
            .await
            .unwrap();

        let mut stream = Cursor::new(out);
        let mut buf = vec![0u8; payload.len()];
        let cursor = frame::read(&mut stream, &mut buf, false, true).await.unwrap();
        assert!(cursor.is_complete());
        assert_eq!(buf, payload);
    }

    #[tokio::test]
    async fn compressed_continuation_frame_never_sets_rsv1() {
        let mut out = Vec::new();
        write(
            &mut out,
            OpCode::Continuation,
            b"tail",
            true,
            false,
            true,
            false,
        )
        .await
        .unwrap();
        assert_eq!(out[0] & 0b0100_0000, 0);
    }

    #[tokio::test]
    async fn compressed_first_fragment_sets_rsv1() {
        let mut out = Vec::new();
        write(&mut out, OpCode::Text, b"head", false, false, true, true)
            .await
            .unwrap();
        assert_eq!(out[0] & 0b0100_0000, 0b0100_0000);
        assert_eq!(out[0] & 0b1000_0000, 0);
    }

    #[tokio::test]
    async fn large_payload_uses_16_bit_length_prefix() {
        let payload = vec![3u8; 1000];
        let mut out = Vec::new();
        write(&mut out, OpCode::Binary, &payload, true, false, false, true)
            .await
            .unwrap();
        assert_eq!(out[1] & 0x7F, 126);
        assert_eq!(u16::from_be_bytes([out[2], out[3]]) as usize, 1000);
    }
}
