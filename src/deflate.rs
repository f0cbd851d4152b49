//! Per-direction `permessage-deflate` codec (§4.8 / RFC 7692).
//!
//! Each direction of a connection that negotiated the extension gets its
//! own `Deflater`/`Inflater`, since RFC 7692 keeps the two LZ77 windows
//! independent. Both operate on whole, already-reassembled messages rather
//! than per-frame: the wire format allows a compressed message to span
//! several frames, but this crate's encoder always emits one, and the
//! decoder collects fragments before inflating.

use crate::error::Error;
use bytes::BytesMut;
use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};

/// The empty, non-final DEFLATE block both sides strip from / re-append to
/// a compressed message's payload (RFC 7692 §7.2.1).
const DEFLATE_TRAILER: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

fn io_buffer_size(payload_size: usize) -> usize {
    if payload_size <= 4096 {
        4096
    } else if payload_size <= 65536 {
        16384
    } else {
        65536
    }
}

/// Compresses outbound messages for one direction of the stream.
pub struct Deflater {
    compressor: Compress,
    no_context_takeover: bool,
}

impl Deflater {
    pub fn new(no_context_takeover: bool) -> Self {
        Self {
            compressor: Compress::new(Compression::default(), false),
            no_context_takeover,
        }
    }

    /// Compresses a full logical message and strips the trailing empty
    /// block, leaving a payload the peer's `Inflater` can reconstruct by
    /// re-appending it.
    ///
    /// Every message ends on a `Sync` flush, never `Finish` — `Finish`
    /// terminates the DEFLATE stream outright, which would leave a
    /// context-takeover compressor unusable for the next message. `Sync`
    /// is the symmetric counterpart of the `FlushDecompress::Sync` the
    /// decoder already uses.
    pub fn compress_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let buffer_size = io_buffer_size(payload.len().max(1));
        let mut compressed = BytesMut::with_capacity(buffer_size);
        let mut buffer = Vec::with_capacity(buffer_size);

        let before_in = self.compressor.total_in();
        loop {
            let consumed = (self.compressor.total_in() - before_in) as usize;
            let input = &payload[consumed..];
            let status = self
                .compressor
                .compress_vec(input, &mut buffer, FlushCompress::Sync)
                .map_err(|e| Error::Deflate(e.to_string()))?;
            compressed.extend_from_slice(&buffer);
            buffer.clear();

            match status {
                Status::StreamEnd => break,
                Status::Ok | Status::BufError => {
                    if (self.compressor.total_in() - before_in) as usize >= payload.len() {
                        break;
                    }
                }
            }
        }

        if self.no_context_takeover {
            self.compressor.reset();
        }

        let mut out = compressed.to_vec();
        if out.ends_with(&DEFLATE_TRAILER) {
            out.truncate(out.len() - DEFLATE_TRAILER.len());
        }
        Ok(out)
    }
}

/// Decompresses inbound messages for one direction of the stream.
pub struct Inflater {
    decompressor: Decompress,
    no_context_takeover: bool,
}

impl Inflater {
    pub fn new(no_context_takeover: bool) -> Self {
        Self {
            decompressor: Decompress::new(false),
            no_context_takeover,
        }
    }

    /// Re-appends the stripped trailer and inflates a full message payload.
    pub fn decompress_message(&mut self, payload: &[u8]) -> Result<Vec<u8>, Error> {
        let mut input = BytesMut::from(payload);
        input.extend_from_slice(&DEFLATE_TRAILER);

        let buffer_size = io_buffer_size(input.len());
        let mut decompressed = BytesMut::with_capacity(buffer_size);
        let mut buffer = Vec::with_capacity(buffer_size);

        let before_in = self.decompressor.total_in();
        while self.decompressor.total_in() - before_in < input.len() as u64 {
            let consumed = (self.decompressor.total_in() - before_in) as usize;
            let slice = &input[consumed..];
            match self
                .decompressor
                .decompress_vec(slice, &mut buffer, FlushDecompress::Sync)
                .map_err(|e| Error::Deflate(e.to_string()))?
            {
                Status::Ok | Status::BufError => {
                    decompressed.extend_from_slice(&buffer);
                    buffer.clear();
                }
                Status::StreamEnd => break,
            }
        }

        if self.no_context_takeover {
            self.decompressor.reset(false);
        }

        Ok(decompressed.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_text_message() {
        let mut deflater = Deflater::new(false);
        let mut inflater = Inflater::new(false);
        let original = b"the quick brown fox jumps over the lazy dog".repeat(4);

        let compressed = deflater.compress_message(&original).unwrap();
        assert!(compressed.len() < original.len());
        let decompressed = inflater.decompress_message(&compressed).unwrap();
        assert_eq!(decompressed, original);
    }

    #[test]
    fn round_trips_an_empty_message() {
        let mut deflater = Deflater::new(false);
        let mut inflater = Inflater::new(false);
        let compressed = deflater.compress_message(&[]).unwrap();
        let decompressed = inflater.decompress_message(&compressed).unwrap();
        assert_eq!(decompressed, Vec::<u8>::new());
    }

    #[test]
    fn no_context_takeover_resets_state_between_messages() {
        let mut deflater = Deflater::new(true);
        let mut inflater = Inflater::new(true);

        let first = deflater.compress_message(b"first message").unwrap();
        let second = deflater.compress_message(b"second message").unwrap();

        assert_eq!(inflater.decompress_message(&first).unwrap(), b"first message");
        assert_eq!(inflater.decompress_message(&second).unwrap(), b"second message");
    }

    #[test]
    fn context_takeover_compresses_repeated_messages_smaller() {
        let mut deflater = Deflater::new(false);
        let mut inflater = Inflater::new(false);
        let body = b"repeat this payload across messages ".repeat(20);

        let first = deflater.compress_message(&body).unwrap();
        let second = deflater.compress_message(&body).unwrap();
        assert!(second.len() <= first.len());

        assert_eq!(inflater.decompress_message(&first).unwrap(), body);
        assert_eq!(inflater.decompress_message(&second).unwrap(), body);
    }

    #[test]
    fn context_takeover_survives_many_cycles() {
        let mut deflater = Deflater::new(false);
        let mut inflater = Inflater::new(false);

        for i in 0..20 {
            let body = format!("message number {i} carries its own payload").into_bytes();
            let compressed = deflater.compress_message(&body).unwrap();
            let decompressed = inflater.decompress_message(&compressed).unwrap();
            assert_eq!(decompressed, body);
        }
    }
}
