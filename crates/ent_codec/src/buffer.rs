//! Growable byte buffer shared by all encoders.

use std::io;
use std::ops::{Deref, DerefMut};

/// Minimum capacity allocated the first time an empty buffer grows.
const MIN_AUTO_INIT_SIZE: usize = 64;

/// A byte buffer with amortized doubling growth.
///
/// Besides plain appends it offers [`Buffer::grow`], which extends the length
/// by `n` zeroed bytes and returns the offset where the caller should write.
/// Fixed-width integer writers use this to fill bytes in place.
///
/// # Example
///
/// ```
/// use ent_codec::Buffer;
///
/// let mut buf = Buffer::new();
/// buf.write_str("id");
/// let at = buf.grow(2);
/// buf[at..at + 2].copy_from_slice(&7u16.to_be_bytes());
/// assert_eq!(buf.as_bytes(), b"id\x00\x07");
/// ```
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    /// Creates an empty buffer without allocating.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a buffer with `capacity` bytes preallocated.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Truncates the buffer to zero length, keeping its allocation.
    pub fn reset(&mut self) {
        self.data.clear();
    }

    /// Appends `bytes` and returns the offset where they start.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let at = self.grow(bytes.len());
        self.data[at..].copy_from_slice(bytes);
        at
    }

    /// Appends the UTF-8 bytes of `s`.
    pub fn write_str(&mut self, s: &str) {
        self.write(s.as_bytes());
    }

    /// Appends a single byte.
    pub fn write_byte(&mut self, b: u8) {
        self.ensure_spare(1);
        self.data.push(b);
    }

    /// Guarantees room for `n` more bytes without changing the length.
    pub fn reserve(&mut self, n: usize) {
        self.ensure_spare(n);
    }

    /// Extends the length by `n` zeroed bytes and returns the offset of the
    /// first of them.
    pub fn grow(&mut self, n: usize) -> usize {
        self.ensure_spare(n);
        let at = self.data.len();
        self.data.resize(at + n, 0);
        at
    }

    /// Returns the written bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the buffer, returning its bytes.
    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Returns the number of allocated bytes.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Returns the bytes, copying them into a tight allocation when the
    /// buffer's capacity exceeds its length by more than `density_threshold`.
    ///
    /// A threshold of `1.0` or lower always copies.
    #[must_use]
    pub fn dense_bytes(self, density_threshold: f64) -> Vec<u8> {
        let len = self.data.len().max(1) as f64;
        if self.data.capacity() as f64 / len > density_threshold {
            self.data.as_slice().to_vec()
        } else {
            self.data
        }
    }

    fn ensure_spare(&mut self, n: usize) {
        let len = self.data.len();
        let cap = self.data.capacity();
        if n <= cap - len {
            return;
        }
        let target = if cap == 0 && n <= MIN_AUTO_INIT_SIZE {
            MIN_AUTO_INIT_SIZE
        } else {
            2 * cap + n
        };
        self.data.reserve_exact(target - len);
    }
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for Buffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl io::Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Buffer::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl From<Buffer> for Vec<u8> {
    fn from(buf: Buffer) -> Self {
        buf.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_new_is_empty() {
        let buf = Buffer::new();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 0);
    }

    #[test]
    fn buffer_first_growth_uses_minimum_capacity() {
        let mut buf = Buffer::new();
        buf.write_byte(1);
        assert_eq!(buf.capacity(), MIN_AUTO_INIT_SIZE);
    }

    #[test]
    fn buffer_growth_doubles() {
        let mut buf = Buffer::with_capacity(4);
        buf.write(b"abcd");
        buf.write_byte(b'e');
        assert!(buf.capacity() >= 2 * 4 + 1);
        assert_eq!(buf.as_bytes(), b"abcde");
    }

    #[test]
    fn buffer_write_returns_offset() {
        let mut buf = Buffer::new();
        assert_eq!(buf.write(b"hello"), 0);
        assert_eq!(buf.write(b" world"), 5);
        assert_eq!(buf.as_bytes(), b"hello world");
    }

    #[test]
    fn buffer_grow_zero_fills() {
        let mut buf = Buffer::new();
        buf.write_str("x");
        let at = buf.grow(3);
        assert_eq!(at, 1);
        assert_eq!(buf.as_bytes(), b"x\0\0\0");
        buf[at..].copy_from_slice(b"abc");
        assert_eq!(buf.as_bytes(), b"xabc");
    }

    #[test]
    fn buffer_reserve_keeps_length() {
        let mut buf = Buffer::new();
        buf.write_str("ab");
        buf.reserve(100);
        assert_eq!(buf.len(), 2);
        assert!(buf.capacity() >= 102);
    }

    #[test]
    fn buffer_reset_keeps_allocation() {
        let mut buf = Buffer::new();
        buf.write(&[0u8; 40]);
        let cap = buf.capacity();
        buf.reset();
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn buffer_dense_bytes_copies_sparse() {
        let mut buf = Buffer::with_capacity(1024);
        buf.write_str("tiny");
        let bytes = buf.dense_bytes(2.0);
        assert_eq!(bytes, b"tiny");
        assert!(bytes.capacity() < 1024);
    }

    #[test]
    fn buffer_io_write() {
        use std::io::Write as _;
        let mut buf = Buffer::new();
        write!(buf, "{}-{}", 1, 2).unwrap();
        assert_eq!(buf.as_bytes(), b"1-2");
    }
}
