//! Receive buffer for raw transport bytes

use bytes::{Bytes, BytesMut};

/// Bytes received but not yet parsed, in arrival order.
///
/// Bytes are only ever removed from the front, and only once a complete
/// frame has been recognized.
#[derive(Debug, Default)]
pub struct ByteIngestBuffer {
    inner: BytesMut,
}

impl ByteIngestBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes at the tail
    pub fn extend(&mut self, data: &[u8]) {
        self.inner.extend_from_slice(data);
    }

    /// Make room for at least `additional` more bytes
    pub fn reserve(&mut self, additional: usize) {
        self.inner.reserve(additional);
    }

    /// View of the unparsed bytes
    pub fn peek(&self) -> &[u8] {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Remove the first `len` bytes, returning them without copying
    pub fn split_front(&mut self, len: usize) -> Bytes {
        self.inner.split_to(len).freeze()
    }

    /// Drop `len` bytes from the front
    pub fn advance(&mut self, len: usize) {
        let _ = self.inner.split_to(len);
    }

    /// Discard everything, releasing the backing allocation
    pub fn clear(&mut self) {
        self.inner = BytesMut::new();
    }
}
