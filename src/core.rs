//! Data types and defaults shared by the transport layer and the polling
//! state machine.
//!
//! Nothing here allocates: response payloads live in a fixed-capacity buffer
//! sized by [`MAX_RESPONSE_BYTES`].

/// Capacity of a single response buffer. Raw frames (PCI bytes included) are
/// accumulated as received, so this bounds the largest reply one PID can produce.
pub const MAX_RESPONSE_BYTES: usize = 128;

/// Minimum delay between two polls of the same PID (ms).
pub const DEFAULT_POLL_INTERVAL_MS: u32 = 5_000;

/// Maximum wait for a complete reply once a request has been sent (ms).
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u32 = 500;

/// Byte count that marks a reply as complete when none is configured.
pub const DEFAULT_REPLY_LENGTH: usize = 8;

/// Cadence of the scheduler tick driven by the supervisor loop (ms).
pub const DEFAULT_UPDATE_INTERVAL_MS: u32 = 500;

/// Ordered bytes gathered for one polling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseBytes {
    len: usize,
    overflowed: bool,
    data: [u8; MAX_RESPONSE_BYTES],
}

impl Default for ResponseBytes {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseBytes {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            len: 0,
            overflowed: false,
            data: [0; MAX_RESPONSE_BYTES],
        }
    }

    /// Number of valid bytes stored.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Checks whether the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of bytes the buffer can hold.
    #[inline]
    pub const fn capacity(&self) -> usize {
        MAX_RESPONSE_BYTES
    }

    /// `true` once a byte had to be dropped because the buffer was full.
    /// Latched until the next [`clear`](Self::clear).
    #[inline]
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    /// Reset the buffer for a new polling cycle.
    #[inline]
    pub fn clear(&mut self) {
        self.len = 0;
        self.overflowed = false;
    }

    /// Append one byte. Returns `false` (and latches the overflow flag) when full.
    #[inline]
    pub fn push(&mut self, byte: u8) -> bool {
        if self.len >= MAX_RESPONSE_BYTES {
            self.overflowed = true;
            return false;
        }
        self.data[self.len] = byte;
        self.len += 1;
        true
    }

    /// Append as many bytes as fit and return how many were stored.
    pub fn extend_from_slice(&mut self, bytes: &[u8]) -> usize {
        let free = MAX_RESPONSE_BYTES - self.len;
        let copied = bytes.len().min(free);
        self.data[self.len..self.len + copied].copy_from_slice(&bytes[..copied]);
        self.len += copied;
        if copied < bytes.len() {
            self.overflowed = true;
        }
        copied
    }

    /// Immutable view over the populated bytes.
    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }
}
