//! Fixed-capacity ring buffer for frame reassembly
//!
//! Provides O(1) consume operations instead of O(n) Vec::drain().

/// Fixed-capacity ring buffer with O(1) advance
///
/// Generic const parameter `N` sets buffer capacity.
pub struct RingBuffer<const N: usize = 1024> {
    data: [u8; N],
    head: usize, // Write position (next empty slot)
    tail: usize, // Read position (first valid byte)
    len: usize,  // Number of bytes available
}

impl<const N: usize> RingBuffer<N> {
    /// Create a new empty ring buffer
    pub const fn new() -> Self {
        Self {
            data: [0u8; N],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Append bytes to the buffer, returns how many were accepted
    ///
    /// Callers size their reads with `free()` so nothing is refused.
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let accepted = bytes.len().min(self.free());
        for &b in &bytes[..accepted] {
            self.data[self.head] = b;
            self.head = (self.head + 1) % N;
        }
        self.len += accepted;
        accepted
    }

    /// Consume n bytes from the front
    #[inline]
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % N;
        self.len -= n;
    }

    /// Drop everything
    #[inline]
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Number of bytes available to read
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Space left before the buffer is full
    #[inline]
    pub fn free(&self) -> usize {
        N - self.len
    }

    /// Read byte at logical index (handles wraparound)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.data[(self.tail + index) % N])
        } else {
            None
        }
    }

    /// First occurrence of `byte` at or after logical index `start`
    pub fn find_from(&self, byte: u8, start: usize) -> Option<usize> {
        (start..self.len).find(|&i| self.data[(self.tail + i) % N] == byte)
    }

    /// Copy `len` bytes starting at logical index 0
    pub fn to_vec(&self, len: usize) -> Vec<u8> {
        let len = len.min(self.len);
        (0..len).map(|i| self.data[(self.tail + i) % N]).collect()
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
