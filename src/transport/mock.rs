//! Mock transport for testing
//!
//! Bytes can be made readable immediately (`inject_read`) or scripted as
//! replies that only appear after the next write (`queue_reply`). The
//! second form survives the input discard the reader performs before every
//! command, which is how a real module behaves.

use super::Transport;
use crate::error::Result;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Mock transport for unit testing
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    replies: VecDeque<Vec<u8>>,
    chunk_size: Option<usize>,
    fail_writes: bool,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                replies: VecDeque::new(),
                chunk_size: None,
                fail_writes: false,
            })),
        }
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Script bytes that become readable after the next write
    pub fn queue_reply(&self, data: &[u8]) {
        self.inner.lock().replies.push_back(data.to_vec());
    }

    /// Limit every read to at most `size` bytes
    pub fn set_chunk_size(&self, size: usize) {
        self.inner.lock().chunk_size = Some(size.max(1));
    }

    /// Make every subsequent write fail with a broken pipe
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Clear written data
    pub fn clear_written(&self) {
        self.inner.lock().write_buffer.clear();
    }

    /// Bytes injected but not yet read
    pub fn unread(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }
}

impl Transport for MockTransport {
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let limit = inner.chunk_size.unwrap_or(buffer.len());
        let available = inner.read_buffer.len().min(buffer.len()).min(limit);

        for (slot, byte) in buffer
            .iter_mut()
            .zip(inner.read_buffer.drain(..available))
        {
            *slot = byte;
        }

        Ok(available)
    }

    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "mock write failure").into());
        }
        inner.write_buffer.extend_from_slice(data);
        if let Some(reply) = inner.replies.pop_front() {
            inner.read_buffer.extend(reply);
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn available(&mut self) -> Result<usize> {
        Ok(self.inner.lock().read_buffer.len())
    }

    fn discard_input(&mut self) -> Result<usize> {
        let mut inner = self.inner.lock();
        let dropped = inner.read_buffer.len();
        inner.read_buffer.clear();
        Ok(dropped)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_released_on_write() {
        let mut mock = MockTransport::new();
        mock.queue_reply(&[0xBB, 0x01]);

        let mut buf = [0u8; 8];
        assert_eq!(mock.read(&mut buf).unwrap(), 0);

        mock.write(&[0x00]).unwrap();
        assert_eq!(mock.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[0xBB, 0x01]);
        assert_eq!(mock.get_written(), vec![0x00]);
    }

    #[test]
    fn test_chunked_reads() {
        let mut mock = MockTransport::new();
        mock.set_chunk_size(1);
        mock.inject_read(&[1, 2, 3]);

        let mut buf = [0u8; 8];
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 1);
        assert_eq!(mock.unread(), 2);
    }

    #[test]
    fn test_discard_input() {
        let mut mock = MockTransport::new();
        mock.inject_read(&[1, 2, 3]);
        assert_eq!(mock.discard_input().unwrap(), 3);
        assert_eq!(mock.unread(), 0);
    }
}
