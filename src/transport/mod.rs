//! Transport layer for I/O abstraction

use crate::error::{Error, Result};

mod mock;
mod serial;
pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Upper bound on reads spent discarding stale input before a command
const MAX_DISCARD_READS: usize = 64;

/// Transport trait for the reader's serial link
pub trait Transport: Send {
    /// Read data into buffer, returns number of bytes read (0 when idle)
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Write data from buffer, returns number of bytes written
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Flush any pending writes (blocking until complete)
    fn flush(&mut self) -> Result<()>;

    /// Check if data is available to read
    fn available(&mut self) -> Result<usize> {
        Ok(0)
    }

    /// Drop everything already received, returns the number of bytes dropped
    fn discard_input(&mut self) -> Result<usize> {
        let mut scratch = [0u8; 256];
        let mut dropped = 0;
        for _ in 0..MAX_DISCARD_READS {
            let n = self.read(&mut scratch)?;
            if n == 0 {
                break;
            }
            dropped += n;
        }
        Ok(dropped)
    }

    /// Write the whole buffer, failing if the link stops accepting bytes
    fn write_all(&mut self, mut data: &[u8]) -> Result<()> {
        while !data.is_empty() {
            let n = self.write(data)?;
            if n == 0 {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "transport accepted no bytes",
                )));
            }
            data = &data[n..];
        }
        Ok(())
    }
}
