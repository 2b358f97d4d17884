//! Stream reassembler
//!
//! Turns the noisy serial byte stream into validated frames. Three states:
//!
//! - `SeekHeader`: drop bytes until 0xBB
//! - `ReadLength`: wait for 5 bytes, then derive the total frame length
//! - `ReadBody`: wait for the full frame, check the end byte and checksum
//!
//! Any failure (oversize length, wrong end byte, bad checksum) triggers a
//! resync: look for another 0xBB after the current candidate header and
//! restart from there, or drop everything if there is none. Bytes beyond
//! the current frame stay buffered, so a burst of notifications from a
//! multi-inventory is read as consecutive frames.

use super::constants::{FRAME_END, FRAME_HEADER, FRAME_OVERHEAD, LENGTH_FIELD_END, MAX_FRAME_SIZE};
use super::frame::Frame;
use super::ring_buffer::RingBuffer;
use crate::clock::Clock;
use crate::error::Result;
use crate::transport::Transport;
use std::time::Duration;

/// Default per-call wait for a complete frame
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);

/// Sleep between empty reads
const IDLE_SLICE: Duration = Duration::from_millis(2);

/// Bytes requested from the transport per read
const READ_CHUNK: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SeekHeader,
    ReadLength,
    ReadBody { expected: usize },
}

/// Outcome of a bounded wait for a frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    Frame(Frame),
    /// No complete frame before the deadline; `partial` is for diagnostics only
    Timeout { partial: Vec<u8> },
}

/// Resync-capable frame reassembler
pub struct StreamReassembler {
    buffer: RingBuffer<1024>,
    state: State,
    max_frame_size: usize,
    resyncs: u64,
    dropped: u64,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self::with_max_frame_size(MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: RingBuffer::new(),
            state: State::SeekHeader,
            max_frame_size: max_frame_size.clamp(FRAME_OVERHEAD, 1024),
            resyncs: 0,
            dropped: 0,
        }
    }

    /// Forget any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = State::SeekHeader;
    }

    /// Number of resyncs since creation
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    /// Bytes discarded as garbage since creation
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped
    }

    /// Bytes currently held
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Feed bytes directly, returns how many were accepted
    pub fn push(&mut self, bytes: &[u8]) -> usize {
        self.buffer.extend(bytes)
    }

    /// One non-blocking step: extract a buffered frame, else read once
    pub fn poll<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Option<Frame>> {
        if let Some(frame) = self.next_frame() {
            return Ok(Some(frame));
        }

        let mut chunk = [0u8; READ_CHUNK];
        let want = self.buffer.free().min(READ_CHUNK);
        let n = transport.read(&mut chunk[..want])?;
        if n == 0 {
            return Ok(None);
        }
        log::trace!("RX chunk: {} bytes", n);
        self.buffer.extend(&chunk[..n]);

        Ok(self.next_frame())
    }

    /// Wait up to `timeout` for the next complete frame
    pub fn receive<T: Transport + ?Sized>(
        &mut self,
        transport: &mut T,
        clock: &dyn Clock,
        timeout: Duration,
    ) -> Result<Received> {
        let deadline = clock.now() + timeout;
        loop {
            if let Some(frame) = self.poll(transport)? {
                return Ok(Received::Frame(frame));
            }
            if clock.now() >= deadline {
                let partial = self.buffer.to_vec(self.buffer.len());
                if !partial.is_empty() {
                    log::debug!("Receive timeout with {} partial bytes", partial.len());
                }
                return Ok(Received::Timeout { partial });
            }
            clock.sleep(IDLE_SLICE);
        }
    }

    /// Run the state machine over buffered bytes
    pub fn next_frame(&mut self) -> Option<Frame> {
        loop {
            match self.state {
                State::SeekHeader => match self.buffer.find_from(FRAME_HEADER, 0) {
                    Some(index) => {
                        self.discard(index);
                        self.state = State::ReadLength;
                    }
                    None => {
                        let len = self.buffer.len();
                        self.discard(len);
                        return None;
                    }
                },
                State::ReadLength => {
                    if self.buffer.len() < LENGTH_FIELD_END {
                        return None;
                    }
                    let hi = self.buffer.get(3).unwrap_or(0);
                    let lo = self.buffer.get(4).unwrap_or(0);
                    let expected = FRAME_OVERHEAD + u16::from_be_bytes([hi, lo]) as usize;
                    if expected > self.max_frame_size {
                        log::warn!(
                            "Frame length {} exceeds maximum {}, resyncing",
                            expected,
                            self.max_frame_size
                        );
                        self.resync();
                        continue;
                    }
                    self.state = State::ReadBody { expected };
                }
                State::ReadBody { expected } => {
                    if self.buffer.len() < expected {
                        if self.buffer.free() == 0 {
                            log::warn!("Reassembly buffer full, resetting");
                            self.reset();
                        }
                        return None;
                    }
                    if self.buffer.get(expected - 1) != Some(FRAME_END) {
                        log::warn!("Invalid end byte, resyncing");
                        self.resync();
                        continue;
                    }
                    let bytes = self.buffer.to_vec(expected);
                    match Frame::decode(&bytes) {
                        Ok(frame) => {
                            self.buffer.advance(expected);
                            self.state = State::SeekHeader;
                            return Some(frame);
                        }
                        Err(e) => {
                            log::warn!("{}, resyncing", e);
                            self.resync();
                        }
                    }
                }
            }
        }
    }

    /// Restart at the next header after index 0, or drop everything
    fn resync(&mut self) {
        self.resyncs += 1;
        match self.buffer.find_from(FRAME_HEADER, 1) {
            Some(index) => {
                self.discard(index);
                self.state = State::ReadLength;
            }
            None => {
                let len = self.buffer.len();
                self.discard(len);
                self.state = State::SeekHeader;
            }
        }
    }

    fn discard(&mut self, n: usize) {
        if n > 0 {
            log::trace!("Discarding {} bytes", n);
            self.dropped += n as u64;
            self.buffer.advance(n);
        }
    }
}

impl Default for StreamReassembler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::reader::commands::ReaderCommand;
    use crate::reader::frame::FrameType;
    use crate::transport::MockTransport;

    fn power_response() -> Vec<u8> {
        vec![0xBB, 0x01, 0xB7, 0x00, 0x02, 0x07, 0xD0, 0x91, 0x7E]
    }

    fn tag_notification() -> Vec<u8> {
        let payload = vec![0xC8, 0x30, 0x00, 0xE2, 0x00, 0x12, 0x34, 0xAB, 0xCD];
        Frame::new(FrameType::Notification, 0x22, payload)
            .encode()
            .unwrap()
    }

    #[test]
    fn test_single_frame() {
        let mut r = StreamReassembler::new();
        r.push(&power_response());
        let frame = r.next_frame().unwrap();
        assert_eq!(frame.command, 0xB7);
        assert_eq!(frame.payload, vec![0x07, 0xD0]);
        assert!(r.next_frame().is_none());
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn test_leading_garbage() {
        for garbage_len in [1usize, 7, 64, 300] {
            let mut r = StreamReassembler::new();
            let garbage: Vec<u8> = (0..garbage_len).map(|i| (i % 0xBB) as u8).collect();
            r.push(&garbage);
            r.push(&power_response());
            let frame = r.next_frame().expect("frame after garbage");
            assert_eq!(frame.command, 0xB7);
            assert_eq!(r.dropped_bytes(), garbage_len as u64);
        }
    }

    #[test]
    fn test_false_header_with_oversize_length() {
        let mut r = StreamReassembler::new();
        // Stray 0xBB whose "length" is 0xFFFF
        r.push(&[0xBB, 0x00, 0x00, 0xFF, 0xFF]);
        r.push(&power_response());
        let frame = r.next_frame().unwrap();
        assert_eq!(frame.command, 0xB7);
        assert_eq!(r.resyncs(), 1);
    }

    #[test]
    fn test_bad_end_byte_resyncs() {
        let mut r = StreamReassembler::new();
        let mut broken = power_response();
        broken[8] = 0x00;
        r.push(&broken);
        r.push(&power_response());
        let frame = r.next_frame().unwrap();
        assert_eq!(frame.payload, vec![0x07, 0xD0]);
        assert!(r.resyncs() >= 1);
    }

    #[test]
    fn test_checksum_failure_then_valid_frame() {
        let mut r = StreamReassembler::new();
        let mut corrupt = tag_notification();
        let n = corrupt.len();
        corrupt[n - 2] ^= 0xFF;
        r.push(&corrupt);
        r.push(&power_response());
        let frame = r.next_frame().unwrap();
        assert_eq!(frame.command, 0xB7);
    }

    #[test]
    fn test_consecutive_frames() {
        let mut r = StreamReassembler::new();
        let mut burst = tag_notification();
        burst.extend(tag_notification());
        burst.extend(power_response());
        r.push(&burst);

        assert_eq!(r.next_frame().unwrap().command, 0x22);
        assert_eq!(r.next_frame().unwrap().command, 0x22);
        assert_eq!(r.next_frame().unwrap().command, 0xB7);
        assert!(r.next_frame().is_none());
    }

    #[test]
    fn test_split_delivery() {
        let clock = ManualClock::default();
        let mut mock = MockTransport::new();
        mock.set_chunk_size(1);
        mock.inject_read(&[0x00, 0x11]);
        mock.inject_read(&power_response());

        let mut r = StreamReassembler::new();
        match r.receive(&mut mock, &clock, DEFAULT_TIMEOUT).unwrap() {
            Received::Frame(frame) => assert_eq!(frame.command, 0xB7),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_timeout_keeps_partial() {
        let clock = ManualClock::default();
        let mut mock = MockTransport::new();
        mock.inject_read(&[0xBB, 0x01, 0xB7]);

        let mut r = StreamReassembler::new();
        let result = r.receive(&mut mock, &clock, DEFAULT_TIMEOUT).unwrap();
        assert_eq!(
            result,
            Received::Timeout {
                partial: vec![0xBB, 0x01, 0xB7]
            }
        );
        assert!(clock.elapsed() >= DEFAULT_TIMEOUT);

        r.reset();
        assert_eq!(r.buffered(), 0);
    }

    #[test]
    fn test_max_size_frame_accepted() {
        let mut r = StreamReassembler::new();
        let bytes = ReaderCommand::WriteData {
            access: crate::reader::commands::MemoryAccess {
                access_password: 0,
                bank: 3,
                start: 0,
                words: 0,
            },
            data: vec![0x55; MAX_FRAME_SIZE - FRAME_OVERHEAD - 9],
        }
        .encode()
        .unwrap();
        assert_eq!(bytes.len(), MAX_FRAME_SIZE);
        r.push(&bytes);
        assert_eq!(r.next_frame().unwrap().payload.len(), MAX_FRAME_SIZE - FRAME_OVERHEAD);
    }
}
