//! UHF reader module driver
//!
//! Protocol stack, bottom-up:
//! - `frame`: wire codec and checksum
//! - `ring_buffer` + `reassembler`: resync-capable frame reassembly
//! - `commands`: typed command set and payload layouts
//! - `decoder`: frame to `ReaderReply` mapping and result strings
//!
//! `RfidReader` owns the transport. Every exchange is strictly
//! request-then-response: stale input is discarded before a command goes
//! out, so a reply can never be confused with leftovers of an earlier one.

pub mod commands;
pub mod constants;
pub mod decoder;
pub mod frame;
pub mod reassembler;
pub mod ring_buffer;

use crate::clock::Clock;
use crate::error::Result;
use crate::transport::Transport;
use commands::ReaderCommand;
use decoder::ReaderReply;
use frame::hex_dump;
use reassembler::{Received, StreamReassembler};
use std::time::Duration;

/// Serial session with the reader module
pub struct RfidReader<T: Transport> {
    transport: T,
    reassembler: StreamReassembler,
    response_timeout: Duration,
    last_tx: Vec<u8>,
    last_rx: Vec<u8>,
}

impl<T: Transport> RfidReader<T> {
    pub fn new(transport: T, response_timeout: Duration) -> Self {
        Self {
            transport,
            reassembler: StreamReassembler::new(),
            response_timeout,
            last_tx: Vec::new(),
            last_rx: Vec::new(),
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Transmit raw bytes after dropping any stale input
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let stale = self.transport.discard_input()? + self.reassembler.buffered();
        if stale > 0 {
            log::debug!("Discarded {} stale bytes before TX", stale);
        }
        self.reassembler.reset();
        self.last_rx.clear();

        log::debug!("TX: {}", hex_dump(bytes));
        self.transport.write_all(bytes)?;
        self.transport.flush()?;
        self.last_tx = bytes.to_vec();
        Ok(())
    }

    pub fn send_command(&mut self, command: &ReaderCommand) -> Result<()> {
        let bytes = command.encode()?;
        self.send(&bytes)
    }

    /// Wait up to `timeout` for the next frame
    pub fn receive(&mut self, clock: &dyn Clock, timeout: Duration) -> Result<Received> {
        let received = self
            .reassembler
            .receive(&mut self.transport, clock, timeout)?;
        match &received {
            Received::Frame(frame) => {
                self.last_rx = frame.encode().unwrap_or_default();
                log::debug!("RX: {}", hex_dump(&self.last_rx));
            }
            Received::Timeout { partial } => {
                self.last_rx = partial.clone();
            }
        }
        Ok(received)
    }

    /// Next decoded reply, `None` on timeout
    pub fn next_reply(&mut self, clock: &dyn Clock, timeout: Duration) -> Result<Option<ReaderReply>> {
        match self.receive(clock, timeout)? {
            Received::Frame(frame) => Ok(Some(ReaderReply::from_frame(&frame))),
            Received::Timeout { .. } => Ok(None),
        }
    }

    /// Send a command and decode its reply
    pub fn execute(&mut self, command: &ReaderCommand, clock: &dyn Clock) -> Result<Option<ReaderReply>> {
        self.send_command(command)?;
        self.next_reply(clock, self.response_timeout)
    }

    /// Send verbatim bytes and decode the reply
    pub fn execute_raw(&mut self, bytes: &[u8], clock: &dyn Clock) -> Result<Option<ReaderReply>> {
        self.send(bytes)?;
        self.next_reply(clock, self.response_timeout)
    }

    /// Last transmitted bytes as "BB 00 .." (empty before the first send)
    pub fn last_tx_hex(&self) -> String {
        hex_dump(&self.last_tx)
    }

    /// Last received frame, or the partial buffer after a timeout
    pub fn last_rx_hex(&self) -> String {
        hex_dump(&self.last_rx)
    }
}
