//! Runs remote commands on the reader

use super::RemoteCommand;
use super::command_text::{self, DeviceCommand};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::reader::RfidReader;
use crate::reader::commands::ReaderCommand;
use crate::reader::decoder::ReaderReply;
use crate::transport::Transport;
use rand::Rng;
use std::time::Duration;

/// Result string when the module never answers
pub const TIMEOUT_RESULT: &str = "Error: Timeout";

/// Single polls attempted by the smart poll
pub const SMART_POLL_ATTEMPTS: u32 = 10;

const SMART_POLL_PAUSE: Duration = Duration::from_millis(100);
const SETTLE_DELAY: Duration = Duration::from_millis(50);
/// Session S1, Q=1
const SMART_QUERY_Q1: u16 = 0x1101;
/// Session S1, Q=0
const SMART_QUERY_Q0: u16 = 0x1100;
const SMART_CHANNELS: std::ops::Range<u8> = 0..19;

/// Outcome of one remote command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    /// Short result string, e.g. `SetPower: Success`
    pub result: String,
    /// `CMD: ..\nTX: ..\nRX: ..\nResult: ..`
    pub debug: String,
}

/// Executes one command row; never fails, errors become result strings
pub trait CommandExecutor {
    fn execute(&mut self, command: &RemoteCommand) -> Execution;
}

/// Executor backed by the serial reader
pub struct ReaderExecutor<'a, T: Transport, R: Rng> {
    reader: &'a mut RfidReader<T>,
    clock: &'a dyn Clock,
    rng: &'a mut R,
}

impl<'a, T: Transport, R: Rng> ReaderExecutor<'a, T, R> {
    pub fn new(reader: &'a mut RfidReader<T>, clock: &'a dyn Clock, rng: &'a mut R) -> Self {
        Self { reader, clock, rng }
    }

    fn run(&mut self, text: &str) -> Result<String> {
        match command_text::parse(text)? {
            DeviceCommand::Reader(cmd) => {
                let reply = self.reader.execute(&cmd, self.clock)?;
                Ok(describe(reply))
            }
            DeviceCommand::RawFrame(bytes) => {
                let reply = self.reader.execute_raw(&bytes, self.clock)?;
                Ok(describe(reply))
            }
            DeviceCommand::SmartPoll => self.smart_poll(),
        }
    }

    /// Single polls until a tag answers, widening the search on repeated misses
    fn smart_poll(&mut self) -> Result<String> {
        let mut misses = 0;
        let mut last = String::new();

        for attempt in 0..SMART_POLL_ATTEMPTS {
            log::debug!("Smart poll attempt {}", attempt + 1);
            let reply = self.reader.execute(&ReaderCommand::InventorySingle, self.clock)?;
            match reply {
                Some(reply) if reply.is_no_tag() => {
                    last = reply.to_string();
                    misses += 1;
                }
                other => return Ok(describe(other)),
            }

            if misses == 3 {
                log::info!("Smart poll: query Q=1");
                self.adjust(ReaderCommand::SetQuery { bits: SMART_QUERY_Q1 })?;
            }
            if misses == 6 {
                let channel = self.rng.gen_range(SMART_CHANNELS);
                log::info!("Smart poll: query Q=0, channel {}", channel);
                self.adjust(ReaderCommand::SetQuery { bits: SMART_QUERY_Q0 })?;
                self.adjust(ReaderCommand::SetChannel(channel))?;
            }
            self.clock.sleep(SMART_POLL_PAUSE);
        }

        log::info!("Smart poll gave up after {} attempts ({})", SMART_POLL_ATTEMPTS, last);
        Ok("Error: Timeout (Max Retries)".to_string())
    }

    fn adjust(&mut self, command: ReaderCommand) -> Result<()> {
        match self.reader.execute(&command, self.clock)? {
            Some(reply) => log::debug!("Smart poll adjust: {}", reply),
            None => log::warn!("Smart poll adjust {:02X}: no response", command.code()),
        }
        self.clock.sleep(SETTLE_DELAY);
        Ok(())
    }
}

impl<T: Transport, R: Rng> CommandExecutor for ReaderExecutor<'_, T, R> {
    fn execute(&mut self, command: &RemoteCommand) -> Execution {
        log::info!("Executing command {}: {}", command.id, command.text);

        let (result, tx, rx) = match self.run(&command.text) {
            Ok(result) => (result, self.reader.last_tx_hex(), self.reader.last_rx_hex()),
            // Nothing was sent
            Err(Error::CommandParse(e)) => (format!("Error: {}", e), String::new(), String::new()),
            Err(e) => (
                format!("Error: {}", e),
                self.reader.last_tx_hex(),
                self.reader.last_rx_hex(),
            ),
        };

        log::info!("Command {} result: {}", command.id, result);
        let debug = format!(
            "CMD: {}\nTX: {}\nRX: {}\nResult: {}",
            command.text.trim(),
            tx,
            rx,
            result
        );
        Execution { result, debug }
    }
}

fn describe(reply: Option<ReaderReply>) -> String {
    match reply {
        Some(reply) => reply.to_string(),
        None => TIMEOUT_RESULT.to_string(),
    }
}
