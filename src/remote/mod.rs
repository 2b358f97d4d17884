//! Remote command queue and backend interfaces
//!
//! The backend is a table of command rows with increasing ids. The cursor
//! pulls pending rows, runs each one on the reader at most once, and writes
//! a result string back. The presence tracker pushes tag status and play
//! sessions through the sink traits in `presence`.
//!
//! - `command_text`: command text grammar
//! - `cursor`: at-most-once execution with skip marking
//! - `dispatch`: runs parsed commands on the reader
//! - `rest`: PostgREST-style HTTP backend
//! - `memory`: in-memory backend for tests and dry runs

pub mod command_text;
pub mod cursor;
pub mod dispatch;
pub mod memory;
pub mod rest;

pub use cursor::{RemoteCommandCursor, TickReport};
pub use dispatch::{CommandExecutor, Execution, ReaderExecutor};

use crate::error::Result;
use crate::presence::PresenceSink;

/// Result text written to rows delivered at or below the cursor
pub const SKIPPED_RESULT: &str = "Skipped (Old)";

/// One pending command row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    pub id: i64,
    pub text: String,
}

impl RemoteCommand {
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// Command queue operations the cursor relies on
pub trait CommandQueue {
    /// Highest command id for this device, `None` if it has none
    fn latest_command_id(&mut self) -> Result<Option<i64>>;

    /// Pending commands with id greater than `after`, ascending, at most `limit`
    fn pending_after(&mut self, after: i64, limit: u32) -> Result<Vec<RemoteCommand>>;

    /// Write the result onto the command row, returns affected rows
    fn mark_result(&mut self, id: i64, result: &str, debug: &str) -> Result<usize>;

    /// Mark a stale delivery as skipped, returns affected rows
    fn mark_skipped(&mut self, id: i64, reason: &str) -> Result<usize>;

    /// Insert a separate result row pointing back at `reference_id`
    fn insert_result(&mut self, reference_id: i64, result: &str, debug: &str) -> Result<()>;
}

/// Periodic liveness report
pub trait HeartbeatSink {
    /// `unix_time` is `None` while the wall clock is not synchronized
    fn heartbeat(&mut self, unix_time: Option<u64>) -> Result<()>;
}

/// Everything the control loop talks to
pub trait Backend: CommandQueue + PresenceSink + HeartbeatSink {}

impl<T: CommandQueue + PresenceSink + HeartbeatSink + ?Sized> Backend for T {}
