//! Remote command cursor
//!
//! Tracks the highest command id this device has executed. Commands run
//! at most once: the cursor advances before the result is reported, so a
//! lost report never causes a second execution. Rows delivered at or
//! below the cursor are marked skipped instead of being run again.
//!
//! On the first tick after boot the cursor jumps to the newest existing
//! command, discarding any backlog queued while the device was offline.

use super::{CommandExecutor, CommandQueue, RemoteCommand, SKIPPED_RESULT};
use crate::error::Result;

/// Default pending commands fetched per tick
pub const DEFAULT_BATCH_SIZE: u32 = 10;

/// What one tick did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// The cursor was initialized this tick (nothing executed)
    pub bootstrapped: bool,
    pub fetched: usize,
    pub executed: usize,
    pub skipped: usize,
    /// Results delivered as new rows after a filtered update
    pub fallback_inserts: usize,
}

pub struct RemoteCommandCursor {
    last_executed: Option<i64>,
    batch_size: u32,
}

impl RemoteCommandCursor {
    pub fn new(batch_size: u32) -> Self {
        Self {
            last_executed: None,
            batch_size: batch_size.max(1),
        }
    }

    /// Highest executed id, `None` until bootstrapped
    pub fn position(&self) -> Option<i64> {
        self.last_executed
    }

    /// One poll of the queue
    ///
    /// Errors are only returned when the queue itself cannot be read; the
    /// cursor is then left untouched and the next tick retries.
    pub fn tick(
        &mut self,
        queue: &mut dyn CommandQueue,
        executor: &mut dyn CommandExecutor,
    ) -> Result<TickReport> {
        let mut report = TickReport::default();

        let Some(cursor) = self.last_executed else {
            let latest = queue.latest_command_id()?.unwrap_or(0);
            log::info!("Command cursor initialized at {}", latest);
            self.last_executed = Some(latest);
            report.bootstrapped = true;
            return Ok(report);
        };

        let commands = queue.pending_after(cursor, self.batch_size)?;
        report.fetched = commands.len();

        for command in commands {
            if self.already_handled(&command) {
                log::warn!(
                    "Command {} redelivered (cursor at {:?}), marking skipped",
                    command.id,
                    self.last_executed
                );
                match queue.mark_skipped(command.id, SKIPPED_RESULT) {
                    Ok(_) => report.skipped += 1,
                    Err(e) => log::warn!("Marking command {} skipped failed: {}", command.id, e),
                }
                continue;
            }

            let execution = executor.execute(&command);
            self.last_executed = Some(command.id);
            report.executed += 1;

            match queue.mark_result(command.id, &execution.result, &execution.debug) {
                Ok(0) => {
                    log::warn!(
                        "Result update for command {} matched no rows, inserting result row",
                        command.id
                    );
                    match queue.insert_result(command.id, &execution.result, &execution.debug) {
                        Ok(()) => report.fallback_inserts += 1,
                        Err(e) => log::warn!("Result insert for command {} failed: {}", command.id, e),
                    }
                }
                Ok(_) => log::debug!("Command {} reported", command.id),
                Err(e) => log::warn!("Reporting command {} failed: {}", command.id, e),
            }
        }

        Ok(report)
    }

    fn already_handled(&self, command: &RemoteCommand) -> bool {
        match self.last_executed {
            Some(cursor) => command.id <= cursor,
            None => false,
        }
    }
}

impl Default for RemoteCommandCursor {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::Execution;
    use crate::remote::memory::{MemoryBackend, PENDING};

    /// Echoes the command text and records what ran
    #[derive(Default)]
    struct Recorder {
        ran: Vec<i64>,
    }

    impl CommandExecutor for Recorder {
        fn execute(&mut self, command: &RemoteCommand) -> Execution {
            self.ran.push(command.id);
            Execution {
                result: format!("ran {}", command.text),
                debug: format!("CMD: {}", command.text),
            }
        }
    }

    fn bootstrapped(backend: &mut MemoryBackend, executor: &mut Recorder) -> RemoteCommandCursor {
        let mut cursor = RemoteCommandCursor::default();
        let report = cursor.tick(backend, executor).unwrap();
        assert!(report.bootstrapped);
        cursor
    }

    #[test]
    fn test_bootstrap_discards_backlog() {
        let mut backend = MemoryBackend::new();
        backend.push_command_with_id(41, "RFID_INFO");
        backend.push_command_with_id(42, "RFID_POWER_GET");
        let mut executor = Recorder::default();

        let mut cursor = bootstrapped(&mut backend, &mut executor);
        assert_eq!(cursor.position(), Some(42));

        let report = cursor.tick(&mut backend, &mut executor).unwrap();
        assert_eq!(report.fetched, 0);
        assert!(executor.ran.is_empty());
        assert_eq!(backend.row(42).unwrap().status, PENDING);
    }

    #[test]
    fn test_bootstrap_on_empty_queue() {
        let mut backend = MemoryBackend::new();
        let mut executor = Recorder::default();

        let mut cursor = bootstrapped(&mut backend, &mut executor);
        assert_eq!(cursor.position(), Some(0));

        let id = backend.push_command("RFID_INFO");
        cursor.tick(&mut backend, &mut executor).unwrap();
        assert_eq!(executor.ran, vec![id]);
    }

    #[test]
    fn test_bootstrap_failure_retries() {
        let mut backend = MemoryBackend::new();
        let mut executor = Recorder::default();
        let mut cursor = RemoteCommandCursor::default();

        backend.set_fail_queue(true);
        assert!(cursor.tick(&mut backend, &mut executor).is_err());
        assert_eq!(cursor.position(), None);

        backend.set_fail_queue(false);
        assert!(cursor.tick(&mut backend, &mut executor).unwrap().bootstrapped);
    }

    #[test]
    fn test_executes_in_order_and_reports() {
        let mut backend = MemoryBackend::new();
        let mut executor = Recorder::default();
        let mut cursor = bootstrapped(&mut backend, &mut executor);

        let a = backend.push_command("A");
        let b = backend.push_command("B");
        let report = cursor.tick(&mut backend, &mut executor).unwrap();

        assert_eq!(report.executed, 2);
        assert_eq!(executor.ran, vec![a, b]);
        assert_eq!(cursor.position(), Some(b));
        assert_eq!(backend.row(a).unwrap().status, "ran A");
        assert_eq!(backend.row(b).unwrap().debug, "CMD: B");
    }

    #[test]
    fn test_batch_size_caps_fetch() {
        let mut backend = MemoryBackend::new();
        let mut executor = Recorder::default();
        let mut cursor = RemoteCommandCursor::new(2);
        cursor.tick(&mut backend, &mut executor).unwrap();

        for text in ["A", "B", "C"] {
            backend.push_command(text);
        }
        assert_eq!(cursor.tick(&mut backend, &mut executor).unwrap().executed, 2);
        assert_eq!(cursor.tick(&mut backend, &mut executor).unwrap().executed, 1);
    }

    #[test]
    fn test_silent_filter_falls_back_to_insert() {
        let mut backend = MemoryBackend::new();
        let mut executor = Recorder::default();
        let mut cursor = bootstrapped(&mut backend, &mut executor);

        let id = backend.push_command("RFID_POWER_GET");
        backend.set_silent_filter(id);
        let report = cursor.tick(&mut backend, &mut executor).unwrap();

        assert_eq!(report.fallback_inserts, 1);
        let inserted = &backend.inserted_results()[0];
        assert_eq!(inserted.reference_id, id);
        assert_eq!(inserted.result, "ran RFID_POWER_GET");
        // Row still pending, but the cursor moved past it
        assert_eq!(cursor.position(), Some(id));
        assert_eq!(cursor.tick(&mut backend, &mut executor).unwrap().fetched, 0);
        assert_eq!(executor.ran, vec![id]);
    }

    #[test]
    fn test_redelivered_command_is_skipped_not_rerun() {
        let mut backend = MemoryBackend::new();
        let mut executor = Recorder::default();
        let mut cursor = bootstrapped(&mut backend, &mut executor);

        let id = backend.push_command("RFID_POLL_SINGLE");
        cursor.tick(&mut backend, &mut executor).unwrap();
        backend.redeliver(id);

        let report = cursor.tick(&mut backend, &mut executor).unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.executed, 0);
        assert_eq!(executor.ran, vec![id]);
        assert_eq!(backend.row(id).unwrap().status, SKIPPED_RESULT);
    }

    #[test]
    fn test_report_failure_keeps_cursor() {
        let mut backend = MemoryBackend::new();
        let mut executor = Recorder::default();
        let mut cursor = bootstrapped(&mut backend, &mut executor);

        let id = backend.push_command("RFID_INFO");
        backend.set_fail_reports(true);
        let report = cursor.tick(&mut backend, &mut executor).unwrap();
        assert_eq!(report.executed, 1);
        assert_eq!(cursor.position(), Some(id));

        // Row is still pending, but it is never run twice
        backend.set_fail_reports(false);
        assert_eq!(cursor.tick(&mut backend, &mut executor).unwrap().fetched, 0);
        assert_eq!(executor.ran, vec![id]);
    }
}
