//! In-memory backend
//!
//! Implements every queue and sink trait over plain collections and
//! records each call. Failure knobs let tests exercise the retry paths:
//! an unreachable queue, rejected status pushes, and "silent filter"
//! rows whose updates affect nothing.

use super::{CommandQueue, HeartbeatSink, RemoteCommand};
use crate::error::{Error, Result};
use crate::presence::{PlaySession, PlaySessionSink, StatusSink, TagStatus};
use std::collections::{BTreeMap, HashSet};

/// Status of a command row that has not been handled yet
pub const PENDING: &str = "PENDING";

/// A command row as stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRow {
    pub text: String,
    pub status: String,
    pub debug: String,
}

/// Result row inserted when an in-place update was filtered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertedResult {
    pub reference_id: i64,
    pub result: String,
    pub debug: String,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: BTreeMap<i64, CommandRow>,
    next_id: i64,
    inserted: Vec<InsertedResult>,
    /// Rows whose updates report zero affected rows
    silent: HashSet<i64>,
    /// Rows returned by the next pending query regardless of status
    redeliveries: Vec<RemoteCommand>,
    fail_queue: bool,
    fail_reports: bool,
    fail_status: bool,
    fail_sessions: bool,
    status_calls: Vec<(String, TagStatus)>,
    status_attempts: usize,
    play_sessions: Vec<PlaySession>,
    heartbeats: Vec<Option<u64>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            ..Default::default()
        }
    }

    /// Queue a pending command, returns its id
    pub fn push_command(&mut self, text: &str) -> i64 {
        let id = self.next_id;
        self.push_command_with_id(id, text);
        id
    }

    pub fn push_command_with_id(&mut self, id: i64, text: &str) {
        self.rows.insert(
            id,
            CommandRow {
                text: text.to_string(),
                status: PENDING.to_string(),
                debug: String::new(),
            },
        );
        self.next_id = self.next_id.max(id + 1);
    }

    pub fn row(&self, id: i64) -> Option<&CommandRow> {
        self.rows.get(&id)
    }

    /// Updates to `id` will silently affect nothing
    pub fn set_silent_filter(&mut self, id: i64) {
        self.silent.insert(id);
    }

    /// Deliver `id` once more on the next pending query
    pub fn redeliver(&mut self, id: i64) {
        if let Some(row) = self.rows.get(&id) {
            self.redeliveries.push(RemoteCommand::new(id, row.text.clone()));
        }
    }

    pub fn set_fail_queue(&mut self, fail: bool) {
        self.fail_queue = fail;
    }

    /// Result updates and inserts fail, reads still work
    pub fn set_fail_reports(&mut self, fail: bool) {
        self.fail_reports = fail;
    }

    pub fn set_fail_status(&mut self, fail: bool) {
        self.fail_status = fail;
    }

    pub fn set_fail_sessions(&mut self, fail: bool) {
        self.fail_sessions = fail;
    }

    pub fn inserted_results(&self) -> &[InsertedResult] {
        &self.inserted
    }

    /// Accepted status pushes, in order
    pub fn status_calls(&self) -> Vec<(String, TagStatus)> {
        self.status_calls.clone()
    }

    /// Every status push, including rejected ones
    pub fn status_attempts(&self) -> usize {
        self.status_attempts
    }

    pub fn play_sessions(&self) -> Vec<PlaySession> {
        self.play_sessions.clone()
    }

    pub fn heartbeats(&self) -> &[Option<u64>] {
        &self.heartbeats
    }

    fn check_queue(&self) -> Result<()> {
        if self.fail_queue {
            return Err(Error::Remote("queue unreachable".to_string()));
        }
        Ok(())
    }

    fn check_reports(&self) -> Result<()> {
        self.check_queue()?;
        if self.fail_reports {
            return Err(Error::Remote("result update rejected".to_string()));
        }
        Ok(())
    }

    fn update_row(&mut self, id: i64, status: &str, debug: Option<&str>) -> usize {
        if self.silent.contains(&id) {
            return 0;
        }
        match self.rows.get_mut(&id) {
            Some(row) => {
                row.status = status.to_string();
                if let Some(debug) = debug {
                    row.debug = debug.to_string();
                }
                1
            }
            None => 0,
        }
    }
}

impl CommandQueue for MemoryBackend {
    fn latest_command_id(&mut self) -> Result<Option<i64>> {
        self.check_queue()?;
        Ok(self.rows.keys().next_back().copied())
    }

    fn pending_after(&mut self, after: i64, limit: u32) -> Result<Vec<RemoteCommand>> {
        self.check_queue()?;
        let mut commands: Vec<RemoteCommand> = self
            .rows
            .range(after + 1..)
            .filter(|(_, row)| row.status == PENDING)
            .take(limit as usize)
            .map(|(id, row)| RemoteCommand::new(*id, row.text.clone()))
            .collect();
        commands.append(&mut self.redeliveries);
        commands.sort_by_key(|c| c.id);
        Ok(commands)
    }

    fn mark_result(&mut self, id: i64, result: &str, debug: &str) -> Result<usize> {
        self.check_reports()?;
        Ok(self.update_row(id, result, Some(debug)))
    }

    fn mark_skipped(&mut self, id: i64, reason: &str) -> Result<usize> {
        self.check_reports()?;
        Ok(self.update_row(id, reason, None))
    }

    fn insert_result(&mut self, reference_id: i64, result: &str, debug: &str) -> Result<()> {
        self.check_reports()?;
        self.inserted.push(InsertedResult {
            reference_id,
            result: result.to_string(),
            debug: debug.to_string(),
        });
        Ok(())
    }
}

impl StatusSink for MemoryBackend {
    fn set_status(&mut self, epc: &str, status: TagStatus) -> Result<()> {
        self.status_attempts += 1;
        if self.fail_status {
            return Err(Error::Remote(format!("status update for {} rejected", epc)));
        }
        self.status_calls.push((epc.to_string(), status));
        Ok(())
    }
}

impl PlaySessionSink for MemoryBackend {
    fn record_play_session(&mut self, session: &PlaySession) -> Result<()> {
        if self.fail_sessions {
            return Err(Error::Remote("play session rejected".to_string()));
        }
        self.play_sessions.push(session.clone());
        Ok(())
    }
}

impl HeartbeatSink for MemoryBackend {
    fn heartbeat(&mut self, unix_time: Option<u64>) -> Result<()> {
        self.heartbeats.push(unix_time);
        Ok(())
    }
}
