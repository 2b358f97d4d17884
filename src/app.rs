//! Application context and control loop
//!
//! One `Context` owns every component: the reader session, the presence
//! tracker, the command cursor, and the backend. The loop is cooperative
//! and single-threaded: each unit of work (a scan cycle, a command poll, a
//! heartbeat) runs to completion before the next starts, so the serial
//! link is never shared and no state needs locking. The shutdown flag is
//! only checked between units.

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::error::Result;
use crate::presence::PresenceTracker;
use crate::reader::RfidReader;
use crate::remote::{Backend, ReaderExecutor, RemoteCommandCursor, TickReport};
use crate::scan::{ScanCycleOrchestrator, ScanReport};
use crate::transport::Transport;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const MIN_IDLE: Duration = Duration::from_millis(1);

/// Counters logged at shutdown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub scans: u64,
    pub scan_failures: u64,
    pub commands_executed: u64,
    pub poll_failures: u64,
    pub heartbeats: u64,
}

/// Everything the daemon owns
pub struct Context<T: Transport, B: Backend, C: Clock> {
    config: AppConfig,
    reader: RfidReader<T>,
    tracker: PresenceTracker,
    scanner: ScanCycleOrchestrator,
    cursor: RemoteCommandCursor,
    backend: B,
    clock: C,
    rng: StdRng,
    next_scan: Instant,
    next_poll: Instant,
    next_heartbeat: Instant,
    stats: LoopStats,
}

impl<T: Transport, B: Backend, C: Clock> Context<T, B, C> {
    /// Build the context; assigned tags from the config are preloaded
    pub fn new(config: AppConfig, transport: T, backend: B, clock: C) -> Self {
        let reader = RfidReader::new(transport, config.reader.response_timeout());
        let mut tracker = PresenceTracker::new(config.presence.clone());
        let preloaded = tracker.preload(&config.presence.assigned_tags);
        if preloaded > 0 {
            log::info!("Tracking {} assigned tags", preloaded);
        }

        let now = clock.now();
        Self {
            reader,
            tracker,
            scanner: ScanCycleOrchestrator::new(config.scan.inventory_count),
            cursor: RemoteCommandCursor::new(config.remote.batch_size),
            backend,
            clock,
            rng: StdRng::from_entropy(),
            next_scan: now,
            next_poll: now,
            next_heartbeat: now,
            stats: LoopStats::default(),
            config,
        }
    }

    pub fn tracker(&self) -> &PresenceTracker {
        &self.tracker
    }

    pub fn cursor(&self) -> &RemoteCommandCursor {
        &self.cursor
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// One scan cycle
    pub fn scan_once(&mut self) -> Result<ScanReport> {
        let result = self.scanner.run(
            &mut self.reader,
            &mut self.tracker,
            &self.clock,
            &mut self.backend,
        );
        match &result {
            Ok(_) => self.stats.scans += 1,
            Err(e) => {
                self.stats.scan_failures += 1;
                log::warn!("Scan cycle aborted: {}", e);
            }
        }
        result
    }

    /// One command queue poll
    pub fn poll_commands(&mut self) -> Result<TickReport> {
        let mut executor = ReaderExecutor::new(&mut self.reader, &self.clock, &mut self.rng);
        let result = self.cursor.tick(&mut self.backend, &mut executor);
        match &result {
            Ok(report) => self.stats.commands_executed += report.executed as u64,
            Err(e) => {
                self.stats.poll_failures += 1;
                log::warn!("Command poll failed: {}", e);
            }
        }
        result
    }

    pub fn send_heartbeat(&mut self) -> Result<()> {
        let result = self.backend.heartbeat(self.clock.unix_time());
        match &result {
            Ok(()) => {
                self.stats.heartbeats += 1;
                log::debug!("Heartbeat sent");
            }
            Err(e) => log::warn!("Heartbeat failed: {}", e),
        }
        result
    }

    /// Run whatever is due, returns the time until the next deadline
    ///
    /// Failures are logged and retried at the next interval; none of them
    /// stop the loop.
    pub fn step(&mut self) -> Duration {
        let now = self.clock.now();

        if now >= self.next_poll {
            let _ = self.poll_commands();
            self.next_poll = self.clock.now() + self.config.remote.poll_interval();
        }

        if now >= self.next_scan {
            let _ = self.scan_once();
            self.next_scan = reschedule(self.next_scan, self.config.scan.interval(), self.clock.now());
        }

        if now >= self.next_heartbeat {
            let _ = self.send_heartbeat();
            self.next_heartbeat = self.clock.now() + self.config.remote.heartbeat_interval();
        }

        let next = self.next_poll.min(self.next_scan).min(self.next_heartbeat);
        next.saturating_duration_since(self.clock.now())
    }

    /// Loop until `shutdown` is set
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!(
            "Control loop started (scan every {:?}, poll every {:?})",
            self.config.scan.interval(),
            self.config.remote.poll_interval()
        );

        while !shutdown.load(Ordering::Relaxed) {
            let idle = self.step();
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            self.clock.sleep(idle.max(MIN_IDLE));
        }

        log::info!("Control loop stopped: {:?}", self.stats);
    }
}

/// Fixed-rate schedule; a cycle that overran starts the next one immediately
fn reschedule(previous: Instant, interval: Duration, now: Instant) -> Instant {
    let next = previous + interval;
    if next < now { now } else { next }
}
