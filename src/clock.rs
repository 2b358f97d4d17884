//! Time sources
//!
//! Every wait in the daemon is a deadline checked against [`Clock::now`],
//! with short [`Clock::sleep`] slices in between. Production code uses
//! [`SystemClock`]; tests use [`ManualClock`], where sleeping advances
//! virtual time so multi-second timeouts complete instantly.

use std::cell::Cell;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock values earlier than 2020-01-01 mean NTP has not synced yet
pub const MIN_SYNCED_UNIX_TIME: u64 = 1_577_836_800;

/// Monotonic and wall-clock time source
pub trait Clock {
    /// Monotonic timestamp
    fn now(&self) -> Instant;

    /// Wall-clock Unix seconds, `None` while the clock is unsynchronized
    fn unix_time(&self) -> Option<u64>;

    /// Block the control loop for `duration`
    fn sleep(&self, duration: Duration);
}

/// Operating system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn unix_time(&self) -> Option<u64> {
        let secs = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
        (secs >= MIN_SYNCED_UNIX_TIME).then_some(secs)
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for tests
///
/// Starts at an arbitrary monotonic origin; `sleep` and `advance` move both
/// the monotonic and the wall clock forward.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Cell<Duration>,
    unix_base: Cell<Option<u64>>,
}

impl ManualClock {
    /// Clock with a synchronized wall clock at `unix_base` seconds
    pub fn new(unix_base: u64) -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            unix_base: Cell::new(Some(unix_base)),
        }
    }

    /// Clock whose wall clock never synchronized
    pub fn unsynced() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Cell::new(Duration::ZERO),
            unix_base: Cell::new(None),
        }
    }

    /// Move time forward
    pub fn advance(&self, duration: Duration) {
        self.elapsed.set(self.elapsed.get() + duration);
    }

    /// Total virtual time elapsed since creation
    pub fn elapsed(&self) -> Duration {
        self.elapsed.get()
    }

    /// Simulate an NTP sync
    pub fn set_unix_base(&self, unix_base: Option<u64>) {
        self.unix_base.set(unix_base);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(1_700_000_000)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed.get()
    }

    fn unix_time(&self) -> Option<u64> {
        let base = self.unix_base.get()?;
        let secs = base + self.elapsed.get().as_secs();
        (secs >= MIN_SYNCED_UNIX_TIME).then_some(secs)
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
