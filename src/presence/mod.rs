//! Tag presence tracking
//!
//! Turns noisy per-cycle RSSI sightings into stable presence states and
//! pushes "in"/"out" transitions and completed play sessions to the
//! backend through the sink traits below.

mod state;
mod tracker;

pub use state::{PlaySession, TagRecord, TagState, TagStatus, UNSEEN_RSSI};
pub use tracker::{PresenceTracker, normalize_epc};

use crate::error::Result;

/// Receives tag status changes
pub trait StatusSink {
    /// Set the status of the tag identified by `epc`. An update that
    /// matches no row must be reported as an error.
    fn set_status(&mut self, epc: &str, status: TagStatus) -> Result<()>;
}

/// Receives completed play sessions (fire-and-forget)
pub trait PlaySessionSink {
    fn record_play_session(&mut self, session: &PlaySession) -> Result<()>;
}

/// Everything the tracker reports to
pub trait PresenceSink: StatusSink + PlaySessionSink {}

impl<T: StatusSink + PlaySessionSink + ?Sized> PresenceSink for T {}
