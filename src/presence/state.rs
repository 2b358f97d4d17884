//! Tag presence records

use std::fmt;
use std::time::Instant;

/// Presence lifecycle of one tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagState {
    /// Seen, but not yet stable enough to call in place
    Unknown,
    /// Sitting on the board
    InPlace,
    /// Missing for a couple of sweeps; not yet reported to the backend
    Playing,
    /// Picked up (reported to the backend)
    Out,
}

impl fmt::Display for TagState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TagState::Unknown => "unknown",
            TagState::InPlace => "in-place",
            TagState::Playing => "playing",
            TagState::Out => "out",
        };
        f.write_str(name)
    }
}

/// Status value pushed to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagStatus {
    In,
    Out,
}

impl TagStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TagStatus::In => "in",
            TagStatus::Out => "out",
        }
    }
}

/// Per-EPC tracking state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    /// Normalized EPC (uppercase hex)
    pub epc: String,
    pub rssi: i16,
    pub state: TagState,
    pub stable_count: u32,
    pub missed_count: u32,
    /// `None` until the tag is first seen (pre-loaded tags)
    pub last_seen: Option<Instant>,
    /// Unix seconds at which the tag left the board
    pub play_started_at: Option<u64>,
}

/// RSSI placeholder for tags that were assigned but never seen
pub const UNSEEN_RSSI: i16 = -100;

impl TagRecord {
    pub fn new(epc: String, rssi: i16) -> Self {
        Self {
            epc,
            rssi,
            state: TagState::Unknown,
            stable_count: 0,
            missed_count: 0,
            last_seen: None,
            play_started_at: None,
        }
    }

    /// Not observed since `cycle_start`
    pub fn missed_since(&self, cycle_start: Instant) -> bool {
        match self.last_seen {
            Some(seen) => seen < cycle_start,
            None => true,
        }
    }
}

/// Completed time away from the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaySession {
    pub epc: String,
    pub started_at: u64,
    pub ended_at: u64,
}

impl PlaySession {
    pub fn duration_secs(&self) -> u64 {
        self.ended_at.saturating_sub(self.started_at)
    }
}
