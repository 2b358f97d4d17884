//! Presence state machine
//!
//! ```text
//!            strong x S (or very strong)            missed x M
//!  Unknown ───────────────────────────▶ InPlace ─────────────▶ Playing
//!                                        │  ▲                     │
//!          weak signal / RSSI jump > D   │  │ strong x S          │ missed x O
//!                                        ▼  │                     ▼ (sink ok)
//!                                        Out ◀────────────────────┘
//! ```
//!
//! - Displacement (RSSI jump > D while in place) skips the hysteresis and
//!   goes straight to `Out`. The same sighting then counts as the first
//!   strong one on the way back, so a very strong jump re-enters at once.
//! - `Playing` is internal: nothing is pushed until the tag has been
//!   missing for O sweeps.
//! - The sweep only commits `Out` once the status sink accepted it. A
//!   failed push leaves the state alone, so the next sweep retries.
//! - Returning to `InPlace` closes the open play session and reports it.

use super::state::{PlaySession, TagRecord, TagState, TagStatus, UNSEEN_RSSI};
use super::PresenceSink;
use crate::clock::Clock;
use crate::config::PresenceConfig;
use std::collections::HashMap;
use std::time::Instant;

/// Canonical EPC key: hex digits only, uppercase
pub fn normalize_epc(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_hexdigit)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Per-tag presence tracker
pub struct PresenceTracker {
    config: PresenceConfig,
    tags: HashMap<String, TagRecord>,
}

impl PresenceTracker {
    pub fn new(config: PresenceConfig) -> Self {
        Self {
            config,
            tags: HashMap::new(),
        }
    }

    /// Seed records for tags assigned to this board, returns how many were added
    pub fn preload<I, S>(&mut self, epcs: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for raw in epcs {
            let epc = normalize_epc(raw.as_ref());
            if epc.is_empty() || self.tags.contains_key(&epc) {
                continue;
            }
            log::info!("Loaded assigned tag: {}", epc);
            self.tags
                .insert(epc.clone(), TagRecord::new(epc, UNSEEN_RSSI));
            added += 1;
        }
        added
    }

    pub fn get(&self, epc: &str) -> Option<&TagRecord> {
        self.tags.get(&normalize_epc(epc))
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Records sorted by EPC
    pub fn snapshot(&self) -> Vec<TagRecord> {
        let mut records: Vec<TagRecord> = self.tags.values().cloned().collect();
        records.sort_by(|a, b| a.epc.cmp(&b.epc));
        records
    }

    /// Apply one sighting, returns the resulting state
    pub fn on_seen(
        &mut self,
        epc: &str,
        rssi: i16,
        clock: &dyn Clock,
        sink: &mut dyn PresenceSink,
    ) -> Option<TagState> {
        let key = normalize_epc(epc);
        if key.is_empty() {
            log::warn!("Ignoring sighting with empty EPC ({:?})", epc);
            return None;
        }
        let now = clock.now();
        let cfg = &self.config;

        let Some(record) = self.tags.get_mut(&key) else {
            let mut record = TagRecord::new(key.clone(), rssi);
            record.stable_count = 1;
            record.last_seen = Some(now);
            if rssi > cfg.initial_in_place_rssi {
                record.state = TagState::InPlace;
                push_status(sink, &key, TagStatus::In);
            }
            log::info!("New tag: {} RSSI={} state={}", key, rssi, record.state);
            let state = record.state;
            self.tags.insert(key, record);
            return Some(state);
        };

        if record.state == TagState::InPlace && (rssi - record.rssi).abs() > cfg.displacement_db {
            log::info!(
                "Displacement: {} RSSI {} -> {}, marking out",
                record.epc,
                record.rssi,
                rssi
            );
            leave_board(record, clock, sink);
        }

        record.rssi = rssi;
        record.last_seen = Some(now);
        record.missed_count = 0;

        if rssi >= cfg.rssi_threshold {
            if record.state == TagState::InPlace {
                record.stable_count = cfg.stable_cycles;
            } else {
                record.stable_count += 1;
                if record.stable_count >= cfg.stable_cycles || rssi > cfg.fast_path_rssi {
                    return_to_board(record, clock, sink);
                }
            }
        } else if record.state == TagState::InPlace {
            log::info!("Weak signal: {} RSSI={}, marking out", record.epc, rssi);
            leave_board(record, clock, sink);
        }

        Some(record.state)
    }

    /// Age every tag not seen since `cycle_start` by one missed cycle
    pub fn sweep_missing(
        &mut self,
        cycle_start: Instant,
        clock: &dyn Clock,
        sink: &mut dyn PresenceSink,
    ) -> usize {
        let cfg = &self.config;
        let mut missed = 0;

        for record in self.tags.values_mut() {
            if !record.missed_since(cycle_start) {
                continue;
            }
            missed += 1;
            record.missed_count += 1;
            record.stable_count = 0;

            if record.missed_count == cfg.playing_after_missed && record.state != TagState::Playing {
                log::info!(
                    "Tag missing {}x, playing (internal): {}",
                    record.missed_count,
                    record.epc
                );
                record.state = TagState::Playing;
                open_play_session(record, clock);
            }

            if record.missed_count >= cfg.out_after_missed && record.state != TagState::Out {
                log::info!("Tag missing {}x, out: {}", record.missed_count, record.epc);
                match sink.set_status(&record.epc, TagStatus::Out) {
                    Ok(()) => {
                        record.state = TagState::Out;
                        open_play_session(record, clock);
                    }
                    Err(e) => {
                        log::warn!(
                            "Status update for {} failed, retrying next cycle: {}",
                            record.epc,
                            e
                        );
                    }
                }
            }
        }

        missed
    }
}

fn push_status(sink: &mut dyn PresenceSink, epc: &str, status: TagStatus) {
    if let Err(e) = sink.set_status(epc, status) {
        log::warn!("Status update {} for {} failed: {}", status.as_str(), epc, e);
    }
}

fn open_play_session(record: &mut TagRecord, clock: &dyn Clock) {
    if record.play_started_at.is_none() {
        record.play_started_at = clock.unix_time();
    }
}

/// Tag left the board: `Out`, new play session, push "out"
fn leave_board(record: &mut TagRecord, clock: &dyn Clock, sink: &mut dyn PresenceSink) {
    record.state = TagState::Out;
    record.stable_count = 0;
    record.play_started_at = clock.unix_time();
    push_status(sink, &record.epc, TagStatus::Out);
}

/// Tag is back: flush any open play session, `InPlace`, push "in"
fn return_to_board(record: &mut TagRecord, clock: &dyn Clock, sink: &mut dyn PresenceSink) {
    let previous = record.state;
    if matches!(previous, TagState::Playing | TagState::Out) {
        if let (Some(started_at), Some(ended_at)) = (record.play_started_at, clock.unix_time()) {
            let session = PlaySession {
                epc: record.epc.clone(),
                started_at,
                ended_at,
            };
            log::info!(
                "Play session: {} for {}s",
                session.epc,
                session.duration_secs()
            );
            if let Err(e) = sink.record_play_session(&session) {
                log::warn!("Recording play session for {} failed: {}", session.epc, e);
            }
        }
    }
    record.play_started_at = None;
    record.state = TagState::InPlace;
    log::info!("Tag in place: {} (was {})", record.epc, previous);
    push_status(sink, &record.epc, TagStatus::In);
}
