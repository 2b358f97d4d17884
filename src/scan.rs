//! Scan cycle
//!
//! One cycle sends a bounded multi-inventory command, collects tag
//! notifications for a fixed window, feeds each sighting to the presence
//! tracker, then sweeps the tags that did not answer. The window depends
//! on the requested poll count; the module keeps reporting until its
//! count runs out, so the window has to cover the whole burst.

use crate::clock::Clock;
use crate::error::Result;
use crate::presence::{PresenceSink, PresenceTracker};
use crate::reader::RfidReader;
use crate::reader::commands::ReaderCommand;
use crate::reader::decoder::ReaderReply;
use crate::transport::Transport;
use std::collections::HashSet;
use std::time::Duration;

/// Collection window for an inventory of `count` polls
pub fn scan_duration(count: u16) -> Duration {
    match count {
        0..=30 => Duration::from_secs(3),
        31..=100 => Duration::from_secs(6),
        _ => Duration::from_secs(15),
    }
}

/// What one cycle saw
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Frames received, sightings included
    pub frames: usize,
    pub sightings: usize,
    /// Distinct EPCs, sorted
    pub tags: Vec<String>,
    /// Tracked tags that did not answer this cycle
    pub missed: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanCycleOrchestrator {
    inventory_count: u16,
}

impl ScanCycleOrchestrator {
    pub fn new(inventory_count: u16) -> Self {
        Self {
            inventory_count: inventory_count.max(1),
        }
    }

    pub fn inventory_count(&self) -> u16 {
        self.inventory_count
    }

    /// Run one full cycle
    ///
    /// Returns early with an error if the inventory command cannot be
    /// sent or the link fails mid-cycle; the sweep is skipped in that case
    /// so a dead link is not mistaken for every tag leaving.
    pub fn run<T: Transport>(
        &self,
        reader: &mut RfidReader<T>,
        tracker: &mut PresenceTracker,
        clock: &dyn Clock,
        sink: &mut dyn PresenceSink,
    ) -> Result<ScanReport> {
        let cycle_start = clock.now();
        let window = scan_duration(self.inventory_count);
        log::debug!(
            "Scan cycle: {} polls over {:?}",
            self.inventory_count,
            window
        );

        reader.send_command(&ReaderCommand::InventoryMulti {
            count: self.inventory_count,
        })?;

        let deadline = cycle_start + window;
        let mut report = ScanReport::default();
        let mut seen = HashSet::new();

        loop {
            let now = clock.now();
            if now >= deadline {
                break;
            }
            let wait = (deadline - now).min(reader.response_timeout());
            match reader.next_reply(clock, wait)? {
                Some(ReaderReply::TagSeen(sighting)) => {
                    report.frames += 1;
                    report.sightings += 1;
                    log::trace!("Sighting {} RSSI={}", sighting.epc, sighting.rssi);
                    let rssi = i16::from(sighting.rssi);
                    if tracker.on_seen(&sighting.epc, rssi, clock, sink).is_some() {
                        seen.insert(sighting.epc);
                    }
                }
                Some(other) => {
                    report.frames += 1;
                    log::debug!("Scan: ignoring {}", other);
                }
                None => {}
            }
        }

        report.missed = tracker.sweep_missing(cycle_start, clock, sink);
        report.tags = seen.into_iter().collect();
        report.tags.sort();
        report.elapsed = clock.now() - cycle_start;

        log::info!(
            "Scan done: {} sightings, {} tags, {} missed",
            report.sightings,
            report.tags.len(),
            report.missed
        );
        Ok(report)
    }
}

impl Default for ScanCycleOrchestrator {
    fn default() -> Self {
        Self::new(300)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::PresenceConfig;
    use crate::presence::TagState;
    use crate::reader::frame::{Frame, FrameType};
    use crate::remote::memory::MemoryBackend;
    use crate::transport::MockTransport;

    fn sighting(epc: &[u8], rssi: i8) -> Vec<u8> {
        let mut payload = vec![rssi as u8, 0x30, 0x00];
        payload.extend_from_slice(epc);
        payload.extend_from_slice(&[0x12, 0x34]);
        Frame::new(FrameType::Notification, 0x22, payload)
            .encode()
            .unwrap()
    }

    const NO_TAG: [u8; 8] = [0xBB, 0x01, 0xFF, 0x00, 0x01, 0x15, 0x16, 0x7E];

    fn setup() -> (MockTransport, RfidReader<MockTransport>, PresenceTracker, MemoryBackend) {
        let mock = MockTransport::new();
        let reader = RfidReader::new(mock.clone(), Duration::from_millis(3000));
        let tracker = PresenceTracker::new(PresenceConfig::default());
        (mock, reader, tracker, MemoryBackend::new())
    }

    #[test]
    fn test_scan_duration_tiers() {
        assert_eq!(scan_duration(1), Duration::from_secs(3));
        assert_eq!(scan_duration(30), Duration::from_secs(3));
        assert_eq!(scan_duration(31), Duration::from_secs(6));
        assert_eq!(scan_duration(100), Duration::from_secs(6));
        assert_eq!(scan_duration(300), Duration::from_secs(15));
    }

    #[test]
    fn test_cycle_feeds_tracker() {
        let clock = ManualClock::default();
        let (mock, mut reader, mut tracker, mut sink) = setup();

        let mut burst = sighting(&[0xE2, 0x00, 0x00, 0x01], -40);
        burst.extend(sighting(&[0xE2, 0x00, 0x00, 0x02], -70));
        burst.extend(sighting(&[0xE2, 0x00, 0x00, 0x01], -41));
        burst.extend_from_slice(&NO_TAG);
        mock.queue_reply(&burst);

        let report = ScanCycleOrchestrator::new(300)
            .run(&mut reader, &mut tracker, &clock, &mut sink)
            .unwrap();

        assert_eq!(report.frames, 4);
        assert_eq!(report.sightings, 3);
        assert_eq!(report.tags, vec!["E2000001".to_string(), "E2000002".to_string()]);
        assert_eq!(report.missed, 0);
        assert!(report.elapsed >= Duration::from_secs(15));

        // Written command is the bounded multi-inventory
        assert_eq!(
            mock.get_written(),
            vec![0xBB, 0x00, 0x27, 0x00, 0x03, 0x22, 0x01, 0x2C, 0x79, 0x7E]
        );
        assert_eq!(tracker.get("E2000001").unwrap().state, TagState::InPlace);
        assert_eq!(tracker.get("E2000002").unwrap().state, TagState::Unknown);
    }

    #[test]
    fn test_empty_epc_is_not_reported() {
        let clock = ManualClock::default();
        let (mock, mut reader, mut tracker, mut sink) = setup();

        // RSSI, PC and CRC with no EPC bytes
        let empty = Frame::new(FrameType::Notification, 0x22, vec![0xC4, 0x00, 0x00, 0x12, 0x34])
            .encode()
            .unwrap();
        let mut burst = empty;
        burst.extend(sighting(&[0xE2, 0x00, 0x00, 0x01], -40));
        burst.extend_from_slice(&NO_TAG);
        mock.queue_reply(&burst);

        let report = ScanCycleOrchestrator::new(30)
            .run(&mut reader, &mut tracker, &clock, &mut sink)
            .unwrap();

        assert_eq!(report.tags, vec!["E2000001".to_string()]);
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_absent_tags_are_swept() {
        let clock = ManualClock::default();
        let (mock, mut reader, mut tracker, mut sink) = setup();
        tracker.preload(["E2000009"]);
        mock.queue_reply(&NO_TAG);

        let report = ScanCycleOrchestrator::new(30)
            .run(&mut reader, &mut tracker, &clock, &mut sink)
            .unwrap();

        assert_eq!(report.missed, 1);
        assert!(report.elapsed >= Duration::from_secs(3));
        assert_eq!(tracker.get("E2000009").unwrap().missed_count, 1);
    }

    #[test]
    fn test_write_failure_skips_sweep() {
        let clock = ManualClock::default();
        let (mock, mut reader, mut tracker, mut sink) = setup();
        tracker.preload(["E2000009"]);
        mock.set_fail_writes(true);

        let result = ScanCycleOrchestrator::default().run(&mut reader, &mut tracker, &clock, &mut sink);
        assert!(result.is_err());
        assert_eq!(tracker.get("E2000009").unwrap().missed_count, 0);
    }
}
