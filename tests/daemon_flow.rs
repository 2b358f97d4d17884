//! End-to-end flow through the application context with a scripted
//! reader, a virtual clock and the in-memory backend.

use pinme_reader::app::Context;
use pinme_reader::clock::ManualClock;
use pinme_reader::config::AppConfig;
use pinme_reader::presence::{TagState, TagStatus};
use pinme_reader::reader::frame::{Frame, FrameType};
use pinme_reader::remote::SKIPPED_RESULT;
use pinme_reader::remote::memory::MemoryBackend;
use pinme_reader::transport::MockTransport;

const NO_TAG: [u8; 8] = [0xBB, 0x01, 0xFF, 0x00, 0x01, 0x15, 0x16, 0x7E];

fn sighting(epc: &[u8], rssi: i8) -> Vec<u8> {
    let mut payload = vec![rssi as u8, 0x30, 0x00];
    payload.extend_from_slice(epc);
    payload.extend_from_slice(&[0x00, 0x00]);
    Frame::new(FrameType::Notification, 0x22, payload)
        .encode()
        .unwrap()
}

fn context() -> (MockTransport, Context<MockTransport, MemoryBackend, ManualClock>) {
    let mut config = AppConfig::default();
    config.scan.inventory_count = 30;
    config.presence.assigned_tags = vec!["E2000009".to_string()];
    let mock = MockTransport::new();
    let ctx = Context::new(config, mock.clone(), MemoryBackend::new(), ManualClock::default());
    (mock, ctx)
}

#[test]
fn test_tag_leaves_and_returns() {
    let (mock, mut ctx) = context();

    let mut burst = sighting(&[0xE2, 0x00, 0x00, 0x01], -40);
    burst.extend_from_slice(&NO_TAG);
    mock.queue_reply(&burst);

    let report = ctx.scan_once().unwrap();
    assert_eq!(report.tags, vec!["E2000001".to_string()]);
    assert_eq!(report.missed, 1);
    assert_eq!(
        ctx.backend().status_calls(),
        vec![("E2000001".to_string(), TagStatus::In)]
    );

    // Three empty cycles: playing after two, out after three
    for _ in 0..3 {
        mock.queue_reply(&NO_TAG);
        ctx.scan_once().unwrap();
    }
    assert_eq!(ctx.tracker().get("E2000001").unwrap().state, TagState::Out);
    assert!(
        ctx.backend()
            .status_calls()
            .contains(&("E2000001".to_string(), TagStatus::Out))
    );
    assert!(ctx.backend().play_sessions().is_empty());

    // Back on the board with a strong signal: in place at once, session closed
    let mut burst = sighting(&[0xE2, 0x00, 0x00, 0x01], -45);
    burst.extend_from_slice(&NO_TAG);
    mock.queue_reply(&burst);
    ctx.scan_once().unwrap();

    assert_eq!(ctx.tracker().get("E2000001").unwrap().state, TagState::InPlace);
    let sessions = ctx.backend().play_sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].epc, "E2000001");
    assert!(sessions[0].duration_secs() >= 3);
    assert_eq!(
        ctx.backend().status_calls().last(),
        Some(&("E2000001".to_string(), TagStatus::In))
    );
}

#[test]
fn test_remote_command_round_trip() {
    let (mock, mut ctx) = context();

    // Backlog queued while offline is never run
    let stale = ctx.backend_mut().push_command("RFID_POWER_SET 5");
    assert!(ctx.poll_commands().unwrap().bootstrapped);

    let id = ctx.backend_mut().push_command("RFID_POWER_SET 20");
    mock.queue_reply(&[0xBB, 0x01, 0xB6, 0x00, 0x01, 0x00, 0xB8, 0x7E]);
    let report = ctx.poll_commands().unwrap();
    assert_eq!(report.executed, 1);

    assert_eq!(
        mock.get_written(),
        vec![0xBB, 0x00, 0xB6, 0x00, 0x02, 0x07, 0xD0, 0x8F, 0x7E]
    );
    let row = ctx.backend().row(id).unwrap();
    assert_eq!(row.status, "SetPower: Success");
    assert!(row.debug.starts_with("CMD: RFID_POWER_SET 20\nTX: BB 00 B6"));
    assert_eq!(ctx.backend().row(stale).unwrap().status, "PENDING");

    // Redelivery of an executed command is skipped, not run again
    mock.clear_written();
    ctx.backend_mut().redeliver(id);
    let report = ctx.poll_commands().unwrap();
    assert_eq!(report.skipped, 1);
    assert!(mock.get_written().is_empty());
    assert_eq!(ctx.backend().row(id).unwrap().status, SKIPPED_RESULT);
}

#[test]
fn test_malformed_command_reports_error() {
    let (mock, mut ctx) = context();
    ctx.poll_commands().unwrap();

    let id = ctx.backend_mut().push_command("RFID_POWER_SET loud");
    ctx.poll_commands().unwrap();

    assert!(mock.get_written().is_empty());
    assert_eq!(
        ctx.backend().row(id).unwrap().status,
        "Error: RFID_POWER_SET: invalid <dbm> 'loud'"
    );
    assert_eq!(ctx.cursor().position(), Some(id));
}
