// crates/powermax-rs/tests/panel_session_test.rs
//
// End-to-end scenarios against a scripted PowerMax Pro panel: cold enroll,
// EEPROM download, zone activity, PIN patching and the JSON dump.

mod simulator;

use powermax_rs::{
    PmaxCommand, PowerMaxEngine, SessionState, SystemStatus, ZoneEvent,
};
use simulator::{SimulatedPort, VirtualPanel, feed, run_to_monitoring, seed_default_image};

fn init_logging() {
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

fn enrolled_engine() -> (PowerMaxEngine<SimulatedPort>, VirtualPanel, SimulatedPort) {
    init_logging();
    let port = SimulatedPort::new();
    let mut panel = VirtualPanel::new(port.clone());
    seed_default_image(&mut panel);
    let mut engine = PowerMaxEngine::new(port.clone());
    run_to_monitoring(&mut engine, &mut panel);
    (engine, panel, port)
}

#[test]
fn cold_enroll_panel_info_starts_download() {
    init_logging();
    let port = SimulatedPort::new();
    let mut engine = PowerMaxEngine::new(port.clone());

    // PowerMax Pro announcement: model 0x0B, panel type 2.
    feed(&mut engine, &[0x3C, 0x0B, 0x20, 0x00, 0x00, 0x00, 0x00, 0x02, 0x00]);

    assert_eq!(engine.session_state(), SessionState::PanelInfoReceived);
    assert!(!engine.is_powermaster());
    assert_eq!(engine.model_type(), 0x0B);
    assert!(
        port.sent_payloads().iter().any(|p| p[0] == 0x24),
        "download start was not issued"
    );
}

#[test]
fn download_settings_frames_accumulate_contiguously() {
    init_logging();
    let port = SimulatedPort::new();
    let mut engine = PowerMaxEngine::new(port);

    for start in [0u8, 16, 32] {
        let mut frame = vec![0x3F, start, 0x00];
        frame.extend((start..start + 16).map(|v| v ^ 0x5A));
        feed(&mut engine, &frame);
    }

    let mut out = [0u8; 48];
    let read = engine.eeprom_read(0, 0, &mut out);
    assert!(read.complete);
    assert_eq!(read.copied, 48);
    let expected: Vec<u8> = (0u8..48).map(|v| v ^ 0x5A).collect();
    assert_eq!(&out[..], &expected[..]);
}

#[test]
fn full_session_reaches_monitoring_with_parsed_settings() {
    let (engine, _panel, _port) = enrolled_engine();

    assert!(engine.enroll_completed());
    assert!(!engine.is_download_mode());
    let cfg = engine.panel_config();
    assert!(cfg.parsed_ok);
    assert_eq!(cfg.installer_pin.as_str(), "1234");
    assert_eq!(cfg.powerlink_pin.as_str(), "3622");
    assert_eq!(cfg.serial_number.as_str(), "5004T90");
    assert_eq!(cfg.software.as_str(), "2.13.503");
    assert_eq!(cfg.max_zone_cnt, 30);

    assert_eq!(engine.enrolled_zone_count(), 3);
    assert_eq!(engine.zone_name(1), Some("Front Door"));
    assert_eq!(engine.zone_name(2), None);
    assert_eq!(engine.zone_name(3), Some("Kitchen"));
    assert_eq!(engine.zone_name(5), Some("Garage"));
}

#[test]
fn zone_open_then_close_records_events_with_monotonic_times() {
    let (mut engine, _panel, port) = enrolled_engine();

    // Zone-open bitmap with bit 5 set.
    feed(&mut engine, &[0xA5, 0x00, 0x02, 0x20, 0x00, 0x00, 0x00]);
    let zone = engine.zone(5).unwrap();
    assert!(zone.stat.door_open);
    assert_eq!(zone.last_event, ZoneEvent::Open);
    let t_open = zone.last_event_time;
    assert_eq!(t_open, port.now());

    port.advance(3);
    feed(&mut engine, &[0xA5, 0x00, 0x02, 0x00, 0x00, 0x00, 0x00]);
    let zone = engine.zone(5).unwrap();
    assert!(!zone.stat.door_open);
    assert_eq!(zone.last_event, ZoneEvent::Closed);
    assert!(zone.last_event_time > t_open);

    // Unenrolled zones never synthesise events.
    assert_eq!(engine.zone(2).unwrap().last_event, ZoneEvent::None);
}

#[test]
fn arm_away_patches_installer_pin_and_mirrors_the_state() {
    let (mut engine, _panel, port) = enrolled_engine();

    engine.send_command(PmaxCommand::ArmAway).unwrap();
    let sent = port.sent_payloads();
    let arm = sent.iter().find(|p| p[0] == 0xA1).expect("arm frame missing");
    assert_eq!(arm[3], 0x05);
    assert_eq!(&arm[4..6], &[0x12, 0x34]);

    // Matching status frame: armed away, arm/disarm event bit set.
    feed(&mut engine, &[0xA5, 0x00, 0x04, 0x05, 0x40, 0x00, 0x00]);
    assert_eq!(engine.system_status(), SystemStatus::ArmedAway);
    assert!(engine.is_arm_event());
    assert!(engine.take_arm_event());
    assert!(!engine.take_arm_event());
}

#[test]
fn json_dump_lists_only_enrolled_zones() {
    let (engine, _panel, _port) = enrolled_engine();

    let mut out = String::new();
    engine.dump_to_json(&mut out);

    let zones_at = out.find("\"zones\":[").expect("no zones array");
    let front = out.find("\"name\":\"Front Door\"").expect("no Front Door");
    let kitchen = out.find("\"name\":\"Kitchen\"").expect("no Kitchen");
    assert!(zones_at < front && front < kitchen);
    assert_eq!(out.matches("\"zone\":").count(), 3);
    assert!(out.contains("\"cfg\":{"));
    assert!(out.contains("\"secondsFromLastComm\":"));
    assert!(out.contains("\"serialNumber\":\"5004T90\""));
}

#[test]
fn repeated_access_denied_only_resends_the_enroll_reply() {
    init_logging();
    let port = SimulatedPort::new();
    let mut engine = PowerMaxEngine::new(port.clone());
    engine.tick(); // opens enrolment

    let enroll_sends = |port: &SimulatedPort| {
        port.sent_payloads()
            .iter()
            .filter(|p| p.starts_with(&[0xAB, 0x0A, 0x00, 0x00]))
            .count()
    };
    let baseline = enroll_sends(&port);

    for round in 1..=3 {
        feed(&mut engine, &[0x08, 0x00]);
        assert_eq!(engine.session_state(), SessionState::Enrolling);
        assert_eq!(enroll_sends(&port), baseline + round);
    }
}

#[test]
fn panel_stop_flushes_the_session_back_to_idle() {
    let (mut engine, _panel, _port) = enrolled_engine();
    feed(&mut engine, &[0x0B]);
    assert_eq!(engine.session_state(), SessionState::Idle);
    assert!(!engine.is_download_mode());
}
