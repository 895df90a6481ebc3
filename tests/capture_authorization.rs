//! Capture authorization integration tests.
//!
//! Covers the THREATCON -> TEMPEST -> policy -> token -> capture chain and
//! the audit trail it leaves behind.

use tempest_kernel::{
    capture_frame, fused_capture, tempest_for_threatcon, Clearance, DeviceIdentity, Error,
    EventLog, EventType, LoopbackControl, MetadataBuffer, MetadataPayload, PolicyGate, Profile,
    StubFrameSource, TempestController, TempestState, ThreatCon, TimingMark,
    DEFAULT_SYNC_TOLERANCE_NS,
};

fn setup_device(role: &str, layer: u32) -> (TempestController, EventLog) {
    let events = EventLog::new(256, Profile::Forensic);
    let controller = TempestController::new(
        DeviceIdentity {
            dev_id: 42,
            role: role.to_string(),
            layer,
        },
        Some(Box::new(LoopbackControl::default())),
        events.clone(),
    );
    (controller, events)
}

// ==================== THREATCON Escalation ====================

#[test]
fn threatcon_escalation_is_monotonic_to_lockdown() {
    let mut last = TempestState::Disabled;
    for level in ThreatCon::ALL {
        let state = tempest_for_threatcon(level);
        assert!(
            state >= last,
            "THREATCON {} mapped below its predecessor",
            level
        );
        last = state;
    }
    assert_eq!(last, TempestState::Lockdown);
}

#[test]
fn emergency_threatcon_locks_device_down() {
    let mut gate = PolicyGate::new(Clearance::TopSecret, ThreatCon::Normal);
    let (mut device, _events) = setup_device("generic_webcam", 3);

    gate.set_threatcon(ThreatCon::Emergency);
    device.apply_threatcon(&gate).expect("apply threatcon");
    assert_eq!(device.state(), TempestState::Lockdown);

    let err = device
        .authorize_capture(&gate, "integration")
        .expect_err("lockdown must deny");
    assert!(err.is_denial());
}

// ==================== Token-Gated Capture ====================

#[test]
fn authorized_capture_delivers_frame() {
    let gate = PolicyGate::new(Clearance::Secret, ThreatCon::Bravo);
    let (mut device, _events) = setup_device("iris_scanner", 3);
    device.apply_threatcon(&gate).expect("apply threatcon");

    let token = device
        .authorize_capture(&gate, "iris_enroll")
        .expect("authorize");
    assert_eq!(token.state(), TempestState::Low);
    assert_eq!(token.context(), "iris_enroll");

    let mut source = StubFrameSource::new(640, 480);
    let frame = capture_frame(&mut source, token, "SECRET_BIOMETRIC").expect("capture");
    assert_eq!(frame.len(), 640 * 480);
    assert_eq!(frame.classification(), "SECRET_BIOMETRIC");
}

#[test]
fn denied_capture_is_distinguishable_from_faults() {
    let gate = PolicyGate::new(Clearance::TopSecret, ThreatCon::Emergency);
    let (mut device, _events) = setup_device("tempest_cam", 8);
    device.apply_threatcon(&gate).expect("apply threatcon");

    match device.authorize_capture(&gate, "routine") {
        Err(Error::PolicyDenied { context, .. }) => assert_eq!(context, "routine"),
        other => panic!("expected PolicyDenied, got {:?}", other.map(|t| t.state())),
    }
}

#[test]
fn clearance_gates_declassification_not_capture() {
    // An Unclassified session may run an unclassified capture but cannot
    // declassify biometric frames.
    let gate = PolicyGate::new(Clearance::Unclassified, ThreatCon::Normal);
    let (mut device, _events) = setup_device("generic_webcam", 2);

    let token = device.authorize_capture(&gate, "kiosk").expect("authorize");
    let mut source = StubFrameSource::new(320, 240);
    let frame = capture_frame(&mut source, token, "SECRET_BIOMETRIC").expect("capture");

    let err = frame
        .declassify(&gate, "iris_scanner")
        .expect_err("unclassified session must not declassify SECRET_BIOMETRIC");
    assert!(err.is_denial());

    let token = device.authorize_capture(&gate, "kiosk").expect("authorize");
    let frame = capture_frame(&mut source, token, "UNCLASSIFIED").expect("capture");
    let bytes = frame
        .declassify(&gate, "generic_webcam")
        .expect("unclassified frame declassifies");
    assert_eq!(bytes.len(), 320 * 240);
}

// ==================== Fused Capture ====================

#[test]
fn fused_capture_pairs_frame_with_nearest_metadata() {
    let gate = PolicyGate::new(Clearance::Secret, ThreatCon::Normal);
    let (mut device, _events) = setup_device("fused_sensor", 6);
    device.set_state(TempestState::Low).expect("set state");

    // StubFrameSource emits frame 0 at t=0.
    let candidates = vec![
        MetadataBuffer::new(
            40_000_000,
            0,
            MetadataPayload::Timing(TimingMark {
                frame_timestamp_ns: 40_000_000,
                sync_token: 7,
            }),
        ),
        MetadataBuffer::new(
            900_000_000,
            1,
            MetadataPayload::Timing(TimingMark {
                frame_timestamp_ns: 900_000_000,
                sync_token: 8,
            }),
        ),
    ];

    let token = device.authorize_capture(&gate, "fused").expect("authorize");
    let mut source = StubFrameSource::new(16, 16);
    let fused = fused_capture(
        &mut source,
        token,
        "SECRET",
        &candidates,
        DEFAULT_SYNC_TOLERANCE_NS,
    )
    .expect("fused capture");

    assert_eq!(fused.metadata_index, Some(0));
    assert_eq!(fused.frame.sequence, 0);
}

#[test]
fn fused_capture_without_nearby_metadata_still_delivers_frame() {
    let gate = PolicyGate::new(Clearance::Secret, ThreatCon::Normal);
    let (mut device, _events) = setup_device("fused_sensor", 6);
    device.set_state(TempestState::Low).expect("set state");

    let candidates = vec![MetadataBuffer::new(
        5_000_000_000,
        0,
        MetadataPayload::Timing(TimingMark {
            frame_timestamp_ns: 5_000_000_000,
            sync_token: 0,
        }),
    )];

    let token = device.authorize_capture(&gate, "fused").expect("authorize");
    let mut source = StubFrameSource::new(16, 16);
    let fused = fused_capture(
        &mut source,
        token,
        "SECRET",
        &candidates,
        DEFAULT_SYNC_TOLERANCE_NS,
    )
    .expect("fused capture");

    assert_eq!(fused.metadata_index, None);
    assert!(!fused.frame.is_empty());
}

// ==================== Audit Trail ====================

#[test]
fn escalation_and_denial_leave_an_audit_trail() {
    let mut gate = PolicyGate::new(Clearance::TopSecret, ThreatCon::Normal);
    let (mut device, events) = setup_device("tempest_cam", 7);

    gate.set_threatcon(ThreatCon::Emergency);
    device.apply_threatcon(&gate).expect("apply threatcon");
    let _ = device.authorize_capture(&gate, "post-escalation");

    let recorded = events.drain();
    let transition = recorded
        .iter()
        .find(|e| e.event_type == EventType::TempestTransition)
        .expect("transition event recorded");
    assert_eq!(transition.aux & 0xFFFF, TempestState::Lockdown.as_raw());
    assert_eq!(transition.role, "tempest_cam");
    assert_eq!(transition.layer, 7);

    assert!(recorded
        .iter()
        .any(|e| e.event_type == EventType::TempestLockdown));
    assert!(recorded
        .iter()
        .any(|e| e.event_type == EventType::PolicyViolation));
}
