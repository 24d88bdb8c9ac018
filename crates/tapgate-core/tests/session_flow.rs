//! End-to-end session flows over the mock seams.

use serde_json::json;

use tapgate_core::harness::{PresentationCall, ScriptedInput, TestRig};
use tapgate_core::session::ConnectionState;
use tapgate_core::store::{ReaderIdentity, Store};
use tapgate_core::tag::TagUid;
use tapgate_proto::envelope::{kind, Envelope};

fn registered_identity() -> ReaderIdentity {
    ReaderIdentity {
        reader_id: 7,
        api_key: "abcdef0123456789".into(),
        has_auth: true,
    }
}

#[tokio::test]
async fn fresh_reader_registers_then_authenticates() {
    let mut rig = TestRig::new(ReaderIdentity::default());

    rig.tick(1_000).await;
    assert_eq!(rig.engine.state(), ConnectionState::SocketConnected);
    assert_eq!(rig.engine.transport().sent_of_kind(kind::REGISTER).len(), 1);
    assert!(rig.engine.transport().sent_of_kind(kind::AUTHENTICATE).is_empty());

    // Backend answers with registration data.
    rig.push_inbound(&Envelope::event(
        kind::REGISTER,
        json!({"id": 7, "token": "abcdef0123456789"}),
    ));
    rig.tick(2_000).await;

    let persisted = rig.store.load_identity().await.unwrap();
    assert_eq!(persisted.reader_id, 7);
    assert!(persisted.has_auth);

    // The same tick switches from registering to authenticating.
    assert_eq!(rig.engine.transport().sent_of_kind(kind::REGISTER).len(), 1);
    let auth = rig.engine.transport().sent_of_kind(kind::AUTHENTICATE);
    assert_eq!(auth.len(), 1);
    assert_eq!(
        auth[0].data.as_ref().unwrap().payload,
        json!({"id": 7, "token": "abcdef0123456789"})
    );
}

#[tokio::test]
async fn registration_is_rate_limited_to_one_per_window() {
    let mut rig = TestRig::new(ReaderIdentity::default());

    rig.tick(1_000).await;
    rig.tick(6_000).await; // inside the 10 s window
    assert_eq!(rig.engine.transport().sent_of_kind(kind::REGISTER).len(), 1);

    rig.tick(11_500).await; // window elapsed
    assert_eq!(rig.engine.transport().sent_of_kind(kind::REGISTER).len(), 2);
}

#[tokio::test]
async fn authentication_is_rate_limited_to_one_per_window() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.tick(6_000).await;
    assert_eq!(rig.engine.transport().sent_of_kind(kind::AUTHENTICATE).len(), 1);

    rig.tick(11_500).await;
    assert_eq!(rig.engine.transport().sent_of_kind(kind::AUTHENTICATE).len(), 2);
}

#[tokio::test]
async fn heartbeat_runs_on_its_own_cadence() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.tick(3_000).await; // inside the 5 s cadence
    rig.tick(6_100).await;

    let heartbeats = rig
        .engine
        .transport()
        .sent_kinds()
        .iter()
        .filter(|k| *k == "HEARTBEAT")
        .count();
    assert_eq!(heartbeats, 2);
}

#[tokio::test]
async fn reader_authenticated_flips_auth_state_and_surfaces_name() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.push_inbound(&Envelope::event(
        kind::READER_AUTHENTICATED,
        json!({"name": "Front Door"}),
    ));
    rig.tick(2_000).await;

    assert!(rig.engine.is_authenticated());
    let calls = rig.presentation.calls();
    assert!(calls.contains(&PresentationCall::ApiConnected(true)));
    assert!(calls.contains(&PresentationCall::DeviceName("Front Door".into())));
}

#[tokio::test]
async fn unauthorized_revokes_flag_and_falls_back_to_registration() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.push_inbound(&Envelope::event(
        kind::READER_AUTHENTICATED,
        json!({"name": "Front Door"}),
    ));
    rig.tick(2_000).await;
    assert!(rig.engine.is_authenticated());

    rig.push_inbound(&Envelope::event(kind::UNAUTHORIZED, json!({"message": "revoked"})));
    rig.tick(3_000).await;

    assert!(!rig.engine.is_authenticated());
    let persisted = rig.store.load_identity().await.unwrap();
    assert!(!persisted.has_auth);
    // Flag-only revocation: id and token survive.
    assert_eq!(persisted.reader_id, 7);
    assert_eq!(persisted.api_key, "abcdef0123456789");

    // Inbound runs before outbound, so the same tick already re-registers
    // instead of re-sending stale credentials.
    assert_eq!(rig.engine.transport().sent_of_kind(kind::REGISTER).len(), 1);
    assert_eq!(rig.engine.transport().sent_of_kind(kind::AUTHENTICATE).len(), 1);
    assert!(rig
        .presentation
        .calls()
        .contains(&PresentationCall::ApiConnected(false)));
}

#[tokio::test]
async fn inbound_registration_never_alters_a_registered_identity() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.push_inbound(&Envelope::event(
        kind::REGISTER,
        json!({"id": 99, "token": "attacker-token-00"}),
    ));
    rig.tick(2_000).await;

    let persisted = rig.store.load_identity().await.unwrap();
    assert_eq!(persisted, registered_identity());
}

#[tokio::test]
async fn enable_card_checking_leads_to_tap_reports() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.push_inbound(&Envelope::event(
        kind::ENABLE_CARD_CHECKING,
        json!({"message": "Tap your card"}),
    ));
    rig.tick(2_000).await;

    assert!(rig.tags.scanning_enabled());
    let calls = rig.presentation.calls();
    assert!(calls.contains(&PresentationCall::TapEnabled(true)));
    assert!(calls.contains(&PresentationCall::TapPrompt("Tap your card".into())));

    rig.tags
        .link_mut()
        .detect_results
        .push_back(Some(TagUid::new(&[0x04, 0xaa, 0xbb, 0xcc, 0xdd])));
    rig.tick(2_200).await;

    let taps = rig.engine.transport().sent_of_kind(kind::NFC_TAP);
    assert_eq!(taps.len(), 1);
    assert_eq!(
        taps[0].data.as_ref().unwrap().payload,
        json!({"cardUID": "04aabbccdd"})
    );
}

#[tokio::test]
async fn disable_card_checking_stops_scanning() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.push_inbound(&Envelope::event(kind::ENABLE_CARD_CHECKING, json!({"message": "Tap"})));
    rig.tick(2_000).await;
    rig.push_inbound(&Envelope::event(kind::DISABLE_CARD_CHECKING, serde_json::Value::Null));
    rig.tick(3_000).await;

    assert!(!rig.tags.scanning_enabled());
    let detect_calls_before = rig.tags.link().detect_calls;
    rig.tick(4_000).await;
    assert_eq!(rig.tags.link().detect_calls, detect_calls_before);
}

#[tokio::test]
async fn keypress_is_reported_once_per_tick() {
    let mut rig = TestRig::new(registered_identity());
    rig.engine.set_input(Box::new(ScriptedInput::new(['A', '5'])));

    rig.tick(1_000).await;
    rig.tick(1_100).await;
    rig.tick(1_200).await;

    let presses = rig.engine.transport().sent_of_kind(kind::KEY_PRESSED);
    assert_eq!(presses.len(), 2);
    assert_eq!(presses[0].data.as_ref().unwrap().payload, json!({"key": "A"}));
    assert_eq!(presses[1].data.as_ref().unwrap().payload, json!({"key": "5"}));
}

#[tokio::test]
async fn display_messages_are_forwarded_verbatim() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.push_inbound(&Envelope::event(
        kind::SHOW_TEXT,
        json!({"lineOne": "Access", "lineTwo": "granted"}),
    ));
    rig.tick(2_000).await;
    rig.push_inbound(&Envelope::event(
        kind::DISPLAY_ERROR,
        json!({"message": "Denied", "duration": 3000}),
    ));
    rig.tick(3_000).await;
    rig.push_inbound(&Envelope::event(kind::HIDE_TEXT, serde_json::Value::Null));
    rig.tick(4_000).await;

    let calls = rig.presentation.calls();
    assert!(calls.contains(&PresentationCall::Text("Access".into(), "granted".into())));
    assert!(calls.contains(&PresentationCall::Error("Denied".into(), 3000)));
    assert!(calls.contains(&PresentationCall::HideText));
}

#[tokio::test]
async fn unknown_and_malformed_messages_are_dropped_without_state_change() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.push_inbound(&Envelope::event("FROBNICATE", json!({"x": 1})));
    rig.engine
        .transport_mut()
        .inbound
        .push_back(b"}{ definitely not json".to_vec());
    rig.tick(2_000).await;
    rig.tick(2_100).await;

    assert_eq!(rig.engine.state(), ConnectionState::SocketConnected);
    // Still exactly the one AUTHENTICATE from the handshake.
    assert_eq!(rig.engine.transport().sent_of_kind(kind::AUTHENTICATE).len(), 1);
}

#[tokio::test]
async fn socket_loss_forces_reauthentication_on_reconnect() {
    let mut rig = TestRig::new(registered_identity());

    rig.tick(1_000).await;
    rig.push_inbound(&Envelope::event(kind::READER_AUTHENTICATED, json!({"name": "Door"})));
    rig.tick(2_000).await;
    assert!(rig.engine.is_authenticated());

    rig.engine.transport_mut().connected = false;
    rig.tick(4_100).await; // drops, then reconnects (retry window elapsed)

    assert!(!rig.engine.is_authenticated());
    assert_eq!(rig.engine.state(), ConnectionState::SocketConnected);
    // A second AUTHENTICATE goes out after the reconnect.
    assert_eq!(rig.engine.transport().sent_of_kind(kind::AUTHENTICATE).len(), 2);
}
