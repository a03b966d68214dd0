//! Wire sessions: a simulated client/server correspondence with periodic
//! rekeying.

mod common;

use common::{envelope_for_suite, suite, test_trust_store};
use jess_core::{JessError, Letter, MemTrustStore, Session, WireState, SUITE_WIRE_V1};

const REKEY_AFTER_MSGS: u64 = 100;

struct WireTestRange {
    store: MemTrustStore,
    client: Session,
    server: Option<Session>,
    rekeys_observed: usize,
    msgs_transferred: usize,
}

impl WireTestRange {
    fn new() -> Self {
        let store = test_trust_store();
        let envelope = envelope_for_suite(&store, suite(SUITE_WIRE_V1));

        let mut client = envelope.wire_correspondence(&store).unwrap();
        client.set_rekey_after_msgs(REKEY_AFTER_MSGS);

        Self { store, client, server: None, rekeys_observed: 0, msgs_transferred: 0 }
    }

    fn client_send(&mut self, payload: &[u8]) -> Vec<u8> {
        // A completed key exchange is observable as the state passing
        // through SendApply: the next close commits it.
        if self.client.wire_status().unwrap().state == WireState::SendApply {
            self.rekeys_observed += 1;
        }

        let letter = self.client.close(payload).unwrap();
        letter.to_wire().unwrap()
    }

    fn server_recv(&mut self, wire_data: &[u8], expected: &[u8]) {
        self.msgs_transferred += 1;
        let letter = Letter::from_wire(wire_data).unwrap();

        // The server session springs from the first letter it sees.
        if self.server.is_none() {
            let mut server = letter.wire_correspondence(&self.store).unwrap();
            server.set_server();
            server.set_rekey_after_msgs(REKEY_AFTER_MSGS);
            self.server = Some(server);
        }

        let server = self.server.as_mut().unwrap();
        let opened = server.open(&letter).unwrap();
        assert_eq!(opened, expected, "server received corrupted plaintext");
    }

    fn server_send(&mut self, payload: &[u8]) -> Vec<u8> {
        let letter = self.server.as_mut().expect("server not started").close(payload).unwrap();
        letter.to_wire().unwrap()
    }

    fn client_recv(&mut self, wire_data: &[u8], expected: &[u8]) {
        self.msgs_transferred += 1;
        let letter = Letter::from_wire(wire_data).unwrap();
        let opened = self.client.open(&letter).unwrap();
        assert_eq!(opened, expected, "client received corrupted plaintext");
    }
}

#[test]
fn wire_correspondence_with_rekeying() {
    let mut range = WireTestRange::new();

    let up = b"the quick brown fox jumps over the lazy dog";
    let down = b"and jumps right back";

    // Handshake: client hello, server key answer, client apply.
    let wire = range.client_send(up);
    range.server_recv(&wire, up);

    let wire = range.server_send(down);
    range.client_recv(&wire, down);

    let pre_rekey_client = range.client.wire_status().unwrap();

    // 250 round trips with a rekey interval of 100 must rekey at least
    // twice.
    for i in 0..250u32 {
        let up_payload = format!("up {i}: {}", String::from_utf8_lossy(up)).into_bytes();
        let wire = range.client_send(&up_payload);
        range.server_recv(&wire, &up_payload);

        let down_payload = format!("down {i}").into_bytes();
        let wire = range.server_send(&down_payload);
        range.client_recv(&wire, &down_payload);
    }

    assert!(
        range.rekeys_observed >= 2,
        "expected at least two rekeys, observed {}",
        range.rekeys_observed
    );
    assert!(range.msgs_transferred >= 500);

    // Carryovers have moved on from their pre-rekey values.
    let post_client = range.client.wire_status().unwrap();
    assert_ne!(post_client.send_key_carryover, pre_rekey_client.send_key_carryover);
    assert_ne!(post_client.recv_key_carryover, pre_rekey_client.recv_key_carryover);
    assert!(post_client.last_rekey_at_msg_no > 0, "client never completed a rekey");

    let server_status = range.server.as_ref().unwrap().wire_status().unwrap();
    assert!(server_status.last_rekey_at_msg_no > 0, "server never applied a rekey");
}

#[test]
fn carryovers_differ_per_message_and_match_across_sides() {
    let mut range = WireTestRange::new();

    let wire = range.client_send(b"one");
    range.server_recv(&wire, b"one");

    let client_status = range.client.wire_status().unwrap();
    let server_status = range.server.as_ref().unwrap().wire_status().unwrap();

    // After the first message both sides hold the same bootstrap keys,
    // mirrored per direction.
    assert_eq!(client_status.send_key_carryover, server_status.recv_key_carryover);

    let before = client_status.send_key_carryover.clone();
    let wire = range.client_send(b"two");
    range.server_recv(&wire, b"two");
    let after = range.client.wire_status().unwrap().send_key_carryover;
    assert_ne!(before, after, "carryover must be re-derived every message");
}

#[test]
fn ephemeral_keys_are_burned_after_the_handshake() {
    let mut range = WireTestRange::new();

    let wire = range.client_send(b"hello");
    range.server_recv(&wire, b"hello");

    // Handshake in flight: the client still holds its ephemeral halves.
    assert!(range.client.wire_status().unwrap().ephemeral_keys_live > 0);

    let wire = range.server_send(b"hi");
    range.client_recv(&wire, b"hi");

    // The client commits on its next send and burns everything.
    let wire = range.client_send(b"commit");
    assert_eq!(range.client.wire_status().unwrap().ephemeral_keys_live, 0);
    range.server_recv(&wire, b"commit");
    assert_eq!(
        range.server.as_ref().unwrap().wire_status().unwrap().ephemeral_keys_live,
        0,
        "server kept ephemeral keys after apply"
    );
}

#[test]
fn unexpected_apply_marker_is_a_protocol_violation() {
    let mut range = WireTestRange::new();

    let wire = range.client_send(b"hello");
    range.server_recv(&wire, b"hello");

    // Forge an apply marker while the server is in SendKey.
    let mut forged = Letter::from_wire(&range.client_send(b"data")).unwrap();
    forged.apply_keys = true;

    match range.server.as_mut().unwrap().open(&forged) {
        Err(JessError::ProtocolViolation(_)) => {}
        other => panic!("expected protocol violation, got {other:?}"),
    }
}

#[test]
fn wire_sessions_reject_unsuitable_tools() {
    let store = test_trust_store();

    // Password suites cannot run the handshake.
    let envelope = envelope_for_suite(&store, suite(jess_core::SUITE_PASSWORD_V1));
    match envelope.wire_correspondence(&store) {
        Err(JessError::InvalidConfiguration(_)) => {}
        other => panic!("expected invalid configuration, got {other:?}"),
    }

    // Neither can static pre-shared keys.
    let envelope = envelope_for_suite(&store, suite(jess_core::SUITE_KEY_V1));
    match envelope.wire_correspondence(&store) {
        Err(JessError::InvalidConfiguration(_)) => {}
        other => panic!("expected invalid configuration, got {other:?}"),
    }
}
