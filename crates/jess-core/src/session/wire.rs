//! Wire sessions: forward-secret rekeying for interactive channels.
//!
//! On top of a compiled session, a wire session maintains a per-direction
//! carryover key that is re-derived on every message and periodically mixes
//! in fresh ephemeral key exchanges via a four-state handshake. Either side
//! may run the client or server role; the non-server side initiates
//! rekeying.
//!
//! Letters must be processed strictly in send order. The transport is
//! assumed reliable and in-order; reordering surfaces as an integrity
//! failure on the carryover.

use jess_tools::random;

use crate::letter::{Letter, Seal};
use crate::requirements::{Requirement, Requirements};
use crate::signet::{Signet, SIGNET_SCHEME_KEY};
use crate::JessError;

use super::Session;

/// Rekey interval in messages, per direction.
const DEFAULT_REKEY_AFTER_MSGS: u64 = 100_000;

/// Handshake state of a wire session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireState {
    /// Before the first message.
    Init,
    /// Steady state; rekeying starts from here.
    Idle,
    /// Server: received the initiator's ephemeral keys, must answer with
    /// its own on the next send.
    SendKey,
    /// Client: sent ephemeral keys, waiting for the server's.
    AwaitKey,
    /// Client: received the server's keys, must send the apply marker.
    SendApply,
    /// Server: sent its keys, waiting for the apply marker.
    AwaitApply,
}

/// Ephemeral key exchange pair: local signet and remote public key.
pub(crate) struct KxPair {
    pub(crate) scheme: &'static str,
    pub(crate) signet: Option<Signet>,
    pub(crate) peer: Option<Signet>,
}

/// Ephemeral key encapsulation pair: the signet slot holds the local
/// private signet on the initiating side and the peer's public signet on
/// the answering side.
pub(crate) struct KePair {
    pub(crate) scheme: &'static str,
    pub(crate) signet: Option<Signet>,
    pub(crate) seal: Option<Seal>,
}

/// Session state specific to communication over a network connection.
pub(crate) struct WireSession {
    pub(crate) server: bool,
    pub(crate) msg_no: u64,
    pub(crate) last_rekey_at_msg_no: u64,
    pub(crate) rekey_after_msgs: u64,

    pub(crate) send_key_carryover: Vec<u8>,
    pub(crate) recv_key_carryover: Vec<u8>,

    // Key management state.
    pub(crate) e_kx: Vec<KxPair>,
    pub(crate) e_ke: Vec<KePair>,
    pub(crate) state: WireState,
    pub(crate) new_key_material: Vec<Vec<u8>>,
}

/// A snapshot of wire session internals, for diagnostics and tests.
#[derive(Debug, Clone)]
pub struct WireStatus {
    /// Current handshake state.
    pub state: WireState,
    /// Messages processed by this side.
    pub msg_no: u64,
    /// Message number of the last completed rekey.
    pub last_rekey_at_msg_no: u64,
    /// Current send-direction carryover key.
    pub send_key_carryover: Vec<u8>,
    /// Current recv-direction carryover key.
    pub recv_key_carryover: Vec<u8>,
    /// Number of ephemeral key halves currently held.
    pub ephemeral_keys_live: usize,
}

impl WireSession {
    fn new() -> Self {
        Self {
            server: false,
            msg_no: 0,
            last_rekey_at_msg_no: 0,
            rekey_after_msgs: DEFAULT_REKEY_AFTER_MSGS,
            send_key_carryover: Vec::new(),
            recv_key_carryover: Vec::new(),
            e_kx: Vec::new(),
            e_ke: Vec::new(),
            state: WireState::Init,
            new_key_material: Vec::new(),
        }
    }

    fn rekey_needed(&self) -> bool {
        self.msg_no - self.last_rekey_at_msg_no > self.rekey_after_msgs
    }

    /// Generates fresh local signets and seals for the next outgoing letter
    /// if a handshake is due, and moves into the awaiting state.
    fn initiate_handshake_if_due(&mut self, letter: &mut Letter) -> Result<(), JessError> {
        if self.msg_no == 0 || (!self.server && self.rekey_needed()) {
            self.generate_local_key_exchange_signets(letter)?;
            self.generate_local_key_encapsulation_signets(letter)?;
            self.state = WireState::AwaitKey;
        }
        Ok(())
    }

    fn generate_local_key_exchange_signets(
        &mut self,
        letter: &mut Letter,
    ) -> Result<(), JessError> {
        for pair in &mut self.e_kx {
            if pair.signet.is_none() {
                let mut signet = Signet::new_base(pair.scheme);
                signet.generate_key()?;
                signet.store_key()?;

                let mut public = signet.as_recipient()?;
                public.store_key()?;
                letter.keys.push(Seal {
                    scheme: String::new(),
                    id: String::new(),
                    value: public.key,
                });

                pair.signet = Some(signet);
            }
        }
        Ok(())
    }

    fn generate_local_key_encapsulation_signets(
        &mut self,
        letter: &mut Letter,
    ) -> Result<(), JessError> {
        for pair in &mut self.e_ke {
            if pair.signet.is_none() {
                let mut signet = Signet::new_base(pair.scheme);
                signet.generate_key()?;
                signet.store_key()?;

                let mut public = signet.as_recipient()?;
                public.store_key()?;
                letter.keys.push(Seal {
                    scheme: String::new(),
                    id: String::new(),
                    value: public.key,
                });

                pair.signet = Some(signet);
            }
        }
        Ok(())
    }

    /// Assigns the keys of an incoming handshake letter to the ephemeral
    /// pairs on the answering side.
    fn assign_incoming_keys(&mut self, letter: &Letter) -> Result<(), JessError> {
        // The initial handshake message carries an extra encapsulation seal
        // (the wrapped key addressed to the static recipient), so the exact
        // count only holds without key encapsulators.
        if self.e_ke.is_empty() && letter.keys.len() != self.e_kx.len() + self.e_ke.len() {
            return Err(JessError::ProtocolViolation(
                "incorrect amount of keys in letter".into(),
            ));
        }

        let mut key_index = 0usize;
        for pair in &mut self.e_kx {
            let seal = letter
                .keys
                .get(key_index)
                .ok_or_else(|| JessError::ProtocolViolation("missing handshake keys".into()))?;
            pair.peer = Some(Signet {
                version: letter.version,
                scheme: pair.scheme.to_string(),
                key: seal.value.clone(),
                public: true,
                ..Signet::default()
            });
            key_index += 1;
        }
        for pair in &mut self.e_ke {
            // Skip seals with an id: those address static recipients.
            while letter.keys.get(key_index).is_some_and(|seal| !seal.id.is_empty()) {
                key_index += 1;
            }
            let seal = letter
                .keys
                .get(key_index)
                .ok_or_else(|| JessError::ProtocolViolation("missing handshake keys".into()))?;
            pair.signet = Some(Signet {
                version: letter.version,
                scheme: pair.scheme.to_string(),
                key: seal.value.clone(),
                public: true,
                ..Signet::default()
            });
            key_index += 1;
        }
        Ok(())
    }

    /// Burns all ephemeral key material. Failures are collected and the
    /// last one returned; cleanup always continues.
    fn burn_ephemeral_keys(&mut self) -> Result<(), JessError> {
        let mut last_error = None;

        for pair in &mut self.e_kx {
            if let Some(mut signet) = pair.signet.take() {
                if let Err(err) = signet.burn() {
                    last_error = Some(err);
                }
            }
            if let Some(mut peer) = pair.peer.take() {
                if let Err(err) = peer.burn() {
                    last_error = Some(err);
                }
            }
        }
        for pair in &mut self.e_ke {
            if let Some(mut signet) = pair.signet.take() {
                if let Err(err) = signet.burn() {
                    last_error = Some(err);
                }
            }
            if let Some(mut seal) = pair.seal.take() {
                jess_tools::burn_bytes(&mut seal.value);
            }
        }
        for part in &mut self.new_key_material {
            jess_tools::burn_bytes(part);
        }
        self.new_key_material.clear();

        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Session {
    /// Turns this session into a wire session.
    ///
    /// Wire sessions only support key exchange and key encapsulation for
    /// key establishment; password derivation, signing, and pre-shared keys
    /// do not fit the handshake shape.
    pub fn init_wire_session(&mut self) -> Result<(), JessError> {
        let required = Requirements::all().without(Requirement::SenderAuthentication);
        self.tool_requirements
            .check_compliance_to(required)
            .map_err(|missing| JessError::UnmetRequirements { missing })?;

        if self.pass_deriver.is_some() {
            return Err(JessError::config(
                "wire sessions currently do not support password derivation",
            ));
        }
        if !self.signers.is_empty() {
            return Err(JessError::config("wire sessions currently do not support signing"));
        }
        if self.envelope.secrets_of(SIGNET_SCHEME_KEY).next().is_some() {
            return Err(JessError::config(
                "wire sessions currently do not support pre-shared keys",
            ));
        }

        self.wire = Some(WireSession::new());
        Ok(())
    }

    /// Marks this wire session as being in the role of the server, rather
    /// than the client.
    pub fn set_server(&mut self) {
        if let Some(wire) = &mut self.wire {
            wire.server = true;
        }
    }

    /// Overrides the rekey interval in messages.
    pub fn set_rekey_after_msgs(&mut self, messages: u64) {
        if let Some(wire) = &mut self.wire {
            wire.rekey_after_msgs = messages;
        }
    }

    /// Returns a snapshot of the wire session state, if this is a wire
    /// session.
    pub fn wire_status(&self) -> Option<WireStatus> {
        self.wire.as_ref().map(|wire| WireStatus {
            state: wire.state,
            msg_no: wire.msg_no,
            last_rekey_at_msg_no: wire.last_rekey_at_msg_no,
            send_key_carryover: wire.send_key_carryover.clone(),
            recv_key_carryover: wire.recv_key_carryover.clone(),
            ephemeral_keys_live: wire
                .e_kx
                .iter()
                .map(|pair| usize::from(pair.signet.is_some()) + usize::from(pair.peer.is_some()))
                .chain(wire.e_ke.iter().map(|pair| {
                    usize::from(pair.signet.is_some()) + usize::from(pair.seal.is_some())
                }))
                .sum(),
        })
    }

    /// Drives the sending half of the handshake and initializes the KDF
    /// with handshake material plus the send carryover.
    pub(crate) fn wire_send_handshake_and_init_kdf(
        &mut self,
        wire: &mut WireSession,
        letter: &mut Letter,
    ) -> Result<(), JessError> {
        let mut material: Vec<Vec<u8>> = Vec::new();
        let mut burn = false;

        match wire.state {
            WireState::Init => {
                // Client: first message carries the static key
                // establishment plus fresh ephemeral halves.
                material = self.setup_closing_key_material(letter, Some(&mut *wire))?;
                wire.initiate_handshake_if_due(letter)?;
            }
            WireState::Idle => {
                wire.initiate_handshake_if_due(letter)?;
            }
            WireState::SendKey => {
                // Server: answer with own ephemerals, shared secrets, and a
                // fresh wrapped key per encapsulation pair.
                wire.generate_local_key_exchange_signets(letter)?;
                self.wire_make_shared_keys(wire, &mut material)?;
                wire.generate_local_key_encapsulation_signets(letter)?;
                self.wire_make_and_encapsulate_new_keys(wire, letter, &mut material)?;

                wire.new_key_material = material.clone();
                wire.state = WireState::AwaitApply;
            }
            WireState::SendApply => {
                // Client: commit the new keys.
                material.extend(wire.new_key_material.iter().cloned());
                letter.apply_keys = true;
                burn = true;
                wire.state = WireState::Idle;
                wire.last_rekey_at_msg_no = wire.msg_no;
            }
            WireState::AwaitKey | WireState::AwaitApply => {
                // Plain data message while the handshake is in flight.
            }
        }

        // Carryover key.
        if wire.msg_no == 0 {
            if self.default_symmetric_key_size == 0 {
                return Err(JessError::config("missing default key size"));
            }
            wire.send_key_carryover = vec![0u8; self.default_symmetric_key_size];
        } else {
            material.push(wire.send_key_carryover.clone());
        }

        self.init_kdf(&letter.nonce, &material)?;

        // Derive the next carryover; the first derivation bootstraps both
        // directions.
        let kdf = self.kdf.as_mut().expect("wire sessions always have a kdf");
        kdf.logic.derive_key_into(&mut wire.send_key_carryover)?;
        if wire.msg_no == 0 {
            wire.recv_key_carryover = wire.send_key_carryover.clone();
        }

        wire.msg_no += 1;

        if burn {
            wire.burn_ephemeral_keys()?;
        }
        Ok(())
    }

    /// Drives the receiving half of the handshake and initializes the KDF
    /// with handshake material plus the recv carryover.
    pub(crate) fn wire_recv_handshake_and_init_kdf(
        &mut self,
        wire: &mut WireSession,
        letter: &Letter,
    ) -> Result<(), JessError> {
        let mut material: Vec<Vec<u8>> = Vec::new();
        let mut burn = false;

        // The apply marker is only ever valid while awaiting it.
        if letter.apply_keys && wire.state != WireState::AwaitApply {
            return Err(JessError::ProtocolViolation(format!(
                "unexpected apply keys marker in state {:?}",
                wire.state
            )));
        }

        match wire.state {
            WireState::Init => {
                // Server: first message establishes the static keys and
                // carries the client's ephemeral halves.
                material = self.setup_opening_key_material(letter, Some(&mut *wire))?;
                if !letter.keys.is_empty() {
                    wire.assign_incoming_keys(letter)?;
                    wire.state = WireState::SendKey;
                }
            }
            WireState::Idle => {
                // Server: the client initiated a rekey.
                if !letter.keys.is_empty() {
                    wire.assign_incoming_keys(letter)?;
                    wire.state = WireState::SendKey;
                }
            }
            WireState::AwaitKey => {
                // Client: the server answered with its ephemeral halves.
                if !letter.keys.is_empty() {
                    if letter.keys.len() != wire.e_kx.len() + wire.e_ke.len() {
                        return Err(JessError::ProtocolViolation(
                            "incorrect amount of keys in letter".into(),
                        ));
                    }

                    let mut key_index = 0usize;
                    for pair in &mut wire.e_kx {
                        let seal = &letter.keys[key_index];
                        pair.peer = Some(Signet {
                            version: letter.version,
                            scheme: pair.scheme.to_string(),
                            key: seal.value.clone(),
                            public: true,
                            ..Signet::default()
                        });
                        key_index += 1;
                    }
                    for pair in &mut wire.e_ke {
                        pair.seal = Some(letter.keys[key_index].clone());
                        key_index += 1;
                    }

                    self.wire_make_shared_keys(wire, &mut material)?;
                    self.wire_unwrap_keys(wire, &mut material)?;

                    wire.new_key_material = material.clone();
                    wire.state = WireState::SendApply;
                }
            }
            WireState::AwaitApply => {
                // Server: the client committed the new keys.
                if letter.apply_keys {
                    material.extend(wire.new_key_material.iter().cloned());
                    burn = true;
                    wire.state = WireState::Idle;
                    wire.last_rekey_at_msg_no = wire.msg_no;
                }
            }
            WireState::SendKey | WireState::SendApply => {
                // Plain data message while a send is owed.
            }
        }

        // Carryover key.
        if wire.msg_no == 0 {
            if self.default_symmetric_key_size == 0 {
                return Err(JessError::config("missing default key size"));
            }
            wire.recv_key_carryover = vec![0u8; self.default_symmetric_key_size];
        } else {
            material.push(wire.recv_key_carryover.clone());
        }

        self.init_kdf(&letter.nonce, &material)?;

        let kdf = self.kdf.as_mut().expect("wire sessions always have a kdf");
        kdf.logic.derive_key_into(&mut wire.recv_key_carryover)?;
        if wire.msg_no == 0 {
            wire.send_key_carryover = wire.recv_key_carryover.clone();
        }

        wire.msg_no += 1;

        if burn {
            wire.burn_ephemeral_keys()?;
        }
        Ok(())
    }

    /// Computes the shared secret of every ephemeral key exchange pair.
    fn wire_make_shared_keys(
        &self,
        wire: &mut WireSession,
        material: &mut Vec<Vec<u8>>,
    ) -> Result<(), JessError> {
        for pair in &mut wire.e_kx {
            let signet = pair.signet.as_ref().ok_or_else(|| {
                JessError::ProtocolViolation(format!(
                    "missing key exchange signet for {}",
                    pair.scheme
                ))
            })?;
            let peer = pair.peer.as_mut().ok_or_else(|| {
                JessError::ProtocolViolation(format!(
                    "missing key exchange peer for {}",
                    pair.scheme
                ))
            })?;
            peer.load_key()?;

            let slot = self
                .key_exchangers
                .iter()
                .find(|slot| slot.info.name == pair.scheme)
                .ok_or_else(|| {
                    JessError::ProtocolViolation(format!(
                        "no key exchange tool for {}",
                        pair.scheme
                    ))
                })?;
            material.push(slot.logic.make_shared_key(signet, peer)?);
        }
        Ok(())
    }

    /// Wraps a fresh random key for every ephemeral encapsulation pair.
    fn wire_make_and_encapsulate_new_keys(
        &self,
        wire: &mut WireSession,
        letter: &mut Letter,
        material: &mut Vec<Vec<u8>>,
    ) -> Result<(), JessError> {
        for pair in &mut wire.e_ke {
            let signet = pair.signet.as_mut().ok_or_else(|| {
                JessError::ProtocolViolation(format!(
                    "missing key encapsulation signet for {}",
                    pair.scheme
                ))
            })?;
            signet.load_key()?;

            let new_key = random::random_bytes(self.default_symmetric_key_size)?;

            let slot = self
                .key_encapsulators
                .iter()
                .find(|slot| slot.info.name == pair.scheme)
                .ok_or_else(|| {
                    JessError::ProtocolViolation(format!(
                        "no key encapsulation tool for {}",
                        pair.scheme
                    ))
                })?;
            let wrapped = slot.logic.encapsulate_key(&new_key, signet)?;

            letter.keys.push(Seal { scheme: String::new(), id: String::new(), value: wrapped });
            material.push(new_key);
        }
        Ok(())
    }

    /// Unwraps the encapsulated keys of every ephemeral pair.
    fn wire_unwrap_keys(
        &self,
        wire: &mut WireSession,
        material: &mut Vec<Vec<u8>>,
    ) -> Result<(), JessError> {
        for pair in &mut wire.e_ke {
            let signet = pair.signet.as_mut().ok_or_else(|| {
                JessError::ProtocolViolation(format!(
                    "missing key encapsulation signet for {}",
                    pair.scheme
                ))
            })?;
            signet.load_key()?;
            let seal = pair.seal.as_ref().ok_or_else(|| {
                JessError::ProtocolViolation(format!(
                    "missing key encapsulation seal for {}",
                    pair.scheme
                ))
            })?;

            let slot = self
                .key_encapsulators
                .iter()
                .find(|slot| slot.info.name == pair.scheme)
                .ok_or_else(|| {
                    JessError::ProtocolViolation(format!(
                        "no key encapsulation tool for {}",
                        pair.scheme
                    ))
                })?;
            material.push(slot.logic.unwrap_key(&seal.value, signet)?);
        }
        Ok(())
    }
}
