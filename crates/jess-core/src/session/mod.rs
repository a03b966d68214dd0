//! The session compiler.
//!
//! A session is the compiled form of an envelope: the suite's tool tokens
//! are tokenized, classified into typed queues by purpose, wired up with
//! hash tools, and validated as a whole. The token order of the suite is
//! canonical: key material assembly, seal emission, cipher application, MAC
//! concatenation, and signature emission all follow it, and decryption
//! walks it in reverse.
//!
//! Sessions are single-tenant: one `close`, `open`, or `verify` call at a
//! time, enforced by `&mut self`.

mod close;
mod open;
mod wire;

use std::collections::BTreeMap;

use jess_tools::{
    Cipher, DynDigest as _, DynHasher, HashTool, Helper, IntegratedCipher, KeyDeriver,
    KeyEncapsulator, KeyExchanger, KeyHandler, Mac, PassDeriver, Purpose, Signer, ToolInfo,
    ToolInstance, ToolOption,
};

pub use wire::{WireState, WireStatus};
pub(crate) use wire::WireSession;

use crate::config;
use crate::envelope::Envelope;
use crate::password::{calculate_password_security_level, password_iterations_for_tool};
use crate::requirements::{Requirement, Requirements};
use crate::signet::{Signet, SIGNET_SCHEME_KEY, SIGNET_SCHEME_PASSWORD};
use crate::JessError;

/// A tool instance sorted into a session queue.
pub(crate) struct QueuedTool<T> {
    pub(crate) info: &'static ToolInfo,
    pub(crate) hash: Option<&'static HashTool>,
    pub(crate) handler: Option<&'static dyn KeyHandler>,
    /// Key into the managed hasher pool of the tool's purpose.
    pub(crate) managed_hash: Option<String>,
    pub(crate) logic: T,
}

/// A hash instance shared by all tools requesting the same hash within one
/// purpose pool. The session feeds it data and associated data once per
/// direction.
pub(crate) struct ManagedHasher {
    digest: DynHasher,
}

impl ManagedHasher {
    fn new(tool: &'static HashTool) -> Self {
        Self { digest: tool.new_digest() }
    }

    pub(crate) fn feed(&mut self, data: &[u8], associated_data: &[u8]) {
        self.digest.update(data);
        self.digest.update(associated_data);
    }

    pub(crate) fn sum(&self) -> Vec<u8> {
        self.digest.box_clone().finalize().to_vec()
    }

    pub(crate) fn reset(&mut self) {
        self.digest.reset();
    }
}

/// Position of a stateful tool, in suite order.
pub(crate) enum StatefulRef {
    Integrated(usize),
    Cipher(usize),
    Mac(usize),
}

/// The compiled pipeline for one envelope.
pub struct Session {
    pub(crate) envelope: Envelope,

    pub(crate) default_symmetric_key_size: usize,
    pub(crate) security_level: i32,
    pub(crate) max_security_level: i32,
    pub(crate) tool_requirements: Requirements,

    // Session over the wire.
    pub(crate) wire: Option<WireSession>,

    // Typed tool queues, each in suite order.
    pub(crate) kdf: Option<QueuedTool<Box<dyn KeyDeriver>>>,
    pub(crate) pass_deriver: Option<QueuedTool<Box<dyn PassDeriver>>>,
    pub(crate) key_exchangers: Vec<QueuedTool<Box<dyn KeyExchanger>>>,
    pub(crate) key_encapsulators: Vec<QueuedTool<Box<dyn KeyEncapsulator>>>,
    pub(crate) integrated_ciphers: Vec<QueuedTool<Box<dyn IntegratedCipher>>>,
    pub(crate) ciphers: Vec<QueuedTool<Box<dyn Cipher>>>,
    pub(crate) macs: Vec<QueuedTool<Box<dyn Mac>>>,
    pub(crate) signers: Vec<QueuedTool<Box<dyn Signer>>>,

    pub(crate) managed_mac_hashers: BTreeMap<String, ManagedHasher>,
    pub(crate) managed_signing_hashers: BTreeMap<String, ManagedHasher>,

    /// Stateful tools in suite order; `setup` consumes KDF bytes in exactly
    /// this order.
    pub(crate) state_order: Vec<StatefulRef>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("envelope", &self.envelope)
            .field("security_level", &self.security_level)
            .field("max_security_level", &self.max_security_level)
            .finish_non_exhaustive()
    }
}

/// Tracks the effective and maximum security level during compilation.
struct LevelTracker {
    session_level: i32,
    max_level: i32,
    envelope_min: i32,
}

impl LevelTracker {
    fn check(&self, level: i32, subject: impl Fn() -> String) -> Result<(), JessError> {
        let global_min = config::minimum_security_level();
        if global_min > 0 {
            // The global minimum overrides other checks.
            if level < global_min {
                return Err(JessError::WeakSecurityLevel {
                    subject: subject(),
                    level,
                    minimum: global_min,
                });
            }
        } else if self.envelope_min > 0 {
            if level < self.envelope_min {
                return Err(JessError::WeakSecurityLevel {
                    subject: subject(),
                    level,
                    minimum: self.envelope_min,
                });
            }
        } else if level < config::default_security_level() {
            return Err(JessError::WeakSecurityLevel {
                subject: subject(),
                level,
                minimum: config::default_security_level(),
            });
        }
        Ok(())
    }

    fn observe(&mut self, level: i32, subject: impl Fn() -> String) -> Result<(), JessError> {
        if level == 0 {
            // Not applicable.
            return Ok(());
        }
        if level < 0 {
            return Err(JessError::BrokenPrimitive { subject: subject() });
        }

        self.check(level, subject)?;

        if self.session_level == 0 || level < self.session_level {
            self.session_level = level;
        }
        if level > self.max_level {
            self.max_level = level;
        }
        Ok(())
    }
}

fn queued<T>(
    info: &'static ToolInfo,
    hash: Option<&'static HashTool>,
    handler: Option<&'static dyn KeyHandler>,
    managed_hash: Option<String>,
    logic: T,
) -> QueuedTool<T> {
    QueuedTool { info, hash, handler, managed_hash, logic }
}

/// Splits a suite token into tool name and optional hash argument.
fn parse_token(token: &str) -> (&str, Option<&str>) {
    match token.split_once('(') {
        Some((name, arg)) => (name, Some(arg.trim_end_matches(')'))),
        None => (token, None),
    }
}

/// The generic tool security level: the declared level, bounded by the
/// assigned hash tool's level.
fn generic_tool_level(info: &ToolInfo, hash: Option<&'static HashTool>) -> i32 {
    match hash {
        Some(hash) if info.security_level == 0 => hash.security_level,
        Some(hash) => info.security_level.min(hash.security_level),
        None => info.security_level,
    }
}

/// Computes and checks the security level contribution of one tool or one
/// signet assigned to it.
fn observe_component(
    tracker: &mut LevelTracker,
    info: &'static ToolInfo,
    hash: Option<&'static HashTool>,
    handler: Option<&'static dyn KeyHandler>,
    signet: Option<&Signet>,
) -> Result<(), JessError> {
    let level = match signet {
        Some(signet) if signet.scheme == SIGNET_SCHEME_KEY => (signet.key.len() * 8) as i32,
        Some(signet) if signet.scheme == SIGNET_SCHEME_PASSWORD => {
            // Only check if the password is present; existence is checked
            // when opening or closing.
            if signet.key.is_empty() {
                0
            } else {
                let level = calculate_password_security_level(
                    &String::from_utf8_lossy(&signet.key),
                    password_iterations_for_tool(info.name),
                );
                if level < 0 {
                    return Err(JessError::WeakKey { id: signet.id.clone() });
                }
                level
            }
        }
        _ => match handler {
            Some(handler) => handler
                .security_level(signet.map(|s| s as &dyn jess_tools::KeySlot))?
                .unwrap_or_else(|| generic_tool_level(info, hash)),
            None => generic_tool_level(info, hash),
        },
    };

    tracker.observe(level, || match signet {
        Some(signet) => format!("supplied {} signet \"{}\"", signet.scheme, signet.id),
        None => format!("tool {}", info.name),
    })
}

impl Session {
    /// Compiles the envelope into a session.
    ///
    /// The envelope must have its suite loaded and its signets prepared.
    pub(crate) fn new(envelope: Envelope) -> Result<Session, JessError> {
        let suite = envelope
            .suite()
            .ok_or_else(|| JessError::config("suite not loaded"))?;

        let mut s = Session {
            envelope,
            default_symmetric_key_size: 0,
            security_level: 0,
            max_security_level: 0,
            tool_requirements: Requirements::none(),
            wire: None,
            kdf: None,
            pass_deriver: None,
            key_exchangers: Vec::new(),
            key_encapsulators: Vec::new(),
            integrated_ciphers: Vec::new(),
            ciphers: Vec::new(),
            macs: Vec::new(),
            signers: Vec::new(),
            managed_mac_hashers: BTreeMap::new(),
            managed_signing_hashers: BTreeMap::new(),
            state_order: Vec::new(),
        };

        let mut tracker = LevelTracker {
            session_level: 0,
            max_level: 0,
            envelope_min: s.envelope.security_level,
        };

        // Check envelope and suite security levels.
        if s.envelope.security_level > 0 {
            let name = s.envelope.name.clone();
            tracker.check(s.envelope.security_level, || format!("envelope \"{name}\""))?;
        }
        tracker.check(suite.security_level, || format!("suite \"{}\"", suite.id))?;

        let mut key_source_available = false;
        let mut total_signets_seen = 0usize;
        let mut require_security_level = false;
        let mut require_default_key_size = false;

        // Queue metadata for the per-signet pass below, in suite order.
        let mut signet_passes: Vec<(
            &'static ToolInfo,
            Option<&'static HashTool>,
            Option<&'static dyn KeyHandler>,
        )> = Vec::new();

        for (i, token) in suite.tools.iter().enumerate() {
            // Each tool may only be specified once.
            for (j, other) in suite.tools.iter().enumerate() {
                if i != j && token == other {
                    return Err(JessError::config(format!(
                        "cannot use tool {token} twice, each tool may be only specified once"
                    )));
                }
            }

            let (tool_name, hash_arg) = parse_token(token);
            let tool = jess_tools::get(tool_name).map_err(|_| {
                JessError::config(format!("the specified tool {tool_name} could not be found"))
            })?;
            let hash = match hash_arg {
                Some(arg) => Some(jess_tools::get_hash_tool(arg).map_err(|_| {
                    JessError::config(format!(
                        "the specified hashtool for {tool_name}({arg}) could not be found"
                    ))
                })?),
                None => None,
            };

            // Process options.
            let mut managed_hash = None;
            for option in tool.info.options {
                match option {
                    ToolOption::NeedsManagedHasher => {
                        let pool = match tool.info.purpose {
                            Purpose::Mac => &mut s.managed_mac_hashers,
                            Purpose::Signing => &mut s.managed_signing_hashers,
                            _ => {
                                return Err(JessError::config(
                                    "only MAC and Signing tools may use managed hashers",
                                ))
                            }
                        };
                        let (arg, hash) = match (hash_arg, hash) {
                            (Some(arg), Some(hash)) => (arg, hash),
                            _ => {
                                return Err(JessError::config(format!(
                                    "the specified hashtool for {tool_name} could not be found"
                                )))
                            }
                        };
                        pool.entry(arg.to_string()).or_insert_with(|| ManagedHasher::new(hash));
                        managed_hash = Some(arg.to_string());
                    }
                    ToolOption::NeedsDedicatedHasher => {
                        if hash.is_none() {
                            return Err(JessError::config(format!(
                                "the specified hashtool for {tool_name} could not be found"
                            )));
                        }
                    }
                    ToolOption::NeedsSecurityLevel => require_security_level = true,
                    ToolOption::NeedsDefaultKeySize => require_default_key_size = true,
                    ToolOption::Streaming | ToolOption::HasState => {}
                }
            }

            let has_state = tool.info.has_option(ToolOption::HasState);

            // Assign the instance to its queue and accumulate the
            // requirements its purpose provides.
            match tool.new_instance(hash)? {
                ToolInstance::KeyDeriver(logic) => {
                    if let Some(existing) = &s.kdf {
                        return Err(JessError::config(format!(
                            "cannot use {}, you may only specify one key derivation tool and {} was already specified",
                            tool.info.name, existing.info.name
                        )));
                    }
                    s.kdf = Some(queued(&tool.info, hash, tool.key_handler, managed_hash, logic));
                }
                ToolInstance::PassDeriver(logic) => {
                    if let Some(existing) = &s.pass_deriver {
                        return Err(JessError::config(format!(
                            "cannot use {}, you may only specify one password derivation tool and {} was already specified",
                            tool.info.name, existing.info.name
                        )));
                    }
                    s.pass_deriver =
                        Some(queued(&tool.info, hash, tool.key_handler, managed_hash, logic));
                    s.tool_requirements.add(Requirement::SenderAuthentication);
                    s.tool_requirements.add(Requirement::RecipientAuthentication);
                    signet_passes.push((&tool.info, hash, tool.key_handler));
                }
                ToolInstance::KeyExchanger(logic) => {
                    s.key_exchangers
                        .push(queued(&tool.info, hash, tool.key_handler, managed_hash, logic));
                    s.tool_requirements.add(Requirement::RecipientAuthentication);
                    signet_passes.push((&tool.info, hash, tool.key_handler));
                }
                ToolInstance::KeyEncapsulator(logic) => {
                    s.key_encapsulators
                        .push(queued(&tool.info, hash, tool.key_handler, managed_hash, logic));
                    s.tool_requirements.add(Requirement::RecipientAuthentication);
                    signet_passes.push((&tool.info, hash, tool.key_handler));
                }
                ToolInstance::Signer(logic) => {
                    s.signers
                        .push(queued(&tool.info, hash, tool.key_handler, managed_hash, logic));
                    s.tool_requirements.add(Requirement::SenderAuthentication);
                    // A verified signature covers data and associated data,
                    // so alterations are detected.
                    s.tool_requirements.add(Requirement::Integrity);
                    signet_passes.push((&tool.info, hash, tool.key_handler));
                }
                ToolInstance::IntegratedCipher(logic) => {
                    let index = s.integrated_ciphers.len();
                    s.integrated_ciphers
                        .push(queued(&tool.info, hash, tool.key_handler, managed_hash, logic));
                    s.tool_requirements.add(Requirement::Confidentiality);
                    s.tool_requirements.add(Requirement::Integrity);
                    if has_state {
                        s.state_order.push(StatefulRef::Integrated(index));
                    }
                }
                ToolInstance::Cipher(logic) => {
                    let index = s.ciphers.len();
                    s.ciphers
                        .push(queued(&tool.info, hash, tool.key_handler, managed_hash, logic));
                    s.tool_requirements.add(Requirement::Confidentiality);
                    if has_state {
                        s.state_order.push(StatefulRef::Cipher(index));
                    }
                }
                ToolInstance::Mac(logic) => {
                    let index = s.macs.len();
                    s.macs.push(queued(&tool.info, hash, tool.key_handler, managed_hash, logic));
                    s.tool_requirements.add(Requirement::Integrity);
                    if has_state {
                        s.state_order.push(StatefulRef::Mac(index));
                    }
                }
            }

            // Per-tool security level.
            observe_component(&mut tracker, &tool.info, hash, tool.key_handler, None)?;

            // The biggest declared key size becomes the session default.
            if tool.info.key_size > s.default_symmetric_key_size {
                s.default_symmetric_key_size = tool.info.key_size;
            }
        }

        // Per-signet pass: every signet-consuming tool needs at least one
        // signet, and every signet's security level joins the session's.
        for (info, hash, handler) in signet_passes {
            let mut seen = 0usize;
            match info.purpose {
                Purpose::PassDerivation => {
                    for signet in s.envelope.secrets_of(SIGNET_SCHEME_PASSWORD) {
                        seen += 1;
                        observe_component(&mut tracker, info, hash, handler, Some(signet))?;
                    }
                    key_source_available = true;
                }
                Purpose::KeyExchange | Purpose::KeyEncapsulation => {
                    for signet in s.envelope.recipients_of(info.name) {
                        seen += 1;
                        observe_component(&mut tracker, info, hash, handler, Some(signet))?;
                    }
                    key_source_available = true;
                }
                Purpose::Signing => {
                    for signet in s.envelope.senders_of(info.name) {
                        seen += 1;
                        observe_component(&mut tracker, info, hash, handler, Some(signet))?;
                    }
                    key_source_available = true;
                }
                _ => continue,
            }

            if seen == 0 {
                return Err(JessError::config(format!(
                    "tool {} requires at least one signet",
                    info.name
                )));
            }
            total_signets_seen += seen;
        }

        // Static key signets provide both authentication properties.
        for signet in s.envelope.secrets_of(SIGNET_SCHEME_KEY) {
            s.tool_requirements.add(Requirement::SenderAuthentication);
            s.tool_requirements.add(Requirement::RecipientAuthentication);
            total_signets_seen += 1;
            key_source_available = true;

            let level = (signet.key.len() * 8) as i32;
            let id = signet.id.clone();
            tracker.observe(level, || format!("supplied key signet \"{id}\""))?;
        }

        s.security_level = tracker.session_level;
        s.max_security_level = tracker.max_level;

        // Manual minima raise the session values.
        if config::minimum_security_level() > s.security_level {
            s.security_level = config::minimum_security_level();
        }
        if config::minimum_symmetric_key_size() > s.default_symmetric_key_size {
            s.default_symmetric_key_size = config::minimum_symmetric_key_size();
        }

        if require_security_level && s.security_level == 0 {
            return Err(JessError::config(
                "this toolset requires the security level to be set manually",
            ));
        }
        if require_default_key_size && s.default_symmetric_key_size == 0 {
            return Err(JessError::config(
                "this toolset requires the default key size to be set manually",
            ));
        }

        // Final checks.
        if s.tool_requirements.is_empty() {
            return Err(JessError::config(
                "envelope excludes all security requirements, no meaningful operation possible",
            ));
        }
        s.tool_requirements
            .check_compliance_to(suite.provides)
            .map_err(|missing| JessError::UnmetRequirements { missing })?;

        if s.tool_requirements.has(Requirement::RecipientAuthentication)
            && !s.tool_requirements.has(Requirement::Confidentiality)
        {
            return Err(JessError::config(
                "having recipient authentication without confidentiality does not make sense",
            ));
        }
        if s.tool_requirements.has(Requirement::Confidentiality)
            && !s.tool_requirements.has(Requirement::Integrity)
        {
            return Err(JessError::config(
                "having confidentiality without integrity does not make sense",
            ));
        }

        // A KDF is required unless the suite only signs.
        if s.kdf.is_none() && s.signers.len() != suite.tools.len() {
            return Err(JessError::config("missing a key derivation tool"));
        }
        // A KDF that nothing consumes is rejected.
        if s.integrated_ciphers.is_empty()
            && s.ciphers.is_empty()
            && s.macs.is_empty()
            && s.kdf.is_some()
        {
            return Err(JessError::config("key derivation tool specified, but not needed"));
        }

        if !key_source_available
            && (s.tool_requirements.has(Requirement::Integrity)
                || s.tool_requirements.has(Requirement::Confidentiality))
        {
            return Err(JessError::config(
                "missing key source, please add a tool that provides a key or add a key signet directly",
            ));
        }

        // Every signet in the envelope must be consumed by some queue.
        let total_signets = s.envelope.secrets.len()
            + s.envelope.senders.len()
            + s.envelope.recipients.len();
        if total_signets > total_signets_seen {
            return Err(JessError::config(
                "detected signet or recipient in envelope that is not used by any tool",
            ));
        }

        // Precaution against future code changes: the assembled session
        // level must itself pass the checks.
        let final_tracker = LevelTracker {
            session_level: s.security_level,
            max_level: s.max_security_level,
            envelope_min: s.envelope.security_level,
        };
        final_tracker.check(s.security_level, || "current session".to_string())?;

        tracing::debug!(
            suite = suite.id,
            security_level = s.security_level,
            default_key_size = s.default_symmetric_key_size,
            requirements = %s.tool_requirements,
            "compiled session"
        );

        Ok(s)
    }

    /// The effective (lowest) security level of the session.
    pub fn security_level(&self) -> i32 {
        self.security_level
    }

    /// The default symmetric key size of the session, in bytes.
    pub fn default_symmetric_key_size(&self) -> usize {
        self.default_symmetric_key_size
    }

    /// The security requirements the compiled tool set provides.
    pub fn tool_requirements(&self) -> Requirements {
        self.tool_requirements
    }

    /// The nonce size to use for new letters.
    pub fn nonce_size(&self) -> usize {
        ((self.max_security_level / 32).max(4)) as usize
    }

    /// Runs `setup` on all stateful tools, in suite order.
    pub(crate) fn setup_tools(&mut self) -> Result<(), JessError> {
        let Session {
            kdf,
            state_order,
            integrated_ciphers,
            ciphers,
            macs,
            default_symmetric_key_size,
            security_level,
            max_security_level,
            ..
        } = self;

        for state_ref in state_order.iter() {
            let (info, result) = match state_ref {
                StatefulRef::Integrated(i) => {
                    let slot = &mut integrated_ciphers[*i];
                    let mut helper = Helper::new(
                        kdf.as_mut().map(|k| k.logic.as_mut() as &mut dyn KeyDeriver),
                        slot.info,
                        *default_symmetric_key_size,
                        *security_level,
                        *max_security_level,
                    );
                    (slot.info, slot.logic.setup(&mut helper))
                }
                StatefulRef::Cipher(i) => {
                    let slot = &mut ciphers[*i];
                    let mut helper = Helper::new(
                        kdf.as_mut().map(|k| k.logic.as_mut() as &mut dyn KeyDeriver),
                        slot.info,
                        *default_symmetric_key_size,
                        *security_level,
                        *max_security_level,
                    );
                    (slot.info, slot.logic.setup(&mut helper))
                }
                StatefulRef::Mac(i) => {
                    let slot = &mut macs[*i];
                    let mut helper = Helper::new(
                        kdf.as_mut().map(|k| k.logic.as_mut() as &mut dyn KeyDeriver),
                        slot.info,
                        *default_symmetric_key_size,
                        *security_level,
                        *max_security_level,
                    );
                    (slot.info, slot.logic.setup(&mut helper))
                }
            };
            result.map_err(|err| {
                JessError::config(format!("failed to run tool {} setup: {err}", info.name))
            })?;
        }
        Ok(())
    }

    /// Runs `reset` on all stateful tools. Failures are collected and the
    /// last one is returned; cleanup always continues.
    pub(crate) fn reset_tools(&mut self) -> Result<(), JessError> {
        let mut last_error = None;
        for state_ref in self.state_order.iter() {
            let result = match state_ref {
                StatefulRef::Integrated(i) => self.integrated_ciphers[*i].logic.reset(),
                StatefulRef::Cipher(i) => self.ciphers[*i].logic.reset(),
                StatefulRef::Mac(i) => self.macs[*i].logic.reset(),
            };
            if let Err(err) = result {
                last_error = Some(JessError::from(err));
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resets both managed hasher pools.
    pub(crate) fn reset_managed_hashers(&mut self) {
        for hasher in self.managed_mac_hashers.values_mut() {
            hasher.reset();
        }
        for hasher in self.managed_signing_hashers.values_mut() {
            hasher.reset();
        }
    }
}

pub(crate) fn feed_managed(
    pool: &mut BTreeMap<String, ManagedHasher>,
    data: &[u8],
    associated_data: &[u8],
) {
    for hasher in pool.values_mut() {
        hasher.feed(data, associated_data);
    }
}

pub(crate) fn managed_sum(
    pool: &BTreeMap<String, ManagedHasher>,
    key: Option<&String>,
) -> Option<Vec<u8>> {
    key.and_then(|key| pool.get(key)).map(ManagedHasher::sum)
}
