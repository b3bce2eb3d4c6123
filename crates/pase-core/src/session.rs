//! PASE session establishment state machine.
//!
//! ```text
//! Initiator                                         Responder
//! Idle                                              WaitingForPbkdfParamRequest
//!   start()          --- PBKDFParamRequest --->
//! WaitingForPbkdfParamResponse
//!                    <-- PBKDFParamResponse ---     WaitingForPake1
//!                    --------- Pake1 --------->
//! WaitingForPake2
//!                    <-------- Pake2 ----------     WaitingForPake3
//!                    --------- Pake3 --------->
//! WaitingForStatusReport
//!                    <----- StatusReport ------     Established
//! Established
//! ```
//!
//! Each phase accepts exactly one message type. Anything else, and any
//! decoding, bounds or confirmation error, moves the session to `Failed`
//! and drops all secret material.

use core::fmt;
use std::mem;

use pase_crypto::{
    compute_ws, derive_session_keys, PbkdfParameters, Spake2p, Spake2pVerifier, HASH_LENGTH,
    KE_LENGTH, SESSION_KEY_LENGTH, SETUP_PASSCODE_MAX, SPAKE2P_CONTEXT_PREFIX,
};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::config::PaseConfig;
use crate::message::{
    Message, MessageType, Pake1, Pake2, Pake3, Payload, PbkdfParamRequest, PbkdfParamResponse,
    SessionParameters, RANDOM_LENGTH,
};
use crate::status::StatusReport;
use crate::{Error, Result};

/// Session role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Commissioner; holds the passcode (SPAKE2+ prover).
    Initiator,
    /// Accessory; holds the verifier (SPAKE2+ verifier).
    Responder,
}

/// Public view of the handshake state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakePhase {
    /// Initiator not started yet.
    Idle,
    /// Responder waiting for PBKDFParamRequest.
    WaitingForPbkdfParamRequest,
    /// Initiator waiting for PBKDFParamResponse.
    WaitingForPbkdfParamResponse,
    /// Responder waiting for Pake1.
    WaitingForPake1,
    /// Initiator waiting for Pake2.
    WaitingForPake2,
    /// Responder waiting for Pake3.
    WaitingForPake3,
    /// Initiator waiting for the final StatusReport.
    WaitingForStatusReport,
    /// Session keys available.
    Established,
    /// Handshake failed; terminal.
    Failed,
}

/// What the caller must do after a handled message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Send this message and wait for the next one.
    Send(Message),
    /// Send this message; the session is established.
    SendAndComplete(Message),
    /// Nothing to send; the session is established.
    Complete,
}

/// Keys handed to the session manager once PASE completes.
#[derive(Clone)]
pub struct SessionKeys {
    /// Local role.
    pub role: Role,
    /// Session id chosen by this side.
    pub local_session_id: u16,
    /// Session id chosen by the peer.
    pub peer_session_id: u16,
    /// Initiator-to-responder key.
    pub i2r_key: Zeroizing<[u8; SESSION_KEY_LENGTH]>,
    /// Responder-to-initiator key.
    pub r2i_key: Zeroizing<[u8; SESSION_KEY_LENGTH]>,
    /// Attestation challenge for device attestation.
    pub attestation_challenge: Zeroizing<[u8; SESSION_KEY_LENGTH]>,
    /// MRP parameters the peer advertised.
    pub peer_session_parameters: Option<SessionParameters>,
}

impl SessionKeys {
    /// Key for messages this side sends.
    pub fn encrypt_key(&self) -> &[u8; SESSION_KEY_LENGTH] {
        match self.role {
            Role::Initiator => &self.i2r_key,
            Role::Responder => &self.r2i_key,
        }
    }

    /// Key for messages this side receives.
    pub fn decrypt_key(&self) -> &[u8; SESSION_KEY_LENGTH] {
        match self.role {
            Role::Initiator => &self.r2i_key,
            Role::Responder => &self.i2r_key,
        }
    }
}

impl fmt::Debug for SessionKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionKeys")
            .field("role", &self.role)
            .field("local_session_id", &self.local_session_id)
            .field("peer_session_id", &self.peer_session_id)
            .field("peer_session_parameters", &self.peer_session_parameters)
            .finish_non_exhaustive()
    }
}

type CompletionCallback = Box<dyn FnOnce(core::result::Result<&SessionKeys, &Error>) + Send>;

enum SessionState {
    /// Initiator: not started.
    Idle {
        passcode: Zeroizing<u32>,
        pbkdf: Option<PbkdfParameters>,
    },
    /// Initiator: PBKDFParamRequest sent.
    AwaitingPbkdfResponse {
        passcode: Zeroizing<u32>,
        pbkdf: Option<PbkdfParameters>,
        initiator_random: [u8; RANDOM_LENGTH],
        request: Vec<u8>,
    },
    /// Initiator: Pake1 sent.
    AwaitingPake2 {
        spake: Box<Spake2p>,
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    },
    /// Initiator: Pake3 sent.
    AwaitingStatusReport {
        ke: Zeroizing<[u8; KE_LENGTH]>,
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    },
    /// Responder: waiting for the initiator.
    AwaitingPbkdfRequest {
        verifier: Spake2pVerifier,
        pbkdf: PbkdfParameters,
    },
    /// Responder: PBKDFParamResponse sent.
    AwaitingPake1 {
        verifier: Spake2pVerifier,
        context: [u8; HASH_LENGTH],
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    },
    /// Responder: Pake2 sent.
    AwaitingPake3 {
        spake: Box<Spake2p>,
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    },
    Established,
    Failed {
        error: Error,
    },
}

/// One side of one PASE handshake.
pub struct PaseSession {
    role: Role,
    config: PaseConfig,
    local_session_id: u16,
    state: SessionState,
    keys: Option<SessionKeys>,
    failure_report: Option<StatusReport>,
    on_complete: Option<CompletionCallback>,
}

fn random_bytes_32() -> [u8; 32] {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn random_session_id() -> u16 {
    OsRng.gen_range(1..=u16::MAX)
}

fn commissioning_context(request: &[u8], response: &[u8]) -> [u8; HASH_LENGTH] {
    let mut hasher = Sha256::new();
    hasher.update(SPAKE2P_CONTEXT_PREFIX);
    hasher.update(request);
    hasher.update(response);

    let mut context = [0u8; HASH_LENGTH];
    context.copy_from_slice(&hasher.finalize());
    context
}

fn check_pbkdf(pbkdf: &PbkdfParameters) -> Result<()> {
    pbkdf
        .validate()
        .map_err(|e| Error::ParameterOutOfRange(e.to_string()))
}

fn confirm(spake: &mut Spake2p, peer_confirmation: &[u8]) -> Result<()> {
    spake.key_confirm(peer_confirmation).map_err(|e| match e {
        pase_crypto::Error::ConfirmationFailed => Error::ConfirmationFailed,
        other => Error::Crypto(other),
    })
}

impl PaseSession {
    /// Create the initiator side.
    ///
    /// `pbkdf` is set when the PBKDF parameters are known out of band; the
    /// responder then omits them from its response.
    pub fn initiator(
        config: PaseConfig,
        passcode: u32,
        pbkdf: Option<PbkdfParameters>,
    ) -> Result<Self> {
        config.validate()?;
        if passcode > SETUP_PASSCODE_MAX {
            return Err(Error::ParameterOutOfRange(format!(
                "passcode exceeds {:#x}",
                SETUP_PASSCODE_MAX
            )));
        }
        if let Some(pbkdf) = &pbkdf {
            check_pbkdf(pbkdf)?;
        }

        Ok(Self::new(
            Role::Initiator,
            config,
            SessionState::Idle {
                passcode: Zeroizing::new(passcode),
                pbkdf,
            },
        ))
    }

    /// Create the responder side from a stored verifier and the PBKDF
    /// parameters it was generated with.
    pub fn responder(
        config: PaseConfig,
        verifier: Spake2pVerifier,
        pbkdf: PbkdfParameters,
    ) -> Result<Self> {
        config.validate()?;
        check_pbkdf(&pbkdf)?;

        Ok(Self::new(
            Role::Responder,
            config,
            SessionState::AwaitingPbkdfRequest { verifier, pbkdf },
        ))
    }

    fn new(role: Role, config: PaseConfig, state: SessionState) -> Self {
        Self {
            role,
            config,
            local_session_id: random_session_id(),
            state,
            keys: None,
            failure_report: None,
            on_complete: None,
        }
    }

    /// Local role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Configuration this session runs with.
    pub fn config(&self) -> &PaseConfig {
        &self.config
    }

    /// Session id this side allocated.
    pub fn local_session_id(&self) -> u16 {
        self.local_session_id
    }

    /// Current phase.
    pub fn phase(&self) -> HandshakePhase {
        match self.state {
            SessionState::Idle { .. } => HandshakePhase::Idle,
            SessionState::AwaitingPbkdfResponse { .. } => {
                HandshakePhase::WaitingForPbkdfParamResponse
            }
            SessionState::AwaitingPake2 { .. } => HandshakePhase::WaitingForPake2,
            SessionState::AwaitingStatusReport { .. } => HandshakePhase::WaitingForStatusReport,
            SessionState::AwaitingPbkdfRequest { .. } => {
                HandshakePhase::WaitingForPbkdfParamRequest
            }
            SessionState::AwaitingPake1 { .. } => HandshakePhase::WaitingForPake1,
            SessionState::AwaitingPake3 { .. } => HandshakePhase::WaitingForPake3,
            SessionState::Established => HandshakePhase::Established,
            SessionState::Failed { .. } => HandshakePhase::Failed,
        }
    }

    /// The only message type accepted now.
    pub fn expected_message(&self) -> Option<MessageType> {
        match self.phase() {
            HandshakePhase::WaitingForPbkdfParamRequest => Some(MessageType::PbkdfParamRequest),
            HandshakePhase::WaitingForPbkdfParamResponse => Some(MessageType::PbkdfParamResponse),
            HandshakePhase::WaitingForPake1 => Some(MessageType::Pake1),
            HandshakePhase::WaitingForPake2 => Some(MessageType::Pake2),
            HandshakePhase::WaitingForPake3 => Some(MessageType::Pake3),
            HandshakePhase::WaitingForStatusReport => Some(MessageType::StatusReport),
            HandshakePhase::Idle | HandshakePhase::Established | HandshakePhase::Failed => None,
        }
    }

    /// Check if the handshake completed successfully.
    pub fn is_established(&self) -> bool {
        matches!(self.state, SessionState::Established)
    }

    /// Check if the handshake reached a terminal phase.
    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            SessionState::Established | SessionState::Failed { .. }
        )
    }

    /// Session keys (only available once established).
    pub fn keys(&self) -> Option<&SessionKeys> {
        self.keys.as_ref()
    }

    /// Error that failed the session.
    pub fn error(&self) -> Option<&Error> {
        match &self.state {
            SessionState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// StatusReport to send to the peer after a local failure.
    pub fn failure_report(&self) -> Option<&StatusReport> {
        self.failure_report.as_ref()
    }

    /// Register the completion callback.
    ///
    /// Invoked exactly once, with the session keys or the error. A callback
    /// registered after completion runs immediately.
    pub fn on_complete<F>(&mut self, callback: F)
    where
        F: FnOnce(core::result::Result<&SessionKeys, &Error>) + Send + 'static,
    {
        match (&self.state, &self.keys) {
            (SessionState::Established, Some(keys)) => callback(Ok(keys)),
            (SessionState::Failed { error }, _) => callback(Err(error)),
            _ => self.on_complete = Some(Box::new(callback)),
        }
    }

    /// Tear the handshake down (timeout, exchange closed, shutdown).
    ///
    /// No effect once the session is finished.
    pub fn abort(&mut self, reason: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        self.fail(Error::Aborted(reason.into()));
    }

    /// Fail on a peer frame that could not be decoded.
    ///
    /// Reports `InvalidParameter` like any other malformed message. No
    /// effect once the session is finished.
    pub fn reject_frame(&mut self, reason: impl Into<String>) {
        if self.is_finished() {
            return;
        }
        self.fail(Error::Decode(reason.into()));
    }

    /// Build the PBKDFParamRequest (initiator only).
    pub fn start(&mut self) -> Result<Message> {
        if self.role != Role::Initiator {
            return Err(Error::ProtocolViolation("Not an initiator".into()));
        }

        let (passcode, pbkdf) = match mem::replace(
            &mut self.state,
            SessionState::Failed {
                error: Error::InvalidState("start in progress"),
            },
        ) {
            SessionState::Idle { passcode, pbkdf } => (passcode, pbkdf),
            old_state => {
                self.state = old_state;
                return Err(Error::InvalidState("handshake already started"));
            }
        };

        let initiator_random = random_bytes_32();
        let request = PbkdfParamRequest {
            initiator_random,
            initiator_session_id: self.local_session_id,
            passcode_id: self.config.passcode_id,
            has_pbkdf_parameters: pbkdf.is_some(),
            session_parameters: self.config.advertised_parameters(),
        };
        let message = request.to_message();

        self.state = SessionState::AwaitingPbkdfResponse {
            passcode,
            pbkdf,
            initiator_random,
            request: message.payload().to_vec(),
        };
        debug!(
            session_id = self.local_session_id,
            "PBKDFParamRequest sent, waiting for PBKDFParamResponse"
        );
        Ok(message)
    }

    /// Advance the handshake with a received message.
    ///
    /// On error the session is `Failed` and [`Self::failure_report`] holds
    /// the StatusReport to send back, unless the peer reported the failure.
    pub fn handle_message(&mut self, message: &Message) -> Result<Step> {
        if self.is_finished() {
            return Err(Error::InvalidState("handshake finished"));
        }

        match self.dispatch(message) {
            Ok(step) => Ok(step),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn dispatch(&mut self, message: &Message) -> Result<Step> {
        let expected = self
            .expected_message()
            .ok_or(Error::InvalidState("handshake not started"))?;
        let received = message.message_type();

        if received == MessageType::StatusReport && expected != MessageType::StatusReport {
            let report: StatusReport = message.decode()?;
            return Err(Error::PeerStatus {
                general: report.general_code,
                protocol_code: report.protocol_code,
            });
        }
        if received != expected {
            return Err(Error::UnexpectedMessage { expected, received });
        }

        let state = mem::replace(
            &mut self.state,
            SessionState::Failed {
                error: Error::InvalidState("message in progress"),
            },
        );
        match state {
            SessionState::AwaitingPbkdfResponse {
                passcode,
                pbkdf,
                initiator_random,
                request,
            } => self.handle_pbkdf_response(message, passcode, pbkdf, initiator_random, request),
            SessionState::AwaitingPake2 {
                spake,
                peer_session_id,
                peer_params,
            } => self.handle_pake2(message, spake, peer_session_id, peer_params),
            SessionState::AwaitingStatusReport {
                ke,
                peer_session_id,
                peer_params,
            } => self.handle_status_report(message, ke, peer_session_id, peer_params),
            SessionState::AwaitingPbkdfRequest { verifier, pbkdf } => {
                self.handle_pbkdf_request(message, verifier, pbkdf)
            }
            SessionState::AwaitingPake1 {
                verifier,
                context,
                peer_session_id,
                peer_params,
            } => self.handle_pake1(message, verifier, context, peer_session_id, peer_params),
            SessionState::AwaitingPake3 {
                spake,
                peer_session_id,
                peer_params,
            } => self.handle_pake3(message, spake, peer_session_id, peer_params),
            old_state => {
                self.state = old_state;
                Err(Error::InvalidState("no message expected"))
            }
        }
    }

    // === Responder ===

    fn handle_pbkdf_request(
        &mut self,
        message: &Message,
        verifier: Spake2pVerifier,
        pbkdf: PbkdfParameters,
    ) -> Result<Step> {
        let request: PbkdfParamRequest = message.decode()?;
        if request.passcode_id != self.config.passcode_id {
            return Err(Error::ProtocolViolation(format!(
                "unknown passcode id {}",
                request.passcode_id
            )));
        }

        let response = PbkdfParamResponse {
            initiator_random: request.initiator_random,
            responder_random: random_bytes_32(),
            responder_session_id: self.local_session_id,
            pbkdf_parameters: (!request.has_pbkdf_parameters).then_some(pbkdf),
            session_parameters: self.config.advertised_parameters(),
        };
        let reply = response.to_message();
        let context = commissioning_context(message.payload(), reply.payload());

        self.state = SessionState::AwaitingPake1 {
            verifier,
            context,
            peer_session_id: request.initiator_session_id,
            peer_params: request.session_parameters,
        };
        debug!(
            session_id = self.local_session_id,
            peer_session_id = request.initiator_session_id,
            "PBKDFParamResponse sent, waiting for Pake1"
        );
        Ok(Step::Send(reply))
    }

    fn handle_pake1(
        &mut self,
        message: &Message,
        verifier: Spake2pVerifier,
        context: [u8; HASH_LENGTH],
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    ) -> Result<Step> {
        let pake1: Pake1 = message.decode()?;

        let mut spake = Box::new(Spake2p::begin_verifier(&context, &verifier)?);
        let pb = spake.compute_round_one(Some(&pake1.pa))?;
        let cb = spake.compute_round_two(&pake1.pa)?;

        self.state = SessionState::AwaitingPake3 {
            spake,
            peer_session_id,
            peer_params,
        };
        debug!(session_id = self.local_session_id, "Pake2 sent, waiting for Pake3");
        Ok(Step::Send(Pake2 { pb, cb }.to_message()))
    }

    fn handle_pake3(
        &mut self,
        message: &Message,
        mut spake: Box<Spake2p>,
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    ) -> Result<Step> {
        let pake3: Pake3 = message.decode()?;
        confirm(&mut spake, &pake3.ca)?;

        self.establish(spake.shared_key()?, peer_session_id, peer_params)?;
        Ok(Step::SendAndComplete(StatusReport::success().to_message()))
    }

    // === Initiator ===

    fn handle_pbkdf_response(
        &mut self,
        message: &Message,
        passcode: Zeroizing<u32>,
        known: Option<PbkdfParameters>,
        initiator_random: [u8; RANDOM_LENGTH],
        request: Vec<u8>,
    ) -> Result<Step> {
        let response: PbkdfParamResponse = message.decode()?;

        if !bool::from(response.initiator_random.ct_eq(&initiator_random)) {
            return Err(Error::RandomMismatch);
        }

        let pbkdf = match (known, response.pbkdf_parameters) {
            (None, Some(received)) => received,
            (Some(known), None) => known,
            (Some(known), Some(received)) => {
                if known != received {
                    return Err(Error::ProtocolViolation(
                        "PBKDF parameters differ from the known ones".into(),
                    ));
                }
                known
            }
            (None, None) => {
                return Err(Error::ProtocolViolation(
                    "PBKDF parameters missing".into(),
                ))
            }
        };
        check_pbkdf(&pbkdf)?;

        let ws = compute_ws(*passcode, &pbkdf.salt, pbkdf.iterations)?;
        let context = commissioning_context(&request, message.payload());

        let mut spake = Box::new(Spake2p::begin_prover(&context, &ws[..])?);
        let pa = spake.compute_round_one(None)?;

        self.state = SessionState::AwaitingPake2 {
            spake,
            peer_session_id: response.responder_session_id,
            peer_params: response.session_parameters,
        };
        debug!(
            session_id = self.local_session_id,
            peer_session_id = response.responder_session_id,
            "Pake1 sent, waiting for Pake2"
        );
        Ok(Step::Send(Pake1 { pa }.to_message()))
    }

    fn handle_pake2(
        &mut self,
        message: &Message,
        mut spake: Box<Spake2p>,
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    ) -> Result<Step> {
        let pake2: Pake2 = message.decode()?;

        let ca = spake.compute_round_two(&pake2.pb)?;
        confirm(&mut spake, &pake2.cb)?;
        let ke = Zeroizing::new(*spake.shared_key()?);

        self.state = SessionState::AwaitingStatusReport {
            ke,
            peer_session_id,
            peer_params,
        };
        debug!(
            session_id = self.local_session_id,
            "Pake3 sent, waiting for StatusReport"
        );
        Ok(Step::Send(Pake3 { ca }.to_message()))
    }

    fn handle_status_report(
        &mut self,
        message: &Message,
        ke: Zeroizing<[u8; KE_LENGTH]>,
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    ) -> Result<Step> {
        let report: StatusReport = message.decode()?;
        if !report.is_success() {
            return Err(Error::PeerStatus {
                general: report.general_code,
                protocol_code: report.protocol_code,
            });
        }

        self.establish(&ke, peer_session_id, peer_params)?;
        Ok(Step::Complete)
    }

    // === Completion ===

    fn establish(
        &mut self,
        ke: &[u8; KE_LENGTH],
        peer_session_id: u16,
        peer_params: Option<SessionParameters>,
    ) -> Result<()> {
        let derived = derive_session_keys(ke)?;

        self.keys = Some(SessionKeys {
            role: self.role,
            local_session_id: self.local_session_id,
            peer_session_id,
            i2r_key: derived.i2r_key,
            r2i_key: derived.r2i_key,
            attestation_challenge: derived.attestation_challenge,
            peer_session_parameters: peer_params,
        });
        self.state = SessionState::Established;
        info!(
            role = ?self.role,
            session_id = self.local_session_id,
            peer_session_id,
            "PASE session established"
        );

        if let (Some(callback), Some(keys)) = (self.on_complete.take(), self.keys.as_ref()) {
            callback(Ok(keys));
        }
        Ok(())
    }

    fn fail(&mut self, error: Error) -> Error {
        warn!(
            role = ?self.role,
            session_id = self.local_session_id,
            phase = ?self.phase(),
            %error,
            "PASE handshake failed"
        );

        self.keys = None;
        self.failure_report = error.status_code().map(StatusReport::failure);
        self.state = SessionState::Failed {
            error: error.clone(),
        };

        if let Some(callback) = self.on_complete.take() {
            callback(Err(&error));
        }
        error
    }
}

impl fmt::Debug for PaseSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaseSession")
            .field("role", &self.role)
            .field("local_session_id", &self.local_session_id)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const SALT: &[u8] = b"SPAKE2P Key Salt";
    const PASSCODE: u32 = 20202021;

    fn pbkdf() -> PbkdfParameters {
        PbkdfParameters::new(1000, SALT.to_vec())
    }

    fn responder(passcode: u32) -> PaseSession {
        let verifier = Spake2pVerifier::generate(passcode, SALT, 1000).expect("verifier failed");
        PaseSession::responder(PaseConfig::default(), verifier, pbkdf()).expect("responder failed")
    }

    fn initiator() -> PaseSession {
        PaseSession::initiator(PaseConfig::default(), PASSCODE, None).expect("initiator failed")
    }

    fn expect_send(step: Step) -> Message {
        match step {
            Step::Send(message) => message,
            other => panic!("expected Send, got {:?}", other),
        }
    }

    #[test]
    fn test_session_creation() {
        let init = initiator();
        assert_eq!(init.role(), Role::Initiator);
        assert_eq!(init.phase(), HandshakePhase::Idle);
        assert_eq!(init.expected_message(), None);
        assert_ne!(init.local_session_id(), 0);

        let resp = responder(PASSCODE);
        assert_eq!(resp.phase(), HandshakePhase::WaitingForPbkdfParamRequest);
        assert_eq!(resp.expected_message(), Some(MessageType::PbkdfParamRequest));
    }

    #[test]
    fn test_handshake_flow() {
        let mut init = initiator();
        let mut resp = responder(PASSCODE);

        let request = init.start().unwrap();
        assert_eq!(init.phase(), HandshakePhase::WaitingForPbkdfParamResponse);

        let response = expect_send(resp.handle_message(&request).unwrap());
        assert_eq!(resp.phase(), HandshakePhase::WaitingForPake1);

        let pake1 = expect_send(init.handle_message(&response).unwrap());
        assert_eq!(init.phase(), HandshakePhase::WaitingForPake2);

        let pake2 = expect_send(resp.handle_message(&pake1).unwrap());
        assert_eq!(resp.phase(), HandshakePhase::WaitingForPake3);

        let pake3 = expect_send(init.handle_message(&pake2).unwrap());
        assert_eq!(init.phase(), HandshakePhase::WaitingForStatusReport);

        let status = match resp.handle_message(&pake3).unwrap() {
            Step::SendAndComplete(message) => message,
            other => panic!("expected SendAndComplete, got {:?}", other),
        };
        assert!(resp.is_established());

        assert_eq!(init.handle_message(&status).unwrap(), Step::Complete);
        assert!(init.is_established());

        let ik = init.keys().unwrap();
        let rk = resp.keys().unwrap();
        assert_eq!(ik.encrypt_key(), rk.decrypt_key());
        assert_eq!(ik.decrypt_key(), rk.encrypt_key());
        assert_eq!(&*ik.attestation_challenge, &*rk.attestation_challenge);
        assert_eq!(ik.peer_session_id, resp.local_session_id());
        assert_eq!(rk.peer_session_id, init.local_session_id());
        assert_eq!(
            ik.peer_session_parameters,
            Some(PaseConfig::default().local_session_parameters)
        );
    }

    #[test]
    fn test_start_twice() {
        let mut init = initiator();
        init.start().unwrap();
        assert!(matches!(init.start(), Err(Error::InvalidState(_))));
        assert_eq!(init.phase(), HandshakePhase::WaitingForPbkdfParamResponse);
    }

    #[test]
    fn test_responder_cannot_start() {
        let mut resp = responder(PASSCODE);
        assert!(matches!(resp.start(), Err(Error::ProtocolViolation(_))));
        assert_eq!(resp.phase(), HandshakePhase::WaitingForPbkdfParamRequest);
    }

    #[test]
    fn test_unexpected_message_fails() {
        let mut resp = responder(PASSCODE);
        let pake3 = Pake3 { ca: [0; 32] }.to_message();

        assert!(matches!(
            resp.handle_message(&pake3),
            Err(Error::UnexpectedMessage {
                expected: MessageType::PbkdfParamRequest,
                received: MessageType::Pake3
            })
        ));
        assert_eq!(resp.phase(), HandshakePhase::Failed);
        assert!(resp.failure_report().is_some());
        assert!(matches!(
            resp.handle_message(&pake3),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_message_before_start_fails() {
        let mut init = initiator();
        let msg = Pake2 {
            pb: [4; 65],
            cb: [0; 32],
        }
        .to_message();
        assert!(init.handle_message(&msg).is_err());
        assert_eq!(init.phase(), HandshakePhase::Failed);
    }

    #[test]
    fn test_peer_status_report_fails_without_report() {
        let mut init = initiator();
        init.start().unwrap();

        let busy = StatusReport::busy(1000).to_message();
        assert!(matches!(
            init.handle_message(&busy),
            Err(Error::PeerStatus {
                general: 8,
                protocol_code: 4
            })
        ));
        assert_eq!(init.phase(), HandshakePhase::Failed);
        assert!(init.failure_report().is_none());
    }

    #[test]
    fn test_constructor_bounds() {
        assert!(matches!(
            PaseSession::initiator(PaseConfig::default(), SETUP_PASSCODE_MAX + 1, None),
            Err(Error::ParameterOutOfRange(_))
        ));
        assert!(matches!(
            PaseSession::initiator(
                PaseConfig::default(),
                PASSCODE,
                Some(PbkdfParameters::new(999, SALT.to_vec()))
            ),
            Err(Error::ParameterOutOfRange(_))
        ));

        let verifier = Spake2pVerifier::generate(PASSCODE, SALT, 1000).unwrap();
        assert!(matches!(
            PaseSession::responder(
                PaseConfig::default(),
                verifier,
                PbkdfParameters::new(1000, vec![0; 8])
            ),
            Err(Error::ParameterOutOfRange(_))
        ));
    }

    #[test]
    fn test_unknown_passcode_id_rejected() {
        let mut init = PaseSession::initiator(
            PaseConfig {
                passcode_id: 3,
                ..Default::default()
            },
            PASSCODE,
            None,
        )
        .unwrap();
        let mut resp = responder(PASSCODE);

        let request = init.start().unwrap();
        assert!(matches!(
            resp.handle_message(&request),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_completion_callback_fires_once() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut resp = responder(PASSCODE);

        let sink = Arc::clone(&calls);
        resp.on_complete(move |outcome| {
            sink.lock().unwrap().push(outcome.is_ok());
        });

        let pake1 = Pake1 { pa: [4; 65] }.to_message();
        assert!(resp.handle_message(&pake1).is_err());
        assert!(resp.handle_message(&pake1).is_err());
        resp.abort("late abort");

        assert_eq!(*calls.lock().unwrap(), vec![false]);
    }

    #[test]
    fn test_late_callback_sees_failure() {
        let mut init = initiator();
        init.abort("exchange closed");
        assert!(matches!(init.error(), Some(Error::Aborted(_))));

        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        init.on_complete(move |outcome| {
            *sink.lock().unwrap() = Some(outcome.is_err());
        });
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    #[test]
    fn test_abort_reports_close_session() {
        let mut resp = responder(PASSCODE);
        resp.abort("timeout");
        assert_eq!(resp.phase(), HandshakePhase::Failed);
        assert_eq!(
            resp.failure_report().map(|r| r.protocol_code),
            Some(crate::status::ProtocolCode::CloseSession.to_u16())
        );
    }

    #[test]
    fn test_reject_frame_reports_invalid_parameter() {
        let mut resp = responder(PASSCODE);
        resp.reject_frame("unknown opcode 0x7f");
        assert_eq!(resp.phase(), HandshakePhase::Failed);
        assert!(matches!(resp.error(), Some(Error::Decode(_))));
        assert_eq!(
            resp.failure_report().map(|r| r.protocol_code),
            Some(crate::status::ProtocolCode::InvalidParameter.to_u16())
        );

        // finished sessions keep their first failure
        resp.abort("late timeout");
        assert!(matches!(resp.error(), Some(Error::Decode(_))));
    }

    #[test]
    fn test_session_keys_debug_redacted() {
        let keys = SessionKeys {
            role: Role::Initiator,
            local_session_id: 1,
            peer_session_id: 2,
            i2r_key: Zeroizing::new([0xAB; 16]),
            r2i_key: Zeroizing::new([0xCD; 16]),
            attestation_challenge: Zeroizing::new([0xEF; 16]),
            peer_session_parameters: None,
        };
        let printed = format!("{:?}", keys);
        assert!(!printed.contains("171"));
        assert!(!printed.contains("205"));
        assert_eq!(keys.encrypt_key(), &[0xAB; 16]);
        assert_eq!(keys.decrypt_key(), &[0xCD; 16]);
    }
}
