//! PASE (Passcode-Authenticated Session Establishment) protocol engine.
//!
//! This crate implements both sides of the PASE handshake:
//! - Matter TLV subset used by the handshake payloads
//! - PBKDFParamRequest/Response, Pake1/2/3 and StatusReport messages
//! - Initiator and responder state machines ([`PaseSession`])
//!
//! The engine is transport-agnostic: callers feed received [`Message`]s in
//! and send whatever [`Step`] tells them to. Delivery, retransmission and
//! timers live in pase-transport.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod message;
pub mod session;
pub mod status;
pub mod tlv;

pub use config::PaseConfig;
pub use error::{Error, Result};
pub use message::{
    Message, MessageType, Pake1, Pake2, Pake3, Payload, PbkdfParamRequest, PbkdfParamResponse,
    SessionParameters,
};
pub use session::{HandshakePhase, PaseSession, Role, SessionKeys, Step};
pub use status::{GeneralCode, ProtocolCode, StatusReport};

pub use pase_crypto::{PbkdfParameters, Spake2pVerifier};
