//! PASE wire messages.
//!
//! Every handshake message is an anonymous TLV structure whose members use
//! context tags in ascending order:
//!
//! | Message            | Opcode | Members                                                    |
//! |--------------------|--------|------------------------------------------------------------|
//! | PBKDFParamRequest  | 0x20   | 1 initiatorRandom, 2 sessionId, 3 passcodeId, 4 hasParams, 5 params? |
//! | PBKDFParamResponse | 0x21   | 1 initiatorRandom, 2 responderRandom, 3 sessionId, 4 pbkdf?, 5 params? |
//! | Pake1              | 0x22   | 1 pA                                                       |
//! | Pake2              | 0x23   | 1 pB, 2 cB                                                 |
//! | Pake3              | 0x24   | 1 cA                                                       |
//!
//! StatusReport (0x40) uses its own binary layout, see [`crate::status`].

use core::fmt;

use pase_crypto::{PbkdfParameters, HASH_LENGTH, P256_POINT_LENGTH};

use crate::status::StatusReport;
use crate::tlv::{self, Element, Fields, Value};
use crate::{Error, Result};

/// Length of the initiator and responder randoms.
pub const RANDOM_LENGTH: usize = 32;

/// Opcode for PBKDFParamRequest (0x20).
pub const OPCODE_PBKDF_PARAM_REQUEST: u8 = 0x20;
/// Opcode for PBKDFParamResponse (0x21).
pub const OPCODE_PBKDF_PARAM_RESPONSE: u8 = 0x21;
/// Opcode for Pake1 (0x22).
pub const OPCODE_PAKE1: u8 = 0x22;
/// Opcode for Pake2 (0x23).
pub const OPCODE_PAKE2: u8 = 0x23;
/// Opcode for Pake3 (0x24).
pub const OPCODE_PAKE3: u8 = 0x24;
/// Opcode for StatusReport (0x40).
pub const OPCODE_STATUS_REPORT: u8 = 0x40;

/// Secure-channel message types used by PASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// PBKDFParamRequest (initiator to responder).
    PbkdfParamRequest,
    /// PBKDFParamResponse (responder to initiator).
    PbkdfParamResponse,
    /// Pake1 carrying pA.
    Pake1,
    /// Pake2 carrying pB and cB.
    Pake2,
    /// Pake3 carrying cA.
    Pake3,
    /// StatusReport.
    StatusReport,
}

impl MessageType {
    /// Wire opcode.
    pub fn opcode(self) -> u8 {
        match self {
            Self::PbkdfParamRequest => OPCODE_PBKDF_PARAM_REQUEST,
            Self::PbkdfParamResponse => OPCODE_PBKDF_PARAM_RESPONSE,
            Self::Pake1 => OPCODE_PAKE1,
            Self::Pake2 => OPCODE_PAKE2,
            Self::Pake3 => OPCODE_PAKE3,
            Self::StatusReport => OPCODE_STATUS_REPORT,
        }
    }

    /// Message type for a wire opcode.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        match opcode {
            OPCODE_PBKDF_PARAM_REQUEST => Some(Self::PbkdfParamRequest),
            OPCODE_PBKDF_PARAM_RESPONSE => Some(Self::PbkdfParamResponse),
            OPCODE_PAKE1 => Some(Self::Pake1),
            OPCODE_PAKE2 => Some(Self::Pake2),
            OPCODE_PAKE3 => Some(Self::Pake3),
            OPCODE_STATUS_REPORT => Some(Self::StatusReport),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PbkdfParamRequest => "PBKDFParamRequest",
            Self::PbkdfParamResponse => "PBKDFParamResponse",
            Self::Pake1 => "Pake1",
            Self::Pake2 => "Pake2",
            Self::Pake3 => "Pake3",
            Self::StatusReport => "StatusReport",
        };
        f.write_str(name)
    }
}

/// A message as carried by the exchange: type plus undecoded payload.
///
/// The session decodes payloads itself so that malformed input fails the
/// handshake, and so the transcript hash covers the exact received bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    message_type: MessageType,
    payload: Vec<u8>,
}

impl Message {
    /// Wrap a payload.
    pub fn new(message_type: MessageType, payload: Vec<u8>) -> Self {
        Self {
            message_type,
            payload,
        }
    }

    /// Wrap a payload received with a raw opcode.
    pub fn from_wire(opcode: u8, payload: Vec<u8>) -> Result<Self> {
        let message_type = MessageType::from_opcode(opcode)
            .ok_or_else(|| Error::Decode(format!("unknown opcode {:#04x}", opcode)))?;
        Ok(Self::new(message_type, payload))
    }

    /// Message type.
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Wire opcode.
    pub fn opcode(&self) -> u8 {
        self.message_type.opcode()
    }

    /// Encoded payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Consume into the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Decode the payload as `T`, checking the message type first.
    pub fn decode<T: Payload>(&self) -> Result<T> {
        if self.message_type != T::MESSAGE_TYPE {
            return Err(Error::UnexpectedMessage {
                expected: T::MESSAGE_TYPE,
                received: self.message_type,
            });
        }
        T::decode(&self.payload)
    }
}

/// A typed message body.
pub trait Payload: Sized {
    /// Message type this body travels as.
    const MESSAGE_TYPE: MessageType;

    /// Encode to payload bytes.
    fn encode(&self) -> Vec<u8>;

    /// Decode from payload bytes; fails without partial results.
    fn decode(payload: &[u8]) -> Result<Self>;

    /// Encode into a [`Message`].
    fn to_message(&self) -> Message {
        Message::new(Self::MESSAGE_TYPE, self.encode())
    }
}

fn decode_struct(payload: &[u8]) -> Result<Element> {
    let element = tlv::decode(payload)?;
    if element.tag != tlv::Tag::Anonymous {
        return Err(Error::Decode("message must be an anonymous structure".into()));
    }
    element.as_structure()?;
    Ok(element)
}

fn structure(members: Vec<Element>) -> Vec<u8> {
    Element::anonymous(Value::Structure(members)).encode()
}

fn bytes(tag: u8, data: &[u8]) -> Element {
    Element::context(tag, Value::Bytes(data.to_vec()))
}

fn unsigned(tag: u8, value: impl Into<u64>) -> Element {
    Element::context(tag, Value::Unsigned(value.into()))
}

/// MRP session parameters exchanged alongside the PBKDF messages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionParameters {
    /// SESSION_IDLE_INTERVAL in milliseconds.
    pub idle_retrans_timeout_ms: Option<u32>,
    /// SESSION_ACTIVE_INTERVAL in milliseconds.
    pub active_retrans_timeout_ms: Option<u32>,
    /// SESSION_ACTIVE_THRESHOLD in milliseconds.
    pub active_threshold_ms: Option<u16>,
}

impl SessionParameters {
    fn to_element(self, tag: u8) -> Element {
        let mut members = Vec::new();
        if let Some(v) = self.idle_retrans_timeout_ms {
            members.push(unsigned(1, v));
        }
        if let Some(v) = self.active_retrans_timeout_ms {
            members.push(unsigned(2, v));
        }
        if let Some(v) = self.active_threshold_ms {
            members.push(unsigned(3, v));
        }
        Element::context(tag, Value::Structure(members))
    }

    // Newer revisions add members; unknown tags are skipped.
    fn from_element(element: &Element) -> Result<Self> {
        let fields = Fields::lenient(element)?;
        Ok(Self {
            idle_retrans_timeout_ms: fields.get(1).map(Element::as_u32).transpose()?,
            active_retrans_timeout_ms: fields.get(2).map(Element::as_u32).transpose()?,
            active_threshold_ms: fields.get(3).map(Element::as_u16).transpose()?,
        })
    }
}

/// PBKDFParamRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbkdfParamRequest {
    /// Initiator random.
    pub initiator_random: [u8; RANDOM_LENGTH],
    /// Initiator's local session id.
    pub initiator_session_id: u16,
    /// Passcode id (0 for the default passcode).
    pub passcode_id: u16,
    /// Whether the initiator already knows the PBKDF parameters.
    pub has_pbkdf_parameters: bool,
    /// Initiator MRP parameters.
    pub session_parameters: Option<SessionParameters>,
}

impl Payload for PbkdfParamRequest {
    const MESSAGE_TYPE: MessageType = MessageType::PbkdfParamRequest;

    fn encode(&self) -> Vec<u8> {
        let mut members = vec![
            bytes(1, &self.initiator_random),
            unsigned(2, self.initiator_session_id),
            unsigned(3, self.passcode_id),
            Element::context(4, Value::Bool(self.has_pbkdf_parameters)),
        ];
        if let Some(params) = self.session_parameters {
            members.push(params.to_element(5));
        }
        structure(members)
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let element = decode_struct(payload)?;
        let fields = Fields::strict(&element, &[1, 2, 3, 4, 5])?;

        Ok(Self {
            initiator_random: fields.required(1)?.as_fixed_bytes()?,
            initiator_session_id: fields.required(2)?.as_u16()?,
            passcode_id: fields.required(3)?.as_u16()?,
            has_pbkdf_parameters: fields.required(4)?.as_bool()?,
            session_parameters: fields
                .get(5)
                .map(SessionParameters::from_element)
                .transpose()?,
        })
    }
}

/// PBKDFParamResponse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PbkdfParamResponse {
    /// Echo of the initiator random.
    pub initiator_random: [u8; RANDOM_LENGTH],
    /// Responder random.
    pub responder_random: [u8; RANDOM_LENGTH],
    /// Responder's local session id.
    pub responder_session_id: u16,
    /// PBKDF parameters, omitted when the initiator already has them.
    pub pbkdf_parameters: Option<PbkdfParameters>,
    /// Responder MRP parameters.
    pub session_parameters: Option<SessionParameters>,
}

impl Payload for PbkdfParamResponse {
    const MESSAGE_TYPE: MessageType = MessageType::PbkdfParamResponse;

    fn encode(&self) -> Vec<u8> {
        let mut members = vec![
            bytes(1, &self.initiator_random),
            bytes(2, &self.responder_random),
            unsigned(3, self.responder_session_id),
        ];
        if let Some(pbkdf) = &self.pbkdf_parameters {
            members.push(Element::context(
                4,
                Value::Structure(vec![unsigned(1, pbkdf.iterations), bytes(2, &pbkdf.salt)]),
            ));
        }
        if let Some(params) = self.session_parameters {
            members.push(params.to_element(5));
        }
        structure(members)
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let element = decode_struct(payload)?;
        let fields = Fields::strict(&element, &[1, 2, 3, 4, 5])?;

        let pbkdf_parameters = match fields.get(4) {
            Some(pbkdf) => {
                let pbkdf = Fields::strict(pbkdf, &[1, 2])?;
                Some(PbkdfParameters::new(
                    pbkdf.required(1)?.as_u32()?,
                    pbkdf.required(2)?.as_bytes()?,
                ))
            }
            None => None,
        };

        Ok(Self {
            initiator_random: fields.required(1)?.as_fixed_bytes()?,
            responder_random: fields.required(2)?.as_fixed_bytes()?,
            responder_session_id: fields.required(3)?.as_u16()?,
            pbkdf_parameters,
            session_parameters: fields
                .get(5)
                .map(SessionParameters::from_element)
                .transpose()?,
        })
    }
}

/// Pake1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pake1 {
    /// Prover share `X`.
    pub pa: [u8; P256_POINT_LENGTH],
}

impl Payload for Pake1 {
    const MESSAGE_TYPE: MessageType = MessageType::Pake1;

    fn encode(&self) -> Vec<u8> {
        structure(vec![bytes(1, &self.pa)])
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let element = decode_struct(payload)?;
        let fields = Fields::strict(&element, &[1])?;
        Ok(Self {
            pa: fields.required(1)?.as_fixed_bytes()?,
        })
    }
}

/// Pake2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pake2 {
    /// Verifier share `Y`.
    pub pb: [u8; P256_POINT_LENGTH],
    /// Verifier confirmation.
    pub cb: [u8; HASH_LENGTH],
}

impl Payload for Pake2 {
    const MESSAGE_TYPE: MessageType = MessageType::Pake2;

    fn encode(&self) -> Vec<u8> {
        structure(vec![bytes(1, &self.pb), bytes(2, &self.cb)])
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let element = decode_struct(payload)?;
        let fields = Fields::strict(&element, &[1, 2])?;
        Ok(Self {
            pb: fields.required(1)?.as_fixed_bytes()?,
            cb: fields.required(2)?.as_fixed_bytes()?,
        })
    }
}

/// Pake3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pake3 {
    /// Prover confirmation.
    pub ca: [u8; HASH_LENGTH],
}

impl Payload for Pake3 {
    const MESSAGE_TYPE: MessageType = MessageType::Pake3;

    fn encode(&self) -> Vec<u8> {
        structure(vec![bytes(1, &self.ca)])
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        let element = decode_struct(payload)?;
        let fields = Fields::strict(&element, &[1])?;
        Ok(Self {
            ca: fields.required(1)?.as_fixed_bytes()?,
        })
    }
}

impl Payload for StatusReport {
    const MESSAGE_TYPE: MessageType = MessageType::StatusReport;

    fn encode(&self) -> Vec<u8> {
        self.serialize()
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        Self::parse(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> PbkdfParamRequest {
        PbkdfParamRequest {
            initiator_random: [0x11; RANDOM_LENGTH],
            initiator_session_id: 0x1234,
            passcode_id: 0,
            has_pbkdf_parameters: false,
            session_parameters: Some(SessionParameters {
                idle_retrans_timeout_ms: Some(500),
                active_retrans_timeout_ms: Some(300),
                active_threshold_ms: Some(4000),
            }),
        }
    }

    #[test]
    fn test_request_wire_layout() {
        let mut req = request();
        req.session_parameters = None;
        let bytes = req.encode();

        let mut expected = vec![0x15, 0x30, 0x01, 0x20];
        expected.extend_from_slice(&[0x11; 32]);
        expected.extend_from_slice(&[0x25, 0x02, 0x34, 0x12]); // session id, 2 bytes
        expected.extend_from_slice(&[0x24, 0x03, 0x00]); // passcode id
        expected.extend_from_slice(&[0x28, 0x04]); // false
        expected.push(0x18);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn test_request_roundtrip() {
        let req = request();
        let decoded = req.to_message().decode::<PbkdfParamRequest>().unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_response_with_pbkdf_parameters() {
        let resp = PbkdfParamResponse {
            initiator_random: [1; RANDOM_LENGTH],
            responder_random: [2; RANDOM_LENGTH],
            responder_session_id: 7,
            pbkdf_parameters: Some(PbkdfParameters::new(1000, b"SPAKE2P Key Salt".to_vec())),
            session_parameters: None,
        };
        assert_eq!(PbkdfParamResponse::decode(&resp.encode()).unwrap(), resp);

        let without = PbkdfParamResponse {
            pbkdf_parameters: None,
            ..resp
        };
        assert_eq!(PbkdfParamResponse::decode(&without.encode()).unwrap(), without);
    }

    #[test]
    fn test_session_parameters_skip_unknown_members() {
        let element = Element::anonymous(Value::Structure(vec![
            bytes(1, &[0x11; 32]),
            unsigned(2, 1u16),
            unsigned(3, 0u16),
            Element::context(4, Value::Bool(true)),
            Element::context(
                5,
                Value::Structure(vec![unsigned(1, 800u32), unsigned(4, 17u32), unsigned(6, 1u32)]),
            ),
        ]));

        let decoded = PbkdfParamRequest::decode(&element.encode()).unwrap();
        let params = decoded.session_parameters.unwrap();
        assert_eq!(params.idle_retrans_timeout_ms, Some(800));
        assert_eq!(params.active_retrans_timeout_ms, None);
        assert!(decoded.has_pbkdf_parameters);
    }

    #[test]
    fn test_top_level_unknown_member_rejected() {
        let element = Element::anonymous(Value::Structure(vec![
            bytes(1, &[0u8; 32]),
            unsigned(9, 1u8),
        ]));
        assert!(matches!(Pake3::decode(&element.encode()), Err(Error::Decode(_))));
    }

    #[test]
    fn test_pake_field_lengths_checked() {
        let pake1 = Pake1 { pa: [4; 65] };
        assert_eq!(Pake1::decode(&pake1.encode()).unwrap(), pake1);

        for len in [0usize, 64, 66] {
            let short = structure(vec![bytes(1, &vec![4u8; len])]);
            assert!(Pake1::decode(&short).is_err());
        }

        let bad_cb = structure(vec![bytes(1, &[4u8; 65]), bytes(2, &[0u8; 31])]);
        assert!(Pake2::decode(&bad_cb).is_err());

        let missing_cb = structure(vec![bytes(1, &[4u8; 65])]);
        assert!(Pake2::decode(&missing_cb).is_err());

        let wrong_type = structure(vec![unsigned(1, 5u8)]);
        assert!(Pake3::decode(&wrong_type).is_err());
    }

    #[test]
    fn test_message_requires_structure() {
        let not_struct = Element::anonymous(Value::Bytes(vec![0; 32])).encode();
        assert!(Pake3::decode(&not_struct).is_err());

        let tagged = Element::context(1, Value::Structure(vec![bytes(1, &[0; 32])])).encode();
        assert!(Pake3::decode(&tagged).is_err());
    }

    #[test]
    fn test_decode_checks_message_type() {
        let msg = Pake3 { ca: [0; 32] }.to_message();
        assert!(matches!(
            msg.decode::<Pake1>(),
            Err(Error::UnexpectedMessage {
                expected: MessageType::Pake1,
                received: MessageType::Pake3
            })
        ));
    }

    #[test]
    fn test_opcodes() {
        for opcode in [0x20u8, 0x21, 0x22, 0x23, 0x24, 0x40] {
            let ty = MessageType::from_opcode(opcode).unwrap();
            assert_eq!(ty.opcode(), opcode);
        }
        assert!(MessageType::from_opcode(0x30).is_none());
        assert!(Message::from_wire(0x25, vec![]).is_err());
    }

    #[test]
    fn test_status_report_payload() {
        let msg = StatusReport::success().to_message();
        assert_eq!(msg.opcode(), OPCODE_STATUS_REPORT);
        assert!(msg.decode::<StatusReport>().unwrap().is_success());
    }
}
