//! Handshake driver tests over the in-memory exchange.
//!
//! Covers the happy path plus timeout, peer close and failure-report
//! delivery.

use std::time::Duration;

use pase_core::{
    HandshakePhase, MessageType, PaseConfig, PaseSession, PbkdfParameters, ProtocolCode,
    Spake2pVerifier, StatusReport,
};
use pase_transport::{establish, Error, Exchange, MemoryExchange};
use tokio::time::timeout;

const PASSCODE: u32 = 20202021;
const ITERATIONS: u32 = 1000;
const SALT: &[u8] = b"SPAKE2P Key Salt";

fn config(wait: Duration) -> PaseConfig {
    PaseConfig {
        handshake_timeout: wait,
        ..Default::default()
    }
}

fn responder(passcode: u32, wait: Duration) -> PaseSession {
    let verifier = Spake2pVerifier::generate(passcode, SALT, ITERATIONS).unwrap();
    PaseSession::responder(
        config(wait),
        verifier,
        PbkdfParameters::new(ITERATIONS, SALT.to_vec()),
    )
    .unwrap()
}

fn initiator(wait: Duration) -> PaseSession {
    PaseSession::initiator(config(wait), PASSCODE, None).unwrap()
}

/// Test: both sides establish and agree on keys
#[tokio::test]
async fn test_loopback_handshake() {
    let (a, b) = MemoryExchange::pair();
    let mut resp = responder(PASSCODE, Duration::from_secs(5));
    let mut init = initiator(Duration::from_secs(5));

    let server = tokio::spawn(async move {
        let keys = establish(&mut resp, &b).await;
        (keys, resp)
    });

    let init_keys = establish(&mut init, &a).await.unwrap();
    let (resp_keys, resp) = timeout(Duration::from_secs(5), server)
        .await
        .expect("Responder timeout")
        .expect("Responder task failed");
    let resp_keys = resp_keys.unwrap();

    assert_eq!(init.phase(), HandshakePhase::Established);
    assert_eq!(resp.phase(), HandshakePhase::Established);
    assert_eq!(init_keys.encrypt_key(), resp_keys.decrypt_key());
    assert_eq!(init_keys.decrypt_key(), resp_keys.encrypt_key());
    assert_eq!(init_keys.peer_session_id, resp_keys.local_session_id);
}

/// Test: wrong passcode fails both sides, the responder via the report
#[tokio::test]
async fn test_loopback_wrong_passcode() {
    let (a, b) = MemoryExchange::pair();
    let mut resp = responder(PASSCODE + 7, Duration::from_secs(5));
    let mut init = initiator(Duration::from_secs(5));

    let server = tokio::spawn(async move { establish(&mut resp, &b).await });

    let init_result = establish(&mut init, &a).await;
    assert!(matches!(
        init_result,
        Err(Error::Protocol(pase_core::Error::ConfirmationFailed))
    ));

    let resp_result = server.await.unwrap();
    assert!(matches!(
        resp_result,
        Err(Error::Protocol(pase_core::Error::PeerStatus { .. }))
    ));
}

/// Test: silent peer triggers the timeout and a CloseSession report
#[tokio::test]
async fn test_loopback_timeout() {
    let (a, b) = MemoryExchange::pair();
    let mut init = initiator(Duration::from_millis(100));

    let result = establish(&mut init, &a).await;
    assert!(matches!(result, Err(Error::Timeout(_))));
    assert_eq!(init.phase(), HandshakePhase::Failed);

    let request = b.recv().await.unwrap().unwrap();
    assert_eq!(request.message_type(), MessageType::PbkdfParamRequest);

    let report: StatusReport = b.recv().await.unwrap().unwrap().decode().unwrap();
    assert_eq!(report.protocol_code, ProtocolCode::CloseSession.to_u16());
}

/// Test: peer closing the exchange aborts the session
#[tokio::test]
async fn test_loopback_peer_closed() {
    let (a, b) = MemoryExchange::pair();
    let mut resp = responder(PASSCODE, Duration::from_secs(5));
    drop(a);

    let result = establish(&mut resp, &b).await;
    assert!(matches!(result, Err(Error::ConnectionClosed)));
    assert!(matches!(
        resp.error(),
        Some(pase_core::Error::Aborted(_))
    ));
}

/// Test: garbage from the peer is answered with an InvalidParameter report
#[tokio::test]
async fn test_loopback_garbage_gets_failure_report() {
    let (a, b) = MemoryExchange::pair();
    let mut resp = responder(PASSCODE, Duration::from_secs(5));

    a.send(pase_core::Message::new(
        MessageType::PbkdfParamRequest,
        vec![0xFF, 0x00],
    ))
    .await
    .unwrap();

    let result = establish(&mut resp, &b).await;
    assert!(matches!(
        result,
        Err(Error::Protocol(pase_core::Error::Decode(_)))
    ));

    let report: StatusReport = a.recv().await.unwrap().unwrap().decode().unwrap();
    assert_eq!(report.protocol_code, ProtocolCode::InvalidParameter.to_u16());
}
