#![no_main]

//! Bounded handshake: passcode, salt and iteration count are taken from
//! the input and clamped into the protocol bounds. Both sides must reach
//! `Established`. The remaining bytes are then replayed as a Pake1 body
//! against a fresh responder, which must fail cleanly or answer.

use libfuzzer_sys::fuzz_target;
use pase_core::{
    HandshakePhase, Message, MessageType, PaseConfig, PaseSession, PbkdfParameters,
    Spake2pVerifier, Step,
};

const MIN_SALT: usize = 16;
const MAX_SALT: usize = 32;
const MIN_ITERATIONS: u32 = 1000;
// Kept near the lower bound so each run stays fast.
const ITERATION_SPAN: u32 = 64;
const PASSCODE_MAX: u32 = 0x7FF_FFFF;

fn sent(step: Step) -> Message {
    match step {
        Step::Send(message) | Step::SendAndComplete(message) => message,
        Step::Complete => panic!("nothing to send"),
    }
}

fuzz_target!(|data: &[u8]| {
    if data.len() < 7 + MAX_SALT {
        return;
    }

    let passcode = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) % (PASSCODE_MAX + 1);
    let iterations = MIN_ITERATIONS + u32::from(u16::from_le_bytes([data[4], data[5]])) % ITERATION_SPAN;
    let salt_len = MIN_SALT + usize::from(data[6]) % (MAX_SALT - MIN_SALT + 1);
    let salt = data[7..7 + salt_len].to_vec();
    let rest = &data[7 + MAX_SALT..];

    let pbkdf = PbkdfParameters::new(iterations, salt.clone());
    let verifier = Spake2pVerifier::generate(passcode, &salt, iterations).unwrap();
    let mut resp = PaseSession::responder(PaseConfig::default(), verifier.clone(), pbkdf.clone()).unwrap();
    let mut init = PaseSession::initiator(PaseConfig::default(), passcode, None).unwrap();

    let request = init.start().unwrap();
    let response = sent(resp.handle_message(&request).unwrap());
    let pake1 = sent(init.handle_message(&response).unwrap());
    let pake2 = sent(resp.handle_message(&pake1).unwrap());
    let pake3 = sent(init.handle_message(&pake2).unwrap());
    let status = sent(resp.handle_message(&pake3).unwrap());
    assert_eq!(init.handle_message(&status).unwrap(), Step::Complete);

    assert_eq!(init.phase(), HandshakePhase::Established);
    assert_eq!(resp.phase(), HandshakePhase::Established);

    // Fuzzed Pake1 against a responder that already answered a request
    let mut target = PaseSession::responder(PaseConfig::default(), verifier, pbkdf).unwrap();
    let mut other = PaseSession::initiator(PaseConfig::default(), passcode, None).unwrap();
    let request = other.start().unwrap();
    let _ = target.handle_message(&request).unwrap();

    match target.handle_message(&Message::new(MessageType::Pake1, rest.to_vec())) {
        Ok(_) => assert_eq!(target.phase(), HandshakePhase::WaitingForPake3),
        Err(_) => {
            assert_eq!(target.phase(), HandshakePhase::Failed);
            assert!(target.keys().is_none());
        }
    }
});
