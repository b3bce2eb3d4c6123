#![no_main]

use libfuzzer_sys::fuzz_target;
use pase_core::{
    tlv, Pake1, Pake2, Pake3, Payload, PbkdfParamRequest, PbkdfParamResponse, StatusReport,
};

fn check<T: Payload + PartialEq + std::fmt::Debug>(data: &[u8]) {
    // Anything that decodes must survive re-encoding unchanged
    if let Ok(decoded) = T::decode(data) {
        let reparsed = T::decode(&decoded.encode());
        assert_eq!(reparsed.ok().as_ref(), Some(&decoded));
    }
}

fuzz_target!(|data: &[u8]| {
    let _ = tlv::decode(data);

    check::<PbkdfParamRequest>(data);
    check::<PbkdfParamResponse>(data);
    check::<Pake1>(data);
    check::<Pake2>(data);
    check::<Pake3>(data);
    check::<StatusReport>(data);
});
