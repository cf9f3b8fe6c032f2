#![no_main]

use libfuzzer_sys::fuzz_target;
use luminous_stack::core::serialization::MultiFormat;
use luminous_stack::Packet;

fuzz_target!(|data: &[u8]| {
    if let Ok((packet, format)) = Packet::deserialize_with_header(data) {
        // Whatever decodes must encode again in the same format
        if let Ok(bytes) = packet.serialize_with_header(format) {
            let _ = Packet::deserialize_with_header(&bytes);
        }
        let _ = packet.intention();
        let _ = packet.verify_integrity();
    }
});
