#![no_main]

use libfuzzer_sys::fuzz_target;
use luminous_stack::core::codec::Frame;
use luminous_stack::Message;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must never panic the frame parser or the message decoder
    if let Ok(frame) = Frame::from_bytes(data) {
        let _ = Message::from_frame(&frame);
    }
});
