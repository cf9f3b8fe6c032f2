#![no_main]

use libfuzzer_sys::fuzz_target;
use luminous_stack::utils::compression::{compress, decompress, CompressionKind};

fuzz_target!(|data: &[u8]| {
    for kind in [CompressionKind::Lz4, CompressionKind::Zstd] {
        if let Ok(compressed) = compress(data, kind) {
            let _ = decompress(&compressed, kind);
        }
        // Raw input exercises the size limits on malformed streams
        let _ = decompress(data, kind);
    }
});
