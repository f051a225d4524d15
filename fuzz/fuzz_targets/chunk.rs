#![no_main]

use libfuzzer_sys::fuzz_target;
use uatcp_core::chunk::Framer;
use uatcp_core::header::AsymmetricSecurityHeader;

fuzz_target!(|data: &[u8]| {
    // Fuzz chunk framing and header parsing - should never panic on any input
    let framer = Framer::new(65_536);
    let mut buf = data.to_vec();
    while let Ok(Some(chunk)) = framer.poll(&mut buf) {
        let _ = AsymmetricSecurityHeader::parse(&chunk.data[12..]);
    }
});
