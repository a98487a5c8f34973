#![no_main]

use libfuzzer_sys::fuzz_target;
use rally::protocol::parse_frame;
use rally::server::{Session, SessionId};

fuzz_target!(|data: &[u8]| {
    // Frame the bytes the way a connection would, then parse every complete frame
    let mut session = Session::with_capacity(SessionId(0), 4096);
    let mut reader = data;
    while let Ok(rally::server::ReadStatus::Open) = session.read_from(&mut reader) {
        while let Some(frame) = session.next_request() {
            let _ = parse_frame(&frame);
        }
        if reader.is_empty() {
            break;
        }
    }
});
