#![no_main]

use libfuzzer_sys::fuzz_target;
use rally_core::RingBuffer;

fuzz_target!(|data: &[u8]| {
    let Some((&capacity, ops)) = data.split_first() else {
        return;
    };
    let mut ring = RingBuffer::with_capacity(capacity as usize);

    // Each op byte picks an action; the low bits size it
    for chunk in ops.chunks(2) {
        let op = chunk[0];
        let arg = chunk.get(1).copied().unwrap_or(0) as usize;
        let before = ring.len();
        match op % 3 {
            0 => {
                let bytes = vec![if arg % 4 == 0 { b'\n' } else { op }; arg % 32];
                if ring.write(&bytes).is_err() {
                    assert_eq!(ring.len(), before);
                }
            }
            1 => {
                if let Some(frame) = ring.read_up_to(b'\n') {
                    assert_eq!(frame.last(), Some(&b'\n'));
                    assert_eq!(ring.len() + frame.len(), before);
                }
            }
            _ => {
                if ring.rollback(arg % 32).is_err() {
                    assert_eq!(ring.len(), before);
                }
            }
        }
        assert_eq!(ring.len() + ring.available_space(), ring.capacity());
    }
});
