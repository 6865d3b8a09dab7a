//! Stream fuzz target: feed arbitrary bytes, split at a fuzzer-chosen point, to the demo protocol.
//! The reader must not panic and must attribute every input byte to exactly one message.
//! Build with: cargo fuzz run stream_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
const DEMO: &str = include_str!("../../demos/demo.dsl");

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Ok(mut engine) = commskit::Engine::from_dsl(DEMO) else {
        return;
    };
    let split = data.first().map(|b| *b as usize % (data.len() + 1)).unwrap_or(0);
    let (head, tail) = data.split_at(split);
    let mut msgs = engine.read_data(head, false);
    msgs.extend(engine.read_data(tail, true));
    let attributed: usize = msgs.iter().map(|m| m.frame_bytes().len()).sum();
    assert_eq!(attributed, data.len());
    assert_eq!(engine.pending(), 0);
    for m in &msgs {
        let _ = commskit::dump::dump_message(m);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run stream_fuzz");
}
