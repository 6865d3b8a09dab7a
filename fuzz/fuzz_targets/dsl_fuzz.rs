//! Protocol description fuzz target: parsing and resolving arbitrary text must not panic.
//! Build with: cargo fuzz run dsl_fuzz (requires nightly and cargo fuzz).

#![cfg_attr(fuzzing, no_main)]

#[cfg(fuzzing)]
use libfuzzer_sys::fuzz_target;

#[cfg(fuzzing)]
fuzz_target!(|data: &[u8]| {
    let Ok(src) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(protocol) = commskit::parse(src) {
        let _ = commskit::resolve(&protocol);
    }
});

#[cfg(not(fuzzing))]
fn main() {
    eprintln!("Build with: cargo fuzz run dsl_fuzz");
}
