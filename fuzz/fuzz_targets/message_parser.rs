//! Fuzz target for line parsing
//!
//! Feeds arbitrary lines to the event parser and checks that it never panics
//! and that decoded tag blocks re-encode to something that parses again.

#![no_main]

use libfuzzer_sys::fuzz_target;
use std::str;
use tmi_chat::{MessageParser, Tags};

fuzz_target!(|data: &[u8]| {
    let Ok(input) = str::from_utf8(data) else {
        return;
    };
    if input.len() > 8191 {
        return;
    }

    let parser = MessageParser::new("fuzzbot");
    if let Ok(event) = parser.parse(input) {
        if let Some(tags) = event.tags() {
            let wire = tags.to_wire();
            assert!(Tags::parse(&wire).is_ok(), "re-encoded tags failed: {}", wire);
        }
    }
    let _ = parser.parse_lossy(input);
});
