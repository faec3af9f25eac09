//! Fuzz target for line framing
//!
//! Splits the input at a fuzzer-chosen point and checks that feeding it in
//! two pieces yields the same lines as feeding it whole.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tmi_chat::LineCodec;

fuzz_target!(|data: &[u8]| {
    let Some((&cut, stream)) = data.split_first() else {
        return;
    };
    let cut = usize::from(cut).min(stream.len());

    let whole = LineCodec::new().feed(stream);

    let mut codec = LineCodec::new();
    let mut pieces = codec.feed(&stream[..cut]);
    pieces.extend(codec.feed(&stream[cut..]));

    assert_eq!(whole, pieces);
});
