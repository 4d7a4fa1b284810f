//! Fuzz target: `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming frame decoder and
//! asserts that it never panics, never yields an empty or oversized body,
//! and that splitting the input into two reads changes nothing.
//!
//! cargo fuzz run fuzz_frame_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use blegw::serial::codec::{FrameDecoder, MAX_BODY_LEN};

fuzz_target!(|data: &[u8]| {
    let mut whole = Vec::new();
    let mut decoder = FrameDecoder::new();
    decoder.feed(data, |body| {
        assert!(!body.is_empty(), "decoder must not yield an empty body");
        assert!(body.len() <= MAX_BODY_LEN, "body exceeds MAX_BODY_LEN");
        whole.push(body.to_vec());
    });

    // Same bytes in two reads.
    let mid = data.len() / 2;
    let mut split = Vec::new();
    decoder.reset();
    decoder.feed(&data[..mid], |body| split.push(body.to_vec()));
    decoder.feed(&data[mid..], |body| split.push(body.to_vec()));
    assert_eq!(whole, split);
});
