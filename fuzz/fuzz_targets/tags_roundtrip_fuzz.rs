#![no_main]
use libfuzzer_sys::fuzz_target;
use osmcache::binary::TagCompressor;
use osmcache::element::Tags;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    let mut tags = Tags::new();
    for pair in text.split('\n') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        tags.insert(k.to_string(), v.to_string());
    }

    let tc = TagCompressor::default();
    let arr = tc.tags_to_array(&tags);
    assert_eq!(tc.array_to_tags(&arr).unwrap(), tags);

    // arbitrary arrays may be rejected but never panic
    let parts: Vec<&str> = text.split('\0').collect();
    let _ = tc.array_to_tags(&parts);
});
