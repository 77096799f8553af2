#![no_main]
use libfuzzer_sys::fuzz_target;
use osmcache::binary::{marshal_node, marshal_relation, marshal_way, unmarshal_coord};
use osmcache::binary::{unmarshal_node, unmarshal_relation, unmarshal_way};

fuzz_target!(|data: &[u8]| {
    // Stored records are untrusted: decoding may fail but never panic.
    if let Ok(node) = unmarshal_node(data) {
        let _ = marshal_node(&node);
    }
    if let Ok(way) = unmarshal_way(data) {
        let again = unmarshal_way(&marshal_way(&way)).unwrap();
        assert_eq!(again.refs, way.refs);
    }
    if let Ok(rel) = unmarshal_relation(data) {
        let _ = marshal_relation(&rel);
    }
    let _ = unmarshal_coord(data);
});
