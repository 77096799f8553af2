#![no_main]
use libfuzzer_sys::fuzz_target;
use osmcache::binary::{marshal_idrefs_bunch, unmarshal_delta_nodes, unmarshal_idrefs_bunch};

fuzz_target!(|data: &[u8]| {
    // Length prefixes are attacker controlled; decoders must reject them
    // before allocating.
    if let Ok(bunch) = unmarshal_idrefs_bunch(data) {
        let again = unmarshal_idrefs_bunch(&marshal_idrefs_bunch(&bunch)).unwrap();
        assert_eq!(again, bunch);
    }
    let _ = unmarshal_delta_nodes(data, Vec::new());
});
