use std::collections::BTreeMap;
use std::sync::Arc;

use osmcache::binary::serialize::{coord_to_int, int_to_coord};
use osmcache::binary::tags::TagCompressor;
use osmcache::binary::varint::{delta_pack, delta_unpack, put_varint, read_varint};
use osmcache::binary::{
    marshal_idrefs_bunch, marshal_relation, marshal_way, unmarshal_idrefs_bunch,
    unmarshal_relation, unmarshal_way,
};
use osmcache::config::BunchOptions;
use osmcache::diff::{BunchRefIndex, merge_bunch};
use osmcache::element::{IdRefs, Member, MemberType, Relation, Tags, Way};
use osmcache::store::{MemoryStore, id_to_key};
use proptest::prelude::*;

fn tag_strategy() -> impl Strategy<Value = Tags> {
    let known = prop_oneof![
        Just(("building".to_string(), "yes".to_string())),
        Just(("highway".to_string(), "residential".to_string())),
        Just(("oneway".to_string(), "yes".to_string())),
    ];
    let common = (
        prop_oneof![Just("name"), Just("addr:street"), Just("addr:housenumber")],
        ".{0,12}",
    )
        .prop_map(|(k, v)| (k.to_string(), v));
    let arbitrary = (".{0,8}", ".{0,12}");
    proptest::collection::vec(prop_oneof![known, common, arbitrary], 0..8)
        .prop_map(|pairs| pairs.into_iter().collect::<BTreeMap<_, _>>())
}

fn sorted_idrefs() -> impl Strategy<Value = Vec<IdRefs>> {
    proptest::collection::btree_map(
        0i64..64,
        proptest::collection::btree_set(-1000i64..1000, 0..6),
        0..12,
    )
    .prop_map(|m| {
        m.into_iter()
            .map(|(id, refs)| IdRefs {
                id,
                refs: refs.into_iter().collect(),
            })
            .collect()
    })
}

fn member_type() -> impl Strategy<Value = MemberType> {
    prop_oneof![
        Just(MemberType::Node),
        Just(MemberType::Way),
        Just(MemberType::Relation)
    ]
}

proptest! {
    #[test]
    fn prop_varint_roundtrip(v in any::<i64>()) {
        let mut buf = [0u8; 10];
        let n = put_varint(&mut buf, v);
        prop_assert_eq!(read_varint(&buf[..n]).unwrap(), (v, n));
    }

    #[test]
    fn prop_delta_pack_unpack_inverse(values in proptest::collection::vec(any::<i64>(), 0..64)) {
        let mut data = values.clone();
        delta_pack(&mut data);
        delta_unpack(&mut data);
        prop_assert_eq!(data, values);
    }

    #[test]
    fn prop_tag_compression_roundtrip(tags in tag_strategy()) {
        let c = TagCompressor::default();
        let array = c.tags_to_array(&tags);
        prop_assert_eq!(c.array_to_tags(&array).unwrap(), tags);
    }

    #[test]
    fn prop_way_roundtrip(
        refs in proptest::collection::vec(any::<i64>(), 0..64),
        tags in tag_strategy()
    ) {
        let mut way = Way::new(1, refs);
        way.tags = tags;
        let back = unmarshal_way(&marshal_way(&way)).unwrap();
        prop_assert_eq!(back.refs, way.refs);
        prop_assert_eq!(back.tags, way.tags);
    }

    #[test]
    fn prop_relation_roundtrip(
        members in proptest::collection::vec((any::<i64>(), member_type(), ".{0,10}"), 0..16),
        tags in tag_strategy()
    ) {
        let rel = Relation {
            id: 1,
            tags,
            members: members
                .into_iter()
                .map(|(id, kind, role)| Member::new(id, kind, role))
                .collect(),
        };
        let back = unmarshal_relation(&marshal_relation(&rel)).unwrap();
        prop_assert_eq!(back.members, rel.members);
        prop_assert_eq!(back.tags, rel.tags);
    }

    #[test]
    fn prop_coord_precision(c in -180.0f64..180.0) {
        let back = int_to_coord(coord_to_int(c));
        prop_assert!((back - c).abs() < 1e-7, "{} -> {}", c, back);
    }

    #[test]
    fn prop_key_order(a in any::<i64>(), b in any::<i64>()) {
        prop_assume!(a != b);
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        prop_assert!(id_to_key(lo) < id_to_key(hi));
    }

    #[test]
    fn prop_idrefs_bunch_roundtrip(bunch in sorted_idrefs()) {
        let back = unmarshal_idrefs_bunch(&marshal_idrefs_bunch(&bunch)).unwrap();
        prop_assert_eq!(back, bunch);
    }

    #[test]
    fn prop_merge_bunch(old in sorted_idrefs(), new in sorted_idrefs()) {
        // stored bunches never hold entries without refs
        let old: Vec<IdRefs> = old.into_iter().filter(|e| !e.refs.is_empty()).collect();
        let merged = merge_bunch(old.clone(), &new);

        prop_assert!(merged.windows(2).all(|w| w[0].id < w[1].id));
        for e in &merged {
            prop_assert!(e.refs.windows(2).all(|w| w[0] < w[1]));
        }

        let find = |v: &[IdRefs], id: i64| v.iter().find(|e| e.id == id).cloned();
        for e in &new {
            match (find(&old, e.id), e.refs.is_empty()) {
                (_, true) => prop_assert!(find(&merged, e.id).is_none()),
                (None, false) => prop_assert_eq!(find(&merged, e.id), Some(e.clone())),
                (Some(o), false) => {
                    let mut union: Vec<i64> = o.refs.iter().chain(&e.refs).copied().collect();
                    union.sort_unstable();
                    union.dedup();
                    prop_assert_eq!(find(&merged, e.id).map(|m| m.refs), Some(union));
                }
            }
        }
        for o in &old {
            if find(&new, o.id).is_none() {
                prop_assert_eq!(find(&merged, o.id), Some(o.clone()));
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_linear_import_equivalence(
        adds in proptest::collection::vec((0i64..2000, 0i64..50), 0..400)
    ) {
        let opts = BunchOptions { bunch_cache_capacity: 37, ..BunchOptions::default() };

        let idle_store = Arc::new(MemoryStore::new());
        let idle = BunchRefIndex::with_store(idle_store.clone(), &opts);
        for &(id, r) in &adds {
            idle.add(id, r).unwrap();
        }

        let linear_store = Arc::new(MemoryStore::new());
        let linear = BunchRefIndex::with_store(linear_store.clone(), &opts);
        linear.set_linear_import(true).unwrap();
        for &(id, r) in &adds {
            linear.add(id, r).unwrap();
        }
        linear.set_linear_import(false).unwrap();

        for id in 0..2000 {
            prop_assert_eq!(idle.get(id).unwrap(), linear.get(id).unwrap());
        }
        prop_assert_eq!(idle_store.len(), linear_store.len());
    }
}
