// OSM element model shared by codecs, caches and the reference index.

use std::collections::BTreeMap;

/// Sentinel ID for elements filtered out upstream; never persisted.
pub const SKIP: i64 = -1;

/// Tag mapping. Ordered so encoded records are deterministic.
pub type Tags = BTreeMap<String, String>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    pub id: i64,
    pub long: f64,
    pub lat: f64,
    pub tags: Tags,
}

impl Node {
    pub fn new(id: i64, long: f64, lat: f64) -> Self {
        Self {
            id,
            long,
            lat,
            tags: Tags::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Way {
    pub id: i64,
    pub tags: Tags,
    /// Node IDs in path order.
    pub refs: Vec<i64>,
    /// Resolved coordinates for `refs`; filled on demand, never stored.
    pub nodes: Vec<Node>,
}

impl Way {
    pub fn new(id: i64, refs: Vec<i64>) -> Self {
        Self {
            id,
            refs,
            ..Default::default()
        }
    }

    pub fn is_closed(&self) -> bool {
        self.refs.len() >= 4 && self.refs.first() == self.refs.last()
    }
}

/// Kind of a relation member. Discriminants are part of the record format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MemberType {
    Node = 0,
    Way = 1,
    Relation = 2,
}

impl MemberType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Node),
            1 => Some(Self::Way),
            2 => Some(Self::Relation),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Way => "way",
            Self::Relation => "relation",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Member {
    pub id: i64,
    pub kind: MemberType,
    pub role: String,
    /// Resolved way for way members; filled on demand, never stored.
    pub way: Option<Box<Way>>,
}

impl Member {
    pub fn new(id: i64, kind: MemberType, role: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            role: role.into(),
            way: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub tags: Tags,
    pub members: Vec<Member>,
}

/// Sorted, duplicate-free set of IDs that depend on (or are depended on by)
/// element `id`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdRefs {
    pub id: i64,
    pub refs: Vec<i64>,
}

impl IdRefs {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            refs: Vec::new(),
        }
    }

    /// Insert `r` at its sorted position. Returns false if already present.
    pub fn add(&mut self, r: i64) -> bool {
        match self.refs.binary_search(&r) {
            Ok(_) => false,
            Err(pos) => {
                self.refs.insert(pos, r);
                true
            }
        }
    }

    /// Remove `r`. Returns false if it was not present.
    pub fn delete(&mut self, r: i64) -> bool {
        match self.refs.binary_search(&r) {
            Ok(pos) => {
                self.refs.remove(pos);
                true
            }
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idrefs_add_keeps_sorted_unique() {
        let mut r = IdRefs::new(1);
        assert!(r.add(5));
        assert!(r.add(3));
        assert!(r.add(9));
        assert!(!r.add(5));
        assert_eq!(r.refs, vec![3, 5, 9]);
    }

    #[test]
    fn idrefs_delete() {
        let mut r = IdRefs {
            id: 1,
            refs: vec![1, 2, 3],
        };
        assert!(r.delete(2));
        assert!(!r.delete(2));
        assert_eq!(r.refs, vec![1, 3]);
    }

    #[test]
    fn member_type_discriminants() {
        for t in [MemberType::Node, MemberType::Way, MemberType::Relation] {
            assert_eq!(MemberType::from_u8(t as u8), Some(t));
        }
        assert_eq!(MemberType::from_u8(3), None);
    }

    #[test]
    fn closed_way() {
        assert!(Way::new(1, vec![1, 2, 3, 1]).is_closed());
        assert!(!Way::new(1, vec![1, 2, 1]).is_closed());
    }
}
