// Reference indexes per relationship.

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use super::index::BunchRefIndex;
use crate::config::BunchOptions;
use crate::element::{Member, MemberType, Way};
use crate::error::Result;
use crate::store::KvStore;

macro_rules! ref_index {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug)]
        pub struct $name(BunchRefIndex);

        impl $name {
            pub fn open(path: &Path, opts: &BunchOptions) -> Result<Self> {
                BunchRefIndex::open(path, opts).map(Self)
            }

            pub fn with_store(store: Arc<dyn KvStore>, opts: &BunchOptions) -> Self {
                Self(BunchRefIndex::with_store(store, opts))
            }

            pub fn close(self) -> Result<()> {
                self.0.close()
            }
        }

        impl Deref for $name {
            type Target = BunchRefIndex;

            fn deref(&self) -> &BunchRefIndex {
                &self.0
            }
        }
    };
}

ref_index! {
    /// Node ID -> IDs of the ways using the node.
    CoordsRefIndex
}

ref_index! {
    /// Node ID -> IDs of the relations with the node as a member.
    CoordsRelRefIndex
}

ref_index! {
    /// Way ID -> IDs of the relations with the way as a member.
    WaysRefIndex
}

impl CoordsRefIndex {
    pub fn add_from_way(&self, way: &Way) -> Result<()> {
        for &node in &way.refs {
            self.add(node, way.id)?;
        }
        Ok(())
    }

    /// Undo [`add_from_way`](Self::add_from_way). Idle mode only.
    pub fn delete_from_way(&self, way: &Way) -> Result<()> {
        for &node in &way.refs {
            self.delete_ref(node, way.id)?;
        }
        Ok(())
    }
}

impl CoordsRelRefIndex {
    pub fn add_from_members(&self, rel_id: i64, members: &[Member]) -> Result<()> {
        add_members(self, MemberType::Node, rel_id, members)
    }

    pub fn delete_from_members(&self, rel_id: i64, members: &[Member]) -> Result<()> {
        delete_members(self, MemberType::Node, rel_id, members)
    }
}

impl WaysRefIndex {
    pub fn add_from_members(&self, rel_id: i64, members: &[Member]) -> Result<()> {
        add_members(self, MemberType::Way, rel_id, members)
    }

    pub fn delete_from_members(&self, rel_id: i64, members: &[Member]) -> Result<()> {
        delete_members(self, MemberType::Way, rel_id, members)
    }
}

fn add_members(
    index: &BunchRefIndex,
    kind: MemberType,
    rel_id: i64,
    members: &[Member],
) -> Result<()> {
    for m in members.iter().filter(|m| m.kind == kind) {
        index.add(m.id, rel_id)?;
    }
    Ok(())
}

fn delete_members(
    index: &BunchRefIndex,
    kind: MemberType,
    rel_id: i64,
    members: &[Member],
) -> Result<()> {
    for m in members.iter().filter(|m| m.kind == kind) {
        index.delete_ref(m.id, rel_id)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn opts() -> BunchOptions {
        BunchOptions::default()
    }

    #[test]
    fn diff_cache_ways() {
        let index = CoordsRefIndex::with_store(Arc::new(MemoryStore::new()), &opts());
        let w1 = Way::new(100, vec![1000, 1001, 1002]);
        let w2 = Way::new(200, vec![1002, 1003, 1004]);
        index.add_from_way(&w1).unwrap();
        index.add_from_way(&w2).unwrap();
        assert_eq!(index.get(1002).unwrap(), vec![100, 200]);

        index.delete_from_way(&w1).unwrap();
        assert!(index.get(1000).unwrap().is_empty());
        assert_eq!(index.get(1002).unwrap(), vec![200]);
    }

    #[test]
    fn members_by_kind() {
        let nodes = CoordsRelRefIndex::with_store(Arc::new(MemoryStore::new()), &opts());
        let ways = WaysRefIndex::with_store(Arc::new(MemoryStore::new()), &opts());
        let members = vec![
            Member::new(1, MemberType::Node, "label"),
            Member::new(1, MemberType::Way, "outer"),
            Member::new(2, MemberType::Way, "inner"),
            Member::new(3, MemberType::Relation, ""),
        ];
        nodes.add_from_members(50, &members).unwrap();
        ways.add_from_members(50, &members).unwrap();

        assert_eq!(nodes.get(1).unwrap(), vec![50]);
        assert!(nodes.get(2).unwrap().is_empty());
        assert_eq!(ways.get(1).unwrap(), vec![50]);
        assert_eq!(ways.get(2).unwrap(), vec![50]);
        assert!(ways.get(3).unwrap().is_empty());

        ways.delete_from_members(50, &members).unwrap();
        assert!(ways.get(1).unwrap().is_empty());
        assert_eq!(nodes.get(1).unwrap(), vec![50]);
    }
}
