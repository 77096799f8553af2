// Bulk coordinate encoding.
//
//   s(count) s(id_delta)*count s(long_delta)*count s(lat_delta)*count
//
// Coordinates go through `coord_to_int` first. Three independent delta
// chains keep each stream small for spatially clustered, ID-sorted nodes.

use super::serialize::{coord_to_int, int_to_coord};
use super::varint::{VarintBuf, VarintReader};
use crate::element::Node;
use crate::error::{CacheError, Result};

/// Encode the `(id, long, lat)` of `nodes`, reusing `buf`'s allocation.
/// Tags are not part of this format.
pub fn marshal_delta_nodes(nodes: &[Node], buf: Vec<u8>) -> Vec<u8> {
    let mut out = VarintBuf::reuse(buf, nodes.len() * 4 * 3 + 10);
    out.put_varint(nodes.len() as i64);

    let mut last = 0i64;
    for n in nodes {
        out.put_varint(n.id.wrapping_sub(last));
        last = n.id;
    }

    let mut last = 0i64;
    for n in nodes {
        let long = i64::from(coord_to_int(n.long));
        out.put_varint(long - last);
        last = long;
    }

    let mut last = 0i64;
    for n in nodes {
        let lat = i64::from(coord_to_int(n.lat));
        out.put_varint(lat - last);
        last = lat;
    }

    out.finish()
}

/// Decode a delta-node record into `nodes`, reusing its allocation.
pub fn unmarshal_delta_nodes(data: &[u8], mut nodes: Vec<Node>) -> Result<Vec<Node>> {
    let mut r = VarintReader::new(data);
    let count = r.varint()?;
    let count = usize::try_from(count)
        .ok()
        .filter(|&c| c.saturating_mul(3) <= r.remaining())
        .ok_or_else(|| CacheError::corrupt(format!("invalid delta node count {count}")))?;

    nodes.clear();
    nodes.reserve(count);

    let mut last = 0i64;
    for _ in 0..count {
        last = last.wrapping_add(r.varint()?);
        nodes.push(Node::new(last, 0.0, 0.0));
    }

    let mut last = 0i64;
    for n in nodes.iter_mut() {
        last = last.wrapping_add(r.varint()?);
        n.long = int_to_coord(fixed(last)?);
    }

    let mut last = 0i64;
    for n in nodes.iter_mut() {
        last = last.wrapping_add(r.varint()?);
        n.lat = int_to_coord(fixed(last)?);
    }

    if !r.is_empty() {
        return Err(CacheError::corrupt("trailing bytes after delta nodes"));
    }
    Ok(nodes)
}

fn fixed(v: i64) -> Result<u32> {
    u32::try_from(v).map_err(|_| CacheError::corrupt(format!("coordinate {v} out of range")))
}
