// Node, way and relation record codecs.
//
// Layouts (all integers are varints, `u` = unsigned, `s` = zig-zag signed):
//
//   strings  := u(count) { u(len) bytes }*
//   node     := u(long_int) u(lat_int) strings(tags)
//   way      := u(n) s(ref_delta)*n strings(tags)
//   relation := u(n) s(id_delta)*n u(n) type_byte*n u(n) { u(len) role }*n
//               strings(tags)
//   coord    := f64le(long) f64le(lat)
//
// The element ID is never part of the value; caches restore it from the key.

use std::str;

use super::tags::TagCompressor;
use super::varint::{VarintBuf, VarintReader, delta_pack, delta_unpack};
use crate::element::{Member, MemberType, Node, Relation, Tags, Way};
use crate::error::{CacheError, Result};

/// Fixed-point scale mapping 360 degrees onto the full `u32` range.
pub const COORD_FACTOR: f64 = u32::MAX as f64 / 360.0;

/// Byte length of a raw coordinate record.
pub const COORD_RECORD_LEN: usize = 16;

/// Convert a coordinate in degrees to its fixed-point form.
#[inline]
pub fn coord_to_int(c: f64) -> u32 {
    ((c + 180.0) * COORD_FACTOR).round() as u32
}

/// Inverse of [`coord_to_int`].
#[inline]
pub fn int_to_coord(i: u32) -> f64 {
    f64::from(i) / COORD_FACTOR - 180.0
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

fn put_tags(buf: &mut VarintBuf, tags: &Tags) {
    let array = TagCompressor::default().tags_to_array(tags);
    buf.put_uvarint(array.len() as u64);
    for s in &array {
        buf.put_str(s);
    }
}

fn read_str<'a>(r: &mut VarintReader<'a>) -> Result<&'a str> {
    let len = r.count(1)?;
    let bytes = r.bytes(len)?;
    str::from_utf8(bytes).map_err(|e| CacheError::corrupt(format!("invalid UTF-8 string: {e}")))
}

fn read_tags(r: &mut VarintReader<'_>) -> Result<Tags> {
    let n = r.count(1)?;
    let mut array = Vec::with_capacity(n);
    for _ in 0..n {
        array.push(read_str(r)?);
    }
    TagCompressor::default().array_to_tags(&array)
}

fn expect_end(r: &VarintReader<'_>, what: &str) -> Result<()> {
    if r.is_empty() {
        Ok(())
    } else {
        Err(CacheError::corrupt(format!(
            "{} trailing bytes after {what} record",
            r.remaining()
        )))
    }
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// Encode a tagged node. Coordinates are stored in fixed-point form.
pub fn marshal_node(node: &Node) -> Vec<u8> {
    let mut buf = VarintBuf::with_estimate(16 + node.tags.len() * 12);
    buf.put_uvarint(u64::from(coord_to_int(node.long)));
    buf.put_uvarint(u64::from(coord_to_int(node.lat)));
    put_tags(&mut buf, &node.tags);
    buf.finish()
}

pub fn unmarshal_node(data: &[u8]) -> Result<Node> {
    let mut r = VarintReader::new(data);
    let long = read_fixed_coord(&mut r)?;
    let lat = read_fixed_coord(&mut r)?;
    let tags = read_tags(&mut r)?;
    expect_end(&r, "node")?;
    Ok(Node {
        id: 0,
        long,
        lat,
        tags,
    })
}

fn read_fixed_coord(r: &mut VarintReader<'_>) -> Result<f64> {
    let v = r.uvarint()?;
    let v = u32::try_from(v)
        .map_err(|_| CacheError::corrupt(format!("coordinate {v} out of range")))?;
    Ok(int_to_coord(v))
}

// ---------------------------------------------------------------------------
// Ways
// ---------------------------------------------------------------------------

/// Encode a way. `way.refs` is left untouched; a packed copy is written.
pub fn marshal_way(way: &Way) -> Vec<u8> {
    let mut refs = way.refs.clone();
    delta_pack(&mut refs);

    let mut buf = VarintBuf::with_estimate(refs.len() * 3 + way.tags.len() * 12 + 8);
    buf.put_uvarint(refs.len() as u64);
    for &r in &refs {
        buf.put_varint(r);
    }
    put_tags(&mut buf, &way.tags);
    buf.finish()
}

pub fn unmarshal_way(data: &[u8]) -> Result<Way> {
    let mut r = VarintReader::new(data);
    let n = r.count(1)?;
    let mut refs = Vec::with_capacity(n);
    for _ in 0..n {
        refs.push(r.varint()?);
    }
    // decode fully before undoing the delta chain
    delta_unpack(&mut refs);
    let tags = read_tags(&mut r)?;
    expect_end(&r, "way")?;
    Ok(Way {
        id: 0,
        tags,
        refs,
        nodes: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// Encode a relation as three parallel member sequences plus tags.
pub fn marshal_relation(rel: &Relation) -> Vec<u8> {
    let members = &rel.members;
    let mut ids: Vec<i64> = members.iter().map(|m| m.id).collect();
    delta_pack(&mut ids);

    let roles_len: usize = members.iter().map(|m| m.role.len() + 1).sum();
    let mut buf = VarintBuf::with_estimate(members.len() * 4 + roles_len + rel.tags.len() * 12 + 8);

    buf.put_uvarint(ids.len() as u64);
    for &id in &ids {
        buf.put_varint(id);
    }
    buf.put_uvarint(members.len() as u64);
    let types: Vec<u8> = members.iter().map(|m| m.kind as u8).collect();
    buf.put_bytes(&types);
    buf.put_uvarint(members.len() as u64);
    for m in members {
        buf.put_str(&m.role);
    }
    put_tags(&mut buf, &rel.tags);
    buf.finish()
}

pub fn unmarshal_relation(data: &[u8]) -> Result<Relation> {
    let mut r = VarintReader::new(data);

    let n_ids = r.count(1)?;
    let mut ids = Vec::with_capacity(n_ids);
    for _ in 0..n_ids {
        ids.push(r.varint()?);
    }
    delta_unpack(&mut ids);

    let n_types = r.count(1)?;
    let types = r.bytes(n_types)?;

    let n_roles = r.count(1)?;
    if n_ids != n_types || n_ids != n_roles {
        return Err(CacheError::corrupt(format!(
            "relation member sequences differ in length ({n_ids} ids, {n_types} types, {n_roles} roles)"
        )));
    }

    let mut members = Vec::with_capacity(n_ids);
    for (&id, &t) in ids.iter().zip(types) {
        let kind = MemberType::from_u8(t)
            .ok_or_else(|| CacheError::corrupt(format!("unknown member type {t}")))?;
        let role = read_str(&mut r)?;
        members.push(Member::new(id, kind, role));
    }

    let tags = read_tags(&mut r)?;
    expect_end(&r, "relation")?;
    Ok(Relation {
        id: 0,
        tags,
        members,
    })
}

// ---------------------------------------------------------------------------
// Raw coordinates
// ---------------------------------------------------------------------------

/// Encode a coordinate pair as two little-endian doubles (no precision loss).
pub fn marshal_coord(long: f64, lat: f64) -> Vec<u8> {
    let mut out = Vec::with_capacity(COORD_RECORD_LEN);
    out.extend_from_slice(&long.to_le_bytes());
    out.extend_from_slice(&lat.to_le_bytes());
    out
}

pub fn unmarshal_coord(data: &[u8]) -> Result<(f64, f64)> {
    if data.len() != COORD_RECORD_LEN {
        return Err(CacheError::corrupt(format!(
            "coord record has {} bytes, expected {COORD_RECORD_LEN}",
            data.len()
        )));
    }
    let mut long = [0u8; 8];
    let mut lat = [0u8; 8];
    long.copy_from_slice(&data[..8]);
    lat.copy_from_slice(&data[8..]);
    Ok((f64::from_le_bytes(long), f64::from_le_bytes(lat)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
