// Reference bunch encoding.
//
//   u(n) s(id_delta)*n u(ref_count)*n s(ref_delta)*sum(ref_count)
//
// The ref delta chain runs across ID boundaries: the first ref of an entry is
// stored relative to the last ref of the previous entry. Existing indexes
// depend on this, so it must not be reset per ID.

use super::varint::{VarintBuf, VarintReader};
use crate::element::IdRefs;
use crate::error::{CacheError, Result};

pub fn marshal_idrefs_bunch(idrefs: &[IdRefs]) -> Vec<u8> {
    let total_refs: usize = idrefs.iter().map(|r| r.refs.len()).sum();
    let mut buf = VarintBuf::with_estimate(idrefs.len() * 5 + total_refs * 6 + 10);

    buf.put_uvarint(idrefs.len() as u64);

    let mut last_id = 0i64;
    for entry in idrefs {
        buf.put_varint(entry.id.wrapping_sub(last_id));
        last_id = entry.id;
    }
    for entry in idrefs {
        buf.put_uvarint(entry.refs.len() as u64);
    }
    let mut last_ref = 0i64;
    for entry in idrefs {
        for &r in &entry.refs {
            buf.put_varint(r.wrapping_sub(last_ref));
            last_ref = r;
        }
    }
    buf.finish()
}

pub fn unmarshal_idrefs_bunch(data: &[u8]) -> Result<Vec<IdRefs>> {
    let mut r = VarintReader::new(data);
    // id delta + ref count: at least two bytes per entry
    let n = r.count(2)?;

    let mut idrefs = Vec::with_capacity(n);
    let mut last = 0i64;
    for _ in 0..n {
        last = last.wrapping_add(r.varint()?);
        idrefs.push(IdRefs::new(last));
    }

    let mut counts = Vec::with_capacity(n);
    for _ in 0..n {
        counts.push(r.count(0)?);
    }
    let total = counts.iter().try_fold(0usize, |acc, &c| acc.checked_add(c));
    if total.is_none_or(|t| t > r.remaining()) {
        return Err(CacheError::corrupt("ref counts exceed record length"));
    }

    let mut last = 0i64;
    for (entry, count) in idrefs.iter_mut().zip(counts) {
        entry.refs.reserve_exact(count);
        for _ in 0..count {
            last = last.wrapping_add(r.varint()?);
            entry.refs.push(last);
        }
    }
    Ok(idrefs)
}
