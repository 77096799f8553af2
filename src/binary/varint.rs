// Variable-length integer encoding shared by every cache record format.
//
// Base-128, little-endian: least-significant group first. Each byte has
// bit 7 set except the final byte. Signed values are zig-zag mapped onto
// unsigned ones before encoding so small negative deltas stay short.

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a `u64` into `buf`, returning the number of bytes written (1..=10).
///
/// # Panics
/// If `buf` is shorter than the encoded length.
#[inline]
pub fn put_uvarint(buf: &mut [u8], mut num: u64) -> usize {
    let mut i = 0;
    while num >= 0x80 {
        buf[i] = num as u8 | 0x80;
        num >>= 7;
        i += 1;
    }
    buf[i] = num as u8;
    i + 1
}

/// Encode an `i64` into `buf`, returning the number of bytes written (1..=10).
///
/// # Panics
/// If `buf` is shorter than the encoded length.
#[inline]
pub fn put_varint(buf: &mut [u8], num: i64) -> usize {
    put_uvarint(buf, zigzag(num))
}

/// Append a `u64` varint to a `Vec`.
pub fn write_uvarint(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = put_uvarint(&mut buf, num);
    out.extend_from_slice(&buf[..len]);
}

/// Append an `i64` varint to a `Vec`.
pub fn write_varint(out: &mut Vec<u8>, num: i64) {
    write_uvarint(out, zigzag(num))
}

#[inline]
fn zigzag(num: i64) -> u64 {
    ((num << 1) ^ (num >> 63)) as u64
}

#[inline]
fn unzigzag(num: u64) -> i64 {
    ((num >> 1) as i64) ^ -((num & 1) as i64)
}

// ---------------------------------------------------------------------------
// Decoding from byte slices
// ---------------------------------------------------------------------------

/// Decode a `u64` from the start of `data`.
/// Returns `(value, bytes_consumed)` or an error.
pub fn read_uvarint(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        if i == MAX_VARINT_LEN {
            return Err(VarIntError::Overflow);
        }
        if byte < 0x80 {
            // The tenth byte may only carry the single remaining bit.
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                return Err(VarIntError::Overflow);
            }
            return Ok((val | u64::from(byte) << shift, i + 1));
        }
        val |= u64::from(byte & 0x7F) << shift;
        shift += 7;
    }
    Err(VarIntError::Truncated)
}

/// Decode an `i64` from the start of `data`.
pub fn read_varint(data: &[u8]) -> Result<(i64, usize), VarIntError> {
    let (val, len) = read_uvarint(data)?;
    Ok((unzigzag(val), len))
}

/// Return the encoded byte-length of a `u64` value.
#[inline]
pub fn sizeof_uvarint(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    bits.max(1).div_ceil(7) as usize
}

// ---------------------------------------------------------------------------
// Delta coding
// ---------------------------------------------------------------------------

/// Replace `data` in place with `[v0, v1-v0, v2-v1, ...]`.
///
/// Differences wrap, so every `i64` sequence survives a pack/unpack cycle.
pub fn delta_pack(data: &mut [i64]) {
    if data.len() < 2 {
        return;
    }
    let mut last = data[0];
    for v in data.iter_mut().skip(1) {
        let cur = *v;
        *v = cur.wrapping_sub(last);
        last = cur;
    }
}

/// Inverse of [`delta_pack`].
pub fn delta_unpack(data: &mut [i64]) {
    if data.len() < 2 {
        return;
    }
    for i in 1..data.len() {
        data[i] = data[i].wrapping_add(data[i - 1]);
    }
}

// ---------------------------------------------------------------------------
// Growable output buffer
// ---------------------------------------------------------------------------

/// Output buffer for varint streams.
///
/// Starts at an estimated size and grows by 1.5x whenever less than
/// `MAX_VARINT_LEN` bytes of slack remain, so values are written straight
/// into the backing storage without a per-value reallocation check.
#[derive(Debug, Default)]
pub struct VarintBuf {
    buf: Vec<u8>,
    pos: usize,
}

impl VarintBuf {
    /// Create a buffer with room for `estimated` bytes.
    pub fn with_estimate(estimated: usize) -> Self {
        Self::reuse(Vec::new(), estimated)
    }

    /// Reuse an existing allocation; previous contents are discarded.
    pub fn reuse(mut buf: Vec<u8>, estimated: usize) -> Self {
        let size = estimated.max(MAX_VARINT_LEN);
        buf.clear();
        buf.resize(size, 0);
        Self { buf, pos: 0 }
    }

    #[inline]
    fn reserve_slack(&mut self) {
        if self.buf.len() - self.pos < MAX_VARINT_LEN {
            let grown = (self.buf.len() * 3 / 2).max(self.pos + MAX_VARINT_LEN);
            self.buf.resize(grown, 0);
        }
    }

    #[inline]
    pub fn put_uvarint(&mut self, num: u64) {
        self.reserve_slack();
        self.pos += put_uvarint(&mut self.buf[self.pos..], num);
    }

    #[inline]
    pub fn put_varint(&mut self, num: i64) {
        self.reserve_slack();
        self.pos += put_varint(&mut self.buf[self.pos..], num);
    }

    /// Append raw bytes.
    pub fn put_bytes(&mut self, data: &[u8]) {
        if self.buf.len() - self.pos < data.len() + MAX_VARINT_LEN {
            let grown = (self.buf.len() * 3 / 2).max(self.pos + data.len() + MAX_VARINT_LEN);
            self.buf.resize(grown, 0);
        }
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn put_str(&mut self, s: &str) {
        self.put_uvarint(s.len() as u64);
        self.put_bytes(s.as_bytes());
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.pos == 0
    }

    /// Current backing allocation size (for growth diagnostics).
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Truncate to the written bytes and return them.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf.truncate(self.pos);
        self.buf
    }
}

// ---------------------------------------------------------------------------
// Byte reader
// ---------------------------------------------------------------------------

/// Cursor over an encoded record.
#[derive(Debug, Clone)]
pub struct VarintReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> VarintReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn uvarint(&mut self) -> Result<u64, VarIntError> {
        let (val, len) = read_uvarint(&self.data[self.pos..])?;
        self.pos += len;
        Ok(val)
    }

    pub fn varint(&mut self) -> Result<i64, VarIntError> {
        let (val, len) = read_varint(&self.data[self.pos..])?;
        self.pos += len;
        Ok(val)
    }

    /// Read a length that must fit into the remaining input, assuming every
    /// counted item takes at least `min_item_len` bytes.
    ///
    /// Guards allocations against corrupt counts.
    pub fn count(&mut self, min_item_len: usize) -> Result<usize, VarIntError> {
        let n = self.uvarint()?;
        let n = usize::try_from(n).map_err(|_| VarIntError::Overflow)?;
        if n.saturating_mul(min_item_len) > self.remaining() {
            return Err(VarIntError::Truncated);
        }
        Ok(n)
    }

    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], VarIntError> {
        if len > self.remaining() {
            return Err(VarIntError::Truncated);
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Input ended before a terminating byte.
    Truncated,
    /// More than ten bytes, or a value above `u64::MAX`.
    Overflow,
}

impl std::fmt::Display for VarIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarIntError::Truncated => write!(f, "malformed varint (truncated input)"),
            VarIntError::Overflow => write!(f, "varint overflow"),
        }
    }
}

impl std::error::Error for VarIntError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
