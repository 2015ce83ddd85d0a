//! One-block codec: a contiguous run of column values to/from compact bytes.
//!
//! Encoding is chosen per run: delta-of-zigzag varints for all-int runs, raw
//! little-endian bits for all-float runs, length-prefixed UTF-8 for all-string
//! runs, and a per-value tagged encoding for anything mixed or nullable.
//!
//! Decoding is a suspend/resume state machine: the cursor and the running
//! delta accumulator live in `DecodeProgress`, never on the call stack, so a
//! block can be consumed across many `fill`/`skip` calls and torn down
//! cleanly mid-decode via `terminate`.

use serde::{Deserialize, Serialize};

use quarry_core::error::{Error, Result};
use quarry_core::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EncodingKind {
    /// Per-value tag byte + payload. Handles nulls and mixed runs.
    General = 0,
    /// Zigzag varint of the first value, then zigzag varint deltas.
    IntDelta = 1,
    /// Raw little-endian f64 bits, 8 bytes per element.
    FloatPlain = 2,
    /// Varint byte length + UTF-8 bytes per element.
    StrPlain = 3,
}

impl EncodingKind {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(EncodingKind::General),
            1 => Ok(EncodingKind::IntDelta),
            2 => Ok(EncodingKind::FloatPlain),
            3 => Ok(EncodingKind::StrPlain),
            other => Err(Error::Decode(format!("unknown encoding tag {other}"))),
        }
    }
}

/// Per-block header: everything needed to decode (or skip) the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub element_count: u64,
    pub encoding: EncodingKind,
    pub byte_length: u64,
}

impl Default for BlockInfo {
    fn default() -> Self {
        Self {
            element_count: 0,
            encoding: EncodingKind::General,
            byte_length: 0,
        }
    }
}

// ---- varint / zigzag helpers ----

fn write_varint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

fn read_varint(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let mut v: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *bytes
            .get(*pos)
            .ok_or_else(|| Error::Decode("truncated varint".to_string()))?;
        *pos += 1;
        v |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(v);
        }
        shift += 7;
        if shift >= 64 {
            return Err(Error::Decode("varint overflow".to_string()));
        }
    }
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

// ---- encoding ----

fn pick_encoding(values: &[Value]) -> EncodingKind {
    if values.is_empty() {
        return EncodingKind::General;
    }
    if values.iter().all(|v| matches!(v, Value::Int(_))) {
        EncodingKind::IntDelta
    } else if values.iter().all(|v| matches!(v, Value::Float(_))) {
        EncodingKind::FloatPlain
    } else if values.iter().all(|v| matches!(v, Value::Str(_))) {
        EncodingKind::StrPlain
    } else {
        EncodingKind::General
    }
}

// Per-value tags for the general encoding.
const TAG_NULL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STR: u8 = 3;

/// Encode one run of values, filling `info_out` with the header fields.
pub fn encode(values: &[Value], info_out: &mut BlockInfo) -> Vec<u8> {
    let encoding = pick_encoding(values);
    let mut out = Vec::with_capacity(values.len() * 4);

    match encoding {
        EncodingKind::IntDelta => {
            let mut prev = 0i64;
            for (i, v) in values.iter().enumerate() {
                let v = match v {
                    Value::Int(v) => *v,
                    _ => unreachable!("pick_encoding guarantees all-int"),
                };
                if i == 0 {
                    write_varint(&mut out, zigzag(v));
                } else {
                    write_varint(&mut out, zigzag(v.wrapping_sub(prev)));
                }
                prev = v;
            }
        }
        EncodingKind::FloatPlain => {
            for v in values {
                let f = match v {
                    Value::Float(f) => *f,
                    _ => unreachable!("pick_encoding guarantees all-float"),
                };
                out.extend_from_slice(&f.to_bits().to_le_bytes());
            }
        }
        EncodingKind::StrPlain => {
            for v in values {
                let s = match v {
                    Value::Str(s) => s.as_str(),
                    _ => unreachable!("pick_encoding guarantees all-str"),
                };
                write_varint(&mut out, s.len() as u64);
                out.extend_from_slice(s.as_bytes());
            }
        }
        EncodingKind::General => {
            for v in values {
                match v {
                    Value::Null => out.push(TAG_NULL),
                    Value::Int(i) => {
                        out.push(TAG_INT);
                        write_varint(&mut out, zigzag(*i));
                    }
                    Value::Float(f) => {
                        out.push(TAG_FLOAT);
                        out.extend_from_slice(&f.to_bits().to_le_bytes());
                    }
                    Value::Str(s) => {
                        out.push(TAG_STR);
                        write_varint(&mut out, s.len() as u64);
                        out.extend_from_slice(s.as_bytes());
                    }
                }
            }
        }
    }

    info_out.element_count = values.len() as u64;
    info_out.encoding = encoding;
    info_out.byte_length = out.len() as u64;
    out
}

// ---- decoding state machine ----

/// Where a suspended decode resumes: the resumption tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResumeTag {
    /// No element decoded yet (delta decode reads an absolute value here).
    Start,
    /// Mid-block; `prev_int` carries the running delta accumulator.
    Mid,
    /// Finished or explicitly terminated; produces nothing further.
    Done,
}

/// Loop-carried decode state. Lives in fields, never on the call stack.
#[derive(Debug, Clone)]
pub(crate) struct DecodeProgress {
    pub pos: usize,
    pub produced: u64,
    pub prev_int: i64,
    pub tag: ResumeTag,
}

impl DecodeProgress {
    pub(crate) fn new() -> Self {
        Self {
            pos: 0,
            produced: 0,
            prev_int: 0,
            tag: ResumeTag::Start,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.tag == ResumeTag::Done
    }
}

fn read_f64(bytes: &[u8], pos: &mut usize) -> Result<f64> {
    let end = *pos + 8;
    let slice = bytes
        .get(*pos..end)
        .ok_or_else(|| Error::Decode("truncated float payload".to_string()))?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    *pos = end;
    Ok(f64::from_bits(u64::from_le_bytes(buf)))
}

fn read_str(bytes: &[u8], pos: &mut usize) -> Result<String> {
    let len = read_varint(bytes, pos)? as usize;
    // The length prefix is untrusted; the sum must not wrap.
    let end = pos
        .checked_add(len)
        .ok_or_else(|| Error::Decode("truncated string payload".to_string()))?;
    let slice = bytes
        .get(*pos..end)
        .ok_or_else(|| Error::Decode("truncated string payload".to_string()))?;
    let s = std::str::from_utf8(slice)
        .map_err(|e| Error::Decode(format!("invalid utf-8 in block: {e}")))?;
    *pos = end;
    Ok(s.to_string())
}

/// Decode the next element, advancing `progress`. `Ok(None)` at end-of-block.
pub(crate) fn decode_step(
    info: &BlockInfo,
    bytes: &[u8],
    progress: &mut DecodeProgress,
) -> Result<Option<Value>> {
    if progress.is_done() {
        return Ok(None);
    }
    if progress.produced >= info.element_count {
        progress.tag = ResumeTag::Done;
        return Ok(None);
    }

    let value = match info.encoding {
        EncodingKind::IntDelta => {
            let raw = read_varint(bytes, &mut progress.pos)?;
            let v = match progress.tag {
                ResumeTag::Start => unzigzag(raw),
                _ => progress.prev_int.wrapping_add(unzigzag(raw)),
            };
            progress.prev_int = v;
            Value::Int(v)
        }
        EncodingKind::FloatPlain => Value::Float(read_f64(bytes, &mut progress.pos)?),
        EncodingKind::StrPlain => Value::Str(read_str(bytes, &mut progress.pos)?),
        EncodingKind::General => {
            let tag = *bytes
                .get(progress.pos)
                .ok_or_else(|| Error::Decode("truncated value tag".to_string()))?;
            progress.pos += 1;
            match tag {
                TAG_NULL => Value::Null,
                TAG_INT => Value::Int(unzigzag(read_varint(bytes, &mut progress.pos)?)),
                TAG_FLOAT => Value::Float(read_f64(bytes, &mut progress.pos)?),
                TAG_STR => Value::Str(read_str(bytes, &mut progress.pos)?),
                other => {
                    return Err(Error::Decode(format!("unknown value tag {other}")));
                }
            }
        }
    };

    progress.produced += 1;
    progress.tag = if progress.produced >= info.element_count {
        ResumeTag::Done
    } else {
        ResumeTag::Mid
    };
    Ok(Some(value))
}

/// Advance past one element without materializing it.
pub(crate) fn skip_step(
    info: &BlockInfo,
    bytes: &[u8],
    progress: &mut DecodeProgress,
) -> Result<bool> {
    if progress.is_done() || progress.produced >= info.element_count {
        progress.tag = ResumeTag::Done;
        return Ok(false);
    }

    match info.encoding {
        // Delta decode must still track the accumulator while skipping.
        EncodingKind::IntDelta => {
            let raw = read_varint(bytes, &mut progress.pos)?;
            progress.prev_int = match progress.tag {
                ResumeTag::Start => unzigzag(raw),
                _ => progress.prev_int.wrapping_add(unzigzag(raw)),
            };
        }
        EncodingKind::FloatPlain => {
            if progress.pos + 8 > bytes.len() {
                return Err(Error::Decode("truncated float payload".to_string()));
            }
            progress.pos += 8;
        }
        EncodingKind::StrPlain => {
            let len = read_varint(bytes, &mut progress.pos)? as usize;
            progress.pos = progress
                .pos
                .checked_add(len)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| Error::Decode("truncated string payload".to_string()))?;
        }
        EncodingKind::General => {
            let tag = *bytes
                .get(progress.pos)
                .ok_or_else(|| Error::Decode("truncated value tag".to_string()))?;
            progress.pos += 1;
            match tag {
                TAG_NULL => {}
                TAG_INT => {
                    read_varint(bytes, &mut progress.pos)?;
                }
                TAG_FLOAT => {
                    if progress.pos + 8 > bytes.len() {
                        return Err(Error::Decode("truncated float payload".to_string()));
                    }
                    progress.pos += 8;
                }
                TAG_STR => {
                    let len = read_varint(bytes, &mut progress.pos)? as usize;
                    progress.pos = progress
                        .pos
                        .checked_add(len)
                        .filter(|end| *end <= bytes.len())
                        .ok_or_else(|| {
                            Error::Decode("truncated string payload".to_string())
                        })?;
                }
                other => {
                    return Err(Error::Decode(format!("unknown value tag {other}")));
                }
            }
        }
    }

    progress.produced += 1;
    progress.tag = if progress.produced >= info.element_count {
        ResumeTag::Done
    } else {
        ResumeTag::Mid
    };
    Ok(true)
}

/// Restartable decoder over a borrowed payload.
pub struct DecodeHandle<'a> {
    info: BlockInfo,
    bytes: &'a [u8],
    progress: DecodeProgress,
}

impl<'a> DecodeHandle<'a> {
    /// Elements not yet produced or skipped.
    pub fn remaining(&self) -> u64 {
        if self.progress.is_done() {
            0
        } else {
            self.info.element_count - self.progress.produced
        }
    }

    pub fn is_done(&self) -> bool {
        self.progress.is_done()
    }

    /// Decode up to `n` elements into `out`. Returns the count actually
    /// produced, short of `n` only at end-of-block.
    pub fn fill(&mut self, out: &mut Vec<Value>, n: usize) -> Result<usize> {
        let mut produced = 0;
        while produced < n {
            match decode_step(&self.info, self.bytes, &mut self.progress)? {
                Some(v) => {
                    out.push(v);
                    produced += 1;
                }
                None => break,
            }
        }
        Ok(produced)
    }

    /// Advance past up to `n` elements. Returns the count actually skipped.
    pub fn skip(&mut self, n: usize) -> Result<usize> {
        let mut skipped = 0;
        while skipped < n {
            if !skip_step(&self.info, self.bytes, &mut self.progress)? {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Explicit unwind: the state machine stops producing and releases its
    /// view of the payload. Used when a consumer abandons a block early.
    pub fn terminate(&mut self) {
        self.progress.tag = ResumeTag::Done;
        self.bytes = &[];
    }
}

/// Begin a restartable decode of `bytes` described by `info`.
pub fn decode_range<'a>(info: &BlockInfo, bytes: &'a [u8]) -> DecodeHandle<'a> {
    DecodeHandle {
        info: *info,
        bytes,
        progress: DecodeProgress::new(),
    }
}

/// Decode a whole block in one shot.
pub fn decode(info: &BlockInfo, bytes: &[u8]) -> Result<Vec<Value>> {
    let mut handle = decode_range(info, bytes);
    let mut out = Vec::with_capacity(info.element_count as usize);
    let produced = handle.fill(&mut out, info.element_count as usize)?;
    if produced as u64 != info.element_count {
        return Err(Error::Decode(format!(
            "block produced {produced} of {} elements",
            info.element_count
        )));
    }
    Ok(out)
}
