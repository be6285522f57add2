// Consensus wire encoding
//
// Little-endian fixed-width integers, bitcoin-style compact varints for
// counts and byte strings.
//
// SAFETY INVARIANTS:
// 1. Decoders never read past the input and never allocate more than the
//    declared per-field maximum
// 2. `Decodable::decode` rejects trailing bytes
// 3. Varints must be minimally encoded

use namechain_crypto::Hash;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of input: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEnd { needed: usize, remaining: usize },

    #[error("{0} trailing bytes after object")]
    TrailingBytes(usize),

    #[error("non-canonical varint")]
    NonCanonicalVarint,

    #[error("{field} length {len} exceeds maximum {max}")]
    TooLong { field: &'static str, len: usize, max: usize },

    #[error("{field} length {len} below minimum {min}")]
    TooShort { field: &'static str, len: usize, min: usize },

    #[error("unknown {object} version {version}")]
    UnknownVersion { object: &'static str, version: u8 },

    #[error("unknown covenant type {0}")]
    UnknownCovenant(u8),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Append-only encoder.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { buf: Vec::with_capacity(capacity) }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_hash(&mut self, h: &Hash) {
        self.buf.extend_from_slice(h);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_varint(&mut self, v: u64) {
        match v {
            0..=0xfc => self.write_u8(v as u8),
            0xfd..=0xffff => {
                self.write_u8(0xfd);
                self.write_u16(v as u16);
            }
            0x1_0000..=0xffff_ffff => {
                self.write_u8(0xfe);
                self.write_u32(v as u32);
            }
            _ => {
                self.write_u8(0xff);
                self.write_u64(v);
            }
        }
    }

    pub fn write_var_bytes(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Bounds-checked cursor over an input slice.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::UnexpectedEnd { needed: n, remaining: self.remaining() });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash, CodecError> {
        self.read_array()
    }

    pub fn read_varint(&mut self) -> Result<u64, CodecError> {
        let prefix = self.read_u8()?;
        let (value, min) = match prefix {
            0xfd => (self.read_u16()? as u64, 0xfd),
            0xfe => (self.read_u32()? as u64, 0x1_0000),
            0xff => (self.read_u64()?, 0x1_0000_0000),
            v => return Ok(v as u64),
        };
        if value < min {
            return Err(CodecError::NonCanonicalVarint);
        }
        Ok(value)
    }

    /// Reads a varint count and checks it against `max` before allocating.
    pub fn read_count(&mut self, field: &'static str, max: usize) -> Result<usize, CodecError> {
        let n = self.read_varint()?;
        if n > max as u64 {
            return Err(CodecError::TooLong { field, len: n.min(usize::MAX as u64) as usize, max });
        }
        Ok(n as usize)
    }

    pub fn read_var_bytes(&mut self, field: &'static str, max: usize) -> Result<Vec<u8>, CodecError> {
        let n = self.read_count(field, max)?;
        Ok(self.read_bytes(n)?.to_vec())
    }

    pub fn finish(&self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(CodecError::TrailingBytes(n)),
        }
    }
}

/// Shared encode capability for consensus objects.
pub trait Encodable {
    fn encode_into(&self, w: &mut Writer);

    fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        self.encode_into(&mut w);
        w.into_inner()
    }
}

/// Shared decode capability for consensus objects.
pub trait Decodable: Sized {
    fn decode_from(r: &mut Reader<'_>) -> Result<Self, CodecError>;

    /// Decodes a complete object; trailing bytes are an error.
    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let value = Self::decode_from(&mut r)?;
        r.finish()?;
        Ok(value)
    }
}
