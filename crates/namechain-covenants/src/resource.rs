// Resource records
//
// The data a name owner publishes with REGISTER and UPDATE: a version byte
// followed by typed records. DNS names inside records are written in wire
// form with compression pointers relative to the start of the resource.
//
// SAFETY INVARIANTS:
// 1. A serialized resource never exceeds MAX_RESOURCE_SIZE
// 2. Compression pointers must point strictly backwards, so name decoding
//    always terminates
// 3. Decoding stops at the first unknown record type and reports it in
//    `Resource::unknown`; records after it are not interpreted

use namechain_core::covenant::MAX_RESOURCE_SIZE;
use namechain_core::{CodecError, Reader, Writer};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;

pub const RESOURCE_VERSION: u8 = 0;
pub const DEFAULT_TTL: u32 = 21_600;
const MAX_LABEL_SIZE: usize = 63;
const MAX_DNS_NAME_SIZE: usize = 255;
const MAX_POINTER_JUMPS: usize = 16;
const POINTER_LIMIT: usize = 0x3fff;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("unknown resource version {0}")]
    UnknownVersion(u8),

    #[error("resource is {0} bytes, limit is 512")]
    TooLarge(usize),

    #[error("invalid dns name: {0}")]
    BadName(String),

    #[error("bad compression pointer at offset {0}")]
    BadPointer(usize),

    #[error("txt entry longer than 255 bytes")]
    TxtTooLong,

    #[error("more than 255 txt entries")]
    TooManyTxt,

    #[error("txt entry is not valid utf-8")]
    BadTxt,

    #[error("ds digest longer than 255 bytes")]
    DigestTooLong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RecordType {
    Ds = 0,
    Ns = 1,
    Glue4 = 2,
    Glue6 = 3,
    Synth4 = 4,
    Synth6 = 5,
    Txt = 6,
}

impl RecordType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Ds,
            1 => Self::Ns,
            2 => Self::Glue4,
            3 => Self::Glue6,
            4 => Self::Synth4,
            5 => Self::Synth6,
            6 => Self::Txt,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    Ds { key_tag: u16, algorithm: u8, digest_type: u8, digest: Vec<u8> },
    Ns { ns: String },
    Glue4 { ns: String, address: Ipv4Addr },
    Glue6 { ns: String, address: Ipv6Addr },
    Synth4 { address: Ipv4Addr },
    Synth6 { address: Ipv6Addr },
    Txt { txt: Vec<String> },
}

/// Where decoding stopped on an unrecognised record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnknownRecord {
    pub tag: u8,
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub ttl: u32,
    pub records: Vec<Record>,
    pub unknown: Option<UnknownRecord>,
}

impl Default for Resource {
    fn default() -> Self {
        Self { ttl: DEFAULT_TTL, records: Vec::new(), unknown: None }
    }
}

impl Record {
    pub fn record_type(&self) -> RecordType {
        match self {
            Record::Ds { .. } => RecordType::Ds,
            Record::Ns { .. } => RecordType::Ns,
            Record::Glue4 { .. } => RecordType::Glue4,
            Record::Glue6 { .. } => RecordType::Glue6,
            Record::Synth4 { .. } => RecordType::Synth4,
            Record::Synth6 { .. } => RecordType::Synth6,
            Record::Txt { .. } => RecordType::Txt,
        }
    }

    fn encode_body(&self, w: &mut Writer, names: &mut NameTable) -> Result<(), ResourceError> {
        match self {
            Record::Ds { key_tag, algorithm, digest_type, digest } => {
                w.write_bytes(&key_tag.to_be_bytes());
                w.write_u8(*algorithm);
                w.write_u8(*digest_type);
                let len = u8::try_from(digest.len()).map_err(|_| ResourceError::DigestTooLong)?;
                w.write_u8(len);
                w.write_bytes(digest);
            }
            Record::Ns { ns } => names.write(w, ns)?,
            Record::Glue4 { ns, address } => {
                names.write(w, ns)?;
                w.write_bytes(&address.octets());
            }
            Record::Glue6 { ns, address } => {
                names.write(w, ns)?;
                w.write_bytes(&address.octets());
            }
            Record::Synth4 { address } => w.write_bytes(&address.octets()),
            Record::Synth6 { address } => w.write_bytes(&address.octets()),
            Record::Txt { txt } => {
                let count = u8::try_from(txt.len()).map_err(|_| ResourceError::TooManyTxt)?;
                w.write_u8(count);
                for entry in txt {
                    let len = u8::try_from(entry.len()).map_err(|_| ResourceError::TxtTooLong)?;
                    w.write_u8(len);
                    w.write_bytes(entry.as_bytes());
                }
            }
        }
        Ok(())
    }

    fn decode_body(ty: RecordType, r: &mut Reader<'_>, data: &[u8]) -> Result<Self, ResourceError> {
        Ok(match ty {
            RecordType::Ds => {
                let tag = r.read_bytes(2)?;
                let key_tag = u16::from_be_bytes([tag[0], tag[1]]);
                let algorithm = r.read_u8()?;
                let digest_type = r.read_u8()?;
                let len = r.read_u8()? as usize;
                let digest = r.read_bytes(len)?.to_vec();
                Record::Ds { key_tag, algorithm, digest_type, digest }
            }
            RecordType::Ns => Record::Ns { ns: read_name(r, data)? },
            RecordType::Glue4 => Record::Glue4 { ns: read_name(r, data)?, address: read_ipv4(r)? },
            RecordType::Glue6 => Record::Glue6 { ns: read_name(r, data)?, address: read_ipv6(r)? },
            RecordType::Synth4 => Record::Synth4 { address: read_ipv4(r)? },
            RecordType::Synth6 => Record::Synth6 { address: read_ipv6(r)? },
            RecordType::Txt => {
                let count = r.read_u8()? as usize;
                let mut txt = Vec::with_capacity(count);
                for _ in 0..count {
                    let len = r.read_u8()? as usize;
                    let entry = std::str::from_utf8(r.read_bytes(len)?).map_err(|_| ResourceError::BadTxt)?;
                    txt.push(entry.to_string());
                }
                Record::Txt { txt }
            }
        })
    }
}

impl Resource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records, ..Self::default() }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ResourceError> {
        let mut w = Writer::new();
        let mut names = NameTable::default();
        w.write_u8(RESOURCE_VERSION);
        for record in &self.records {
            w.write_u8(record.record_type() as u8);
            record.encode_body(&mut w, &mut names)?;
        }
        if w.len() > MAX_RESOURCE_SIZE {
            return Err(ResourceError::TooLarge(w.len()));
        }
        Ok(w.into_inner())
    }

    pub fn decode(data: &[u8]) -> Result<Self, ResourceError> {
        if data.len() > MAX_RESOURCE_SIZE {
            return Err(ResourceError::TooLarge(data.len()));
        }
        let mut r = Reader::new(data);
        let version = r.read_u8()?;
        if version != RESOURCE_VERSION {
            return Err(ResourceError::UnknownVersion(version));
        }
        let mut resource = Resource::default();
        while r.remaining() > 0 {
            let offset = r.position();
            let tag = r.read_u8()?;
            match RecordType::from_u8(tag) {
                Some(ty) => resource.records.push(Record::decode_body(ty, &mut r, data)?),
                None => {
                    resource.unknown = Some(UnknownRecord { tag, offset });
                    break;
                }
            }
        }
        Ok(resource)
    }
}

/// Suffix -> offset table for name compression.
#[derive(Default)]
struct NameTable {
    offsets: HashMap<String, usize>,
}

impl NameTable {
    fn write(&mut self, w: &mut Writer, name: &str) -> Result<(), ResourceError> {
        let labels = split_name(name)?;
        for i in 0..labels.len() {
            let suffix = labels[i..].join(".").to_ascii_lowercase();
            if let Some(&offset) = self.offsets.get(&suffix) {
                w.write_u8(0xc0 | (offset >> 8) as u8);
                w.write_u8(offset as u8);
                return Ok(());
            }
            if w.len() <= POINTER_LIMIT {
                self.offsets.insert(suffix, w.len());
            }
            w.write_u8(labels[i].len() as u8);
            w.write_bytes(labels[i].as_bytes());
        }
        w.write_u8(0);
        Ok(())
    }
}

fn split_name(name: &str) -> Result<Vec<&str>, ResourceError> {
    let trimmed = name.strip_suffix('.').unwrap_or(name);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    if trimmed.len() + 2 > MAX_DNS_NAME_SIZE {
        return Err(ResourceError::BadName(name.to_string()));
    }
    let labels: Vec<&str> = trimmed.split('.').collect();
    if labels.iter().any(|l| l.is_empty() || l.len() > MAX_LABEL_SIZE || !l.is_ascii()) {
        return Err(ResourceError::BadName(name.to_string()));
    }
    Ok(labels)
}

fn read_name(r: &mut Reader<'_>, data: &[u8]) -> Result<String, ResourceError> {
    let start = r.position();
    let mut pos = start;
    let mut end = None;
    let mut jumps = 0;
    let mut size = 0;
    let mut labels: Vec<String> = Vec::new();

    loop {
        let len = *data.get(pos).ok_or(CodecError::UnexpectedEnd { needed: 1, remaining: 0 })? as usize;
        if len == 0 {
            if end.is_none() {
                end = Some(pos + 1);
            }
            break;
        }
        if len & 0xc0 == 0xc0 {
            let low = *data.get(pos + 1).ok_or(CodecError::UnexpectedEnd { needed: 1, remaining: 0 })? as usize;
            let target = ((len & 0x3f) << 8) | low;
            jumps += 1;
            if target >= pos || jumps > MAX_POINTER_JUMPS {
                return Err(ResourceError::BadPointer(pos));
            }
            if end.is_none() {
                end = Some(pos + 2);
            }
            pos = target;
            continue;
        }
        if len > MAX_LABEL_SIZE {
            return Err(ResourceError::BadName(format!("label of {} bytes", len)));
        }
        let label = data
            .get(pos + 1..pos + 1 + len)
            .ok_or(CodecError::UnexpectedEnd { needed: len, remaining: data.len().saturating_sub(pos + 1) })?;
        size += len + 1;
        if size + 1 > MAX_DNS_NAME_SIZE {
            return Err(ResourceError::BadName("name exceeds 255 bytes".into()));
        }
        labels.push(String::from_utf8_lossy(label).into_owned());
        pos += 1 + len;
    }

    let end = end.unwrap_or(pos);
    r.read_bytes(end - start)?;
    let mut name = labels.join(".");
    name.push('.');
    Ok(name)
}

fn read_ipv4(r: &mut Reader<'_>) -> Result<Ipv4Addr, ResourceError> {
    let b = r.read_bytes(4)?;
    Ok(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
}

fn read_ipv6(r: &mut Reader<'_>) -> Result<Ipv6Addr, ResourceError> {
    let mut octets = [0u8; 16];
    octets.copy_from_slice(r.read_bytes(16)?);
    Ok(Ipv6Addr::from(octets))
}
