// Log record layout for the append-only store plus checksum and torn-tail detection.
use sha2::{Digest, Sha256};

use crate::core::error::{Error, ErrorKind};

pub const RECORD_MAGIC: [u8; 4] = *b"TBL1";
pub const RECORD_HEADER_LEN: usize = 32;
pub const MAX_PART_LEN: usize = 64 * 1024 * 1024;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RecordKind {
    Put = 1,
    Remove = 2,
}

impl RecordKind {
    fn from_u32(value: u32) -> Result<Self, Error> {
        match value {
            1 => Ok(RecordKind::Put),
            2 => Ok(RecordKind::Remove),
            _ => Err(Error::new(ErrorKind::Corrupt).with_message("invalid record kind")),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RecordHeader {
    pub kind: RecordKind,
    pub key_len: u32,
    pub value_len: u32,
    pub len_xor: u32,
    pub checksum: u64,
}

impl RecordHeader {
    pub fn new(kind: RecordKind, key: &[u8], value: &[u8]) -> Result<Self, Error> {
        if key.len() > MAX_PART_LEN || value.len() > MAX_PART_LEN {
            return Err(Error::new(ErrorKind::Usage).with_message("record exceeds max part length"));
        }
        let key_len = key.len() as u32;
        let value_len = value.len() as u32;
        Ok(Self {
            kind,
            key_len,
            value_len,
            len_xor: (key_len ^ value_len) ^ 0xFFFF_FFFF,
            checksum: checksum(kind, key, value),
        })
    }

    pub fn encode(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        buf[0..4].copy_from_slice(&RECORD_MAGIC);
        write_u32(&mut buf, 4, self.kind as u32);
        write_u32(&mut buf, 8, self.key_len);
        write_u32(&mut buf, 12, self.value_len);
        write_u32(&mut buf, 16, self.len_xor);
        write_u64(&mut buf, 24, self.checksum);
        buf
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < RECORD_HEADER_LEN {
            return Err(Error::new(ErrorKind::Corrupt).with_message("record header too small"));
        }
        if buf[0..4] != RECORD_MAGIC {
            return Err(Error::new(ErrorKind::Corrupt).with_message("bad record magic"));
        }
        let header = Self {
            kind: RecordKind::from_u32(read_u32(buf, 4))?,
            key_len: read_u32(buf, 8),
            value_len: read_u32(buf, 12),
            len_xor: read_u32(buf, 16),
            checksum: read_u64(buf, 24),
        };
        header.validate()?;
        Ok(header)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.key_len ^ self.value_len ^ self.len_xor != 0xFFFF_FFFF {
            return Err(Error::new(ErrorKind::Corrupt).with_message("record length xor mismatch"));
        }
        if self.key_len as usize > MAX_PART_LEN || self.value_len as usize > MAX_PART_LEN {
            return Err(Error::new(ErrorKind::Corrupt).with_message("record length exceeds max"));
        }
        Ok(())
    }

    pub fn body_len(&self) -> usize {
        self.key_len as usize + self.value_len as usize
    }
}

#[derive(Debug, PartialEq)]
pub enum ReadRecord<'a> {
    Record {
        kind: RecordKind,
        key: &'a [u8],
        value: &'a [u8],
        next_off: usize,
    },
    /// Trailing bytes too short to hold the record they announce.
    Torn,
}

pub fn encode_record(kind: RecordKind, key: &[u8], value: &[u8]) -> Result<Vec<u8>, Error> {
    let header = RecordHeader::new(kind, key, value)?;
    let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + header.body_len());
    buf.extend_from_slice(&header.encode());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    Ok(buf)
}

pub fn read_record_at(buf: &[u8], offset: usize) -> Result<ReadRecord<'_>, Error> {
    let Some(rest) = buf.get(offset..) else {
        return Ok(ReadRecord::Torn);
    };
    if rest.len() < RECORD_HEADER_LEN {
        return Ok(ReadRecord::Torn);
    }
    let header = RecordHeader::decode(&rest[..RECORD_HEADER_LEN])
        .map_err(|err| err.with_position(offset))?;
    let body_end = RECORD_HEADER_LEN + header.body_len();
    if rest.len() < body_end {
        return Ok(ReadRecord::Torn);
    }

    let key_end = RECORD_HEADER_LEN + header.key_len as usize;
    let key = &rest[RECORD_HEADER_LEN..key_end];
    let value = &rest[key_end..body_end];
    if checksum(header.kind, key, value) != header.checksum {
        return Err(Error::new(ErrorKind::Corrupt)
            .with_message("record checksum mismatch")
            .with_position(offset));
    }

    Ok(ReadRecord::Record {
        kind: header.kind,
        key,
        value,
        next_off: offset + body_end,
    })
}

fn checksum(kind: RecordKind, key: &[u8], value: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update([kind as u8]);
    hasher.update((key.len() as u32).to_le_bytes());
    hasher.update(key);
    hasher.update(value);
    let digest = hasher.finalize();
    u64::from_le_bytes(read_8(&digest, 0))
}

fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(read_4(buf, offset))
}

fn read_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(read_8(buf, offset))
}

fn read_4(buf: &[u8], offset: usize) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(&buf[offset..offset + 4]);
    out
}

fn read_8(buf: &[u8], offset: usize) -> [u8; 8] {
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf[offset..offset + 8]);
    out
}

fn write_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn write_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}
