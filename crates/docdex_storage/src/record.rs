//! Journal record framing.
//!
//! Every commit is appended to the journal as one framed record:
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | payload (N) | crc32 (4) |
//! ```
//!
//! Integers are little-endian. The CRC covers header and payload.

use crate::error::{StorageError, StorageResult};
use bytes::{Buf, BufMut, Bytes};

/// Magic bytes opening every journal record.
pub const JOURNAL_MAGIC: [u8; 4] = *b"DDXJ";

/// Current record format version.
pub const JOURNAL_VERSION: u16 = 1;

/// magic (4) + version (2) + type (1) + length (4)
pub(crate) const HEADER_SIZE: usize = 11;

pub(crate) const CRC_SIZE: usize = 4;

/// Kind of journal record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    /// A committed write transaction.
    Commit = 1,
    /// The full environment state, written by compaction.
    Snapshot = 2,
}

impl RecordType {
    /// Converts a byte to a record type.
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Commit),
            2 => Some(Self::Snapshot),
            _ => None,
        }
    }

    /// Converts the record type to a byte.
    #[must_use]
    pub const fn as_byte(self) -> u8 {
        self as u8
    }
}

/// One mutation inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeOp {
    /// Creates an empty tree.
    CreateTree {
        /// Tree name.
        tree: String,
    },
    /// Inserts or replaces a key.
    Put {
        /// Tree name.
        tree: String,
        /// Key bytes.
        key: Bytes,
        /// Value bytes.
        value: Bytes,
    },
    /// Removes a key.
    Delete {
        /// Tree name.
        tree: String,
        /// Key bytes.
        key: Bytes,
    },
}

const OP_CREATE_TREE: u8 = 1;
const OP_PUT: u8 = 2;
const OP_DELETE: u8 = 3;

/// Contents of one tree inside a snapshot record.
pub type TreeDump = (String, Vec<(Bytes, Bytes)>);

/// A decoded journal record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// A committed transaction and its ordered mutations.
    Commit {
        /// Transaction id assigned at commit.
        txid: u64,
        /// Mutations in the order they were made.
        ops: Vec<TreeOp>,
    },
    /// Complete state as of `txid`; replaces everything before it.
    Snapshot {
        /// Last transaction folded into the snapshot.
        txid: u64,
        /// Every tree with its entries in key order.
        trees: Vec<TreeDump>,
    },
}

impl JournalRecord {
    /// Returns the record type.
    #[must_use]
    pub fn record_type(&self) -> RecordType {
        match self {
            Self::Commit { .. } => RecordType::Commit,
            Self::Snapshot { .. } => RecordType::Snapshot,
        }
    }

    /// Transaction id carried by the record.
    #[must_use]
    pub fn txid(&self) -> u64 {
        match self {
            Self::Commit { txid, .. } | Self::Snapshot { txid, .. } => *txid,
        }
    }

    /// Encodes the record with its envelope, ready to append.
    ///
    /// # Errors
    ///
    /// Returns `TooLarge` if a name, key, value or the payload exceeds its
    /// length field.
    pub fn encode(&self) -> StorageResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let len = checked_u32(payload.len())?;

        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.put_slice(&JOURNAL_MAGIC);
        buf.put_u16_le(JOURNAL_VERSION);
        buf.put_u8(self.record_type().as_byte());
        buf.put_u32_le(len);
        buf.put_slice(&payload);
        let crc = compute_crc32(&buf);
        buf.put_u32_le(crc);
        Ok(buf)
    }

    fn encode_payload(&self) -> StorageResult<Vec<u8>> {
        let mut buf = Vec::new();
        match self {
            Self::Commit { txid, ops } => {
                buf.put_u64_le(*txid);
                buf.put_u32_le(checked_u32(ops.len())?);
                for op in ops {
                    match op {
                        TreeOp::CreateTree { tree } => {
                            buf.put_u8(OP_CREATE_TREE);
                            put_name(&mut buf, tree)?;
                        }
                        TreeOp::Put { tree, key, value } => {
                            buf.put_u8(OP_PUT);
                            put_name(&mut buf, tree)?;
                            put_blob(&mut buf, key)?;
                            put_blob(&mut buf, value)?;
                        }
                        TreeOp::Delete { tree, key } => {
                            buf.put_u8(OP_DELETE);
                            put_name(&mut buf, tree)?;
                            put_blob(&mut buf, key)?;
                        }
                    }
                }
            }
            Self::Snapshot { txid, trees } => {
                buf.put_u64_le(*txid);
                buf.put_u32_le(checked_u32(trees.len())?);
                for (name, entries) in trees {
                    put_name(&mut buf, name)?;
                    buf.put_u32_le(checked_u32(entries.len())?);
                    for (key, value) in entries {
                        put_blob(&mut buf, key)?;
                        put_blob(&mut buf, value)?;
                    }
                }
            }
        }
        Ok(buf)
    }

    /// Decodes a payload whose envelope has already been validated.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the payload is truncated or malformed.
    pub fn decode_payload(record_type: RecordType, mut payload: &[u8]) -> StorageResult<Self> {
        let buf = &mut payload;
        let record = match record_type {
            RecordType::Commit => {
                let txid = get_u64(buf)?;
                let count = get_u32(buf)? as usize;
                let mut ops = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    let tag = get_u8(buf)?;
                    let tree = get_name(buf)?;
                    let op = match tag {
                        OP_CREATE_TREE => TreeOp::CreateTree { tree },
                        OP_PUT => TreeOp::Put {
                            tree,
                            key: get_blob(buf)?,
                            value: get_blob(buf)?,
                        },
                        OP_DELETE => TreeOp::Delete {
                            tree,
                            key: get_blob(buf)?,
                        },
                        other => {
                            return Err(StorageError::corrupted(format!(
                                "unknown tree operation {other}"
                            )))
                        }
                    };
                    ops.push(op);
                }
                Self::Commit { txid, ops }
            }
            RecordType::Snapshot => {
                let txid = get_u64(buf)?;
                let tree_count = get_u32(buf)? as usize;
                let mut trees = Vec::with_capacity(tree_count.min(1024));
                for _ in 0..tree_count {
                    let name = get_name(buf)?;
                    let entry_count = get_u32(buf)? as usize;
                    let mut entries = Vec::with_capacity(entry_count.min(4096));
                    for _ in 0..entry_count {
                        entries.push((get_blob(buf)?, get_blob(buf)?));
                    }
                    trees.push((name, entries));
                }
                Self::Snapshot { txid, trees }
            }
        };

        if buf.has_remaining() {
            return Err(StorageError::corrupted(format!(
                "{} trailing bytes after record payload",
                buf.remaining()
            )));
        }
        Ok(record)
    }
}

fn checked_u32(len: usize) -> StorageResult<u32> {
    u32::try_from(len).map_err(|_| StorageError::TooLarge {
        len,
        max: u32::MAX as usize,
    })
}

fn put_name(buf: &mut Vec<u8>, name: &str) -> StorageResult<()> {
    let len = u16::try_from(name.len()).map_err(|_| StorageError::TooLarge {
        len: name.len(),
        max: u16::MAX as usize,
    })?;
    buf.put_u16_le(len);
    buf.put_slice(name.as_bytes());
    Ok(())
}

fn put_blob(buf: &mut Vec<u8>, blob: &[u8]) -> StorageResult<()> {
    buf.put_u32_le(checked_u32(blob.len())?);
    buf.put_slice(blob);
    Ok(())
}

fn ensure(buf: &&[u8], needed: usize) -> StorageResult<()> {
    if buf.remaining() < needed {
        return Err(StorageError::corrupted(format!(
            "truncated payload: need {needed} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn get_u8(buf: &mut &[u8]) -> StorageResult<u8> {
    ensure(buf, 1)?;
    Ok(buf.get_u8())
}

fn get_u32(buf: &mut &[u8]) -> StorageResult<u32> {
    ensure(buf, 4)?;
    Ok(buf.get_u32_le())
}

fn get_u64(buf: &mut &[u8]) -> StorageResult<u64> {
    ensure(buf, 8)?;
    Ok(buf.get_u64_le())
}

fn get_name(buf: &mut &[u8]) -> StorageResult<String> {
    ensure(buf, 2)?;
    let len = buf.get_u16_le() as usize;
    ensure(buf, len)?;
    let name = std::str::from_utf8(&buf[..len])
        .map_err(|_| StorageError::corrupted("tree name is not UTF-8"))?
        .to_owned();
    buf.advance(len);
    Ok(name)
}

fn get_blob(buf: &mut &[u8]) -> StorageResult<Bytes> {
    let len = get_u32(buf)? as usize;
    ensure(buf, len)?;
    Ok(buf.copy_to_bytes(len))
}

/// Computes the CRC-32 (IEEE) of `data`.
#[must_use]
pub fn compute_crc32(data: &[u8]) -> u32 {
    const TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut bit = 0;
            while bit < 8 {
                crc = if crc & 1 == 1 {
                    (crc >> 1) ^ 0xEDB8_8320
                } else {
                    crc >> 1
                };
                bit += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}
