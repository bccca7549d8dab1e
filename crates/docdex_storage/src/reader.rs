//! Streaming replay of journal records.
//!
//! ## Recovery policy
//!
//! A record that is cut short (incomplete header or payload) is the
//! signature of a crash in the middle of an append. It is treated as the
//! clean end of the journal and reported through [`JournalReader::torn_at`]
//! so the environment can cut it off before appending again.
//!
//! Everything else that does not decode is fatal: bad magic, a future
//! version, an unknown record type and a CRC mismatch all fail the open.
//! No heuristic repair is attempted.

use crate::error::{StorageError, StorageResult};
use crate::journal::Journal;
use crate::record::{
    compute_crc32, JournalRecord, RecordType, CRC_SIZE, HEADER_SIZE, JOURNAL_MAGIC,
    JOURNAL_VERSION,
};

/// Reads framed records one at a time from a journal.
pub struct JournalReader<'a> {
    journal: &'a dyn Journal,
    size: u64,
    offset: u64,
    torn_at: Option<u64>,
    finished: bool,
}

impl<'a> JournalReader<'a> {
    /// Creates a reader positioned at the start of the journal.
    ///
    /// # Errors
    ///
    /// Returns an error if the journal length cannot be read.
    pub fn new(journal: &'a dyn Journal) -> StorageResult<Self> {
        Ok(Self {
            size: journal.len()?,
            journal,
            offset: 0,
            torn_at: None,
            finished: false,
        })
    }

    /// Offset just past the last complete record read so far.
    #[must_use]
    pub fn valid_len(&self) -> u64 {
        self.offset
    }

    /// Offset of an incomplete trailing record, if one was found.
    #[must_use]
    pub fn torn_at(&self) -> Option<u64> {
        self.torn_at
    }

    /// Reads the next record.
    ///
    /// Returns `Ok(None)` at the end of the journal or at a torn record.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` or `ChecksumMismatch` on damaged records.
    pub fn next_record(&mut self) -> StorageResult<Option<(u64, JournalRecord)>> {
        if self.finished {
            return Ok(None);
        }
        let start = self.offset;
        let remaining = self.size - start;
        if remaining == 0 {
            self.finished = true;
            return Ok(None);
        }
        if remaining < HEADER_SIZE as u64 {
            return Ok(self.torn(start));
        }

        let header = self.journal.read_at(start, HEADER_SIZE)?;
        if header[0..4] != JOURNAL_MAGIC {
            self.finished = true;
            return Err(StorageError::corrupted(format!(
                "invalid record magic at offset {start}"
            )));
        }
        let version = u16::from_le_bytes([header[4], header[5]]);
        if version > JOURNAL_VERSION {
            self.finished = true;
            return Err(StorageError::corrupted(format!(
                "unsupported record version {version} at offset {start}"
            )));
        }
        let Some(record_type) = RecordType::from_byte(header[6]) else {
            self.finished = true;
            return Err(StorageError::corrupted(format!(
                "unknown record type {} at offset {start}",
                header[6]
            )));
        };
        let payload_len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as u64;

        let total = HEADER_SIZE as u64 + payload_len + CRC_SIZE as u64;
        if remaining < total {
            return Ok(self.torn(start));
        }

        let body = self
            .journal
            .read_at(start + HEADER_SIZE as u64, payload_len as usize + CRC_SIZE)?;
        let (payload, crc_bytes) = body.split_at(payload_len as usize);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

        let mut framed = header;
        framed.extend_from_slice(payload);
        let computed = compute_crc32(&framed);
        if stored != computed {
            self.finished = true;
            return Err(StorageError::ChecksumMismatch {
                offset: start,
                expected: stored,
                actual: computed,
            });
        }

        let record = JournalRecord::decode_payload(record_type, payload)?;
        self.offset = start + total;
        Ok(Some((start, record)))
    }

    fn torn(&mut self, at: u64) -> Option<(u64, JournalRecord)> {
        tracing::warn!(offset = at, size = self.size, "discarding torn journal record");
        self.torn_at = Some(at);
        self.finished = true;
        None
    }
}

impl Iterator for JournalReader<'_> {
    type Item = StorageResult<(u64, JournalRecord)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
