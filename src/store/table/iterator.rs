//! Table Iterator
//!
//! Sequential iteration over all entries in a table.
//!
//! [`TableCursor`] holds the scan position without borrowing the reader, so a
//! scan can live next to the reader it walks (see `KeyStream`).
//! [`TableIterator`] pairs a cursor with a borrowed reader.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{StoreError, StoreResult};

use super::reader::TableReader;
use super::{ENTRY_HEADER_SIZE, HEADER_SIZE};

/// Position of a sequential scan through a table's data block
pub struct TableCursor {
    /// Offset of the next entry
    offset: u64,
    /// Start of the index block; the scan stops here
    end_offset: u64,
    /// CRC over everything read so far
    hasher: crc32fast::Hasher,
    /// CRC recorded in the footer
    expected_crc: u32,
    /// Set after the last entry or the first error
    done: bool,
}

impl TableCursor {
    /// Cursor positioned at the first entry of `reader`'s table
    pub fn new(reader: &TableReader) -> Self {
        Self {
            offset: HEADER_SIZE,
            end_offset: reader.index_offset,
            hasher: crc32fast::Hasher::new(),
            expected_crc: reader.data_crc,
            done: false,
        }
    }

    /// Read the next (key, value) entry
    ///
    /// Returns `Ok(None)` once the data block is exhausted and its checksum
    /// matched; a mismatch is reported as [`StoreError::Corruption`].
    pub fn next_entry(&mut self, reader: &mut TableReader) -> StoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        if self.done {
            return Ok(None);
        }

        let result = self.read_entry(reader);
        if !matches!(result, Ok(Some(_))) {
            self.done = true;
        }
        result
    }

    fn read_entry(&mut self, reader: &mut TableReader) -> StoreResult<Option<(Vec<u8>, Vec<u8>)>> {
        if self.offset >= self.end_offset {
            let actual = self.hasher.clone().finalize();
            if actual != self.expected_crc {
                return Err(StoreError::Corruption(format!(
                    "{}: data CRC mismatch (expected {:08x}, got {:08x})",
                    reader.path().display(),
                    self.expected_crc,
                    actual
                )));
            }
            return Ok(None);
        }

        // Avoid discarding the read buffer when already in position
        if reader.file.stream_position()? != self.offset {
            reader.file.seek(SeekFrom::Start(self.offset))?;
        }

        let mut header = [0u8; ENTRY_HEADER_SIZE as usize];
        reader.file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
        let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as u64;

        let entry_size = ENTRY_HEADER_SIZE + key_len + val_len;
        if self.offset + entry_size > self.end_offset {
            return Err(StoreError::Corruption(format!(
                "{}: entry at {} overruns data block",
                reader.path().display(),
                self.offset
            )));
        }

        let mut key = vec![0u8; key_len as usize];
        reader.file.read_exact(&mut key)?;
        let mut value = vec![0u8; val_len as usize];
        reader.file.read_exact(&mut value)?;

        self.hasher.update(&header);
        self.hasher.update(&key);
        self.hasher.update(&value);
        self.offset += entry_size;

        Ok(Some((key, value)))
    }
}

/// Iterator over table entries in ascending key order
pub struct TableIterator<'a> {
    reader: &'a mut TableReader,
    cursor: TableCursor,
}

impl<'a> TableIterator<'a> {
    pub(super) fn new(reader: &'a mut TableReader) -> Self {
        let cursor = TableCursor::new(reader);
        Self { reader, cursor }
    }
}

impl<'a> Iterator for TableIterator<'a> {
    /// (key, encoded record)
    type Item = StoreResult<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_entry(self.reader).transpose()
    }
}
