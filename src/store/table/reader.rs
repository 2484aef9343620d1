//! Table Reader
//!
//! Opens table files and provides O(log n) key lookups via in-memory index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::store::IndicatorRecord;

use super::iterator::TableIterator;
use super::{ENTRY_HEADER_SIZE, FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Reader for table files with in-memory index for O(log n) lookups
///
/// Lookups seek the underlying file, so a reader serves one caller at a
/// time; the store hands readers out through its connection pool.
pub struct TableReader {
    /// Path the table was opened from
    path: PathBuf,
    /// File handle for reading entries
    pub(super) file: BufReader<File>,
    /// In-memory index: key → file offset (shared by reopened handles)
    index: Arc<BTreeMap<Vec<u8>, u64>>,
    /// Entry count from the header
    entry_count: u64,
    /// Index block starting offset (end of data block)
    pub(super) index_offset: u64,
    /// CRC32 of the data block, from the footer
    pub(super) data_crc: u32,
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(buf)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

impl TableReader {
    /// Open a table for reading
    ///
    /// Loads the entire key index into memory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(StoreError::Corruption(format!(
                "{}: file too small ({} bytes)",
                path.display(),
                file_size
            )));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(StoreError::Corruption(format!(
                "{}: invalid magic {:?}",
                path.display(),
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(StoreError::Corruption(format!(
                "{}: unsupported table version {}",
                path.display(),
                version
            )));
        }

        let entry_count = le_u64(&header[6..14]);

        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let index_offset = le_u64(&footer[0..8]);
        let data_crc = le_u32(&footer[8..12]);

        if index_offset < HEADER_SIZE || index_offset > file_size - FOOTER_SIZE {
            return Err(StoreError::Corruption(format!(
                "{}: index offset {} out of range",
                path.display(),
                index_offset
            )));
        }

        // Index block size = file_size - footer_size - index_offset
        file.seek(SeekFrom::Start(index_offset))?;
        let mut index_data = vec![0u8; (file_size - FOOTER_SIZE - index_offset) as usize];
        file.read_exact(&mut index_data)?;

        let index = Self::parse_index(path, &index_data, index_offset)?;

        if index.len() as u64 != entry_count {
            return Err(StoreError::Corruption(format!(
                "{}: header says {} entries, index has {}",
                path.display(),
                entry_count,
                index.len()
            )));
        }

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            index: Arc::new(index),
            entry_count,
            index_offset,
            data_crc,
        })
    }

    /// Open another handle on the same file, sharing the loaded index
    pub fn reopen(&self) -> StoreResult<Self> {
        Ok(Self {
            path: self.path.clone(),
            file: BufReader::new(File::open(&self.path)?),
            index: Arc::clone(&self.index),
            entry_count: self.entry_count,
            index_offset: self.index_offset,
            data_crc: self.data_crc,
        })
    }

    /// Parse index entries: [key_len(4)][offset(8)][key]
    fn parse_index(path: &Path, data: &[u8], data_end: u64) -> StoreResult<BTreeMap<Vec<u8>, u64>> {
        let truncated = || StoreError::Corruption(format!("{}: truncated index block", path.display()));

        let mut index = BTreeMap::new();
        let mut pos = 0;
        while pos < data.len() {
            let key_len = le_u32(data.get(pos..pos + 4).ok_or_else(truncated)?) as usize;
            pos += 4;
            let offset = le_u64(data.get(pos..pos + 8).ok_or_else(truncated)?);
            pos += 8;
            let key = data.get(pos..pos + key_len).ok_or_else(truncated)?.to_vec();
            pos += key_len;

            if offset < HEADER_SIZE || offset >= data_end {
                return Err(StoreError::Corruption(format!(
                    "{}: entry offset {} outside data block",
                    path.display(),
                    offset
                )));
            }

            index.insert(key, offset);
        }
        Ok(index)
    }

    /// Get the raw value bytes for a key, O(log n) via in-memory index
    ///
    /// Returns `Ok(None)` if the key is not in this table.
    pub fn get(&mut self, key: &[u8]) -> StoreResult<Option<Vec<u8>>> {
        let offset = match self.index.get(key) {
            Some(&off) => off,
            None => return Ok(None),
        };

        self.file.seek(SeekFrom::Start(offset))?;

        let mut header = [0u8; ENTRY_HEADER_SIZE as usize];
        self.file.read_exact(&mut header)?;

        let key_len = le_u32(&header[0..4]) as u64;
        let val_len = le_u32(&header[4..8]) as u64;

        if offset + ENTRY_HEADER_SIZE + key_len + val_len > self.index_offset {
            return Err(StoreError::Corruption(format!(
                "{}: entry at {} overruns data block",
                self.path.display(),
                offset
            )));
        }

        // Skip the key (the index already matched it)
        self.file.seek_relative(key_len as i64)?;

        let mut value = vec![0u8; val_len as usize];
        self.file.read_exact(&mut value)?;

        Ok(Some(value))
    }

    /// Get and decode the record stored under `key`
    pub fn get_record(&mut self, key: &str) -> StoreResult<Option<IndicatorRecord>> {
        match self.get(key.as_bytes())? {
            Some(bytes) => bincode::deserialize(&bytes).map(Some).map_err(|e| {
                StoreError::MalformedRow(format!(
                    "{}: record for {:?} does not decode: {}",
                    self.path.display(),
                    key,
                    e
                ))
            }),
            None => Ok(None),
        }
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Path the table was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the minimum key in this table (for range filtering)
    pub fn min_key(&self) -> Option<&[u8]> {
        self.index.keys().next().map(|k| k.as_slice())
    }

    /// Get the maximum key in this table (for range filtering)
    pub fn max_key(&self) -> Option<&[u8]> {
        self.index.keys().next_back().map(|k| k.as_slice())
    }

    /// Quick check if a key might be in this table (range check)
    /// Returns false only if the key is definitely outside [min_key, max_key]
    pub fn might_contain(&self, key: &[u8]) -> bool {
        match (self.min_key(), self.max_key()) {
            (Some(min), Some(max)) => key >= min && key <= max,
            _ => false,
        }
    }

    /// Sequential scan over the data block, verifying the data CRC at the end
    pub fn iter(&mut self) -> TableIterator<'_> {
        TableIterator::new(self)
    }
}
