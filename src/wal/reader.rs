//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::{Result, StoreError};
use super::entry::{read_array, HEADER_SIZE};
use super::WalEntry;

/// Reads entries from the WAL file
pub struct WalReader {
    file: BufReader<File>,
    /// Length of the file when it was opened
    file_len: u64,
    /// Offset just past the last entry successfully read
    position: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        Ok(Self {
            file: BufReader::new(file),
            file_len,
            position: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns `Ok(None)` at a clean end of file. A partial header, partial
    /// data or CRC mismatch is reported as `WalCorruption`.
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        let read = read_fully(&mut self.file, &mut header)?;
        if read == 0 {
            return Ok(None);
        }
        if read < HEADER_SIZE {
            return Err(StoreError::WalCorruption(format!(
                "partial header at offset {}: {} bytes",
                self.position, read
            )));
        }

        let len = u32::from_le_bytes(read_array(&header[12..16])) as usize;

        // The length is unverified until the CRC check; never size a buffer
        // past what the file can still hold
        let available = self
            .file_len
            .saturating_sub(self.position + HEADER_SIZE as u64);
        if len as u64 > available {
            return Err(StoreError::WalCorruption(format!(
                "entry at offset {} claims {} data bytes, only {} remain",
                self.position, len, available
            )));
        }
        let mut record = Vec::with_capacity(HEADER_SIZE + len);
        record.extend_from_slice(&header);
        record.resize(HEADER_SIZE + len, 0);

        let read = read_fully(&mut self.file, &mut record[HEADER_SIZE..])?;
        if read < len {
            return Err(StoreError::WalCorruption(format!(
                "partial data at offset {}: {} of {} bytes",
                self.position, read, len
            )));
        }

        let entry = WalEntry::deserialize(&record)?;
        self.position += record.len() as u64;
        Ok(Some(entry))
    }

    /// Byte offset just past the last valid entry read so far
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries
///
/// Yields the first error it meets and then stops.
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF; returns the number of bytes read
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
