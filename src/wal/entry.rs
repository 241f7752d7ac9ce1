//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their
//! on-disk encoding.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Header size: LSN (8) + CRC (4) + Len (4) = 16 bytes
pub const HEADER_SIZE: usize = 16;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to perform
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Put a key-value pair
    Put { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Delete { key: Vec<u8> },

    /// Several puts/deletes applied all-or-nothing, in order
    Batch { ops: Vec<Operation> },
}

impl Operation {
    /// Number of single-key mutations carried by this operation
    pub fn mutation_count(&self) -> usize {
        match self {
            Operation::Put { .. } | Operation::Delete { .. } => 1,
            Operation::Batch { ops } => ops.iter().map(Operation::mutation_count).sum(),
        }
    }
}

impl WalEntry {
    /// Create an entry stamped with the current wall-clock time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode as `[lsn][crc][len][data]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let data = self.encode_payload()?;
        let len = data.len() as u32;
        let crc = Self::checksum(self.lsn, len, &data);

        let mut bytes = Vec::with_capacity(HEADER_SIZE + data.len());
        bytes.extend_from_slice(&self.lsn.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&len.to_le_bytes());
        bytes.extend_from_slice(&data);
        Ok(bytes)
    }

    /// Decode one entry from the front of `bytes`, verifying its CRC
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::WalCorruption(format!(
                "entry header truncated: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let lsn = u64::from_le_bytes(read_array(&bytes[0..8]));
        let stored_crc = u32::from_le_bytes(read_array(&bytes[8..12]));
        let len = u32::from_le_bytes(read_array(&bytes[12..16]));

        let end = HEADER_SIZE + len as usize;
        if bytes.len() < end {
            return Err(StoreError::WalCorruption(format!(
                "entry data truncated at lsn {}: {} of {} bytes",
                lsn,
                bytes.len() - HEADER_SIZE,
                len
            )));
        }

        let data = &bytes[HEADER_SIZE..end];
        let crc = Self::checksum(lsn, len, data);
        if crc != stored_crc {
            return Err(StoreError::WalCorruption(format!(
                "CRC mismatch at lsn {}: stored {:#010x}, computed {:#010x}",
                lsn, stored_crc, crc
            )));
        }

        let (operation, timestamp): (Operation, u64) = bincode::deserialize(data)
            .map_err(|e| StoreError::WalCorruption(format!("undecodable entry {}: {}", lsn, e)))?;

        Ok(Self {
            lsn,
            operation,
            timestamp,
        })
    }

    /// Total encoded size including header
    pub fn serialized_size(&self) -> Result<usize> {
        Ok(HEADER_SIZE + self.encode_payload()?.len())
    }

    /// CRC this entry would be written with
    pub fn compute_crc(&self) -> Result<u32> {
        let data = self.encode_payload()?;
        Ok(Self::checksum(self.lsn, data.len() as u32, &data))
    }

    fn encode_payload(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(&(&self.operation, self.timestamp))?)
    }

    fn checksum(lsn: u64, len: u32, data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&lsn.to_le_bytes());
        hasher.update(&len.to_le_bytes());
        hasher.update(data);
        hasher.finalize()
    }
}

pub(crate) fn read_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
