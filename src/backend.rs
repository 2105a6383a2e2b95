use sha2::{Digest, Sha256};

use crate::dedup::ContentHash;
use crate::error::{FtlError, Result};

/// Which way a copy moves bytes, seen from the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ToDevice,
    FromDevice,
}

/// Moves payload between a caller buffer and the device's backing memory.
pub trait DataMover: Send {
    fn copy(&mut self, offset: usize, buf: &mut [u8], dir: Direction) -> Result<()>;
}

/// Backing store kept in host memory, addressed by physical byte offset.
pub struct DramBackend {
    space: Vec<u8>,
    copies: usize,
    bytes_in: usize,
    bytes_out: usize,
}

impl DramBackend {
    pub fn new(nbytes: usize) -> Self {
        DramBackend {
            space: vec![0; nbytes],
            copies: 0,
            bytes_in: 0,
            bytes_out: 0,
        }
    }

    /// Number of `copy` calls served so far.
    pub fn copies(&self) -> usize {
        self.copies
    }

    pub fn bytes_in(&self) -> usize {
        self.bytes_in
    }

    pub fn bytes_out(&self) -> usize {
        self.bytes_out
    }
}

impl DataMover for DramBackend {
    fn copy(&mut self, offset: usize, buf: &mut [u8], dir: Direction) -> Result<()> {
        let len = buf.len();
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.space.len())
            .ok_or(FtlError::Backend { offset, len, size: self.space.len() })?;
        let mem = &mut self.space[offset..end];
        match dir {
            Direction::ToDevice => {
                mem.copy_from_slice(buf);
                self.bytes_in += len;
            }
            Direction::FromDevice => {
                buf.copy_from_slice(mem);
                self.bytes_out += len;
            }
        }
        self.copies += 1;
        Ok(())
    }
}

/// SHA-256 digest of one page of payload.
pub fn content_hash(data: &[u8]) -> ContentHash {
    ContentHash::new(&Sha256::digest(data))
}

/// Per-page digests of a write buffer, `page_size` bytes at a time.
pub fn page_hashes(data: &[u8], page_size: usize) -> Vec<ContentHash> {
    data.chunks(page_size).map(content_hash).collect()
}
