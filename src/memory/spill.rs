//! Spill Tier
//!
//! Archived data is first appended to an in-memory [`SpillBuilder`]. When it
//! cannot take another region it is sealed: its bytes are written to an
//! anonymous temporary file under the store directory and the buffer starts
//! over under the next spill id. Sealed files are read-only and are removed
//! by the OS once the handle is dropped.
//!
//! Region ids below zero address this tier: the builder always carries
//! `-(sealed files + 1)` and sealed file `k` is region `-(k + 1)`, so the
//! builder's id becomes the id of the file it turns into.

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::memory::block::Block;
use crate::tree::{tree_size, ValueNode};

/// Upper bound on `read` calls spent filling one request.
pub const READ_ATTEMPTS: usize = 10;

/// Region id of sealed file `index`.
#[inline]
pub fn region_of(index: usize) -> i32 {
    -(index as i32) - 1
}

/// Index of the sealed file behind `region`.
#[inline]
pub fn file_of(region: i16) -> usize {
    (-(region as i32) - 1) as usize
}

/// The active, still writable spill buffer.
#[derive(Debug)]
pub struct SpillBuilder {
    block: Block,
    dir: PathBuf,
}

impl SpillBuilder {
    pub fn new(id: i16, data: Box<[u8]>, dir: impl Into<PathBuf>) -> Self {
        Self {
            block: Block::new(id, data),
            dir: dir.into(),
        }
    }

    #[inline]
    pub fn id(&self) -> i16 {
        self.block.index()
    }

    #[inline]
    pub fn left(&self) -> usize {
        self.block.left()
    }

    #[inline]
    pub fn written(&self) -> usize {
        self.block.written()
    }

    pub fn capacity(&self) -> usize {
        self.block.capacity()
    }

    pub fn append(&mut self, bytes: &[u8]) -> Option<u32> {
        self.block.append(bytes)
    }

    pub fn bytes(&self, offset: u32, length: usize) -> &[u8] {
        self.block.bytes(offset, length)
    }

    pub fn tree(&self, offset: u32) -> &[u8] {
        self.block.tree(offset)
    }

    pub fn write(&mut self, offset: u32, bytes: &[u8]) {
        self.block.write(offset, bytes)
    }

    pub fn overwrite(&mut self, node: ValueNode, value: &[u8]) {
        self.block.overwrite(node, value)
    }

    pub fn remove(&mut self, offset: u32, length: usize) {
        self.block.remove(offset, length)
    }

    /// Writes the buffered bytes to a new spill file and restarts the
    /// builder empty under `next`.
    ///
    /// On failure the builder keeps its content and id.
    pub fn seal(&mut self, next: i16) -> StoreResult<SpillFile> {
        let length = self.block.written();
        let mut file = tempfile::tempfile_in(&self.dir)?;

        file.write_all(self.block.bytes(0, length))?;
        file.flush()?;

        debug!(
            region = self.block.index(),
            bytes = length,
            wasted = self.block.wasted(),
            "Spill file sealed"
        );

        self.block.reset();
        self.block.set_index(next);

        Ok(SpillFile {
            file,
            size: length as u64,
        })
    }
}

/// A sealed, read-only spill file.
#[derive(Debug)]
pub struct SpillFile {
    file: File,
    size: u64,
}

impl SpillFile {
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn read(&self, offset: u32, length: usize) -> StoreResult<Vec<u8>> {
        read_at(&self.file, offset as u64, length)
    }

    /// Reads the bucket at `offset`: the key-length header first, then the
    /// whole bucket once its size is known.
    pub fn tree(&self, offset: u32) -> StoreResult<Vec<u8>> {
        let count = self.read(offset, 1)?[0] as usize;
        let header = self.read(offset, 1 + count)?;
        let size = tree_size(&header);

        self.read(offset, size)
    }
}

/// Fills `length` bytes from `offset`, tolerating short reads.
fn read_at<R: Read + Seek>(mut source: R, offset: u64, length: usize) -> StoreResult<Vec<u8>> {
    let mut data = vec![0u8; length];
    let mut read = 0;

    source.seek(SeekFrom::Start(offset))?;

    for _ in 0..READ_ATTEMPTS {
        if read == length {
            break;
        }

        match source.read(&mut data[read..]) {
            Ok(count) => read += count,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    if read < length {
        return Err(StoreError::ShortRead {
            offset,
            expected: length,
            read,
        });
    }

    Ok(data)
}
