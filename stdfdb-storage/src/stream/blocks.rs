//! Block index for random access into compressed inputs.
//!
//! gzip, bzip2 and deflate streams cannot seek. While the scanner reads the
//! decompressed stream forward, every byte is also fed to a
//! [`BlockIndexBuilder`], which cuts it into fixed-size blocks, compresses
//! each with zstd and appends it to a spill file. [`BlockReader`] then serves
//! `Read + Seek` over the decompressed content by loading whole blocks,
//! keeping the most recent ones in an LRU.
//!
//! ```text
//!  decompressed stream  ──┬──> scanner
//!                         │
//!                         └──> [blk 0][blk 1][blk 2]...  (zstd, spill file)
//!                                 ▲
//!  BlockTable: blk i -> (spill offset, compressed len)
//! ```

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Arc;

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tracing::debug;

use stdfdb_core::error::{Error, Result};

/// Location of one compressed block in the spill file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub spill_offset: u64,
    pub compressed_len: u32,
}

/// Serializable description of a spill file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTable {
    pub block_size: u32,
    pub total_len: u64,
    pub blocks: Vec<BlockEntry>,
}

/// A finished block table together with its spill file
pub struct BlockIndex {
    pub table: BlockTable,
    spill: File,
}

impl BlockIndex {
    /// Reattach a table to a spill file written by another process
    pub fn open(table: BlockTable, spill_path: impl AsRef<Path>) -> Result<Self> {
        let spill = File::open(spill_path.as_ref()).map_err(|e| Error::Io {
            message: format!("Failed to open block spill {}", spill_path.as_ref().display()),
            source: e,
        })?;
        Ok(Self { table, spill })
    }

    pub fn decompressed_len(&self) -> u64 {
        self.table.total_len
    }
}

pub fn compress_block(data: &[u8], level: i32) -> Result<Vec<u8>> {
    zstd::encode_all(data, level).map_err(|e| Error::Internal {
        message: format!("Zstd compression failed: {}", e),
    })
}

pub fn decompress_block(data: &[u8]) -> Result<Vec<u8>> {
    zstd::decode_all(data).map_err(|e| Error::Index {
        message: format!("Zstd decompression failed: {}", e),
        source: None,
    })
}

/// Accumulates decompressed bytes into spill blocks
pub struct BlockIndexBuilder {
    table: BlockTable,
    current: Vec<u8>,
    spill: BufWriter<File>,
    spill_pos: u64,
    level: i32,
}

impl BlockIndexBuilder {
    /// Spill into an anonymous temporary file
    pub fn anonymous(block_size: usize, level: i32) -> Result<Self> {
        Ok(Self::with_file(tempfile::tempfile()?, block_size, level))
    }

    /// Spill into a named file
    pub fn create(path: impl AsRef<Path>, block_size: usize, level: i32) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        Ok(Self::with_file(file, block_size, level))
    }

    fn with_file(file: File, block_size: usize, level: i32) -> Self {
        Self {
            table: BlockTable {
                block_size: block_size as u32,
                total_len: 0,
                blocks: Vec::new(),
            },
            current: Vec::with_capacity(block_size),
            spill: BufWriter::new(file),
            spill_pos: 0,
            level,
        }
    }

    pub fn append(&mut self, mut data: &[u8]) -> Result<()> {
        let block_size = self.table.block_size as usize;
        while !data.is_empty() {
            let room = block_size - self.current.len();
            let take = room.min(data.len());
            self.current.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.current.len() == block_size {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.current.is_empty() {
            return Ok(());
        }
        let compressed = compress_block(&self.current, self.level)?;
        self.spill.write_all(&compressed)?;
        self.table.blocks.push(BlockEntry {
            spill_offset: self.spill_pos,
            compressed_len: compressed.len() as u32,
        });
        self.spill_pos += compressed.len() as u64;
        self.table.total_len += self.current.len() as u64;
        self.current.clear();
        Ok(())
    }

    pub fn finish(mut self) -> Result<BlockIndex> {
        self.flush_block()?;
        let spill = self.spill.into_inner().map_err(|e| Error::Io {
            message: "Failed to flush block spill".to_string(),
            source: e.into_error(),
        })?;
        spill.sync_data()?;
        debug!(
            blocks = self.table.blocks.len(),
            decompressed = self.table.total_len,
            spilled = self.spill_pos,
            "Block index finished"
        );
        Ok(BlockIndex { table: self.table, spill })
    }
}

/// Forward reader that records everything it yields into a block builder
pub struct RecordingReader<'b, R> {
    inner: R,
    builder: &'b mut BlockIndexBuilder,
}

impl<'b, R: Read> RecordingReader<'b, R> {
    pub fn new(inner: R, builder: &'b mut BlockIndexBuilder) -> Self {
        Self { inner, builder }
    }
}

impl<R: Read> Read for RecordingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.builder
            .append(&buf[..n])
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        Ok(n)
    }
}

/// `Read + Seek` over the decompressed content of a block index
pub struct BlockReader {
    table: BlockTable,
    spill: File,
    cache: LruCache<usize, Arc<Vec<u8>>>,
    pos: u64,
}

impl BlockReader {
    pub fn new(index: BlockIndex, cached_blocks: usize) -> Self {
        let capacity = NonZeroUsize::new(cached_blocks.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            table: index.table,
            spill: index.spill,
            cache: LruCache::new(capacity),
            pos: 0,
        }
    }

    pub fn len(&self) -> u64 {
        self.table.total_len
    }

    pub fn is_empty(&self) -> bool {
        self.table.total_len == 0
    }

    fn block(&mut self, index: usize) -> Result<Arc<Vec<u8>>> {
        if let Some(block) = self.cache.get(&index) {
            return Ok(block.clone());
        }
        let entry = *self.table.blocks.get(index).ok_or_else(|| Error::Internal {
            message: format!("Block {} out of range ({} blocks)", index, self.table.blocks.len()),
        })?;
        let mut compressed = vec![0u8; entry.compressed_len as usize];
        self.spill.seek(SeekFrom::Start(entry.spill_offset))?;
        self.spill.read_exact(&mut compressed)?;
        let block = Arc::new(decompress_block(&compressed)?);
        self.cache.put(index, block.clone());
        Ok(block)
    }
}

impl Read for BlockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.pos >= self.table.total_len {
            return Ok(0);
        }
        let block_size = self.table.block_size as u64;
        let index = (self.pos / block_size) as usize;
        let within = (self.pos % block_size) as usize;
        let block = self
            .block(index)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        let available = block.len().saturating_sub(within);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&block[within..within + n]);
        self.pos += n as u64;
        Ok(n)
    }
}

impl Seek for BlockReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.table.total_len.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        match target {
            Some(offset) => {
                self.pos = offset;
                Ok(offset)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of stream",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(data: &[u8], block_size: usize) -> BlockIndex {
        let mut builder = BlockIndexBuilder::anonymous(block_size, 1).unwrap();
        {
            let mut reader = RecordingReader::new(data, &mut builder);
            io::copy(&mut reader, &mut io::sink()).unwrap();
        }
        builder.finish().unwrap()
    }

    #[test]
    fn test_reads_across_block_boundaries() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let index = build(&data, 4096);
        assert_eq!(index.table.blocks.len(), 3);
        assert_eq!(index.decompressed_len(), 10_000);

        let mut reader = BlockReader::new(index, 2);
        reader.seek(SeekFrom::Start(4090)).unwrap();
        let mut buf = [0u8; 20];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(&buf[..], &data[4090..4110]);

        reader.seek(SeekFrom::End(-5)).unwrap();
        let mut tail = Vec::new();
        reader.read_to_end(&mut tail).unwrap();
        assert_eq!(tail, &data[9995..]);
    }

    #[test]
    fn test_read_past_end_is_eof() {
        let index = build(b"abc", 4096);
        let mut reader = BlockReader::new(index, 1);
        reader.seek(SeekFrom::Start(10)).unwrap();
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert!(reader.seek(SeekFrom::Current(-20)).is_err());
    }
}
