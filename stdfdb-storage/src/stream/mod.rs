//! # Compressed Stream Access Layer
//!
//! One interface over plain, gzip, bzip2 and zip-wrapped STDF files:
//!
//! - **Forward reads** for the scanner via [`StdfSource::with_forward_reader`],
//!   counting on-disk bytes consumed for progress reporting.
//! - **Random access** for the decoder via [`StdfSource::open_random_access`]:
//!   a memory map for plain files, a [`blocks::BlockReader`] over the spill
//!   recorded during the scan for compressed ones.
//!
//! Offsets handed out by the scanner always address the *decompressed*
//! stream, so both paths agree on them.

pub mod blocks;

use std::fs::File;
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use memmap2::Mmap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use stdfdb_core::config::StreamConfig;
use stdfdb_core::error::{Error, Result};

pub use blocks::{BlockIndex, BlockIndexBuilder, BlockReader, BlockTable, RecordingReader};

/// Container/compression format of an input file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Compression {
    None,
    Gzip,
    Bzip2,
    Zip,
}

impl Compression {
    /// Detect from the file extension
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "gz" | "gzip" => Some(Compression::Gzip),
            "bz2" | "bz" | "bzip2" => Some(Compression::Bzip2),
            "zip" => Some(Compression::Zip),
            "stdf" | "std" => Some(Compression::None),
            _ => None,
        }
    }

    /// Detect from leading magic bytes
    pub fn from_magic(magic: &[u8]) -> Self {
        if magic.starts_with(&[0x1F, 0x8B]) {
            Compression::Gzip
        } else if magic.starts_with(b"BZh") {
            Compression::Bzip2
        } else if magic.starts_with(b"PK\x03\x04") {
            Compression::Zip
        } else {
            Compression::None
        }
    }

    pub fn detect(path: &Path) -> Result<Self> {
        if let Some(compression) = Self::from_extension(path) {
            return Ok(compression);
        }
        let mut magic = [0u8; 4];
        let mut file = File::open(path)?;
        let n = file.read(&mut magic)?;
        Ok(Self::from_magic(&magic[..n]))
    }

    pub fn is_compressed(&self) -> bool {
        !matches!(self, Compression::None)
    }
}

/// Reader that can also seek
pub trait SeekRead: Read + Seek + Send {}

impl<T: Read + Seek + Send> SeekRead for T {}

/// Random-access handle owned by the decoder
pub type StreamHandle = Box<dyn SeekRead>;

/// Pass-through reader counting bytes consumed from disk
pub struct CountingReader<R> {
    inner: R,
    consumed: Arc<AtomicU64>,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R, consumed: Arc<AtomicU64>) -> Self {
        Self { inner, consumed }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

impl<R: Seek> Seek for CountingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let offset = self.inner.seek(pos)?;
        self.consumed.store(offset, Ordering::Relaxed);
        Ok(offset)
    }
}

/// An STDF input file on disk
#[derive(Debug, Clone)]
pub struct StdfSource {
    path: PathBuf,
    compression: Compression,
    file_size: u64,
}

impl StdfSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = std::fs::metadata(&path).map_err(|e| Error::Io {
            message: format!("Cannot open {}", path.display()),
            source: e,
        })?;
        if !metadata.is_file() {
            return Err(Error::Configuration {
                message: format!("{} is not a file", path.display()),
            });
        }
        let compression = Compression::detect(&path)?;
        info!(path = %path.display(), ?compression, size = metadata.len(), "Opened STDF source");
        Ok(Self { path, compression, file_size: metadata.len() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Size on disk; the denominator for progress
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Largest decompressed offset we can know before scanning
    pub fn size_hint(&self) -> Option<u64> {
        match self.compression {
            Compression::None => Some(self.file_size),
            _ => None,
        }
    }

    /// Run `f` over a forward reader of the decompressed stream.
    ///
    /// `consumed` tracks bytes read from disk. A zip entry borrows its
    /// archive, hence the callback shape.
    pub fn with_forward_reader<T>(
        &self,
        consumed: Arc<AtomicU64>,
        f: impl FnOnce(&mut dyn Read) -> Result<T>,
    ) -> Result<T> {
        let file = File::open(&self.path)?;
        let raw = CountingReader::new(BufReader::with_capacity(256 * 1024, file), consumed);
        match self.compression {
            Compression::None => {
                let mut reader = raw;
                f(&mut reader)
            }
            Compression::Gzip => {
                let mut reader = BufReader::new(flate2::read::MultiGzDecoder::new(raw));
                f(&mut reader)
            }
            Compression::Bzip2 => {
                let mut reader = BufReader::new(bzip2::read::MultiBzDecoder::new(raw));
                f(&mut reader)
            }
            Compression::Zip => {
                let mut archive = zip::ZipArchive::new(raw).map_err(zip_error)?;
                let index = first_file_entry(&mut archive)?;
                let entry = archive.by_index(index).map_err(zip_error)?;
                debug!(entry = entry.name(), size = entry.size(), "Reading zip entry");
                let mut reader = BufReader::new(entry);
                f(&mut reader)
            }
        }
    }

    /// Open a `Read + Seek` handle over the decompressed stream.
    ///
    /// Compressed inputs need the block index recorded during the scan; if
    /// none is supplied one is built here with an extra forward pass.
    pub fn open_random_access(
        &self,
        blocks: Option<BlockIndex>,
        config: &StreamConfig,
    ) -> Result<StreamHandle> {
        if !self.compression.is_compressed() {
            let file = File::open(&self.path)?;
            // Safety: the file is opened read-only and never written through this map.
            let mmap = unsafe {
                Mmap::map(&file).map_err(|e| Error::Io {
                    message: format!("Failed to mmap {}", self.path.display()),
                    source: e,
                })?
            };
            return Ok(Box::new(Cursor::new(mmap)));
        }

        let index = match blocks {
            Some(index) => index,
            None => self.build_block_index(config)?,
        };
        Ok(Box::new(BlockReader::new(index, config.block_cache_blocks)))
    }

    /// Decompress the whole input once into a spill block index
    pub fn build_block_index(&self, config: &StreamConfig) -> Result<BlockIndex> {
        let mut builder = BlockIndexBuilder::anonymous(config.block_size, config.spill_level)?;
        self.with_forward_reader(Arc::new(AtomicU64::new(0)), |reader| {
            let mut recording = RecordingReader::new(reader, &mut builder);
            io::copy(&mut recording, &mut io::sink())?;
            Ok(())
        })?;
        builder.finish()
    }
}

fn first_file_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>) -> Result<usize> {
    if archive.is_empty() {
        return Err(Error::Configuration {
            message: "Empty zip file detected".to_string(),
        });
    }
    for index in 0..archive.len() {
        let entry = archive.by_index(index).map_err(zip_error)?;
        if entry.is_file() && entry.size() > 0 {
            return Ok(index);
        }
    }
    Err(Error::Configuration {
        message: "Zip archive contains no non-empty file".to_string(),
    })
}

fn zip_error(err: zip::result::ZipError) -> Error {
    match err {
        zip::result::ZipError::Io(e) => Error::Io {
            message: "Zip read failed".to_string(),
            source: e,
        },
        other => Error::format(format!("Invalid zip archive: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_from_extension() {
        assert_eq!(Compression::from_extension(Path::new("lot.stdf.gz")), Some(Compression::Gzip));
        assert_eq!(Compression::from_extension(Path::new("lot.std.BZ2")), Some(Compression::Bzip2));
        assert_eq!(Compression::from_extension(Path::new("lot.zip")), Some(Compression::Zip));
        assert_eq!(Compression::from_extension(Path::new("lot.stdf")), Some(Compression::None));
        assert_eq!(Compression::from_extension(Path::new("lot")), None);
    }

    #[test]
    fn test_compression_from_magic() {
        assert_eq!(Compression::from_magic(&[0x1F, 0x8B, 8, 0]), Compression::Gzip);
        assert_eq!(Compression::from_magic(b"BZh9"), Compression::Bzip2);
        assert_eq!(Compression::from_magic(b"PK\x03\x04"), Compression::Zip);
        assert_eq!(Compression::from_magic(&[2, 0, 0, 10]), Compression::None);
    }
}
