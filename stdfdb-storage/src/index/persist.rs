//! On-disk form of an [`IndexStore`].
//!
//! ```text
//! ┌──────────┬─────────┬─────────────┬──────────────────┬─────────┐
//! │ STDFIDX1 │ version │ payload len │ bincode payload  │ crc32   │
//! │  8 bytes │ u32 LE  │   u64 LE    │                  │ u32 LE  │
//! └──────────┴─────────┴─────────────┴──────────────────┴─────────┘
//! ```
//!
//! The checksum covers the payload only. Files are written to a temporary
//! sibling and renamed into place, so a reader never sees a partial index.

use std::io::{Cursor, Read, Write};
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::info;

use stdfdb_core::error::{Error, Result, ResultExt};
use stdfdb_core::utils::format_bytes;

use super::IndexStore;

pub const INDEX_MAGIC: &[u8; 8] = b"STDFIDX1";
pub const INDEX_VERSION: u32 = 1;
const HEADER_SIZE: usize = 8 + 4 + 8;
const TRAILER_SIZE: usize = 4;

impl IndexStore {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self).map_err(|e| Error::Index {
            message: "Failed to serialize index".to_string(),
            source: Some(Box::new(e)),
        })?;
        let mut out = Vec::with_capacity(HEADER_SIZE + payload.len() + TRAILER_SIZE);
        out.write_all(INDEX_MAGIC)?;
        out.write_u32::<LittleEndian>(INDEX_VERSION)?;
        out.write_u64::<LittleEndian>(payload.len() as u64)?;
        out.write_all(&payload)?;
        out.write_u32::<LittleEndian>(crc32fast::hash(&payload))?;
        Ok(out)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(Error::index(format!("Index file too short: {} bytes", data.len())));
        }
        let mut cursor = Cursor::new(data);
        let mut magic = [0u8; 8];
        cursor.read_exact(&mut magic)?;
        if &magic != INDEX_MAGIC {
            return Err(Error::index("Invalid index magic"));
        }
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != INDEX_VERSION {
            return Err(Error::index(format!("Unsupported index version: {}", version)));
        }
        let payload_len = usize::try_from(cursor.read_u64::<LittleEndian>()?)
            .map_err(|_| Error::index("Index payload length out of range"))?;
        let payload_end = data.len() - TRAILER_SIZE;
        if payload_len != payload_end - HEADER_SIZE {
            return Err(Error::index(format!(
                "Index payload length {} does not match file size {}",
                payload_len,
                data.len()
            )));
        }

        let payload = &data[HEADER_SIZE..payload_end];
        let mut trailer = &data[payload_end..];
        let expected = trailer.read_u32::<LittleEndian>()?;
        if crc32fast::hash(payload) != expected {
            return Err(Error::index("Index checksum mismatch"));
        }
        bincode::deserialize(payload).map_err(|e| Error::Index {
            message: "Failed to deserialize index".to_string(),
            source: Some(Box::new(e)),
        })
    }

    /// Write atomically: temp file in the same directory, then rename
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .map_err(Error::from)
            .with_context(|| format!("Creating index in {}", dir.display()))?;
        tmp.write_all(&bytes)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(Error::from)
            .with_context(|| format!("Writing index for {}", path.display()))?;
        tmp.persist(path).map_err(|e| Error::Io {
            message: format!("Failed to move index into {}", path.display()),
            source: e.error,
        })?;
        info!(
            path = %path.display(),
            size = %format_bytes(bytes.len() as u64),
            tests = self.tests.len(),
            entries = self.total_entries(),
            "Saved index"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| Error::Io {
            message: format!("Failed to read index {}", path.display()),
            source: e,
        })?;
        let store = Self::from_bytes(&data)?;
        info!(path = %path.display(), tests = store.tests.len(), "Loaded index");
        Ok(store)
    }
}
