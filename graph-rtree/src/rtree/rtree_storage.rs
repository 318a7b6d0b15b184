//! File storage for a persisted tree layout.
//!
//! The file holds a fixed-size header followed by the bincode encoding of
//! one [`TreeLayout`]. Every write replaces the whole payload; the header
//! carries the payload length and its checksum so that a torn or corrupted
//! payload is detected on the next read.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use super::layout::TreeLayout;
use super::rtree_constants::HEADER_SIZE;
use super::rtree_types::{FileHeader, SpatialError, SpatialResult};

pub struct LayoutStorage {
    file: RwLock<File>,
    path: PathBuf,
}

impl LayoutStorage {
    /// Create a new storage file, truncating any existing one
    pub fn create(path: &Path) -> SpatialResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    /// Open an existing storage file
    pub fn open(path: &Path) -> SpatialResult<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        Ok(Self {
            file: RwLock::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and validate the header (single read operation)
    pub fn read_header(&self) -> SpatialResult<FileHeader> {
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        let mut buffer = vec![0u8; HEADER_SIZE];
        file.read_exact(&mut buffer)?;
        let header: FileHeader =
            bincode::serde::decode_from_slice(&buffer, bincode::config::legacy())
                .map(|(header, _)| header)
                .map_err(|e| SpatialError::Serialization(e.to_string()))?;
        header.validate()?;
        Ok(header)
    }

    /// Read the layout, verifying the payload checksum
    pub fn read_layout(&self) -> SpatialResult<TreeLayout> {
        let header = self.read_header()?;

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        let mut payload = vec![0u8; header.payload_len as usize];
        file.read_exact(&mut payload)?;
        header.verify(&payload)?;

        bincode::serde::decode_from_slice(&payload, bincode::config::legacy())
            .map(|(layout, _)| layout)
            .map_err(|e| SpatialError::Serialization(e.to_string()))
    }

    /// Replace the stored layout
    pub fn write_layout(&self, layout: &TreeLayout) -> SpatialResult<()> {
        let payload = bincode::serde::encode_to_vec(layout, bincode::config::legacy())
            .map_err(|e| SpatialError::Serialization(e.to_string()))?;
        let header = FileHeader::new(&payload);
        let mut bytes = bincode::serde::encode_to_vec(&header, bincode::config::legacy())
            .map_err(|e| SpatialError::Serialization(e.to_string()))?;
        if bytes.len() > HEADER_SIZE {
            return Err(SpatialError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Header too large: {} bytes (max {})", bytes.len(), HEADER_SIZE),
            )));
        }
        bytes.resize(HEADER_SIZE, 0);
        bytes.extend_from_slice(&payload);

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&bytes)?;
        file.set_len(bytes.len() as u64)?;
        Ok(())
    }

    /// Sync file to disk
    pub fn sync(&self) -> SpatialResult<()> {
        self.file.write().sync_all()?;
        Ok(())
    }

    /// Truncate the backing file and remove it from disk
    pub fn delete(&self) -> SpatialResult<()> {
        let file = self.file.write();
        file.set_len(0)?;
        drop(file);
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}
