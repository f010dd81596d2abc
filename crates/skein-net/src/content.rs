//! Content storage behind a virtual node.
//!
//! The overlay treats content as an opaque byte buffer; a store only needs
//! whole-blob reads and writes plus a display name for operator listings.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Opaque byte store backing one virtual node's content.
pub trait ContentStore: Send {
    /// Human-readable name shown in operator listings.
    fn name(&self) -> &str;

    /// Read the whole blob from the start.
    fn read_all(&mut self) -> io::Result<Vec<u8>>;

    /// Replace the blob with `data`.
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// File-backed content store.
pub struct FileStore {
    file: File,
    name: String,
}

impl FileStore {
    /// Open an existing file for hosting.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            file,
            name: path.display().to_string(),
        })
    }

    /// Create (or truncate) a file that will receive fetched content.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file,
            name: path.display().to_string(),
        })
    }

    /// Wrap an already-open file handle (temporary files).
    pub fn from_file(file: File, name: impl Into<String>) -> Self {
        Self {
            file,
            name: name.into(),
        }
    }
}

impl ContentStore for FileStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(0))?;
        let mut data = Vec::new();
        self.file.read_to_end(&mut data)?;
        Ok(data)
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(0))?;
        self.file.set_len(0)?;
        self.file.write_all(data)?;
        self.file.flush()
    }
}

/// In-memory content store, used by tests.
#[derive(Default)]
pub struct MemStore {
    name: String,
    data: Vec<u8>,
}

impl MemStore {
    /// Empty store that will receive fetched content.
    pub fn empty(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data: Vec::new(),
        }
    }

    /// Store preloaded with `data`.
    pub fn with_data(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

impl ContentStore for MemStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn read_all(&mut self) -> io::Result<Vec<u8>> {
        Ok(self.data.clone())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.data = data.to_vec();
        Ok(())
    }
}
