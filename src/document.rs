use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::buffer::LineBuffer;
use crate::error::Error;

/// One disassembled class loaded from disk, exclusively owned while edited.
#[derive(Debug)]
pub struct Document {
    path: PathBuf,
    buffer: LineBuffer,
}

impl Document {
    /// Read the file at `path` into a line buffer.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path).map_err(|source| Error::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let buffer = LineBuffer::parse(&text);
        debug!(path = %path.display(), lines = buffer.len(), "loaded document");
        Ok(Self {
            path: path.to_path_buf(),
            buffer,
        })
    }

    /// Wrap an in-memory buffer that will be written to `path` on commit.
    pub fn from_buffer(path: PathBuf, buffer: LineBuffer) -> Self {
        Self { path, buffer }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn buffer(&self) -> &LineBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut LineBuffer {
        &mut self.buffer
    }

    /// Write the full line sequence back to the original path.
    pub fn commit(self) -> Result<(), Error> {
        std::fs::write(&self.path, self.buffer.to_text()).map_err(|source| Error::WriteError {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), "persisted document");
        Ok(())
    }
}

/// Result of a scoped edit: what the edit returned, and whether the
/// write-back succeeded. The write-back happens on both success and failure
/// of the edit.
#[derive(Debug)]
pub struct Edit<T> {
    pub outcome: Result<T, Error>,
    pub commit: Result<(), Error>,
}

/// Open `path`, run `f` over it, then commit regardless of `f`'s result.
///
/// Only a failure to read the document is returned as `Err`; everything after
/// acquisition is reported through [`Edit`].
pub fn edit<T>(
    path: &Path,
    f: impl FnOnce(&mut Document) -> Result<T, Error>,
) -> Result<Edit<T>, Error> {
    let mut doc = Document::open(path)?;
    let outcome = f(&mut doc);
    let commit = doc.commit();
    if let Err(e) = &commit {
        warn!("{e}");
    }
    Ok(Edit { outcome, commit })
}
