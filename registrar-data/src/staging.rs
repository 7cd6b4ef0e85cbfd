//! Scoped local storage for files fetched from a [`Source`].
//!
//! A [`Staging`] area owns a temporary directory that is removed when the
//! value is dropped, so staged files disappear on success, on error and on
//! unwinding alike.

use std::sync::atomic::{AtomicUsize, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use log::debug;
use tempfile::TempDir;

use crate::source::{Source, TransferError};

/// Temporary directory holding staged source files.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
    root: Utf8PathBuf,
    counter: AtomicUsize,
}

impl Staging {
    /// Create an empty staging area under the system temporary directory.
    pub fn new() -> Result<Self, TransferError> {
        let dir = tempfile::Builder::new()
            .prefix("registrar-")
            .tempdir()
            .map_err(TransferError::io("staging directory"))?;
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).map_err(|path| {
            TransferError::Unsupported {
                location: path.display().to_string(),
            }
        })?;
        Ok(Self {
            dir,
            root,
            counter: AtomicUsize::new(0),
        })
    }

    /// Directory staged files are written to.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.root
    }

    /// Copy `path` from `source` into the staging area and return the local path.
    pub fn stage(&self, source: &dyn Source, path: &str) -> Result<Utf8PathBuf, TransferError> {
        let index = self.counter.fetch_add(1, Ordering::Relaxed);
        let name = path
            .rsplit(['/', '\\'])
            .find(|segment| !segment.is_empty())
            .unwrap_or("staged");
        let dest = self.root.join(format!("{index}-{name}"));
        source.get_file(path, &dest)?;
        debug!("staged {path} at {dest}");
        Ok(dest)
    }

    /// Stage `path` and read it as UTF-8 text.
    pub fn read(&self, source: &dyn Source, path: &str) -> Result<String, TransferError> {
        let local = self.stage(source, path)?;
        registrar_fs::read_to_string(&local).map_err(TransferError::io(local.as_str()))
    }

    /// Remove the staging directory now, reporting any failure.
    pub fn close(self) -> Result<(), TransferError> {
        let root = self.root;
        self.dir.close().map_err(TransferError::io(root.as_str()))
    }
}
