//! Short-lived files used to hand certificate material and passwords to the
//! step CLI.
//!
//! A [`ScratchFile`] lives in the system temp directory under a unique name
//! built from a template such as `"ca_console_password_*.txt"` (the `*` is
//! replaced by a random suffix). On Unix the file is created with mode 0600.
//! The file is removed by [`ScratchFile::release`] or, at the latest, when the
//! value is dropped, so every exit path of the owning scope cleans up.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile};
use tracing::warn;

use crate::error::{CaError, Result};

#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    file: Option<NamedTempFile>,
}

impl ScratchFile {
    /// Create a scratch file from `template`, optionally seeded with `initial`.
    ///
    /// The seed is written in full before returning; a short write is an error
    /// and the half-written file is removed.
    pub fn acquire(template: &str, initial: Option<&[u8]>) -> Result<Self> {
        let (prefix, suffix) = template.split_once('*').unwrap_or((template, ""));
        let mut file = Builder::new().prefix(prefix).suffix(suffix).tempfile()?;

        if let Some(bytes) = initial {
            file.write_all(bytes)?;
            file.flush()?;
        }

        Ok(Self {
            path: file.path().to_path_buf(),
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path as an argument for the external tool.
    pub fn arg(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Read the whole file as it currently is on disk.
    pub fn read(&self) -> Result<Vec<u8>> {
        if self.file.is_none() {
            return Err(CaError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("scratch file {} already released", self.path.display()),
            )));
        }
        Ok(std::fs::read(&self.path)?)
    }

    pub fn is_released(&self) -> bool {
        self.file.is_none()
    }

    /// Close and remove the file. Calling it again is a no-op.
    pub fn release(&mut self) -> Result<()> {
        match self.file.take() {
            Some(file) => file.close().map_err(CaError::from),
            None => Ok(()),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!(path = %self.path.display(), error = %e, "failed to remove scratch file");
        }
    }
}
