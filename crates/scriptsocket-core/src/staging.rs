//! Staging store for received payloads
//!
//! The server never hands received text straight to the host application.
//! It writes the text to a file whose path stays fixed for the life of the
//! process, and the host reads that file from its own execution context.
//!
//! Writes go to a temporary file in the same directory which is then renamed
//! over the staged file, so a reader sees either the previous payload or the
//! new one in full.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StagingError;

/// File name of the staged payload inside the staging directory
pub const STAGED_FILE_NAME: &str = "staged_script.txt";

#[derive(Debug)]
pub struct StagingStore {
    dir: PathBuf,
    path: PathBuf,
    generation: AtomicU64,
}

impl StagingStore {
    /// Stage into `dir`, creating it if absent
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, StagingError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StagingError::WriteFailure {
            path: dir.clone(),
            source,
        })?;

        let path = dir.join(STAGED_FILE_NAME);
        Ok(Self {
            dir,
            path,
            generation: AtomicU64::new(0),
        })
    }

    /// Stage under `<tmp>/scriptsocket-<pid>`
    pub fn process_scoped() -> Result<Self, StagingError> {
        Self::new(std::env::temp_dir().join(format!("scriptsocket-{}", std::process::id())))
    }

    /// Location of the staged payload; stable for the life of the store
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Number of successful writes so far
    ///
    /// A polling consumer can compare this against the value it last saw
    /// instead of re-reading the file.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Atomically replace the staged payload with `content`
    pub fn write(&self, content: &[u8]) -> Result<(), StagingError> {
        self.replace(content).map_err(|source| StagingError::WriteFailure {
            path: self.path.clone(),
            source,
        })?;

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(path = %self.path.display(), len = content.len(), generation, "Staged payload");
        Ok(())
    }

    fn replace(&self, content: &[u8]) -> io::Result<()> {
        // The directory lives under the system temp dir and may be swept.
        fs::create_dir_all(&self.dir)?;

        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(content)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|err| err.error)?;
        Ok(())
    }
}
