//! Content providers for the send command
//!
//! The command line has no selection to serialize, so content comes from a
//! file or from standard input instead.

use std::io::{self, Read};
use std::path::PathBuf;

use scriptsocket_core::ContentProvider;

/// Reads the whole file on every request
#[derive(Debug, Clone)]
pub struct FileContent {
    path: PathBuf,
}

impl FileContent {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ContentProvider for FileContent {
    fn selected_content(&self) -> io::Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| {
            io::Error::new(e.kind(), format!("{}: {}", self.path.display(), e))
        })
    }
}

/// Reads standard input to the end
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinContent;

impl ContentProvider for StdinContent {
    fn selected_content(&self) -> io::Result<String> {
        let mut text = String::new();
        io::stdin().lock().read_to_string(&mut text)?;
        Ok(text)
    }
}
