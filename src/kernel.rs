//! Kernel program source.
//!
//! The accelerator backend compiles its kernel from source text at run
//! time. [`KernelSource`] owns that text; it is loaded once, moved into the
//! runner and dropped with it.

use crate::error::{Result, SearchError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name of the kernel entry point every program must declare.
pub const KERNEL_ENTRY: &str = "local_search";

const BUNDLED: &str = include_str!("../kernels/local_search.cu");

/// Owned kernel program text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSource {
    text: String,
    origin: Option<PathBuf>,
}

impl KernelSource {
    /// The kernel shipped with this crate.
    pub fn bundled() -> Self {
        Self {
            text: BUNDLED.to_string(),
            origin: None,
        }
    }

    /// Wraps program text held in memory.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            origin: None,
        }
    }

    /// Reads a kernel program from disk.
    ///
    /// # Errors
    /// - [`SearchError::Io`] if the file cannot be read
    /// - [`SearchError::Compile`] if the file is empty
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!(event = "kernel_load", path = %path.display());
        let text = std::fs::read_to_string(path).map_err(|e| SearchError::io(path, e))?;
        if text.trim().is_empty() {
            return Err(SearchError::Compile(format!(
                "kernel source {} is empty",
                path.display()
            )));
        }
        Ok(Self {
            text,
            origin: Some(path.to_path_buf()),
        })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// File the source was read from, if any.
    pub fn origin(&self) -> Option<&Path> {
        self.origin.as_deref()
    }

    /// `true` if the text declares a function named [`KERNEL_ENTRY`].
    pub fn declares_entry(&self) -> bool {
        self.text.match_indices(KERNEL_ENTRY).any(|(at, _)| {
            let before = self.text[..at].chars().next_back();
            let after = self.text[at + KERNEL_ENTRY.len()..].trim_start().chars().next();
            !before.is_some_and(|c| c.is_alphanumeric() || c == '_') && after == Some('(')
        })
    }
}

impl Default for KernelSource {
    fn default() -> Self {
        Self::bundled()
    }
}
