// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Run-once markers.
//!
//! Pre-install and post-install commands from an application listing must
//! run only once per machine, not once per setup run. After a command
//! succeeds, an empty marker file named after the SHA-256 digest of the
//! command text is dropped into the marker directory. Markers outlive run
//! state: a clean run clears its run state, but keeps its markers.
//!
//! # Marker Layout
//!
//! ```text
//! {state_dir}/
//! └── markers-<platform>/
//!     └── <sha256-of-command>
//! ```

use crate::config::Platform;

use sha2::{Digest, Sha256};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Append-and-check store of commands that already ran.
#[derive(Debug, Clone)]
pub struct MarkerStore {
    marker_dir: PathBuf,
}

impl MarkerStore {
    /// Construct marker store for target platform under state directory.
    pub fn new(state_dir: impl AsRef<Path>, platform: Platform) -> Self {
        Self {
            marker_dir: state_dir.as_ref().join(format!("markers-{platform}")),
        }
    }

    /// Path of marker file for command.
    pub fn marker_path(&self, command: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(command.as_bytes());
        self.marker_dir.join(hex::encode(hasher.finalize()))
    }

    /// Check if command already ran.
    pub fn is_marked(&self, command: &str) -> bool {
        self.marker_path(command).exists()
    }

    /// Record that command ran.
    ///
    /// # Errors
    ///
    /// - Return [`MarkerError::Write`] if marker cannot be written.
    pub fn mark(&self, command: &str) -> Result<()> {
        let path = self.marker_path(command);
        fs::create_dir_all(&self.marker_dir)
            .and_then(|_| fs::write(&path, command))
            .map_err(|source| MarkerError::Write { source, path })
    }
}

/// Marker store error types.
#[derive(Debug, thiserror::Error)]
pub enum MarkerError {
    /// Marker file cannot be written.
    #[error("failed to write marker {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = MarkerError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use sealed_test::prelude::*;

    #[sealed_test]
    fn mark_then_check() -> anyhow::Result<()> {
        let store = MarkerStore::new(std::env::current_dir()?, Platform::Fedora);
        assert!(!store.is_marked("rustup default stable"));

        store.mark("rustup default stable")?;
        assert!(store.is_marked("rustup default stable"));
        assert!(!store.is_marked("rustup default nightly"));

        Ok(())
    }

    #[sealed_test]
    fn markers_are_per_platform() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        MarkerStore::new(&cwd, Platform::Fedora).mark("echo hi")?;
        assert!(!MarkerStore::new(&cwd, Platform::Arch).is_marked("echo hi"));

        Ok(())
    }
}
