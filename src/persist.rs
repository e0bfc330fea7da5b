// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! JSON record persistence shared by run state and rollback sessions.
//!
//! Records are written and synced to a temporary sibling file first, and then
//! renamed over the real file, so a crash mid-write leaves either the old
//! record or the new one on disk, never half of each.

use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

/// Outcome of reading a persisted record.
#[derive(Debug)]
pub(crate) enum Loaded<T> {
    Found(T),
    Missing,
    Corrupt(String),
}

/// Read JSON record at target path.
///
/// Unparsable content, including bytes that are not UTF-8, is reported as
/// [`Loaded::Corrupt`] instead of an error. Callers decide how loudly to
/// complain about it.
pub(crate) fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Loaded<T>> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Loaded::Missing),
        Err(source) => {
            return Err(PersistError::Read {
                source,
                path: path.into(),
            })
        }
    };

    match serde_json::from_slice(&data) {
        Ok(record) => Ok(Loaded::Found(record)),
        Err(error) => Ok(Loaded::Corrupt(error.to_string())),
    }
}

/// Write JSON record to target path atomically.
pub(crate) fn save_json<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| PersistError::Write {
            source,
            path: parent.into(),
        })?;
    }

    let data = serde_json::to_vec_pretty(record)?;
    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = PathBuf::from(temp_path);

    {
        let mut file = File::create(&temp_path).map_err(|source| PersistError::Write {
            source,
            path: temp_path.clone(),
        })?;
        file.write_all(&data)
            .and_then(|_| file.sync_all())
            .map_err(|source| PersistError::Write {
                source,
                path: temp_path.clone(),
            })?;
    }

    fs::rename(&temp_path, path).map_err(|source| PersistError::Write {
        source,
        path: path.into(),
    })
}

/// Remove record at target path. Absent records are fine.
pub(crate) fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistError::Remove {
            source,
            path: path.into(),
        }),
    }
}

/// Current time in seconds since Unix epoch.
pub(crate) fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}

/// Current time in milliseconds since Unix epoch.
pub(crate) fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis())
        .unwrap_or_default()
}

/// Record persistence error types.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Record cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Record cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Record cannot be removed.
    #[error("failed to remove {:?}", path.display())]
    Remove {
        #[source]
        source: io::Error,
        path: PathBuf,
    },

    /// Record cannot be serialized.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}

/// Friendly result alias :3
pub(crate) type Result<T, E = PersistError> = std::result::Result<T, E>;
