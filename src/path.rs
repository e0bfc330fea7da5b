// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine where devstrap keeps its own bookkeeping, and where the files
//! that setup steps touch live on the current machine.

use std::path::{Path, PathBuf};

/// Name of directory devstrap uses inside platform cache directory.
const STATE_DIR_NAME: &str = "devstrap";

/// Determine absolute path to user's home directory.
///
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if home directory path cannot be determined.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or(NoWayHome)
}

/// Determine default absolute path to state directory.
///
/// Run state, rollback sessions, configuration backups, and run-once markers
/// are all kept under `$XDG_CACHE_HOME/devstrap` (or the platform's
/// equivalent cache directory). Does not check if the path returned actually
/// exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if cache directory path cannot be determined.
pub fn default_state_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|path| path.join(STATE_DIR_NAME))
        .ok_or(NoWayHome)
}

/// Determine path to user-level font directory.
///
/// Fonts placed here are picked up without administrator rights.
pub fn user_font_dir(home: &Path) -> PathBuf {
    if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .unwrap_or_else(|| home.join("AppData").join("Local"))
            .join("Microsoft")
            .join("Windows")
            .join("Fonts")
    } else if cfg!(target_os = "macos") {
        home.join("Library").join("Fonts")
    } else {
        home.join(".local").join("share").join("fonts")
    }
}

/// Determine path to Cursor editor's user settings file.
pub fn cursor_settings_file(home: &Path) -> PathBuf {
    let base = if cfg!(target_os = "windows") {
        dirs::config_dir().unwrap_or_else(|| home.join("AppData").join("Roaming"))
    } else if cfg!(target_os = "macos") {
        home.join("Library").join("Application Support")
    } else {
        home.join(".config")
    };

    base.join("Cursor").join("User").join("settings.json")
}

/// Determine path to user's global Git configuration file.
pub fn git_config_file(home: &Path) -> PathBuf {
    home.join(".gitconfig")
}

/// No way to determine user's home or cache directory.
///
/// # See Also
///
/// - [`dirs::home_dir`](https://docs.rs/dirs/latest/dirs/fn.home_dir.html)
/// - [`dirs::cache_dir`](https://docs.rs/dirs/latest/dirs/fn.cache_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's home or cache directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;
