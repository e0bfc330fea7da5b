// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Rollback sessions.
//!
//! While a setup run executes, every reversible side effect it performs is
//! appended to a __rollback session__: configuration files that were backed
//! up before being edited, and packages that were newly installed. The
//! session is written to disk after every entry, so it survives a crash.
//!
//! Rolling back processes the session in reverse order of recording, i.e.,
//! the last package installed is the first package removed, and then deletes
//! the session. Individual failures do not stop a rollback; they are
//! collected into the final [`RollbackReport`].
//!
//! Rollback never reverts package upgrades, repository clones, or generated
//! SSH keys. Only what the session recorded can be undone.
//!
//! # Session Layout
//!
//! ```text
//! {state_dir}/
//! └── rollback-<platform>.json
//! ```

use crate::{
    config::Platform,
    package::{PackageError, PackageManager},
    persist::{self, Loaded, PersistError},
};

use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, instrument, warn};

/// Current rollback session record format version.
pub const ROLLBACK_SESSION_VERSION: u32 = 1;

/// Removes installed packages on behalf of a rollback.
pub trait Uninstall {
    /// Remove package through target package manager.
    fn uninstall(&self, manager: PackageManager, package: &str) -> Result<(), PackageError>;
}

/// Configuration file copied aside before being edited.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct BackupRecord {
    /// Path of file that was backed up.
    pub original: PathBuf,

    /// Path of backup copy.
    pub backup: PathBuf,
}

/// Package newly installed during run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PackageRecord {
    /// Package manager that installed package.
    pub manager: PackageManager,

    /// Package identifier.
    pub package: String,
}

/// Durable log of reversible side effects of one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RollbackSession {
    /// Record format version.
    pub version: u32,

    /// Unique session identifier.
    pub session_id: String,

    /// Platform this session belongs to.
    pub platform: Platform,

    /// Backed up files in recording order.
    pub backed_up_files: Vec<BackupRecord>,

    /// Installed packages in recording order.
    pub installed_packages: Vec<PackageRecord>,

    /// Creation time in Unix seconds.
    pub created_at: u64,

    #[serde(skip, default = "recording_enabled")]
    recording: bool,
}

fn recording_enabled() -> bool {
    true
}

impl RollbackSession {
    /// Construct new empty session.
    pub fn new(platform: Platform) -> Self {
        Self {
            version: ROLLBACK_SESSION_VERSION,
            session_id: format!("{}-{}", persist::unix_millis(), std::process::id()),
            platform,
            backed_up_files: Vec::new(),
            installed_packages: Vec::new(),
            created_at: persist::unix_secs(),
            recording: true,
        }
    }

    /// Construct session that records nothing, for preview runs.
    pub fn disabled(platform: Platform) -> Self {
        Self {
            recording: false,
            ..Self::new(platform)
        }
    }

    /// Check if session records side effects.
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Check if session recorded nothing yet.
    pub fn is_empty(&self) -> bool {
        self.backed_up_files.is_empty() && self.installed_packages.is_empty()
    }
}

/// Result of a rollback.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct RollbackReport {
    /// Packages removed, in removal order.
    pub uninstalled: Vec<PackageRecord>,

    /// Files restored from backup, in restore order.
    pub restored: Vec<PathBuf>,

    /// Entries that could not be undone, with the reason.
    pub failures: Vec<String>,

    /// Entries skipped because there was nothing to restore.
    pub warnings: Vec<String>,
}

impl RollbackReport {
    /// Check if every recorded entry was undone.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Durable storage of rollback sessions.
#[derive(Debug, Clone)]
pub struct RollbackStore {
    base_path: PathBuf,
}

impl RollbackStore {
    /// Construct new rollback store rooted at target directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Path to session record of target platform.
    pub fn session_path(&self, platform: Platform) -> PathBuf {
        self.base_path.join(format!("rollback-{platform}.json"))
    }

    /// Begin new session for target platform.
    ///
    /// Preview runs get a disabled session that is never written. Otherwise
    /// the session replaces any previous one on disk, carrying over the
    /// changes the previous session recorded and never rolled back.
    ///
    /// # Errors
    ///
    /// - Return [`RollbackError::Persist`] if previous session cannot be
    ///   read, or new session cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn start(&self, platform: Platform, preview: bool) -> Result<RollbackSession> {
        if preview {
            return Ok(RollbackSession::disabled(platform));
        }

        let mut session = RollbackSession::new(platform);
        if let Some(previous) = self.load_latest(platform)? {
            if !previous.is_empty() {
                warn!(
                    "session {} replaces {} with {} backup(s) and {} package(s) not rolled back, carrying them over",
                    session.session_id,
                    previous.session_id,
                    previous.backed_up_files.len(),
                    previous.installed_packages.len()
                );
                session.backed_up_files = previous.backed_up_files;
                session.installed_packages = previous.installed_packages;
            }
        }

        self.persist(&session)?;
        Ok(session)
    }

    /// Append backed up file to session, and persist before returning.
    ///
    /// # Errors
    ///
    /// - Return [`RollbackError::Persist`] if session cannot be written.
    pub fn record_backup(
        &self,
        session: &mut RollbackSession,
        original: impl Into<PathBuf>,
        backup: impl Into<PathBuf>,
    ) -> Result<()> {
        if !session.recording {
            return Ok(());
        }

        session.backed_up_files.push(BackupRecord {
            original: original.into(),
            backup: backup.into(),
        });
        self.persist(session)
    }

    /// Append installed package to session, and persist before returning.
    ///
    /// # Errors
    ///
    /// - Return [`RollbackError::Persist`] if session cannot be written.
    pub fn record_installed_package(
        &self,
        session: &mut RollbackSession,
        manager: PackageManager,
        package: impl Into<String>,
    ) -> Result<()> {
        if !session.recording {
            return Ok(());
        }

        session.installed_packages.push(PackageRecord {
            manager,
            package: package.into(),
        });
        self.persist(session)
    }

    /// Write session to disk. Disabled sessions are never written.
    ///
    /// # Errors
    ///
    /// - Return [`RollbackError::Persist`] if session cannot be written.
    pub fn persist(&self, session: &RollbackSession) -> Result<()> {
        if !session.recording {
            return Ok(());
        }

        Ok(persist::save_json(&self.session_path(session.platform), session)?)
    }

    /// Load latest session of target platform.
    ///
    /// Returns `Ok(None)` if there is no session. Unparsable sessions are
    /// logged and reported as absent.
    ///
    /// # Errors
    ///
    /// - Return [`RollbackError::Persist`] if session exists but cannot be read.
    #[instrument(skip(self), level = "debug")]
    pub fn load_latest(&self, platform: Platform) -> Result<Option<RollbackSession>> {
        let path = self.session_path(platform);
        match persist::load_json::<RollbackSession>(&path)? {
            Loaded::Found(session) if session.version == ROLLBACK_SESSION_VERSION => {
                Ok(Some(session))
            }
            Loaded::Found(session) => {
                warn!(
                    "ignoring rollback session {:?} with unsupported version {}",
                    path.display(),
                    session.version
                );
                Ok(None)
            }
            Loaded::Corrupt(reason) => {
                warn!("ignoring corrupt rollback session {:?} ({reason})", path.display());
                Ok(None)
            }
            Loaded::Missing => Ok(None),
        }
    }

    /// Delete session of target platform without undoing anything.
    ///
    /// # Errors
    ///
    /// - Return [`RollbackError::Persist`] if session cannot be removed.
    pub fn discard(&self, platform: Platform) -> Result<()> {
        Ok(persist::remove(&self.session_path(platform))?)
    }

    /// Undo everything recorded in session, then delete it.
    ///
    /// Packages are removed last-installed first through the uninstaller.
    /// Backups are then copied back over their originals, also in reverse.
    /// Failed removals and missing backups are reported, never fatal.
    ///
    /// # Errors
    ///
    /// - Return [`RollbackError::Persist`] if session cannot be removed.
    #[instrument(skip(self, session, uninstaller), fields(session = %session.session_id))]
    pub fn rollback(
        &self,
        session: RollbackSession,
        uninstaller: &dyn Uninstall,
    ) -> Result<RollbackReport> {
        let mut report = RollbackReport::default();

        for record in session.installed_packages.iter().rev() {
            match uninstaller.uninstall(record.manager, &record.package) {
                Ok(()) => {
                    info!("removed package {} ({})", record.package, record.manager);
                    report.uninstalled.push(record.clone());
                }
                Err(error) => {
                    warn!("failed to remove package {}: {error}", record.package);
                    report
                        .failures
                        .push(format!("remove package {}: {error}", record.package));
                }
            }
        }

        for record in session.backed_up_files.iter().rev() {
            if !record.backup.exists() {
                warn!(
                    "backup {:?} is missing, cannot restore {:?}",
                    record.backup.display(),
                    record.original.display()
                );
                report.warnings.push(format!(
                    "backup {} missing for {}",
                    record.backup.display(),
                    record.original.display()
                ));
                continue;
            }

            match restore_file(&record.backup, &record.original) {
                Ok(()) => {
                    info!("restored {:?}", record.original.display());
                    report.restored.push(record.original.clone());
                }
                Err(error) => {
                    warn!("failed to restore {:?}: {error}", record.original.display());
                    report.failures.push(format!(
                        "restore {}: {error}",
                        record.original.display()
                    ));
                }
            }
        }

        if session.recording {
            self.discard(session.platform)?;
        }

        Ok(report)
    }
}

fn restore_file(backup: &Path, original: &Path) -> std::io::Result<()> {
    if let Some(parent) = original.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(backup, original).map(|_| ())
}

/// Rollback session error types.
#[derive(Debug, thiserror::Error)]
pub enum RollbackError {
    /// Session cannot be read, written, or removed.
    #[error(transparent)]
    Persist(#[from] PersistError),
}

/// Friendly result alias :3
pub type Result<T, E = RollbackError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syscall::SyscallError;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingUninstaller {
        calls: RefCell<Vec<String>>,
        broken: Vec<String>,
    }

    impl Uninstall for RecordingUninstaller {
        fn uninstall(&self, _manager: PackageManager, package: &str) -> Result<(), PackageError> {
            self.calls.borrow_mut().push(package.into());
            if self.broken.iter().any(|name| name == package) {
                return Err(PackageError::Syscall(SyscallError::Failed {
                    command: format!("apt-get remove -y {package}"),
                    code: Some(100),
                    message: "stderr: package is locked".into(),
                }));
            }

            Ok(())
        }
    }

    fn store() -> anyhow::Result<RollbackStore> {
        Ok(RollbackStore::new(std::env::current_dir()?.join("state")))
    }

    #[sealed_test]
    fn rollback_removes_packages_in_reverse() -> anyhow::Result<()> {
        let store = store()?;
        let mut session = store.start(Platform::Ubuntu, false)?;
        for package in ["a", "b", "c"] {
            store.record_installed_package(&mut session, PackageManager::Apt, package)?;
        }

        let uninstaller = RecordingUninstaller::default();
        let report = store.rollback(session, &uninstaller)?;

        assert_eq!(uninstaller.calls.into_inner(), vec!["c", "b", "a"]);
        assert_eq!(report.uninstalled.len(), 3);
        assert!(report.is_complete());
        assert_eq!(store.load_latest(Platform::Ubuntu)?, None);

        Ok(())
    }

    #[sealed_test]
    fn rollback_continues_past_failures() -> anyhow::Result<()> {
        let store = store()?;
        let mut session = store.start(Platform::Ubuntu, false)?;
        for package in ["a", "b", "c"] {
            store.record_installed_package(&mut session, PackageManager::Apt, package)?;
        }

        let uninstaller = RecordingUninstaller {
            broken: vec!["b".into()],
            ..Default::default()
        };
        let report = store.rollback(session, &uninstaller)?;

        assert_eq!(uninstaller.calls.into_inner(), vec!["c", "b", "a"]);
        let removed = report
            .uninstalled
            .iter()
            .map(|record| record.package.as_str())
            .collect::<Vec<_>>();
        assert_eq!(removed, vec!["c", "a"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("remove package b"));
        assert!(!report.is_complete());

        Ok(())
    }

    #[sealed_test]
    fn rollback_restores_backups() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        let store = store()?;
        let original = cwd.join(".gitconfig");
        let backup = cwd.join("backup.gitconfig");
        fs::write(&backup, "[user]\n\tname = John Doe\n")?;
        fs::write(&original, "[user]\n\tname = Someone Else\n")?;

        let mut session = store.start(Platform::MacOs, false)?;
        store.record_backup(&mut session, &original, &backup)?;
        store.record_backup(&mut session, cwd.join("gone.json"), cwd.join("gone.bak"))?;

        let report = store.rollback(session, &RecordingUninstaller::default())?;

        assert_eq!(fs::read_to_string(&original)?, "[user]\n\tname = John Doe\n");
        assert_eq!(report.restored, vec![original]);
        assert_eq!(report.warnings.len(), 1);
        assert!(report.is_complete());

        Ok(())
    }

    #[sealed_test]
    fn records_are_persisted_immediately() -> anyhow::Result<()> {
        let store = store()?;
        let mut session = store.start(Platform::Arch, false)?;
        store.record_installed_package(&mut session, PackageManager::Pacman, "neovim")?;

        let loaded = RollbackStore::new(std::env::current_dir()?.join("state"))
            .load_latest(Platform::Arch)?;
        assert_eq!(loaded, Some(session));

        Ok(())
    }

    #[sealed_test]
    fn preview_session_records_nothing() -> anyhow::Result<()> {
        let store = store()?;
        let mut session = store.start(Platform::Ubuntu, true)?;
        store.record_installed_package(&mut session, PackageManager::Apt, "git")?;

        assert!(!session.is_recording());
        assert!(session.is_empty());
        assert_eq!(store.load_latest(Platform::Ubuntu)?, None);

        Ok(())
    }

    #[sealed_test]
    fn corrupt_session_reads_as_absent() -> anyhow::Result<()> {
        let store = store()?;
        fs::create_dir_all(std::env::current_dir()?.join("state"))?;
        fs::write(store.session_path(Platform::Ubuntu), "[1, 2")?;

        assert_eq!(store.load_latest(Platform::Ubuntu)?, None);

        Ok(())
    }

    #[sealed_test]
    fn non_utf8_session_reads_as_absent() -> anyhow::Result<()> {
        let store = store()?;
        fs::create_dir_all(std::env::current_dir()?.join("state"))?;
        fs::write(store.session_path(Platform::Ubuntu), [0xc3, 0x28])?;

        assert_eq!(store.load_latest(Platform::Ubuntu)?, None);

        Ok(())
    }

    #[sealed_test]
    fn new_session_carries_over_unrolled_changes() -> anyhow::Result<()> {
        let store = store()?;
        let mut first = store.start(Platform::Debian, false)?;
        store.record_installed_package(&mut first, PackageManager::Apt, "a")?;
        store.record_backup(&mut first, "/home/user/.gitconfig", "/backups/0-.gitconfig")?;

        let mut second = store.start(Platform::Debian, false)?;
        store.record_installed_package(&mut second, PackageManager::Apt, "b")?;

        let loaded = store
            .load_latest(Platform::Debian)?
            .ok_or_else(|| anyhow::anyhow!("session missing"))?;
        let packages = loaded
            .installed_packages
            .iter()
            .map(|record| record.package.as_str())
            .collect::<Vec<_>>();
        assert_eq!(packages, vec!["a", "b"]);
        assert_eq!(loaded.backed_up_files.len(), 1);
        assert_eq!(loaded.session_id, second.session_id);

        Ok(())
    }
}
