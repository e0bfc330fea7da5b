// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration backup step.
//!
//! Copies every user configuration file that a later step edits in place
//! into a timestamped directory under the state directory:
//!
//! ```text
//! {state_dir}/backups/<platform>-<unix-secs>/
//! ├── 0-.gitconfig
//! └── 1-settings.json
//! ```
//!
//! Each copy is reported as a side effect, so a rollback can put it back.

use crate::{
    action::{settle, ActionError, ActionOutcome, Result, SideEffect, StepAction},
    config::Environment,
    path::{cursor_settings_file, git_config_file},
    persist,
};

use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

/// Back up configuration files that later steps edit.
#[derive(Debug, Default, Clone, Copy)]
pub struct BackupConfigs;

impl BackupConfigs {
    /// Files that later steps may edit in place.
    pub fn targets(env: &Environment) -> Vec<PathBuf> {
        vec![
            git_config_file(&env.home_dir),
            cursor_settings_file(&env.home_dir),
        ]
    }
}

impl StepAction for BackupConfigs {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(backup(env))
    }
}

fn backup(env: &Environment) -> Result<ActionOutcome> {
    let existing = BackupConfigs::targets(env)
        .into_iter()
        .filter(|path| path.is_file())
        .collect::<Vec<_>>();

    if existing.is_empty() {
        return Ok(ActionOutcome::success("nothing to back up"));
    }

    if env.flags.dry_run {
        let listing = existing
            .iter()
            .map(|path| path.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        return Ok(ActionOutcome::success(format!("would back up {listing}")));
    }

    let backup_dir = env
        .state_dir
        .join("backups")
        .join(format!("{}-{}", env.platform, persist::unix_secs()));
    fs::create_dir_all(&backup_dir).map_err(|source| ActionError::Io {
        source,
        path: backup_dir.clone(),
    })?;

    let (side_effects, failures) = copy_into(existing, &backup_dir);
    let outcome = if failures.is_empty() {
        ActionOutcome::success(format!(
            "backed up {} file(s) to {}",
            side_effects.len(),
            backup_dir.display()
        ))
    } else {
        ActionOutcome::failure(format!(
            "backed up {} file(s) to {}, failed: {}",
            side_effects.len(),
            backup_dir.display(),
            failures.join("; ")
        ))
    };

    Ok(outcome.with_side_effects(side_effects))
}

/// Copy each file into backup directory, prefixed with its index.
///
/// Copies that succeed are reported even when a later one fails.
fn copy_into(files: Vec<PathBuf>, backup_dir: &Path) -> (Vec<SideEffect>, Vec<String>) {
    let mut side_effects = Vec::new();
    let mut failures = Vec::new();
    for (index, original) in files.into_iter().enumerate() {
        let file_name = original
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let backup = backup_dir.join(format!("{index}-{file_name}"));
        match fs::copy(&original, &backup) {
            Ok(_) => {
                info!("backed up {:?} to {:?}", original.display(), backup.display());
                side_effects.push(SideEffect::BackedUpFile { original, backup });
            }
            Err(error) => {
                warn!("failed to back up {:?}: {error}", original.display());
                failures.push(format!("{}: {error}", original.display()));
            }
        }
    }

    (side_effects, failures)
}
