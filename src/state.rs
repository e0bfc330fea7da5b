// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resumable run state.
//!
//! Every setup run keeps a __run state__ record that tracks which steps have
//! completed, and which have failed. The record is written to disk after every
//! step, so an interrupted run can be resumed later without repeating work
//! that already finished.
//!
//! # State Layout
//!
//! ```text
//! {state_dir}/
//! └── state-<platform>.json
//! ```
//!
//! There is exactly one record per platform. A record that cannot be parsed
//! is treated as if it did not exist: resuming is a convenience, so starting
//! over from scratch is always an acceptable fallback.
//!
//! # Step Transitions
//!
//! A step starts out `pending`, and moves to either `complete` or `failed`.
//! Failed steps are eligible to run again, and may then complete. A complete
//! step never moves back.

use crate::{
    config::Platform,
    persist::{self, Loaded, PersistError},
    step::StepName,
};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
};
use tracing::{debug, instrument, warn};

/// Current run state record format version.
pub const RUN_STATE_VERSION: u32 = 1;

/// Completion status of a single step.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    #[default]
    Pending,
    Complete,
    Failed,
}

impl StepStatus {
    /// Check if step with this status should be run.
    ///
    /// Failed steps are retried just like pending ones.
    pub fn is_runnable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl Display for StepStatus {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Failed => "failed",
        })
    }
}

/// Resumable record of one setup run for one platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunState {
    /// Record format version.
    pub version: u32,

    /// Platform this run targets.
    pub platform: Platform,

    /// Status of every step.
    pub steps: BTreeMap<StepName, StepStatus>,

    /// Creation time in Unix seconds.
    pub created_at: u64,

    /// Last update time in Unix seconds.
    pub updated_at: u64,
}

impl RunState {
    /// Construct new run state with every step pending.
    pub fn new(platform: Platform) -> Self {
        let now = persist::unix_secs();
        Self {
            version: RUN_STATE_VERSION,
            platform,
            steps: StepName::ALL
                .into_iter()
                .map(|step| (step, StepStatus::Pending))
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Status of target step.
    pub fn status(&self, step: StepName) -> StepStatus {
        self.steps.get(&step).copied().unwrap_or_default()
    }

    /// Check if target step already completed.
    pub fn is_complete(&self, step: StepName) -> bool {
        self.status(step) == StepStatus::Complete
    }

    /// List steps that failed.
    pub fn failed_steps(&self) -> Vec<StepName> {
        self.steps
            .iter()
            .filter(|(_, status)| **status == StepStatus::Failed)
            .map(|(step, _)| *step)
            .collect()
    }

    /// Move target step to new status in memory.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::InvalidTransition`] for any transition out of
    ///   `complete`, or back to `pending`.
    pub fn transition(&mut self, step: StepName, to: StepStatus) -> Result<()> {
        let from = self.status(step);
        let allowed = match (from, to) {
            (StepStatus::Pending | StepStatus::Failed, StepStatus::Complete) => true,
            (StepStatus::Pending | StepStatus::Failed, StepStatus::Failed) => true,
            (StepStatus::Complete, StepStatus::Complete) => true,
            _ => false,
        };

        if !allowed {
            return Err(StateError::InvalidTransition { step, from, to });
        }

        self.steps.insert(step, to);
        self.updated_at = persist::unix_secs();

        Ok(())
    }
}

/// Durable storage of run state records.
#[derive(Debug, Clone)]
pub struct StateStore {
    base_path: PathBuf,
}

impl StateStore {
    /// Construct new state store rooted at target directory.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Base directory of store.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Path to run state record of target platform.
    pub fn state_path(&self, platform: Platform) -> PathBuf {
        self.base_path.join(format!("state-{platform}.json"))
    }

    /// Load persisted run state of target platform.
    ///
    /// Returns `Ok(None)` if no prior run exists. Records that cannot be
    /// parsed, or that carry an unknown format version, are logged and
    /// reported as absent.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Persist`] if record exists but cannot be read.
    #[instrument(skip(self), level = "debug")]
    pub fn load(&self, platform: Platform) -> Result<Option<RunState>> {
        let path = self.state_path(platform);
        match persist::load_json::<RunState>(&path)? {
            Loaded::Found(state) if state.version == RUN_STATE_VERSION => {
                debug!("loaded run state from {:?}", path.display());
                Ok(Some(state))
            }
            Loaded::Found(state) => {
                warn!(
                    "ignoring run state {:?} with unsupported version {}, starting fresh",
                    path.display(),
                    state.version
                );
                Ok(None)
            }
            Loaded::Corrupt(reason) => {
                warn!(
                    "ignoring corrupt run state {:?} ({reason}), starting fresh",
                    path.display()
                );
                Ok(None)
            }
            Loaded::Missing => Ok(None),
        }
    }

    /// Create and persist fresh run state for target platform.
    ///
    /// Overwrites any existing record.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Persist`] if record cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub fn create(&self, platform: Platform) -> Result<RunState> {
        let state = RunState::new(platform);
        self.save(&state)?;
        Ok(state)
    }

    /// Persist run state record.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Persist`] if record cannot be written.
    pub fn save(&self, state: &RunState) -> Result<()> {
        Ok(persist::save_json(&self.state_path(state.platform), state)?)
    }

    /// Mark step complete, and persist before returning.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::InvalidTransition`] if step cannot complete.
    /// - Return [`StateError::Persist`] if record cannot be written.
    pub fn mark_complete(&self, state: &mut RunState, step: StepName) -> Result<()> {
        state.transition(step, StepStatus::Complete)?;
        self.save(state)
    }

    /// Mark step failed, and persist before returning.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::InvalidTransition`] if step already completed.
    /// - Return [`StateError::Persist`] if record cannot be written.
    pub fn mark_failed(&self, state: &mut RunState, step: StepName) -> Result<()> {
        state.transition(step, StepStatus::Failed)?;
        self.save(state)
    }

    /// Check if step already completed in target run state.
    pub fn is_complete(&self, state: &RunState, step: StepName) -> bool {
        state.is_complete(step)
    }

    /// Delete persisted run state of target platform.
    ///
    /// # Errors
    ///
    /// - Return [`StateError::Persist`] if record cannot be removed.
    #[instrument(skip(self), level = "debug")]
    pub fn clear(&self, platform: Platform) -> Result<()> {
        Ok(persist::remove(&self.state_path(platform))?)
    }
}

/// Run state error types.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Record cannot be read, written, or removed.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// Step cannot move between given statuses.
    #[error("step {step} cannot move from {from} to {to}")]
    InvalidTransition {
        step: StepName,
        from: StepStatus,
        to: StepStatus,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StateError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use std::fs;

    fn store() -> anyhow::Result<StateStore> {
        Ok(StateStore::new(std::env::current_dir()?.join("state")))
    }

    #[sealed_test]
    fn load_without_prior_run() -> anyhow::Result<()> {
        assert_eq!(store()?.load(Platform::Ubuntu)?, None);
        Ok(())
    }

    #[sealed_test]
    fn create_marks_every_step_pending() -> anyhow::Result<()> {
        let store = store()?;
        let state = store.create(Platform::Ubuntu)?;
        for step in StepName::ALL {
            assert_eq!(state.status(step), StepStatus::Pending);
        }
        assert_eq!(store.load(Platform::Ubuntu)?, Some(state));

        Ok(())
    }

    #[sealed_test]
    fn marks_are_durable() -> anyhow::Result<()> {
        let store = store()?;
        let mut state = store.create(Platform::MacOs)?;
        store.mark_complete(&mut state, StepName::Validate)?;
        store.mark_failed(&mut state, StepName::Fonts)?;

        // Fresh store instance to rule out in-memory caching.
        let loaded = StateStore::new(store.base_path())
            .load(Platform::MacOs)?
            .ok_or_else(|| anyhow::anyhow!("state missing"))?;
        assert!(loaded.is_complete(StepName::Validate));
        assert_eq!(loaded.status(StepName::Fonts), StepStatus::Failed);
        assert_eq!(loaded.status(StepName::Apps), StepStatus::Pending);
        assert_eq!(loaded.failed_steps(), vec![StepName::Fonts]);

        Ok(())
    }

    #[sealed_test]
    fn corrupt_state_reads_as_absent() -> anyhow::Result<()> {
        let store = store()?;
        fs::create_dir_all(store.base_path())?;
        fs::write(store.state_path(Platform::Ubuntu), "{ not json")?;

        assert_eq!(store.load(Platform::Ubuntu)?, None);

        let state = store.create(Platform::Ubuntu)?;
        assert_eq!(store.load(Platform::Ubuntu)?, Some(state));

        Ok(())
    }

    #[sealed_test]
    fn non_utf8_state_reads_as_absent() -> anyhow::Result<()> {
        let store = store()?;
        fs::create_dir_all(store.base_path())?;
        fs::write(store.state_path(Platform::Ubuntu), [0xff, 0xfe, 0x00, 0x7b])?;

        assert_eq!(store.load(Platform::Ubuntu)?, None);

        Ok(())
    }

    #[sealed_test]
    fn unknown_version_reads_as_absent() -> anyhow::Result<()> {
        let store = store()?;
        let mut state = RunState::new(Platform::Arch);
        state.version = RUN_STATE_VERSION + 1;
        store.save(&state)?;

        assert_eq!(store.load(Platform::Arch)?, None);

        Ok(())
    }

    #[sealed_test]
    fn clear_removes_state() -> anyhow::Result<()> {
        let store = store()?;
        store.create(Platform::Ubuntu)?;
        store.clear(Platform::Ubuntu)?;
        assert_eq!(store.load(Platform::Ubuntu)?, None);

        // Clearing twice is harmless.
        store.clear(Platform::Ubuntu)?;

        Ok(())
    }

    #[sealed_test]
    fn platforms_do_not_share_state() -> anyhow::Result<()> {
        let store = store()?;
        let mut ubuntu = store.create(Platform::Ubuntu)?;
        store.mark_complete(&mut ubuntu, StepName::Apps)?;
        store.create(Platform::Fedora)?;

        let loaded = store.load(Platform::Ubuntu)?.map(|state| state.is_complete(StepName::Apps));
        assert_eq!(loaded, Some(true));

        Ok(())
    }

    #[test]
    fn transitions() {
        let mut state = RunState::new(Platform::Windows);

        // Retry after failure.
        assert!(state.transition(StepName::Apps, StepStatus::Failed).is_ok());
        assert!(state.transition(StepName::Apps, StepStatus::Failed).is_ok());
        assert!(state.transition(StepName::Apps, StepStatus::Complete).is_ok());

        // Never back out of complete.
        assert!(matches!(
            state.transition(StepName::Apps, StepStatus::Failed),
            Err(StateError::InvalidTransition { .. })
        ));
        assert!(matches!(
            state.transition(StepName::Apps, StepStatus::Pending),
            Err(StateError::InvalidTransition { .. })
        ));
        assert!(state.is_complete(StepName::Apps));
    }
}
