// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Step actions.
//!
//! A __step action__ performs the real work behind a setup step: installing
//! packages, downloading fonts, editing configuration, cloning repositories.
//! The orchestrator never looks at how an action does its work. It only sees
//! the [`ActionOutcome`]: whether the action succeeded, a human readable
//! message, and the reversible side effects the action performed, which are
//! forwarded into the rollback session.
//!
//! Every action honours preview mode (`--dry-run`) by describing what it would
//! do, and reporting success without side effects.

pub mod apps;
pub mod backup;
pub mod cursor;
pub mod devenv;
pub mod fonts;
pub mod git;
pub mod repos;
pub mod ssh;
pub mod validate;

use crate::{
    config::{ConfigError, Environment},
    marker::MarkerError,
    package::{PackageError, PackageManager},
    pool::PoolError,
    step::StepName,
    syscall::SyscallError,
};

use std::{collections::BTreeMap, error::Error, fmt::Debug, path::PathBuf};

/// Reversible side effect performed by an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideEffect {
    /// File was copied aside before being edited.
    BackedUpFile { original: PathBuf, backup: PathBuf },

    /// Package was newly installed.
    InstalledPackage {
        manager: PackageManager,
        package: String,
    },
}

/// Result of executing a step action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Action did everything it was asked to do.
    pub success: bool,

    /// Human readable summary.
    pub message: String,

    /// Reversible side effects performed, even by a failed action.
    pub side_effects: Vec<SideEffect>,
}

impl ActionOutcome {
    /// Construct successful outcome.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            side_effects: Vec::new(),
        }
    }

    /// Construct failed outcome.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            side_effects: Vec::new(),
        }
    }

    /// Attach side effects to outcome.
    pub fn with_side_effects(mut self, side_effects: impl IntoIterator<Item = SideEffect>) -> Self {
        self.side_effects.extend(side_effects);
        self
    }
}

/// Performs the work of one setup step.
pub trait StepAction {
    /// Execute action against target environment.
    ///
    /// Never fails outright. Any failure is reported through the outcome.
    fn execute(&self, env: &Environment) -> ActionOutcome;
}

impl<F> StepAction for F
where
    F: Fn(&Environment) -> ActionOutcome,
{
    fn execute(&self, env: &Environment) -> ActionOutcome {
        self(env)
    }
}

/// Mapping of steps to the actions that perform them.
#[derive(Default)]
pub struct ActionSet {
    actions: BTreeMap<StepName, Box<dyn StepAction>>,
}

impl ActionSet {
    /// Construct empty action set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Construct action set with the real action of every step.
    pub fn standard() -> Self {
        Self::new()
            .with(StepName::Validate, validate::ValidateConfig)
            .with(StepName::Backup, backup::BackupConfigs)
            .with(StepName::DevEnv, devenv::PrepareDevEnv)
            .with(StepName::Fonts, fonts::InstallFonts)
            .with(StepName::Apps, apps::InstallApps)
            .with(StepName::Git, git::ConfigureGit)
            .with(StepName::Ssh, ssh::GenerateSshKey)
            .with(StepName::Cursor, cursor::ConfigureCursor)
            .with(StepName::Repos, repos::CloneRepos)
    }

    /// Register action for step, replacing any previous one.
    pub fn with(mut self, step: StepName, action: impl StepAction + 'static) -> Self {
        self.insert(step, action);
        self
    }

    /// Register action for step, replacing any previous one.
    pub fn insert(&mut self, step: StepName, action: impl StepAction + 'static) {
        self.actions.insert(step, Box::new(action));
    }

    /// Action registered for step.
    pub fn get(&self, step: StepName) -> Option<&dyn StepAction> {
        self.actions.get(&step).map(|action| action.as_ref())
    }
}

impl Debug for ActionSet {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.debug_set().entries(self.actions.keys()).finish()
    }
}

/// Turn result of an action's internals into an outcome.
pub(crate) fn settle(result: Result<ActionOutcome>) -> ActionOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(error) => ActionOutcome::failure(error_chain(&error)),
    }
}

/// Render error with all of its sources on one line.
pub(crate) fn error_chain(error: &dyn Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

/// Step action error types.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Configuration file cannot be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// External command failed.
    #[error(transparent)]
    Syscall(#[from] SyscallError),

    /// Package manager failed.
    #[error(transparent)]
    Package(#[from] PackageError),

    /// Worker pool failed to start.
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// Run-once marker cannot be written.
    #[error(transparent)]
    Marker(#[from] MarkerError),

    /// File system operation failed.
    #[error("file system operation failed at {:?}", path.display())]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// JSON document cannot be parsed or rendered.
    #[error("invalid JSON in {:?}", path.display())]
    Json {
        #[source]
        source: serde_json::Error,
        path: PathBuf,
    },

    /// Download failed.
    #[error("failed to download {url}")]
    Fetch {
        #[source]
        source: reqwest::Error,
        url: String,
    },

    /// Download answered with non-success status.
    #[error("failed to download {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Downloaded content does not match its expected digest.
    #[error("digest mismatch for {url}: expected {expected}, got {actual}")]
    DigestMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),
}

/// Friendly result alias :3
pub type Result<T, E = ActionError> = std::result::Result<T, E>;
