// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Setup step registry.
//!
//! A setup run is a fixed, ordered sequence of named __steps__. The order is
//! significant:
//!
//! 1. `validate` checks configuration before anything is touched.
//! 2. `backup` copies every file that later steps edit in place.
//! 3. `devenv` makes sure the platform package manager works.
//! 4. `fonts`, `apps`, `git`, `ssh`, and `cursor` do the actual setup.
//! 5. `repos` goes last, because it is the slowest and least critical.
//!
//! Whether a step runs for a given invocation is a pure function of the
//! invocation's [`Flags`], and whether the step's configuration file exists.
//! A missing configuration file disables its step instead of failing the run.

use crate::config::Environment;

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    path::PathBuf,
    str::FromStr,
};

/// Name of a setup step.
///
/// Variants are declared in execution order, so ordering of step names is
/// the order in which they run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepName {
    Validate,
    Backup,
    DevEnv,
    Fonts,
    Apps,
    Git,
    Ssh,
    Cursor,
    Repos,
}

impl StepName {
    /// All step names in execution order.
    pub const ALL: [StepName; 9] = [
        Self::Validate,
        Self::Backup,
        Self::DevEnv,
        Self::Fonts,
        Self::Apps,
        Self::Git,
        Self::Ssh,
        Self::Cursor,
        Self::Repos,
    ];

    /// Name of step as used on the command line and in state files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validate => "validate",
            Self::Backup => "backup",
            Self::DevEnv => "devenv",
            Self::Fonts => "fonts",
            Self::Apps => "apps",
            Self::Git => "git",
            Self::Ssh => "ssh",
            Self::Cursor => "cursor",
            Self::Repos => "repos",
        }
    }

    /// Check if step edits persisted user configuration in place.
    ///
    /// Such steps must never run before `backup`.
    pub fn mutates_config(&self) -> bool {
        matches!(self, Self::Git | Self::Ssh | Self::Cursor)
    }
}

impl Display for StepName {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl FromStr for StepName {
    type Err = UnknownStep;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == data)
            .ok_or_else(|| UnknownStep(data.into()))
    }
}

/// Step name not recognized.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unknown step {0:?}")]
pub struct UnknownStep(pub String);

/// Step selection and run mode flags of one invocation.
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct Flags {
    /// Steps explicitly skipped.
    pub skip: BTreeSet<StepName>,

    /// Run only this step, e.g., `--apps-only`.
    pub only: Option<StepName>,

    /// Preview changes without applying anything.
    pub dry_run: bool,

    /// Do not back up configuration files.
    pub no_backup: bool,
}

impl Flags {
    /// Skip target step.
    pub fn skip(mut self, step: StepName) -> Self {
        self.skip.insert(step);
        self
    }

    /// Run only target step.
    pub fn only(mut self, step: StepName) -> Self {
        self.only = Some(step);
        self
    }

    /// Toggle preview mode.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Toggle configuration backups off.
    pub fn no_backup(mut self, no_backup: bool) -> Self {
        self.no_backup = no_backup;
        self
    }
}

/// Reason a step will or will not run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enablement {
    /// Step runs.
    Enabled,

    /// Step was skipped through a flag.
    Skipped,

    /// Another step was selected to run alone.
    NotSelected,

    /// Step's configuration file is absent.
    MissingConfig(PathBuf),
}

impl Enablement {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }
}

/// Static description of a setup step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// Unique name of step.
    pub name: StepName,

    /// Position of step in execution sequence.
    pub order: usize,
}

/// Canonical ordered sequence of setup steps.
///
/// Read-only after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRegistry {
    steps: Vec<Step>,
}

impl Default for StepRegistry {
    fn default() -> Self {
        let steps = StepName::ALL
            .into_iter()
            .enumerate()
            .map(|(order, name)| Step { name, order })
            .collect();

        Self { steps }
    }
}

impl StepRegistry {
    /// Construct registry with canonical step sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// List all steps in execution order.
    pub fn list_steps(&self) -> &[Step] {
        &self.steps
    }

    /// Determine why target step will or will not run.
    ///
    /// Only ever checks for file existence, nothing else.
    pub fn enablement(&self, step: StepName, env: &Environment) -> Enablement {
        let flags = &env.flags;
        if let Some(only) = flags.only {
            if only != step {
                return Enablement::NotSelected;
            }
        }

        if flags.skip.contains(&step) || (step == StepName::Backup && flags.no_backup) {
            return Enablement::Skipped;
        }

        match env.config_file_for(step) {
            Some(file) => {
                let path = env.config_path(file);
                if path.is_file() {
                    Enablement::Enabled
                } else {
                    Enablement::MissingConfig(path)
                }
            }
            None => Enablement::Enabled,
        }
    }

    /// Check if target step should run.
    pub fn is_enabled(&self, step: StepName, env: &Environment) -> bool {
        self.enablement(step, env).is_enabled()
    }

    /// List steps that should run, in execution order.
    pub fn list_enabled_steps(&self, env: &Environment) -> Vec<StepName> {
        self.steps
            .iter()
            .map(|step| step.name)
            .filter(|name| self.is_enabled(*name, env))
            .collect()
    }
}
