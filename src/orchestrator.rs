// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Setup run orchestration.
//!
//! The __orchestrator__ drives the ordered setup steps for one platform. For
//! every step in registry order it decides whether to skip the step, because
//! it is disabled or already complete from an earlier run, or to invoke the
//! step's action. Whatever the action reports is bookkept immediately: the
//! step's status goes into the run state, and its side effects go into the
//! rollback session.
//!
//! # Run Phases
//!
//! ```text
//! NotStarted -> Running -> Completed
//!                       -> Failed
//!                       -> AwaitingResume (interrupted, implicit)
//! ```
//!
//! A failed step does not stop the run by default. The run still reaches
//! `Completed`, and the summary lists which steps failed. Those steps are
//! retried on the next invocation. Only in fail-fast mode does the first
//! failed step end the run as `Failed`.
//!
//! Bookkeeping is the one thing that is never best-effort. If run state or
//! the rollback session cannot be written, then the run is aborted with an
//! error, because resuming from unreliable state is worse than not resuming.

use crate::{
    action::{ActionOutcome, ActionSet, SideEffect},
    config::{ConfigError, Environment, Platform},
    rollback::{RollbackError, RollbackReport, RollbackSession, RollbackStore, Uninstall},
    state::{RunState, StateError, StateStore, StepStatus},
    step::{Enablement, StepName, StepRegistry},
};

use std::fmt::{Display, Formatter, Result as FmtResult};
use tracing::{debug, error, info, instrument, warn};

/// Phase of a setup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// No run has happened yet.
    NotStarted,

    /// Steps are being executed.
    Running,

    /// An earlier run was interrupted or left failed steps behind.
    AwaitingResume,

    /// Every enabled step was attempted.
    Completed,

    /// Run stopped at a failed step in fail-fast mode.
    Failed,
}

impl Display for RunPhase {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::NotStarted => "not started",
            Self::Running => "running",
            Self::AwaitingResume => "awaiting resume",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// What happened to one step during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Step is not enabled for this invocation.
    SkippedDisabled,

    /// Step completed in an earlier run.
    SkippedComplete,

    /// Step action succeeded.
    Succeeded,

    /// Step action failed.
    Failed,

    /// Run stopped before reaching step.
    NotRun,
}

impl Display for StepOutcome {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(match self {
            Self::SkippedDisabled => "Skipped (disabled)",
            Self::SkippedComplete => "Skipped (already complete)",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed (see log)",
            Self::NotRun => "Not run",
        })
    }
}

/// Per-step line of a run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub step: StepName,
    pub outcome: StepOutcome,
    pub message: String,
}

impl StepReport {
    fn new(step: StepName, outcome: StepOutcome, message: impl Into<String>) -> Self {
        Self {
            step,
            outcome,
            message: message.into(),
        }
    }
}

/// End-of-run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Platform run targeted.
    pub platform: Platform,

    /// Final phase of run.
    pub phase: RunPhase,

    /// One report per registered step, in execution order.
    pub steps: Vec<StepReport>,

    /// Rollback session that recorded this run's side effects, if any.
    pub session_id: Option<String>,

    /// Run was a preview.
    pub dry_run: bool,
}

impl RunSummary {
    /// Outcome of target step.
    pub fn outcome(&self, step: StepName) -> Option<StepOutcome> {
        self.steps
            .iter()
            .find(|report| report.step == step)
            .map(|report| report.outcome)
    }

    /// Steps whose action failed.
    pub fn failed_steps(&self) -> Vec<StepName> {
        self.steps
            .iter()
            .filter(|report| report.outcome == StepOutcome::Failed)
            .map(|report| report.step)
            .collect()
    }

    /// Steps whose action was invoked.
    pub fn invoked_steps(&self) -> Vec<StepName> {
        self.steps
            .iter()
            .filter(|report| matches!(report.outcome, StepOutcome::Succeeded | StepOutcome::Failed))
            .map(|report| report.step)
            .collect()
    }

    /// Process exit code for run.
    ///
    /// A completed run exits cleanly even when some steps failed.
    pub fn exit_code(&self) -> i32 {
        match self.phase {
            RunPhase::Failed => 1,
            _ => 0,
        }
    }
}

impl Display for RunSummary {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let preview = if self.dry_run { " (dry run)" } else { "" };
        writeln!(fmt, "setup {} for {}{preview}:", self.phase, self.platform)?;
        for report in &self.steps {
            write!(fmt, "  {:<10}{}", report.step.as_str(), report.outcome)?;
            if report.outcome == StepOutcome::Failed && !report.message.is_empty() {
                write!(fmt, ": {}", report.message)?;
            }
            writeln!(fmt)?;
        }

        if !self.failed_steps().is_empty() && !self.dry_run {
            writeln!(
                fmt,
                "run setup again to retry failed steps, or run rollback to undo recorded changes"
            )?;
        }

        Ok(())
    }
}

/// Persisted bookkeeping of one platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    /// Platform inspected.
    pub platform: Platform,

    /// Current phase, `AwaitingResume` if run state exists.
    pub phase: RunPhase,

    /// Persisted run state.
    pub state: Option<RunState>,

    /// Latest rollback session.
    pub session: Option<RollbackSession>,
}

impl Display for StatusReport {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "{}: {}", self.platform, self.phase)?;
        if let Some(state) = &self.state {
            for (step, status) in &state.steps {
                writeln!(fmt, "  {:<10}{status}", step.as_str())?;
            }
        }

        match &self.session {
            Some(session) => writeln!(
                fmt,
                "rollback session {}: {} package(s), {} backup(s)",
                session.session_id,
                session.installed_packages.len(),
                session.backed_up_files.len()
            ),
            None => writeln!(fmt, "no rollback session"),
        }
    }
}

/// Run behavior toggles.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Stop at first failed step.
    pub fail_fast: bool,

    /// Ignore persisted run state, and start over.
    pub no_resume: bool,

    /// Keep rollback session even after a clean run.
    pub keep_rollback: bool,
}

/// Drives setup steps for one environment.
#[derive(Debug)]
pub struct Orchestrator {
    env: Environment,
    registry: StepRegistry,
    actions: ActionSet,
    state_store: StateStore,
    rollback_store: RollbackStore,
    options: RunOptions,
}

impl Orchestrator {
    /// Construct orchestrator keeping its bookkeeping in the environment's
    /// state directory.
    pub fn new(env: Environment, actions: ActionSet) -> Self {
        Self {
            state_store: StateStore::new(&env.state_dir),
            rollback_store: RollbackStore::new(&env.state_dir),
            registry: StepRegistry::new(),
            env,
            actions,
            options: RunOptions::default(),
        }
    }

    /// Replace run behavior toggles.
    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn state_store(&self) -> &StateStore {
        &self.state_store
    }

    pub fn rollback_store(&self) -> &RollbackStore {
        &self.rollback_store
    }

    /// Run every enabled step that is not complete yet.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestratorError::Config`] if configuration directory is
    ///   missing.
    /// - Return [`OrchestratorError::State`] if run state cannot be written.
    /// - Return [`OrchestratorError::Rollback`] if rollback session cannot be
    ///   written.
    #[instrument(skip(self), fields(platform = %self.env.platform), level = "debug")]
    pub fn run(&self) -> Result<RunSummary> {
        let platform = self.env.platform;
        let preview = self.env.flags.dry_run;
        self.env.ensure_config_dir()?;

        let (mut state, resuming) = self.prepare_state()?;
        let mut session = self.prepare_session(resuming)?;
        debug!("run phase {} -> {}", RunPhase::NotStarted, RunPhase::Running);

        let mut reports = Vec::new();
        let mut stopped = false;
        for step in self.registry.list_steps() {
            let name = step.name;
            if stopped {
                reports.push(StepReport::new(name, StepOutcome::NotRun, ""));
                continue;
            }

            match self.registry.enablement(name, &self.env) {
                Enablement::Enabled => {}
                Enablement::MissingConfig(path) => {
                    warn!("skip {name}: no configuration file at {:?}", path.display());
                    reports.push(StepReport::new(name, StepOutcome::SkippedDisabled, ""));
                    continue;
                }
                reason => {
                    debug!("skip {name}: {reason:?}");
                    reports.push(StepReport::new(name, StepOutcome::SkippedDisabled, ""));
                    continue;
                }
            }

            if self.state_store.is_complete(&state, name) {
                info!("skip {name}: already complete");
                reports.push(StepReport::new(name, StepOutcome::SkippedComplete, ""));
                continue;
            }

            info!("run step {name}");
            let outcome = match self.actions.get(name) {
                Some(action) => action.execute(&self.env),
                None => ActionOutcome::failure(format!("no action registered for {name}")),
            };

            for effect in &outcome.side_effects {
                self.record(&mut session, effect)?;
            }

            if outcome.success {
                info!("step {name} succeeded: {}", outcome.message);
                self.mark(&mut state, name, StepStatus::Complete)?;
                reports.push(StepReport::new(name, StepOutcome::Succeeded, outcome.message));
            } else {
                error!("step {name} failed: {}", outcome.message);
                self.mark(&mut state, name, StepStatus::Failed)?;
                reports.push(StepReport::new(name, StepOutcome::Failed, outcome.message));
                stopped = self.options.fail_fast;
            }
        }

        let phase = if stopped {
            RunPhase::Failed
        } else {
            RunPhase::Completed
        };
        debug!("run phase {} -> {phase}", RunPhase::Running);

        let mut discarded = false;
        if phase == RunPhase::Completed && state.failed_steps().is_empty() && !preview {
            info!("clean run, clear run state");
            self.state_store.clear(platform)?;
            if !self.options.keep_rollback {
                self.rollback_store.discard(platform)?;
                discarded = true;
            }
        }

        let session_id = (session.is_recording() && !discarded).then(|| session.session_id.clone());

        Ok(RunSummary {
            platform,
            phase,
            steps: reports,
            session_id,
            dry_run: preview,
        })
    }

    /// Undo everything recorded in the latest rollback session.
    ///
    /// Run state is cleared afterwards, so the next run starts from scratch
    /// instead of skipping steps whose effects were just undone.
    ///
    /// Returns `Ok(None)` if there is nothing to roll back.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestratorError::Rollback`] if session cannot be read or
    ///   removed.
    /// - Return [`OrchestratorError::State`] if run state cannot be removed.
    #[instrument(skip(self, uninstaller), fields(platform = %self.env.platform))]
    pub fn rollback(&self, uninstaller: &dyn Uninstall) -> Result<Option<RollbackReport>> {
        let platform = self.env.platform;
        let Some(session) = self.rollback_store.load_latest(platform)? else {
            info!("no rollback session for {platform}");
            return Ok(None);
        };

        info!("roll back session {}", session.session_id);
        let report = self.rollback_store.rollback(session, uninstaller)?;
        self.state_store.clear(platform)?;

        Ok(Some(report))
    }

    /// Inspect persisted bookkeeping without changing it.
    ///
    /// # Errors
    ///
    /// - Return [`OrchestratorError::State`] if run state cannot be read.
    /// - Return [`OrchestratorError::Rollback`] if session cannot be read.
    pub fn status(&self) -> Result<StatusReport> {
        let platform = self.env.platform;
        let state = self.state_store.load(platform)?;
        let session = self.rollback_store.load_latest(platform)?;
        let phase = if state.is_some() {
            RunPhase::AwaitingResume
        } else {
            RunPhase::NotStarted
        };

        Ok(StatusReport {
            platform,
            phase,
            state,
            session,
        })
    }

    fn prepare_state(&self) -> Result<(RunState, bool)> {
        let platform = self.env.platform;
        let existing = if self.options.no_resume {
            info!("ignore any earlier run state for {platform}");
            None
        } else {
            self.state_store.load(platform)?
        };

        match existing {
            Some(state) => {
                info!("resume earlier run for {platform}");
                Ok((state, true))
            }
            None if self.env.flags.dry_run => Ok((RunState::new(platform), false)),
            None => Ok((self.state_store.create(platform)?, false)),
        }
    }

    fn prepare_session(&self, resuming: bool) -> Result<RollbackSession> {
        let platform = self.env.platform;
        if self.env.flags.dry_run {
            return Ok(self.rollback_store.start(platform, true)?);
        }

        if resuming {
            if let Some(session) = self.rollback_store.load_latest(platform)? {
                debug!("continue rollback session {}", session.session_id);
                return Ok(session);
            }
        }

        Ok(self.rollback_store.start(platform, false)?)
    }

    fn record(&self, session: &mut RollbackSession, effect: &SideEffect) -> Result<()> {
        match effect {
            SideEffect::BackedUpFile { original, backup } => {
                self.rollback_store.record_backup(session, original, backup)?
            }
            SideEffect::InstalledPackage { manager, package } => self
                .rollback_store
                .record_installed_package(session, *manager, package.as_str())?,
        }

        Ok(())
    }

    fn mark(&self, state: &mut RunState, step: StepName, status: StepStatus) -> Result<()> {
        if self.env.flags.dry_run {
            state.transition(step, status)?;
            return Ok(());
        }

        match status {
            StepStatus::Complete => self.state_store.mark_complete(state, step)?,
            _ => self.state_store.mark_failed(state, step)?,
        }

        Ok(())
    }
}

/// Orchestrator error types.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Configuration directory is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Run state bookkeeping failed.
    #[error(transparent)]
    State(#[from] StateError),

    /// Rollback session bookkeeping failed.
    #[error(transparent)]
    Rollback(#[from] RollbackError),
}

/// Friendly result alias :3
pub type Result<T, E = OrchestratorError> = std::result::Result<T, E>;
