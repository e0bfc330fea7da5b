// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use devstrap::{
    action::ActionSet,
    config::{Environment, Platform},
    orchestrator::{Orchestrator, RunOptions},
    package::SystemUninstaller,
    path::{default_state_dir, home_dir},
    step::{Flags, StepName},
};

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use inquire::Confirm;
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "devstrap [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<i32> {
        match self.command {
            Command::Setup(opts) => run_setup(opts),
            Command::Rollback(opts) => run_rollback(opts),
            Command::Status(opts) => run_status(opts),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Run setup steps, resuming an interrupted run.
    #[command(override_usage = "devstrap setup [options]")]
    Setup(SetupOptions),

    /// Undo side effects recorded by the latest run.
    #[command(override_usage = "devstrap rollback [options]")]
    Rollback(RollbackOptions),

    /// Show persisted run state and rollback session.
    #[command(override_usage = "devstrap status [options]")]
    Status(StatusOptions),
}

#[derive(Args, Clone, Debug)]
struct TargetOptions {
    /// Target platform instead of the detected one.
    #[arg(short, long, value_name = "platform", env = "DEVSTRAP_PLATFORM")]
    pub platform: Option<Platform>,

    /// Directory holding run state, rollback sessions, and backups.
    #[arg(long, value_name = "path", env = "DEVSTRAP_STATE_DIR")]
    pub state_dir: Option<PathBuf>,
}

impl TargetOptions {
    fn platform(&self) -> Result<Platform> {
        match self.platform {
            Some(platform) => Ok(platform),
            None => Ok(Platform::detect()?),
        }
    }

    fn state_dir(&self) -> Result<PathBuf> {
        match &self.state_dir {
            Some(path) => Ok(path.clone()),
            None => Ok(default_state_dir()?),
        }
    }

    fn environment(&self, config_dir: PathBuf) -> Result<Environment> {
        Ok(Environment::new(
            self.platform()?,
            config_dir,
            self.state_dir()?,
            home_dir()?,
        ))
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SetupOptions {
    #[command(flatten)]
    pub target: TargetOptions,

    /// Directory holding configuration files.
    #[arg(
        short,
        long,
        value_name = "path",
        env = "DEVSTRAP_CONFIG_DIR",
        default_value = "config"
    )]
    pub config_dir: PathBuf,

    /// Skip target step. May be given more than once.
    #[arg(long, value_name = "step")]
    pub skip: Vec<StepName>,

    /// Skip font installation.
    #[arg(long)]
    pub skip_fonts: bool,

    /// Skip application installation.
    #[arg(long)]
    pub skip_apps: bool,

    /// Skip Git configuration.
    #[arg(long)]
    pub skip_git: bool,

    /// Skip SSH key generation.
    #[arg(long)]
    pub skip_ssh: bool,

    /// Skip Cursor editor configuration.
    #[arg(long)]
    pub skip_cursor: bool,

    /// Skip repository cloning.
    #[arg(long)]
    pub skip_repos: bool,

    /// Run only target step.
    #[arg(long, value_name = "step", conflicts_with = "apps_only")]
    pub only: Option<StepName>,

    /// Run only application installation.
    #[arg(long)]
    pub apps_only: bool,

    /// Preview changes without applying anything.
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Do not back up configuration files.
    #[arg(long)]
    pub no_backup: bool,

    /// Resume an interrupted run (default).
    #[arg(long, conflicts_with = "no_resume")]
    pub resume: bool,

    /// Ignore any interrupted run, and start over.
    #[arg(long)]
    pub no_resume: bool,

    /// Stop at the first failed step.
    #[arg(long)]
    pub fail_fast: bool,

    /// Keep rollback session even after a clean run.
    #[arg(long)]
    pub keep_rollback: bool,

    /// Number of concurrent downloads and package queries.
    #[arg(short, long, value_name = "count")]
    pub jobs: Option<usize>,
}

impl SetupOptions {
    fn flags(&self) -> Flags {
        let mut flags = Flags::default()
            .dry_run(self.dry_run)
            .no_backup(self.no_backup);

        let toggles = [
            (self.skip_fonts, StepName::Fonts),
            (self.skip_apps, StepName::Apps),
            (self.skip_git, StepName::Git),
            (self.skip_ssh, StepName::Ssh),
            (self.skip_cursor, StepName::Cursor),
            (self.skip_repos, StepName::Repos),
        ];
        for step in self.skip.iter().copied().chain(
            toggles
                .into_iter()
                .filter(|(enabled, _)| *enabled)
                .map(|(_, step)| step),
        ) {
            flags = flags.skip(step);
        }

        if self.apps_only {
            flags = flags.only(StepName::Apps);
        } else if let Some(step) = self.only {
            flags = flags.only(step);
        }

        flags
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RollbackOptions {
    #[command(flatten)]
    pub target: TargetOptions,

    /// Do not ask for confirmation.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StatusOptions {
    #[command(flatten)]
    pub target: TargetOptions,
}

fn main() {
    let layer = fmt::layer().compact().with_target(false).without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    match run() {
        Ok(code) => exit(code),
        Err(error) => {
            error!("{error:?}");
            exit(1);
        }
    }
}

fn run() -> Result<i32> {
    Cli::parse().run()
}

fn run_setup(opts: SetupOptions) -> Result<i32> {
    let env = opts.target.environment(opts.config_dir.clone())?;
    env.ensure_config_dir()?;
    let settings = env.load_settings()?;

    let options = RunOptions {
        fail_fast: opts.fail_fast || settings.run.fail_fast,
        no_resume: opts.no_resume,
        keep_rollback: opts.keep_rollback || settings.run.keep_rollback,
    };
    let jobs = opts.jobs.unwrap_or(settings.run.jobs);
    let env = env.with_flags(opts.flags()).with_jobs(jobs);

    info!(
        "set up {} from {:?}",
        env.platform,
        env.config_dir.display()
    );
    let orchestrator = Orchestrator::new(env, ActionSet::standard()).with_options(options);
    let summary = orchestrator.run()?;
    print!("{summary}");

    if let Some(session_id) = &summary.session_id {
        info!("side effects recorded in rollback session {session_id}");
    }

    Ok(summary.exit_code())
}

fn run_rollback(opts: RollbackOptions) -> Result<i32> {
    let env = opts.target.environment(PathBuf::new())?;
    let orchestrator = Orchestrator::new(env, ActionSet::new());

    let status = orchestrator.status()?;
    let Some(session) = &status.session else {
        info!("nothing to roll back for {}", status.platform);
        return Ok(0);
    };

    if !opts.yes {
        let prompt = format!(
            "remove {} package(s) and restore {} file(s)?",
            session.installed_packages.len(),
            session.backed_up_files.len()
        );
        let confirmed = Confirm::new(&prompt)
            .with_default(false)
            .prompt()
            .map_err(|error| anyhow!("confirmation failed: {error}"))?;
        if !confirmed {
            warn!("rollback cancelled");
            return Ok(1);
        }
    }

    let Some(report) = orchestrator.rollback(&SystemUninstaller)? else {
        return Ok(0);
    };

    for record in &report.uninstalled {
        println!("removed {} ({})", record.package, record.manager);
    }
    for path in &report.restored {
        println!("restored {}", path.display());
    }
    for warning in &report.warnings {
        warn!("{warning}");
    }
    for failure in &report.failures {
        error!("{failure}");
    }

    Ok(if report.is_complete() { 0 } else { 1 })
}

fn run_status(opts: StatusOptions) -> Result<i32> {
    let env = opts.target.environment(PathBuf::new())?;
    let status = Orchestrator::new(env, ActionSet::new()).status()?;
    print!("{status}");

    Ok(0)
}
