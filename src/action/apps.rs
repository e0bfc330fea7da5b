// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Application installation step.
//!
//! Installing applications happens in four phases:
//!
//! 1. Run every `preInstall` command that has not run on this machine yet.
//! 2. Ask the package manager which packages are already installed, through
//!    the worker pool.
//! 3. Install the missing packages through the worker pool, bounded by what
//!    the package manager tolerates at once.
//! 4. Run every `postInstall` command that has not run yet, but only when all
//!    installs went through.
//!
//! Each package that gets newly installed is reported as a side effect, even
//! when other installs fail, so a rollback can remove exactly what this step
//! added.

use crate::{
    action::{error_chain, settle, ActionOutcome, Result, SideEffect, StepAction},
    config::{apps_file, AppsConfig, Environment},
    marker::MarkerStore,
    package::PackageManager,
    pool,
    syscall::Invocation,
};

use tracing::{debug, info, warn};

/// Install the platform's application listing.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstallApps;

impl StepAction for InstallApps {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(install(env))
    }
}

fn install(env: &Environment) -> Result<ActionOutcome> {
    let config: AppsConfig = env.load_json(apps_file(env.platform))?;
    let manager = PackageManager::for_platform(env.platform);
    let markers = MarkerStore::new(&env.state_dir, env.platform);
    let dry_run = env.flags.dry_run;

    if let Some(outcome) = run_once(&markers, &config.pre_install, "pre-install", dry_run)? {
        return Ok(outcome);
    }

    let checked = pool::run_bounded(config.packages.clone(), env.jobs, |package| async move {
        let installed = manager.is_installed(&package).await;
        (package, installed)
    })?;

    let mut missing = Vec::new();
    let mut failures = Vec::new();
    let mut present = 0;
    for (package, installed) in checked {
        match installed {
            Ok(true) => {
                debug!("{package} is already installed");
                present += 1;
            }
            Ok(false) => missing.push(package),
            Err(error) => {
                warn!("cannot check {package}: {}", error_chain(&error));
                failures.push(package);
            }
        }
    }

    // INVARIANT: Install in listing order when the manager installs serially.
    missing.sort_by_key(|package| config.packages.iter().position(|name| name == package));

    if dry_run {
        let pending = run_once_preview(&markers, &config.post_install);
        return Ok(ActionOutcome::success(format!(
            "would install {} package(s) with {manager}{}{}",
            missing.len(),
            listing(&missing),
            pending
        )));
    }

    let installed = pool::run_bounded(
        missing.clone(),
        manager.install_parallelism(env.jobs),
        |package| async move {
            let result = manager.install(&package).await;
            (package, result)
        },
    )?;

    let mut side_effects = Vec::new();
    for (package, result) in installed {
        match result {
            Ok(()) => {
                info!("installed {package}");
                side_effects.push(SideEffect::InstalledPackage { manager, package });
            }
            Err(error) => {
                warn!("failed to install {package}: {}", error_chain(&error));
                failures.push(package);
            }
        }
    }

    let summary = format!(
        "{} package(s) installed, {present} already present",
        side_effects.len()
    );

    if !failures.is_empty() {
        failures.sort();
        warn!("skip post-install commands because some packages failed");
        return Ok(ActionOutcome::failure(format!(
            "{summary}, failed: {}",
            failures.join(", ")
        ))
        .with_side_effects(side_effects));
    }

    if let Some(outcome) = run_once(&markers, &config.post_install, "post-install", false)? {
        return Ok(outcome.with_side_effects(side_effects));
    }

    Ok(ActionOutcome::success(summary).with_side_effects(side_effects))
}

/// Run commands that have not run before, marking each one that succeeds.
///
/// Returns a failed outcome for the first command that fails.
fn run_once(
    markers: &MarkerStore,
    commands: &[String],
    phase: &str,
    dry_run: bool,
) -> Result<Option<ActionOutcome>> {
    for command in commands {
        if markers.is_marked(command) {
            debug!("{phase} command already ran: {command}");
            continue;
        }

        if dry_run {
            info!("would run {phase} command: {command}");
            continue;
        }

        info!("run {phase} command: {command}");
        if let Err(error) = Invocation::shell(command.as_str()).run() {
            return Ok(Some(ActionOutcome::failure(format!(
                "{phase} command failed: {}",
                error_chain(&error)
            ))));
        }
        markers.mark(command)?;
    }

    Ok(None)
}

fn run_once_preview(markers: &MarkerStore, commands: &[String]) -> String {
    let pending = commands
        .iter()
        .filter(|command| !markers.is_marked(command))
        .count();
    if pending == 0 {
        String::new()
    } else {
        format!(", then {pending} post-install command(s)")
    }
}

fn listing(packages: &[String]) -> String {
    if packages.is_empty() {
        String::new()
    } else {
        format!(": {}", packages.join(", "))
    }
}
