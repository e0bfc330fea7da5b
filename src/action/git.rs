// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Global Git configuration step.

use crate::{
    action::{settle, ActionOutcome, Result, StepAction},
    config::{Environment, GitConfig, GIT_FILE},
    syscall::Invocation,
};

use tracing::{debug, info};

/// Apply configured entries to the user's global Git configuration.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigureGit;

impl ConfigureGit {
    /// Command lines that apply every entry, in key order.
    pub fn invocations(config: &GitConfig) -> Vec<Invocation> {
        config
            .iter()
            .map(|(key, value)| {
                Invocation::new("git", ["config", "--global", key.as_str(), value.as_str()])
            })
            .collect()
    }
}

impl StepAction for ConfigureGit {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(configure(env))
    }
}

fn configure(env: &Environment) -> Result<ActionOutcome> {
    let config: GitConfig = env.load_json(GIT_FILE)?;
    let invocations = ConfigureGit::invocations(&config);

    for invocation in &invocations {
        if env.flags.dry_run {
            info!("would run {invocation}");
            continue;
        }

        debug!("apply {invocation}");
        invocation.run()?;
    }

    let verb = if env.flags.dry_run { "would set" } else { "set" };
    Ok(ActionOutcome::success(format!(
        "{verb} {} global git option(s)",
        invocations.len()
    )))
}
