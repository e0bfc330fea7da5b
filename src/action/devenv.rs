// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Development environment preparation step.

use crate::{
    action::{settle, ActionOutcome, Result, StepAction},
    config::Environment,
    package::PackageManager,
};

use tracing::info;

/// Make sure the platform package manager works, and refresh its index.
#[derive(Debug, Default, Clone, Copy)]
pub struct PrepareDevEnv;

impl StepAction for PrepareDevEnv {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(prepare(env))
    }
}

fn prepare(env: &Environment) -> Result<ActionOutcome> {
    let manager = PackageManager::for_platform(env.platform);

    if env.flags.dry_run {
        return Ok(ActionOutcome::success(format!(
            "would run {}",
            manager.update_invocation()
        )));
    }

    if !manager.is_available() {
        return Ok(ActionOutcome::failure(format!(
            "package manager {manager} is not available, install it first"
        )));
    }

    info!("refresh package index through {manager}");
    manager.update()?;

    Ok(ActionOutcome::success(format!(
        "{manager} is ready and its index is up to date"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Platform, step::Flags};
    use pretty_assertions::assert_eq;

    #[test]
    fn dry_run_describes_index_refresh() {
        let env = Environment::new(Platform::Fedora, "/config", "/state", "/home/blah")
            .with_flags(Flags::default().dry_run(true));

        assert_eq!(
            PrepareDevEnv.execute(&env),
            ActionOutcome::success("would run sudo dnf makecache")
        );
    }
}
