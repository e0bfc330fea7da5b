// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration validation step.

use crate::{
    action::{error_chain, settle, ActionOutcome, Result, StepAction},
    config::{
        apps_file, AppsConfig, Environment, FontsConfig, GitConfig, ReposConfig, SshConfig,
        CURSOR_FILE, FONTS_FILE, GIT_FILE, REPOS_FILE, SSH_FILE,
    },
};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{info, warn};

/// Parse every configuration file present before anything is changed.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValidateConfig;

impl StepAction for ValidateConfig {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(validate(env))
    }
}

fn validate(env: &Environment) -> Result<ActionOutcome> {
    env.ensure_config_dir()?;

    let mut checked = 0;
    let mut problems = Vec::new();

    if let Err(error) = env.load_settings() {
        problems.push(error_chain(&error));
    }

    check::<AppsConfig>(env, &apps_file(env.platform), &mut checked, &mut problems);
    check::<FontsConfig>(env, FONTS_FILE, &mut checked, &mut problems);
    check::<GitConfig>(env, GIT_FILE, &mut checked, &mut problems);
    check::<SshConfig>(env, SSH_FILE, &mut checked, &mut problems);
    check::<Map<String, Value>>(env, CURSOR_FILE, &mut checked, &mut problems);
    check::<ReposConfig>(env, REPOS_FILE, &mut checked, &mut problems);

    if problems.is_empty() {
        info!("{checked} configuration file(s) are valid");
        Ok(ActionOutcome::success(format!(
            "{checked} configuration file(s) are valid"
        )))
    } else {
        Ok(ActionOutcome::failure(problems.join("; ")))
    }
}

fn check<T: DeserializeOwned>(
    env: &Environment,
    name: &str,
    checked: &mut usize,
    problems: &mut Vec<String>,
) {
    if !env.config_path(name).is_file() {
        return;
    }

    *checked += 1;
    if let Err(error) = env.load_json::<T>(name) {
        warn!("{}", error_chain(&error));
        problems.push(error_chain(&error));
    }
}
