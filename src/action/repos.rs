// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository cloning step.
//!
//! Clones every listed repository into the configured directory through
//! libgit2. Clone progress is displayed through a progress bar. If a remote
//! needs credentials, then the progress bar is suspended while the user is
//! prompted for them.

use crate::{
    action::{error_chain, settle, ActionError, ActionOutcome, Result, StepAction},
    config::{expand_path, Environment, RepoEntry, ReposConfig, REPOS_FILE},
};

use auth_git2::{GitAuthenticator, Prompter};
use git2::{build::RepoBuilder, Config, FetchOptions, RemoteCallbacks};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::{Password, Text};
use std::{
    fs,
    path::{Path, PathBuf},
    time,
};
use tracing::{info, instrument, warn};

/// Clone configured repositories that are not present yet.
#[derive(Debug, Default, Clone, Copy)]
pub struct CloneRepos;

impl StepAction for CloneRepos {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(clone_all(env))
    }
}

fn clone_all(env: &Environment) -> Result<ActionOutcome> {
    let config: ReposConfig = env.load_json(REPOS_FILE)?;
    let directory = expand_path(&config.directory)?;

    let pending = config
        .repositories
        .iter()
        .zip(clone_targets(&config)?)
        .filter(|(_, target)| !target.exists())
        .collect::<Vec<_>>();
    let present = config.repositories.len() - pending.len();

    if env.flags.dry_run {
        let listing = pending
            .iter()
            .map(|(repo, _)| repo.url.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        return Ok(ActionOutcome::success(format!(
            "would clone {} repo(s) into {}: {listing}",
            pending.len(),
            directory.display()
        )));
    }

    fs::create_dir_all(&directory).map_err(|source| ActionError::Io {
        source,
        path: directory.clone(),
    })?;

    let mut cloned = 0;
    let mut failures = Vec::new();
    for (repo, target) in pending {
        match try_clone(repo, &target) {
            Ok(()) => {
                info!("cloned {} into {:?}", repo.url, target.display());
                cloned += 1;
            }
            Err(error) => {
                warn!("failed to clone {}: {}", repo.url, error_chain(&error));
                failures.push(repo.url.clone());
            }
        }
    }

    let summary = format!("{cloned} repo(s) cloned, {present} already present");
    if failures.is_empty() {
        Ok(ActionOutcome::success(summary))
    } else {
        Ok(ActionOutcome::failure(format!(
            "{summary}, failed: {}",
            failures.join(", ")
        )))
    }
}

/// Clone repository to target path, showing progress.
///
/// # Errors
///
/// - Return [`ActionError::Git2`] if libgit2 operations fail.
/// - Return [`ActionError::IndicatifStyleTemplate`] if progress bar cannot be
///   styled.
#[instrument(skip(repo, target), level = "debug")]
fn try_clone(repo: &RepoEntry, target: &Path) -> Result<()> {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(repo.url.clone());
    bar.enable_steady_tick(time::Duration::from_millis(100));

    let prompter = IndicatifPrompter::new(bar);
    let authenticator = GitAuthenticator::default().set_prompter(prompter.clone());
    let config = Config::open_default()?;

    let mut throttle = time::Instant::now();
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(&config));
    rc.transfer_progress(|progress| {
        let stats = progress.to_owned();
        let bar_size = stats.total_objects() as u64;
        let bar_pos = stats.received_objects() as u64;
        if throttle.elapsed() > time::Duration::from_millis(10) {
            throttle = time::Instant::now();
            prompter.bar.set_length(bar_size);
            prompter.bar.set_position(bar_pos);
        }
        true
    });

    let mut fo = FetchOptions::new();
    fo.remote_callbacks(rc);
    let result = RepoBuilder::new().fetch_options(fo).clone(&repo.url, target);
    prompter.bar.finish_and_clear();
    result?;

    Ok(())
}

/// Git2 authentication prompter for progress bar.
#[derive(Debug, Clone)]
pub struct IndicatifPrompter {
    pub(crate) bar: ProgressBar,
}

impl IndicatifPrompter {
    /// Construct new progress bar authenticator.
    pub fn new(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Prompter for IndicatifPrompter {
    #[instrument(skip(self, url, _config), level = "debug")]
    fn prompt_username_password(
        &mut self,
        url: &str,
        _config: &git2::Config,
    ) -> Option<(String, String)> {
        info!("authentication required at {url}");
        self.bar.suspend(|| -> Option<(String, String)> {
            let username = Text::new("username").prompt().ok()?;
            let password = Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()?;
            Some((username, password))
        })
    }

    #[instrument(skip(self, username, url, _config), level = "debug")]
    fn prompt_password(
        &mut self,
        username: &str,
        url: &str,
        _config: &git2::Config,
    ) -> Option<String> {
        info!("authentication required at {url} for user {username}");
        self.bar.suspend(|| {
            Password::new("password")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }

    #[instrument(skip(self, ssh_key_path, _config), level = "debug")]
    fn prompt_ssh_key_passphrase(
        &mut self,
        ssh_key_path: &Path,
        _config: &git2::Config,
    ) -> Option<String> {
        info!(
            "authentication required with ssh key at {}",
            ssh_key_path.display()
        );
        self.bar.suspend(|| {
            Password::new("passphrase")
                .without_confirmation()
                .prompt()
                .ok()
        })
    }
}

/// Clone targets of every listed repository, in listing order.
///
/// # Errors
///
/// - Return [`ActionError::Config`] if directory cannot be expanded, or a
///   repository name would escape it.
pub fn clone_targets(config: &ReposConfig) -> Result<Vec<PathBuf>> {
    let directory = expand_path(&config.directory)?;
    config
        .repositories
        .iter()
        .map(|repo| -> Result<PathBuf> { Ok(directory.join(repo.dir_name()?)) })
        .collect()
}
