// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Font installation step.
//!
//! Fonts are downloaded into the user-level font directory through the worker
//! pool. Each download lands in a `.part` file that is renamed into place once
//! complete. A font whose file already exists, and matches its configured
//! digest if any, is left alone, so a resumed run only fetches what is still
//! missing or damaged.

use crate::{
    action::{error_chain, settle, ActionError, ActionOutcome, Result, StepAction},
    config::{Environment, FontEntry, FontsConfig, FONTS_FILE},
    path::user_font_dir,
    pool,
    syscall::Invocation,
};

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Download configured fonts into the user font directory.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstallFonts;

impl StepAction for InstallFonts {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(install(env))
    }
}

/// What happened to one font.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fetched {
    Downloaded(PathBuf),
    AlreadyPresent(PathBuf),
}

fn install(env: &Environment) -> Result<ActionOutcome> {
    let config: FontsConfig = env.load_json(FONTS_FILE)?;
    let font_dir = user_font_dir(&env.home_dir);

    if env.flags.dry_run {
        let missing = config
            .fonts
            .iter()
            .filter(|font| !is_present(&font_dir.join(font_file_name(&font.url)), font))
            .map(|font| font.name.as_str())
            .collect::<Vec<_>>();
        return Ok(ActionOutcome::success(format!(
            "would download {} font(s) into {}: {}",
            missing.len(),
            font_dir.display(),
            missing.join(", ")
        )));
    }

    std::fs::create_dir_all(&font_dir).map_err(|source| ActionError::Io {
        source,
        path: font_dir.clone(),
    })?;

    let results = pool::run_bounded(config.fonts, env.jobs, |font| {
        let font_dir = font_dir.clone();
        async move {
            let name = font.name.clone();
            (name, fetch_font(font, &font_dir).await)
        }
    })?;

    let mut downloaded = 0;
    let mut present = 0;
    let mut failures = Vec::new();
    for (name, result) in results {
        match result {
            Ok(Fetched::Downloaded(path)) => {
                info!("installed font {name} at {:?}", path.display());
                downloaded += 1;
            }
            Ok(Fetched::AlreadyPresent(path)) => {
                debug!("font {name} already present at {:?}", path.display());
                present += 1;
            }
            Err(error) => {
                warn!("font {name}: {}", error_chain(&error));
                failures.push(name);
            }
        }
    }

    if downloaded > 0 {
        refresh_font_cache();
    }

    let summary = format!("{downloaded} font(s) downloaded, {present} already present");
    if failures.is_empty() {
        Ok(ActionOutcome::success(summary))
    } else {
        failures.sort();
        Ok(ActionOutcome::failure(format!(
            "{summary}, failed: {}",
            failures.join(", ")
        )))
    }
}

async fn fetch_font(font: FontEntry, font_dir: &Path) -> Result<Fetched> {
    let target = font_dir.join(font_file_name(&font.url));
    if is_present(&target, &font) {
        return Ok(Fetched::AlreadyPresent(target));
    }

    debug!("download {}", font.url);
    let response = reqwest::get(&font.url)
        .await
        .map_err(|source| ActionError::Fetch {
            source,
            url: font.url.clone(),
        })?;

    if !response.status().is_success() {
        return Err(ActionError::HttpStatus {
            url: font.url.clone(),
            status: response.status().as_u16(),
        });
    }

    let bytes = response.bytes().await.map_err(|source| ActionError::Fetch {
        source,
        url: font.url.clone(),
    })?;

    if let Some(expected) = &font.sha256 {
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ActionError::DigestMismatch {
                url: font.url.clone(),
                expected: expected.clone(),
                actual,
            });
        }
    }

    let mut partial = target.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|source| ActionError::Io {
            source,
            path: partial.clone(),
        })?;
    tokio::fs::rename(&partial, &target)
        .await
        .map_err(|source| ActionError::Io {
            source,
            path: target.clone(),
        })?;

    Ok(Fetched::Downloaded(target))
}

/// Whether font file at target is complete.
///
/// Without a configured digest any existing file counts. With one, the file
/// must hash to it, so a truncated or tampered file is fetched again.
fn is_present(target: &Path, font: &FontEntry) -> bool {
    let Some(expected) = &font.sha256 else {
        return target.is_file();
    };

    match std::fs::read(target) {
        Ok(data) if sha256_hex(&data).eq_ignore_ascii_case(expected) => true,
        Ok(_) => {
            warn!("font file {:?} does not match its sha256, fetch again", target.display());
            false
        }
        Err(_) => false,
    }
}

/// Lowercase hex SHA-256 digest of data.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// File name a font is stored under, taken from the last segment of its URL.
///
/// Characters outside `[A-Za-z0-9._-]` are replaced, and URLs without a usable
/// segment fall back to a digest of the URL.
pub fn font_file_name(url: &str) -> String {
    let segment = url
        .split(['?', '#'])
        .next()
        .unwrap_or(url)
        .rsplit('/')
        .next()
        .unwrap_or_default();

    let sanitized = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        format!("font-{}", &sha256_hex(url.as_bytes())[..16])
    } else {
        sanitized
    }
}

fn refresh_font_cache() {
    if !cfg!(target_os = "linux") {
        return;
    }

    match Invocation::new("fc-cache", ["-f"]).succeeds() {
        Ok(true) => debug!("refreshed font cache"),
        Ok(false) => warn!("fc-cache exited unsuccessfully, fonts may need a re-login"),
        Err(error) => warn!("{}", error_chain(&error)),
    }
}
