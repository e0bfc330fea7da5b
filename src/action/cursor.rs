// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Cursor editor settings step.
//!
//! The configured settings object is merged into the editor's existing user
//! settings rather than replacing them. Nested objects merge key by key, and
//! any other configured value overwrites what the editor had.

use crate::{
    action::{settle, ActionError, ActionOutcome, Result, StepAction},
    config::{Environment, CURSOR_FILE},
    path::cursor_settings_file,
};

use serde_json::{Map, Value};
use std::{fs, path::Path};
use tracing::info;

/// Merge configured settings into Cursor's user settings file.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConfigureCursor;

impl StepAction for ConfigureCursor {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(configure(env))
    }
}

/// Recursively merge `overlay` into `base`.
pub fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn configure(env: &Environment) -> Result<ActionOutcome> {
    let overlay: Map<String, Value> = env.load_json(CURSOR_FILE)?;
    let target = cursor_settings_file(&env.home_dir);

    if env.flags.dry_run {
        return Ok(ActionOutcome::success(format!(
            "would merge {} setting(s) into {}",
            overlay.len(),
            target.display()
        )));
    }

    let mut settings = read_settings(&target)?;
    let count = overlay.len();
    deep_merge(&mut settings, Value::Object(overlay));

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| ActionError::Io {
            source,
            path: parent.into(),
        })?;
    }

    let mut data = serde_json::to_string_pretty(&settings).map_err(|source| ActionError::Json {
        source,
        path: target.clone(),
    })?;
    data.push('\n');
    fs::write(&target, data).map_err(|source| ActionError::Io {
        source,
        path: target.clone(),
    })?;
    info!("merged {count} setting(s) into {:?}", target.display());

    Ok(ActionOutcome::success(format!(
        "merged {count} setting(s) into {}",
        target.display()
    )))
}

fn read_settings(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let data = fs::read_to_string(path).map_err(|source| ActionError::Io {
        source,
        path: path.into(),
    })?;
    if data.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    serde_json::from_str(&data).map_err(|source| ActionError::Json {
        source,
        path: path.into(),
    })
}
