// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! SSH key generation step.

use crate::{
    action::{settle, ActionError, ActionOutcome, Result, StepAction},
    config::{Environment, SshConfig, SSH_FILE},
    syscall::Invocation,
};

use std::{fs, path::Path};
use tracing::info;

/// Generate an SSH key pair unless one already exists.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenerateSshKey;

impl GenerateSshKey {
    /// Command line that generates key without passphrase.
    pub fn invocation(config: &SshConfig, key_path: &Path) -> Invocation {
        Invocation::new(
            "ssh-keygen",
            [
                String::from("-t"),
                config.key_type.clone(),
                "-C".into(),
                config.email.clone(),
                "-f".into(),
                key_path.display().to_string(),
                "-N".into(),
                String::new(),
            ],
        )
    }
}

impl StepAction for GenerateSshKey {
    fn execute(&self, env: &Environment) -> ActionOutcome {
        settle(generate(env))
    }
}

fn generate(env: &Environment) -> Result<ActionOutcome> {
    let config: SshConfig = env.load_json(SSH_FILE)?;
    let key_path = config.key_path(&env.home_dir)?;

    if key_path.exists() {
        return Ok(ActionOutcome::success(format!(
            "key {} already exists",
            key_path.display()
        )));
    }

    let invocation = GenerateSshKey::invocation(&config, &key_path);
    if env.flags.dry_run {
        return Ok(ActionOutcome::success(format!("would run {invocation}")));
    }

    if let Some(parent) = key_path.parent() {
        fs::create_dir_all(parent).map_err(|source| ActionError::Io {
            source,
            path: parent.into(),
        })?;
    }

    info!("generate {} key at {:?}", config.key_type, key_path.display());
    invocation.run()?;

    Ok(ActionOutcome::success(format!(
        "generated {} key {}",
        config.key_type,
        key_path.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn keygen_command_line() {
        let config = SshConfig {
            email: "john@doe.com".into(),
            key_type: "ed25519".into(),
            key_path: None,
        };
        let result = GenerateSshKey::invocation(&config, Path::new("/home/blah/.ssh/id_ed25519"));
        assert_eq!(
            result.to_string(),
            r#"ssh-keygen -t ed25519 -C john@doe.com -f /home/blah/.ssh/id_ed25519 -N """#
        );
    }

    #[sealed_test]
    fn existing_key_is_kept() -> anyhow::Result<()> {
        let cwd = std::env::current_dir()?;
        fs::write(cwd.join(SSH_FILE), r#"{ "email": "john@doe.com" }"#)?;
        fs::create_dir_all(cwd.join(".ssh"))?;
        fs::write(cwd.join(".ssh").join("id_ed25519"), "secret")?;
        let env = Environment::new(Platform::Debian, &cwd, cwd.join("state"), &cwd);

        let outcome = GenerateSshKey.execute(&env);
        assert!(outcome.success);
        assert!(outcome.message.ends_with("already exists"));
        assert_eq!(fs::read_to_string(cwd.join(".ssh").join("id_ed25519"))?, "secret");

        Ok(())
    }
}
